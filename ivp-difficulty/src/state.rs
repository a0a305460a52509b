//! Per-session difficulty state machine
//!
//! A session starts `Active` at the user's chosen difficulty, records one
//! [`DifficultyChange`] per adjustment and becomes `Finalized` exactly once when
//! the interview completes. Writes keep the change chain continuous by
//! construction; [`SessionDifficultyState::validate`] re-checks it for
//! diagnostics on states read back from storage.
//!
//! The JSON form ([`StateRecord`]) is versioned because sessions are read back,
//! recovered and cloned long after they were written.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use ivp_common::{time, DifficultyLevel};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Current version of the serialized state blob
pub const STATE_FORMAT_VERSION: u32 = 1;

fn legacy_format_version() -> u32 {
    1
}

/// One difficulty adjustment, immutable once appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyChange {
    pub from: DifficultyLevel,
    pub to: DifficultyLevel,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_index: Option<u32>,
    /// 1-based position in the change log
    pub change_number: u32,
}

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatePhase {
    Active,
    /// Terminal; no further changes are accepted
    Finalized,
}

/// Serialized state blob stored in `difficulty_state_json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Blobs written before versioning carry no version and read as v1
    #[serde(default = "legacy_format_version")]
    pub version: u32,
    pub session_id: Uuid,
    pub initial_difficulty: DifficultyLevel,
    pub current_difficulty: DifficultyLevel,
    #[serde(default)]
    pub final_difficulty: Option<DifficultyLevel>,
    #[serde(default)]
    pub changes: Vec<DifficultyChange>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub is_finalized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_baseline: Option<DifficultyLevel>,
}

/// Difficulty trajectory of one interview session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDifficultyState {
    session_id: Uuid,
    initial_difficulty: DifficultyLevel,
    current_difficulty: DifficultyLevel,
    final_difficulty: Option<DifficultyLevel>,
    changes: Vec<DifficultyChange>,
    last_updated: DateTime<Utc>,
    is_finalized: bool,
    /// Level the change log starts from when earlier history was lost
    history_baseline: Option<DifficultyLevel>,
}

impl SessionDifficultyState {
    /// Fresh active state at the given difficulty
    pub fn new(session_id: Uuid, initial: DifficultyLevel) -> Self {
        Self::new_at(session_id, initial, time::now())
    }

    pub fn new_at(session_id: Uuid, initial: DifficultyLevel, at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            initial_difficulty: initial,
            current_difficulty: initial,
            final_difficulty: None,
            changes: Vec::new(),
            last_updated: at,
            is_finalized: false,
            history_baseline: None,
        }
    }

    /// State rebuilt from denormalized columns without a change log
    ///
    /// The change chain restarts at `current`, which is recorded as the
    /// history baseline so validation does not expect the lost changes.
    pub fn from_columns(
        session_id: Uuid,
        initial: DifficultyLevel,
        current: DifficultyLevel,
        final_difficulty: Option<DifficultyLevel>,
        at: DateTime<Utc>,
    ) -> Self {
        // A final column wins over current: finalize copies current into final
        let current = final_difficulty.unwrap_or(current);
        let history_baseline = if current != initial { Some(current) } else { None };

        Self {
            session_id,
            initial_difficulty: initial,
            current_difficulty: current,
            final_difficulty,
            changes: Vec::new(),
            last_updated: at,
            is_finalized: final_difficulty.is_some(),
            history_baseline,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn initial_difficulty(&self) -> DifficultyLevel {
        self.initial_difficulty
    }

    pub fn current_difficulty(&self) -> DifficultyLevel {
        self.current_difficulty
    }

    pub fn final_difficulty(&self) -> Option<DifficultyLevel> {
        self.final_difficulty
    }

    pub fn changes(&self) -> &[DifficultyChange] {
        &self.changes
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn is_finalized(&self) -> bool {
        self.is_finalized
    }

    pub fn history_baseline(&self) -> Option<DifficultyLevel> {
        self.history_baseline
    }

    pub fn phase(&self) -> StatePhase {
        if self.is_finalized {
            StatePhase::Finalized
        } else {
            StatePhase::Active
        }
    }

    /// Level the change log starts from
    pub fn chain_start(&self) -> DifficultyLevel {
        self.history_baseline.unwrap_or(self.initial_difficulty)
    }

    /// Record an adjustment at the current time
    pub fn update(
        &mut self,
        new_difficulty: DifficultyLevel,
        reason: impl Into<String>,
        question_index: Option<u32>,
    ) -> bool {
        self.update_at(new_difficulty, reason, question_index, time::now())
    }

    /// Record an adjustment
    ///
    /// Returns false, leaving the state untouched, when the state is finalized
    /// or `new_difficulty` equals the current difficulty.
    pub fn update_at(
        &mut self,
        new_difficulty: DifficultyLevel,
        reason: impl Into<String>,
        question_index: Option<u32>,
        at: DateTime<Utc>,
    ) -> bool {
        if self.is_finalized {
            debug!(
                "Session {}: ignoring difficulty update to {} after finalize",
                self.session_id, new_difficulty
            );
            return false;
        }

        if new_difficulty == self.current_difficulty {
            debug!(
                "Session {}: difficulty already {}, no change recorded",
                self.session_id, new_difficulty
            );
            return false;
        }

        let change = DifficultyChange {
            from: self.current_difficulty,
            to: new_difficulty,
            reason: reason.into(),
            timestamp: at,
            question_index,
            change_number: self.changes.len() as u32 + 1,
        };
        self.changes.push(change);
        self.current_difficulty = new_difficulty;
        self.last_updated = at;
        true
    }

    /// Finalize at the current time
    pub fn finalize(&mut self) -> DifficultyLevel {
        self.finalize_at(time::now())
    }

    /// Freeze the trajectory and return the final difficulty
    ///
    /// Idempotent: a second call returns the existing final difficulty.
    pub fn finalize_at(&mut self, at: DateTime<Utc>) -> DifficultyLevel {
        if self.is_finalized {
            if let Some(final_difficulty) = self.final_difficulty {
                return final_difficulty;
            }
        }

        self.final_difficulty = Some(self.current_difficulty);
        self.is_finalized = true;
        self.last_updated = at;
        self.current_difficulty
    }

    /// Ending difficulty to seed a practice-again session with
    ///
    /// The final difficulty once finalized, otherwise the current one.
    pub fn get_difficulty_for_practice(&self) -> DifficultyLevel {
        match (self.is_finalized, self.final_difficulty) {
            (true, Some(final_difficulty)) => final_difficulty,
            _ => self.current_difficulty,
        }
    }

    /// Difficulty obtained by replaying the change log from its start
    pub fn replay_current(&self) -> DifficultyLevel {
        self.changes
            .iter()
            .fold(self.chain_start(), |_, change| change.to)
    }

    /// Check chain continuity and finalization invariants
    ///
    /// Returns one message per violation; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let start = self.chain_start();

        if let Some(first) = self.changes.first() {
            if first.from != start {
                violations.push(format!(
                    "first change starts at {} but chain starts at {}",
                    first.from, start
                ));
            }
        }

        for (index, change) in self.changes.iter().enumerate() {
            let expected_number = index as u32 + 1;
            if change.change_number != expected_number {
                violations.push(format!(
                    "change at position {} has change_number {}",
                    expected_number, change.change_number
                ));
            }
            if change.from == change.to {
                violations.push(format!(
                    "change {} does not change difficulty ({})",
                    change.change_number, change.from
                ));
            }
        }

        for pair in self.changes.windows(2) {
            if pair[0].to != pair[1].from {
                violations.push(format!(
                    "change {} ends at {} but change {} starts at {}",
                    pair[0].change_number, pair[0].to, pair[1].change_number, pair[1].from
                ));
            }
        }

        let replayed = self.replay_current();
        if replayed != self.current_difficulty {
            violations.push(format!(
                "current difficulty {} does not match replayed difficulty {}",
                self.current_difficulty, replayed
            ));
        }

        match (self.is_finalized, self.final_difficulty) {
            (true, None) => violations.push("finalized without a final difficulty".to_string()),
            (false, Some(level)) => violations.push(format!(
                "final difficulty {} set on an active session",
                level
            )),
            (true, Some(level)) if level != self.current_difficulty => violations.push(format!(
                "final difficulty {} differs from current difficulty {}",
                level, self.current_difficulty
            )),
            _ => {}
        }

        violations
    }

    /// Serializable form of this state
    pub fn to_record(&self) -> StateRecord {
        StateRecord {
            version: STATE_FORMAT_VERSION,
            session_id: self.session_id,
            initial_difficulty: self.initial_difficulty,
            current_difficulty: self.current_difficulty,
            final_difficulty: self.final_difficulty,
            changes: self.changes.clone(),
            last_updated: self.last_updated,
            is_finalized: self.is_finalized,
            history_baseline: self.history_baseline,
        }
    }

    /// Rebuild a state from its serialized form
    ///
    /// Checks the format version only; invariants are reported by
    /// [`validate`](Self::validate).
    pub fn from_record(record: StateRecord) -> Result<Self> {
        if record.version == 0 {
            return Err(Error::InvalidRecord(format!(
                "session {}: state format version 0",
                record.session_id
            )));
        }
        if record.version > STATE_FORMAT_VERSION {
            return Err(Error::UnsupportedStateVersion(record.version));
        }

        Ok(Self {
            session_id: record.session_id,
            initial_difficulty: record.initial_difficulty,
            current_difficulty: record.current_difficulty,
            final_difficulty: record.final_difficulty,
            changes: record.changes,
            last_updated: record.last_updated,
            is_finalized: record.is_finalized,
            history_baseline: record.history_baseline,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_record())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let record: StateRecord = serde_json::from_str(json)?;
        Self::from_record(record)
    }
}
