//! Difficulty state recovery
//!
//! Strategies are tried in order, stopping at the first that yields a valid
//! state:
//! 1. **FromStateJson** - the stored blob parses, belongs to the session and
//!    passes validation
//! 2. **FromColumns** - rebuild a zero-change state from the denormalized
//!    columns, recording the lost history as a baseline
//! 3. **ResetFromBaseLevel** - fresh state from the legacy `difficulty_level`
//!    column (data loss)
//!
//! Recovery never returns an error. Failures come back as an outcome flagged
//! for manual review. Recover and reset hold the session lock from reading the
//! record to writing the repaired state.

use crate::manager::{DifficultyStateManager, SessionGuard};
use crate::state::SessionDifficultyState;
use crate::validation::{SessionValidationReport, ValidationService};
use ivp_common::db::PersistedSessionRecord;
use ivp_common::DifficultyLevel;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// How a state was (or would be) recovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    FromStateJson,
    FromColumns,
    ResetFromBaseLevel,
}

impl RecoveryStrategy {
    /// Whether the strategy discards recorded history
    pub fn loses_history(&self) -> bool {
        !matches!(self, RecoveryStrategy::FromStateJson)
    }
}

/// Result of a recovery or reset attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryOutcome {
    pub session_id: Uuid,
    pub success: bool,
    pub strategy: Option<RecoveryStrategy>,
    pub current_difficulty: Option<DifficultyLevel>,
    pub final_difficulty: Option<DifficultyLevel>,
    pub changes_count: usize,
    pub manual_review_required: bool,
    /// Why earlier strategies were skipped, and any write failure
    pub messages: Vec<String>,
}

impl RecoveryOutcome {
    fn failed(session_id: Uuid, messages: Vec<String>) -> Self {
        Self {
            session_id,
            success: false,
            strategy: None,
            current_difficulty: None,
            final_difficulty: None,
            changes_count: 0,
            manual_review_required: true,
            messages,
        }
    }

    fn recovered(
        strategy: RecoveryStrategy,
        state: &SessionDifficultyState,
        messages: Vec<String>,
    ) -> Self {
        Self {
            session_id: state.session_id(),
            success: true,
            strategy: Some(strategy),
            current_difficulty: Some(state.current_difficulty()),
            final_difficulty: state.final_difficulty(),
            changes_count: state.changes().len(),
            manual_review_required: false,
            messages,
        }
    }
}

/// Validation report plus the strategy recovery would use
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnosis {
    pub report: SessionValidationReport,
    pub planned_strategy: Option<RecoveryStrategy>,
    pub messages: Vec<String>,
}

/// A state chosen by the strategy chain, not yet written
struct RecoveryPlan {
    strategy: RecoveryStrategy,
    state: SessionDifficultyState,
    messages: Vec<String>,
}

/// Repairs session difficulty state through the manager
pub struct RecoveryService {
    manager: Arc<DifficultyStateManager>,
    validation: ValidationService,
}

impl RecoveryService {
    pub fn new(manager: Arc<DifficultyStateManager>) -> Self {
        Self {
            validation: ValidationService::new(Arc::clone(&manager)),
            manager,
        }
    }

    /// Validate a session and report which strategy recovery would pick
    pub async fn diagnose(&self, session_id: Uuid) -> Diagnosis {
        let report = self.validation.validate_session(session_id).await;

        let (planned_strategy, messages) = match self.load(session_id).await {
            Ok(record) => {
                let plan = self.plan(&record);
                (Some(plan.strategy), plan.messages)
            }
            Err(messages) => (None, messages),
        };

        Diagnosis {
            report,
            planned_strategy,
            messages,
        }
    }

    /// Run the strategy chain and persist the first usable state
    pub async fn recover(&self, session_id: Uuid) -> RecoveryOutcome {
        let lock = self.manager.lock_session(session_id).await;

        let record = match self.load(session_id).await {
            Ok(record) => record,
            Err(messages) => {
                error!(
                    "Session {}: difficulty recovery failed, manual review required",
                    session_id
                );
                return RecoveryOutcome::failed(session_id, messages);
            }
        };

        let plan = self.plan(&record);
        self.apply(plan, &lock).await
    }

    /// Discard stored history and restart from the base difficulty level
    pub async fn reset(&self, session_id: Uuid) -> RecoveryOutcome {
        let lock = self.manager.lock_session(session_id).await;

        let record = match self.load(session_id).await {
            Ok(record) => record,
            Err(messages) => {
                error!(
                    "Session {}: difficulty reset failed, manual review required",
                    session_id
                );
                return RecoveryOutcome::failed(session_id, messages);
            }
        };

        let plan = self.reset_plan(&record, vec!["reset requested".to_string()]);
        self.apply(plan, &lock).await
    }

    async fn load(&self, session_id: Uuid) -> std::result::Result<PersistedSessionRecord, Vec<String>> {
        match self.manager.store().load_record(session_id).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => {
                warn!("Session {}: no session record to recover", session_id);
                Err(vec!["session record not found".to_string()])
            }
            Err(e) => {
                warn!("Session {}: could not load session record: {}", session_id, e);
                Err(vec![format!("could not load session record: {}", e)])
            }
        }
    }

    fn plan(&self, record: &PersistedSessionRecord) -> RecoveryPlan {
        let mut messages = Vec::new();

        match self.from_state_json(record) {
            Ok(state) => {
                return RecoveryPlan {
                    strategy: RecoveryStrategy::FromStateJson,
                    state,
                    messages,
                }
            }
            Err(reason) => messages.push(reason),
        }

        match self.from_columns(record) {
            Ok(state) => {
                return RecoveryPlan {
                    strategy: RecoveryStrategy::FromColumns,
                    state,
                    messages,
                }
            }
            Err(reason) => messages.push(reason),
        }

        self.reset_plan(record, messages)
    }

    fn from_state_json(
        &self,
        record: &PersistedSessionRecord,
    ) -> std::result::Result<SessionDifficultyState, String> {
        let json = record
            .difficulty_state_json
            .as_deref()
            .filter(|json| !json.trim().is_empty())
            .ok_or_else(|| "state blob absent".to_string())?;

        let state = SessionDifficultyState::from_json(json)
            .map_err(|e| format!("state blob unreadable: {}", e))?;

        if state.session_id() != record.session_id {
            return Err(format!("state blob belongs to session {}", state.session_id()));
        }

        let violations = state.validate();
        if !violations.is_empty() {
            return Err(format!("state blob invalid: {}", violations.join("; ")));
        }

        Ok(state)
    }

    fn from_columns(
        &self,
        record: &PersistedSessionRecord,
    ) -> std::result::Result<SessionDifficultyState, String> {
        let initial = record
            .initial_level()
            .ok_or_else(|| "initial_difficulty_level column missing or unreadable".to_string())?;
        let current = record.current_level().unwrap_or(initial);

        Ok(SessionDifficultyState::from_columns(
            record.session_id,
            initial,
            current,
            record.final_level(),
            self.manager.now(),
        ))
    }

    fn reset_plan(&self, record: &PersistedSessionRecord, mut messages: Vec<String>) -> RecoveryPlan {
        let base = match record.legacy_level() {
            Some(level) => level,
            None => {
                let fallback = self.manager.config().default_difficulty;
                messages.push(format!(
                    "difficulty_level column missing or unreadable, using {}",
                    fallback
                ));
                fallback
            }
        };

        RecoveryPlan {
            strategy: RecoveryStrategy::ResetFromBaseLevel,
            state: SessionDifficultyState::new_at(record.session_id, base, self.manager.now()),
            messages,
        }
    }

    async fn apply(&self, plan: RecoveryPlan, lock: &SessionGuard<'_>) -> RecoveryOutcome {
        let RecoveryPlan {
            strategy,
            state,
            mut messages,
        } = plan;
        let session_id = state.session_id();

        if let Err(e) = self.manager.replace_state(&state, lock).await {
            error!(
                "Session {}: recovery via {:?} could not be written: {}",
                session_id, strategy, e
            );
            messages.push(format!("write failed: {}", e));
            return RecoveryOutcome::failed(session_id, messages);
        }

        if strategy.loses_history() {
            warn!(
                "Session {}: difficulty state recovered via {:?} at {}, change history lost ({})",
                session_id,
                strategy,
                state.current_difficulty(),
                messages.join("; ")
            );
        } else {
            info!(
                "Session {}: difficulty state recovered via {:?} at {}",
                session_id,
                strategy,
                state.current_difficulty()
            );
        }

        RecoveryOutcome::recovered(strategy, &state, messages)
    }
}
