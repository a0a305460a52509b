//! Database models

use crate::DifficultyLevel;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One `interview_sessions` row, difficulty columns as stored
///
/// Column values are kept raw so that diagnostics can see exactly what is on
/// disk, including values no current writer would produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSessionRecord {
    pub session_id: Uuid,
    pub user_id: Option<Uuid>,
    pub parent_session_id: Option<Uuid>,
    /// Legacy column predating per-session difficulty tracking
    pub difficulty_level: Option<String>,
    pub initial_difficulty_level: Option<String>,
    pub current_difficulty_level: Option<String>,
    pub final_difficulty_level: Option<String>,
    pub difficulty_changes_count: i64,
    /// Serialized state blob, the authoritative replay source
    pub difficulty_state_json: Option<String>,
}

impl PersistedSessionRecord {
    pub fn initial_level(&self) -> Option<DifficultyLevel> {
        parse_column(&self.initial_difficulty_level)
    }

    pub fn current_level(&self) -> Option<DifficultyLevel> {
        parse_column(&self.current_difficulty_level)
    }

    pub fn final_level(&self) -> Option<DifficultyLevel> {
        parse_column(&self.final_difficulty_level)
    }

    pub fn legacy_level(&self) -> Option<DifficultyLevel> {
        parse_column(&self.difficulty_level)
    }

    /// True if the row carries a non-empty state blob
    pub fn has_state_json(&self) -> bool {
        self.difficulty_state_json
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }
}

fn parse_column(value: &Option<String>) -> Option<DifficultyLevel> {
    value.as_deref().and_then(DifficultyLevel::parse)
}

/// Denormalized difficulty columns plus blob, always written together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifficultyColumns {
    pub initial: DifficultyLevel,
    pub current: DifficultyLevel,
    pub final_level: Option<DifficultyLevel>,
    pub changes_count: i64,
    pub state_json: String,
}

/// Insert request for a new session row
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_id: Uuid,
    pub user_id: Option<Uuid>,
    pub parent_session_id: Option<Uuid>,
    pub difficulty_level: DifficultyLevel,
}
