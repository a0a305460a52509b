//! Durable session store
//!
//! The `interview_sessions` row is the durable home of a session's difficulty
//! state: denormalized columns for cheap reads plus the JSON blob for replay.
//! Writers go through [`SessionStore::save_difficulty`], which always writes
//! both together.

pub mod sessions;

pub use sessions::SqliteSessionStore;

use crate::state::SessionDifficultyState;
use crate::Result;
use async_trait::async_trait;
use ivp_common::db::{DifficultyColumns, NewSession, PersistedSessionRecord};
use uuid::Uuid;

/// Persistence seam used by the manager, validation and recovery
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session row, None if no such session exists
    async fn load_record(&self, session_id: Uuid) -> Result<Option<PersistedSessionRecord>>;

    /// Write difficulty columns and blob in one statement
    ///
    /// # Errors
    /// `SessionNotFound` if the row does not exist, `Database` if the write fails.
    async fn save_difficulty(&self, session_id: Uuid, columns: &DifficultyColumns) -> Result<()>;

    /// Insert a new session row
    async fn create_session(&self, session: &NewSession) -> Result<()>;

    /// Session ids, optionally restricted to one user, oldest first
    async fn list_session_ids(&self, user_id: Option<Uuid>) -> Result<Vec<Uuid>>;
}

/// Columns and blob describing a state
pub fn difficulty_columns(state: &SessionDifficultyState) -> Result<DifficultyColumns> {
    Ok(DifficultyColumns {
        initial: state.initial_difficulty(),
        current: state.current_difficulty(),
        final_level: state.final_difficulty(),
        changes_count: state.changes().len() as i64,
        state_json: state.to_json()?,
    })
}
