//! "Practice again" session creation
//!
//! A practice session starts at its parent's *ending* difficulty: the final
//! difficulty of a completed interview, or the current one if the parent was
//! never finalized.

use crate::manager::DifficultyStateManager;
use crate::{Error, Result};
use ivp_common::db::NewSession;
use ivp_common::DifficultyLevel;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// A newly created practice session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PracticeSession {
    pub session_id: Uuid,
    pub parent_session_id: Uuid,
    pub user_id: Option<Uuid>,
    pub initial_difficulty: DifficultyLevel,
}

pub struct PracticeSessionService {
    manager: Arc<DifficultyStateManager>,
}

impl PracticeSessionService {
    pub fn new(manager: Arc<DifficultyStateManager>) -> Self {
        Self { manager }
    }

    /// Create and initialize a practice session cloned from `parent_session_id`
    ///
    /// # Errors
    /// `SessionNotFound` if the parent does not exist, `Database` if the new
    /// row or its difficulty state cannot be written.
    pub async fn create_practice_session(&self, parent_session_id: Uuid) -> Result<PracticeSession> {
        let parent = self
            .manager
            .store()
            .load_record(parent_session_id)
            .await?
            .ok_or(Error::SessionNotFound(parent_session_id))?;

        let initial_difficulty = self
            .manager
            .get_difficulty_for_practice(parent_session_id)
            .await;

        let session_id = Uuid::new_v4();
        self.manager
            .store()
            .create_session(&NewSession {
                session_id,
                user_id: parent.user_id,
                parent_session_id: Some(parent_session_id),
                difficulty_level: initial_difficulty,
            })
            .await?;

        let state = self
            .manager
            .initialize_session(session_id, initial_difficulty)
            .await?;

        info!(
            "Session {}: practice session created from {} at {}",
            session_id,
            parent_session_id,
            state.initial_difficulty()
        );

        Ok(PracticeSession {
            session_id,
            parent_session_id,
            user_id: parent.user_id,
            initial_difficulty: state.initial_difficulty(),
        })
    }
}
