//! SQLite session queries
//!
//! GUIDs are stored as TEXT and difficulty columns as lowercase tokens.

use super::SessionStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use ivp_common::db::{DifficultyColumns, NewSession, PersistedSessionRecord};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, warn};
use uuid::Uuid;

/// [`SessionStore`] backed by the `interview_sessions` table
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: Pool<Sqlite>,
}

impl SqliteSessionStore {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.db
    }
}

fn parse_guid(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::InvalidRecord(format!("Invalid {} {:?}: {}", column, value, e)))
}

fn parse_optional_guid(column: &str, value: Option<String>) -> Result<Option<Uuid>> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| parse_guid(column, &v))
        .transpose()
}

fn record_from_row(row: &SqliteRow) -> Result<PersistedSessionRecord> {
    let guid: String = row.get("guid");

    Ok(PersistedSessionRecord {
        session_id: parse_guid("guid", &guid)?,
        user_id: parse_optional_guid("user_guid", row.get("user_guid"))?,
        parent_session_id: parse_optional_guid("parent_session_guid", row.get("parent_session_guid"))?,
        difficulty_level: row.get("difficulty_level"),
        initial_difficulty_level: row.get("initial_difficulty_level"),
        current_difficulty_level: row.get("current_difficulty_level"),
        final_difficulty_level: row.get("final_difficulty_level"),
        difficulty_changes_count: row
            .get::<Option<i64>, _>("difficulty_changes_count")
            .unwrap_or(0),
        difficulty_state_json: row.get("difficulty_state_json"),
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load_record(&self, session_id: Uuid) -> Result<Option<PersistedSessionRecord>> {
        let row = sqlx::query(
            r#"
            SELECT guid, user_guid, parent_session_guid, difficulty_level,
                   initial_difficulty_level, current_difficulty_level,
                   final_difficulty_level, difficulty_changes_count,
                   difficulty_state_json
            FROM interview_sessions
            WHERE guid = ?
            "#,
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn save_difficulty(&self, session_id: Uuid, columns: &DifficultyColumns) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE interview_sessions
            SET initial_difficulty_level = ?,
                current_difficulty_level = ?,
                final_difficulty_level = ?,
                difficulty_changes_count = ?,
                difficulty_state_json = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE guid = ?
            "#,
        )
        .bind(columns.initial.as_token())
        .bind(columns.current.as_token())
        .bind(columns.final_level.map(|level| level.as_token()))
        .bind(columns.changes_count)
        .bind(&columns.state_json)
        .bind(session_id.to_string())
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::SessionNotFound(session_id));
        }

        debug!(
            "Session {}: persisted difficulty (current={}, final={:?}, changes={})",
            session_id, columns.current, columns.final_level, columns.changes_count
        );
        Ok(())
    }

    async fn create_session(&self, session: &NewSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO interview_sessions (guid, user_guid, parent_session_guid, difficulty_level)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(session.session_id.to_string())
        .bind(session.user_id.map(|id| id.to_string()))
        .bind(session.parent_session_id.map(|id| id.to_string()))
        .bind(session.difficulty_level.as_token())
        .execute(&self.db)
        .await?;

        debug!(
            "Session {}: created (user={:?}, parent={:?})",
            session.session_id, session.user_id, session.parent_session_id
        );
        Ok(())
    }

    async fn list_session_ids(&self, user_id: Option<Uuid>) -> Result<Vec<Uuid>> {
        let guids: Vec<String> = match user_id {
            Some(user_id) => {
                sqlx::query_scalar(
                    "SELECT guid FROM interview_sessions WHERE user_guid = ? ORDER BY created_at, guid",
                )
                .bind(user_id.to_string())
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT guid FROM interview_sessions ORDER BY created_at, guid")
                    .fetch_all(&self.db)
                    .await?
            }
        };

        let mut ids = Vec::with_capacity(guids.len());
        for guid in guids {
            match Uuid::parse_str(&guid) {
                Ok(id) => ids.push(id),
                Err(e) => warn!("Skipping session with invalid guid {:?}: {}", guid, e),
            }
        }
        Ok(ids)
    }
}
