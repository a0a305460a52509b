//! Test helpers for ivp-difficulty integration tests
//!
//! `TestEnv` wires a manager over an in-memory SQLite store with a manual
//! clock, plus raw SQL helpers for simulating damaged rows. The manager reads
//! through a [`GatedStore`] so tests can pause a load midway.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use ivp_common::db::{init_schema, DifficultyColumns, NewSession, PersistedSessionRecord};
use ivp_common::time::ManualClock;
use ivp_common::DifficultyLevel;
use ivp_difficulty::cache::InMemoryStateCache;
use ivp_difficulty::config::EngineConfig;
use ivp_difficulty::db::{SessionStore, SqliteSessionStore};
use ivp_difficulty::DifficultyStateManager;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 14, 0, 0).unwrap()
}

struct LoadGate {
    entered: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// SQLite store whose next `load_record` can be held after it has read the row
pub struct GatedStore {
    inner: SqliteSessionStore,
    gate: Mutex<Option<LoadGate>>,
}

impl GatedStore {
    pub fn new(inner: SqliteSessionStore) -> Self {
        Self {
            inner,
            gate: Mutex::new(None),
        }
    }

    /// Hold the next load once it has read its row
    ///
    /// Returns a receiver that fires when the load is held, and the sender
    /// that lets it continue.
    pub async fn pause_next_load(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.gate.lock().await = Some(LoadGate {
            entered: entered_tx,
            release: release_rx,
        });
        (entered_rx, release_tx)
    }
}

#[async_trait]
impl SessionStore for GatedStore {
    async fn load_record(
        &self,
        session_id: Uuid,
    ) -> ivp_difficulty::Result<Option<PersistedSessionRecord>> {
        let record = self.inner.load_record(session_id).await?;

        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.release.await;
        }
        Ok(record)
    }

    async fn save_difficulty(
        &self,
        session_id: Uuid,
        columns: &DifficultyColumns,
    ) -> ivp_difficulty::Result<()> {
        self.inner.save_difficulty(session_id, columns).await
    }

    async fn create_session(&self, session: &NewSession) -> ivp_difficulty::Result<()> {
        self.inner.create_session(session).await
    }

    async fn list_session_ids(&self, user_id: Option<Uuid>) -> ivp_difficulty::Result<Vec<Uuid>> {
        self.inner.list_session_ids(user_id).await
    }
}

pub struct TestEnv {
    pub pool: Pool<Sqlite>,
    pub store: SqliteSessionStore,
    pub gated: Arc<GatedStore>,
    pub clock: Arc<ManualClock>,
    pub manager: Arc<DifficultyStateManager>,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::build(None).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        Self::build(Some(config)).await
    }

    async fn build(config: Option<EngineConfig>) -> Self {
        // Single connection so every query sees the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();

        let store = SqliteSessionStore::new(pool.clone());
        let gated = Arc::new(GatedStore::new(store.clone()));
        let clock = Arc::new(ManualClock::new(start_time()));

        let manager = match config {
            Some(config) => DifficultyStateManager::from_config(gated.clone(), config),
            None => {
                DifficultyStateManager::new(gated.clone(), Arc::new(InMemoryStateCache::new()))
            }
        }
        .with_clock(clock.clone());

        Self {
            pool,
            store,
            gated,
            clock,
            manager: Arc::new(manager),
        }
    }

    /// Insert a session row without initializing its difficulty state
    pub async fn create_session(&self, user_id: Option<Uuid>, level: DifficultyLevel) -> Uuid {
        let session_id = Uuid::new_v4();
        self.store
            .create_session(&NewSession {
                session_id,
                user_id,
                parent_session_id: None,
                difficulty_level: level,
            })
            .await
            .unwrap();
        session_id
    }

    /// Insert and initialize a session
    pub async fn start_session(&self, level: DifficultyLevel) -> Uuid {
        let session_id = self.create_session(None, level).await;
        self.manager.initialize_session(session_id, level).await.unwrap();
        session_id
    }

    /// Advance the clock by one minute, as between interview turns
    pub fn tick(&self) {
        self.clock.advance(Duration::minutes(1));
    }

    /// Overwrite columns of a session row directly, bypassing the manager
    pub async fn set_columns(&self, session_id: Uuid, assignments: &str) {
        let sql = format!("UPDATE interview_sessions SET {} WHERE guid = ?", assignments);
        sqlx::query(&sql)
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .unwrap();
    }

    /// Replace the stored state blob, bypassing the manager
    pub async fn set_state_json(&self, session_id: Uuid, json: Option<&str>) {
        sqlx::query("UPDATE interview_sessions SET difficulty_state_json = ? WHERE guid = ?")
            .bind(json)
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .unwrap();
    }

    /// Raw stored state blob
    pub async fn store_json(&self, session_id: Uuid) -> Option<String> {
        sqlx::query_scalar("SELECT difficulty_state_json FROM interview_sessions WHERE guid = ?")
            .bind(session_id.to_string())
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    /// Make every write to `interview_sessions` fail
    pub async fn reject_writes(&self) {
        sqlx::query(
            r#"
            CREATE TRIGGER reject_session_writes
            BEFORE UPDATE ON interview_sessions
            BEGIN
                SELECT RAISE(ABORT, 'disk I/O error');
            END
            "#,
        )
        .execute(&self.pool)
        .await
        .unwrap();
    }

    pub async fn accept_writes(&self) {
        sqlx::query("DROP TRIGGER IF EXISTS reject_session_writes")
            .execute(&self.pool)
            .await
            .unwrap();
    }
}
