//! Difficulty state manager
//!
//! Orchestrates the write-through cache over the durable session store and is
//! the only component that mutates a session's difficulty trajectory.
//!
//! Every mutation and every cache-miss hydration runs under a per-session
//! lock. Mutations are applied to a copy of the current state and reach the
//! cache only after the store write succeeded, so a failed write leaves cache
//! and store at the previous state.

use crate::cache::{InMemoryStateCache, NoopStateCache, StateCache};
use crate::config::EngineConfig;
use crate::db::{difficulty_columns, SessionStore};
use crate::mapping::{DifficultyInput, DifficultyMappingService};
use crate::state::SessionDifficultyState;
use crate::stats::DifficultyStatistics;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use ivp_common::time::{Clock, SystemClock};
use ivp_common::DifficultyLevel;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One async mutex per session id, present only while held or awaited
#[derive(Default)]
struct SessionLocks {
    locks: StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: Uuid) -> SessionGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(session_id).or_default())
        };

        SessionGuard {
            locks: self,
            session_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Exclusive access to one session's difficulty state
pub(crate) struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    session_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.locks.lock().unwrap_or_else(PoisonError::into_inner);
        self.guard.take();

        // Only the map still refers to the mutex: no holder, no waiter
        if locks
            .get(&self.session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.session_id);
        }
    }
}

/// Session difficulty orchestration over cache and store
pub struct DifficultyStateManager {
    store: Arc<dyn SessionStore>,
    cache: Arc<dyn StateCache>,
    clock: Arc<dyn Clock>,
    locks: SessionLocks,
    config: EngineConfig,
}

impl DifficultyStateManager {
    /// Manager with an explicit cache and default settings
    pub fn new(store: Arc<dyn SessionStore>, cache: Arc<dyn StateCache>) -> Self {
        Self {
            store,
            cache,
            clock: Arc::new(SystemClock),
            locks: SessionLocks::default(),
            config: EngineConfig::default(),
        }
    }

    /// Manager whose cache is chosen by `config.cache_enabled`
    pub fn from_config(store: Arc<dyn SessionStore>, config: EngineConfig) -> Self {
        let cache: Arc<dyn StateCache> = if config.cache_enabled {
            Arc::new(InMemoryStateCache::new())
        } else {
            Arc::new(NoopStateCache)
        };

        Self {
            config,
            ..Self::new(store, cache)
        }
    }

    /// Replace the timestamp source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Cached state without hydrating from the store
    pub async fn cached_state(&self, session_id: Uuid) -> Option<SessionDifficultyState> {
        self.cache.get(session_id).await
    }

    /// Start a session's trajectory at the user's chosen difficulty
    ///
    /// A session is initialized once; calling this again keeps the existing
    /// state and returns it.
    ///
    /// # Errors
    /// `SessionNotFound` if the session row does not exist,
    /// `RecoveryRequired` if the row holds a state blob that cannot be read,
    /// `Database` if the write fails.
    pub async fn initialize_session(
        &self,
        session_id: Uuid,
        user_selected_difficulty: impl Into<DifficultyInput>,
    ) -> Result<SessionDifficultyState> {
        let _guard = self.locks.acquire(session_id).await;

        if let Some(existing) = self.load(session_id).await? {
            warn!(
                "Session {}: already initialized at {} (current {}), keeping existing state",
                session_id,
                existing.initial_difficulty(),
                existing.current_difficulty()
            );
            return Ok(existing);
        }

        match self.store.load_record(session_id).await? {
            None => return Err(Error::SessionNotFound(session_id)),
            Some(record) if record.has_state_json() => {
                warn!(
                    "Session {}: refusing to initialize over unreadable difficulty state, run recovery",
                    session_id
                );
                return Err(Error::RecoveryRequired(session_id));
            }
            Some(_) => {}
        }

        let initial = DifficultyMappingService::resolve(user_selected_difficulty);
        let state = SessionDifficultyState::new_at(session_id, initial, self.now());
        self.write_through(&state).await?;

        info!("Session {}: difficulty initialized at {}", session_id, initial);
        Ok(state)
    }

    /// Current state, hydrating from the store on a cache miss
    ///
    /// Returns None when the session has no usable state: no row, a row that
    /// was never initialized, or a blob that cannot be read. The last case is
    /// logged and left for explicit recovery.
    pub async fn get(&self, session_id: Uuid) -> Result<Option<SessionDifficultyState>> {
        if let Some(state) = self.cache.get(session_id).await {
            return Ok(Some(state));
        }

        let _guard = self.locks.acquire(session_id).await;
        self.load(session_id).await
    }

    /// Cached state, else hydrate from the store. Caller holds the session lock.
    async fn load(&self, session_id: Uuid) -> Result<Option<SessionDifficultyState>> {
        if let Some(state) = self.cache.get(session_id).await {
            return Ok(Some(state));
        }

        let Some(record) = self.store.load_record(session_id).await? else {
            debug!("Session {}: no session record", session_id);
            return Ok(None);
        };

        let Some(json) = record.difficulty_state_json.as_deref().filter(|j| !j.trim().is_empty())
        else {
            debug!("Session {}: difficulty state not initialized", session_id);
            return Ok(None);
        };

        let state = match SessionDifficultyState::from_json(json) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "Session {}: stored difficulty state unreadable ({}), recovery required",
                    session_id, e
                );
                return Ok(None);
            }
        };

        if state.session_id() != session_id {
            warn!(
                "Session {}: stored difficulty state belongs to session {}, recovery required",
                session_id,
                state.session_id()
            );
            return Ok(None);
        }

        debug!("Session {}: hydrated difficulty state from store", session_id);
        self.cache.put(state.clone()).await;
        Ok(Some(state))
    }

    /// Record a difficulty adjustment
    ///
    /// Returns `Ok(false)` for unknown or finalized sessions and for updates
    /// that would not change the difficulty.
    pub async fn update(
        &self,
        session_id: Uuid,
        new_difficulty: impl Into<DifficultyInput>,
        reason: &str,
        question_index: Option<u32>,
    ) -> Result<bool> {
        let new_difficulty = DifficultyMappingService::resolve(new_difficulty);
        let _guard = self.locks.acquire(session_id).await;

        let Some(mut state) = self.load(session_id).await? else {
            warn!(
                "Session {}: difficulty update to {} ignored, session not initialized",
                session_id, new_difficulty
            );
            return Ok(false);
        };

        let from = state.current_difficulty();
        if !state.update_at(new_difficulty, reason, question_index, self.now()) {
            return Ok(false);
        }

        self.write_through(&state).await?;
        info!(
            "Session {}: difficulty {} -> {} ({}, question {:?})",
            session_id, from, new_difficulty, reason, question_index
        );
        Ok(true)
    }

    /// Freeze the session's trajectory
    ///
    /// Returns the final difficulty, or `Ok(None)` if the session is unknown.
    /// Finalizing twice returns the same value without writing again.
    pub async fn finalize(&self, session_id: Uuid) -> Result<Option<DifficultyLevel>> {
        let _guard = self.locks.acquire(session_id).await;

        let Some(mut state) = self.load(session_id).await? else {
            warn!("Session {}: finalize ignored, session not initialized", session_id);
            return Ok(None);
        };

        if state.is_finalized() {
            debug!("Session {}: already finalized", session_id);
            return Ok(state.final_difficulty());
        }

        let final_difficulty = state.finalize_at(self.now());
        self.write_through(&state).await?;

        info!(
            "Session {}: difficulty finalized at {} after {} changes",
            session_id,
            final_difficulty,
            state.changes().len()
        );
        Ok(Some(final_difficulty))
    }

    /// Seed difficulty for a practice session cloned from `parent_session_id`
    ///
    /// Never fails. Precedence: the parent's state (final, else current), then
    /// the final, current and initial columns, then the legacy
    /// `difficulty_level` column, then the configured default.
    pub async fn get_difficulty_for_practice(&self, parent_session_id: Uuid) -> DifficultyLevel {
        match self.get(parent_session_id).await {
            Ok(Some(state)) => {
                let level = state.get_difficulty_for_practice();
                debug!(
                    "Session {}: practice difficulty {} from state",
                    parent_session_id, level
                );
                return level;
            }
            Ok(None) => {}
            Err(e) => warn!(
                "Session {}: could not read difficulty state for practice: {}",
                parent_session_id, e
            ),
        }

        let record = match self.store.load_record(parent_session_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    "Session {}: could not read session record for practice: {}",
                    parent_session_id, e
                );
                None
            }
        };

        if let Some(record) = record {
            let fallbacks = [
                ("final", record.final_level()),
                ("current", record.current_level()),
                ("initial", record.initial_level()),
                ("legacy", record.legacy_level()),
            ];
            for (column, level) in fallbacks {
                if let Some(level) = level {
                    info!(
                        "Session {}: practice difficulty {} from {} column",
                        parent_session_id, level, column
                    );
                    return level;
                }
            }
        }

        warn!(
            "Session {}: no difficulty data, practice uses default {}",
            parent_session_id, self.config.default_difficulty
        );
        self.config.default_difficulty
    }

    /// Evict one session or, with None, every session from the cache
    ///
    /// Never touches the store. Returns the number of evicted entries.
    pub async fn clear_cache(&self, session_id: Option<Uuid>) -> usize {
        let evicted = match session_id {
            Some(id) => usize::from(self.cache.remove(id).await),
            None => self.cache.clear().await,
        };
        debug!("Evicted {} cached difficulty states", evicted);
        evicted
    }

    /// Difficulty statistics for one session
    pub async fn statistics(&self, session_id: Uuid) -> Result<Option<DifficultyStatistics>> {
        Ok(self
            .get(session_id)
            .await?
            .map(|state| DifficultyStatistics::from_state(&state)))
    }

    /// Hold a session's lock across a read of the store and a later write
    pub(crate) async fn lock_session(&self, session_id: Uuid) -> SessionGuard<'_> {
        self.locks.acquire(session_id).await
    }

    /// Overwrite a session's state, used by recovery under [`Self::lock_session`]
    pub(crate) async fn replace_state(
        &self,
        state: &SessionDifficultyState,
        _lock: &SessionGuard<'_>,
    ) -> Result<()> {
        self.write_through(state).await
    }

    /// Persist columns and blob, then refresh the cache
    async fn write_through(&self, state: &SessionDifficultyState) -> Result<()> {
        let session_id = state.session_id();
        let columns = difficulty_columns(state)?;

        if let Err(e) = self.store.save_difficulty(session_id, &columns).await {
            error!(
                "Session {}: difficulty write failed, cached state left unchanged: {}",
                session_id, e
            );
            return Err(e);
        }

        self.cache.put(state.clone()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteSessionStore;
    use ivp_common::db::{init_schema, NewSession};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> (DifficultyStateManager, SqliteSessionStore) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        let store = SqliteSessionStore::new(pool);
        let manager = DifficultyStateManager::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryStateCache::new()),
        );
        (manager, store)
    }

    async fn create_session(store: &SqliteSessionStore) -> Uuid {
        let id = Uuid::new_v4();
        store
            .create_session(&NewSession {
                session_id: id,
                user_id: None,
                parent_session_id: None,
                difficulty_level: DifficultyLevel::Medium,
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_session_locks_serialize_same_session() {
        let locks = Arc::new(SessionLocks::default());
        let id = Uuid::new_v4();

        let guard = locks.acquire(id).await;

        // A different session is not blocked
        let other = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            locks.acquire(Uuid::new_v4()),
        )
        .await;
        assert!(other.is_ok());

        // The same session waits
        let same = tokio::time::timeout(std::time::Duration::from_millis(50), locks.acquire(id)).await;
        assert!(same.is_err());

        drop(guard);
        let same = tokio::time::timeout(std::time::Duration::from_millis(100), locks.acquire(id)).await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn test_lock_entry_dropped_with_last_guard() {
        let locks = Arc::new(SessionLocks::default());
        let id = Uuid::new_v4();

        let guard = locks.acquire(id).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // The queued waiter keeps the entry alive
        drop(guard);
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_lock_entry_kept_while_held() {
        let locks = SessionLocks::default();
        let held = Uuid::new_v4();

        let _guard = locks.acquire(held).await;
        drop(locks.acquire(Uuid::new_v4()).await);

        assert_eq!(locks.len(), 1);
        assert!(locks.locks.lock().unwrap().contains_key(&held));
    }

    #[tokio::test]
    async fn test_no_locks_left_after_operations() {
        let (manager, store) = setup().await;
        let id = create_session(&store).await;

        manager.initialize_session(id, "medium").await.unwrap();
        manager.update(id, "hard", "strong_performance", Some(1)).await.unwrap();
        manager.clear_cache(Some(id)).await;
        manager.get(id).await.unwrap();
        manager.finalize(id).await.unwrap();

        assert_eq!(manager.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_initialize_twice_keeps_first_state() {
        let (manager, store) = setup().await;
        let id = create_session(&store).await;

        let first = manager.initialize_session(id, "easy").await.unwrap();
        manager.update(id, "hard", "strong_performance", Some(1)).await.unwrap();
        let second = manager.initialize_session(id, "expert").await.unwrap();

        assert_eq!(first.initial_difficulty(), DifficultyLevel::Easy);
        assert_eq!(second.initial_difficulty(), DifficultyLevel::Easy);
        assert_eq!(second.current_difficulty(), DifficultyLevel::Hard);
    }

    #[tokio::test]
    async fn test_unrecognized_initial_difficulty_defaults_to_medium() {
        let (manager, store) = setup().await;
        let id = create_session(&store).await;

        let state = manager.initialize_session(id, "bananas").await.unwrap();
        assert_eq!(state.initial_difficulty(), DifficultyLevel::Medium);
    }

    #[tokio::test]
    async fn test_concurrent_updates_to_same_session_keep_chain_valid() {
        let (manager, store) = setup().await;
        let manager = Arc::new(manager);
        let id = create_session(&store).await;
        manager.initialize_session(id, DifficultyLevel::Medium).await.unwrap();

        let levels = [
            DifficultyLevel::Hard,
            DifficultyLevel::Easy,
            DifficultyLevel::Expert,
            DifficultyLevel::Medium,
            DifficultyLevel::Hard,
            DifficultyLevel::Easy,
        ];
        let mut handles = Vec::new();
        for (i, level) in levels.into_iter().enumerate() {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager.update(id, level, "adaptive", Some(i as u32)).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        manager.clear_cache(Some(id)).await;
        let state = manager.get(id).await.unwrap().unwrap();
        assert!(state.validate().is_empty(), "violations: {:?}", state.validate());
        assert!(!state.changes().is_empty());
    }
}
