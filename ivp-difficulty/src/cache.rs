//! Write-through state cache
//!
//! The cache memoizes states that are already durable. It is never a second
//! source of truth: entries are inserted only after a successful store write,
//! and evicting them never touches the store.

use crate::state::SessionDifficultyState;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Cache seam injected into the manager
#[async_trait]
pub trait StateCache: Send + Sync {
    async fn get(&self, session_id: Uuid) -> Option<SessionDifficultyState>;

    async fn put(&self, state: SessionDifficultyState);

    /// Evict one entry; returns true if it was present
    async fn remove(&self, session_id: Uuid) -> bool;

    /// Evict everything; returns the number of evicted entries
    async fn clear(&self) -> usize;

    async fn len(&self) -> usize;
}

/// Process-local cache keyed by session id
///
/// Uses RwLock so reads of different sessions never block each other.
#[derive(Default)]
pub struct InMemoryStateCache {
    entries: RwLock<HashMap<Uuid, SessionDifficultyState>>,
}

impl InMemoryStateCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateCache for InMemoryStateCache {
    async fn get(&self, session_id: Uuid) -> Option<SessionDifficultyState> {
        self.entries.read().await.get(&session_id).cloned()
    }

    async fn put(&self, state: SessionDifficultyState) {
        self.entries.write().await.insert(state.session_id(), state);
    }

    async fn remove(&self, session_id: Uuid) -> bool {
        self.entries.write().await.remove(&session_id).is_some()
    }

    async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        count
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Cache that stores nothing, every read goes to the store
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStateCache;

#[async_trait]
impl StateCache for NoopStateCache {
    async fn get(&self, _session_id: Uuid) -> Option<SessionDifficultyState> {
        None
    }

    async fn put(&self, _state: SessionDifficultyState) {}

    async fn remove(&self, _session_id: Uuid) -> bool {
        false
    }

    async fn clear(&self) -> usize {
        0
    }

    async fn len(&self) -> usize {
        0
    }
}
