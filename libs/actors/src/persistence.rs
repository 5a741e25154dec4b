//! Persistence Collaborator
//!
//! The runtime never talks to a database directly. It loads state on
//! activation and restart, and saves dirty state on the persistence cadence
//! and on deactivation, through [`StateStore`].

use crate::error::PersistenceError;
use crate::identity::ActorIdentity;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Backend loading and saving entity state
#[async_trait]
pub trait StateStore<S>: Send + Sync + 'static {
    /// Load persisted state; `Ok(None)` when the entity does not exist
    async fn load(&self, identity: &ActorIdentity) -> Result<Option<S>, PersistenceError>;

    /// Persist the current state
    async fn save(&self, identity: &ActorIdentity, state: &S) -> Result<(), PersistenceError>;
}

/// In-process store for tests and local development
///
/// Counts loads and saves, and can be told to fail either operation.
#[derive(Debug)]
pub struct InMemoryStore<S> {
    records: DashMap<i64, S>,
    loads: AtomicU64,
    saves: AtomicU64,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
}

impl<S: Clone + Send + Sync + 'static> InMemoryStore<S> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            loads: AtomicU64::new(0),
            saves: AtomicU64::new(0),
            fail_loads: AtomicBool::new(false),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// Seed a record without counting it as a save
    pub fn insert(&self, id: i64, state: S) {
        self.records.insert(id, state);
    }

    /// Snapshot of the stored record
    pub fn get(&self, id: i64) -> Option<S> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    pub fn remove(&self, id: i64) -> Option<S> {
        self.records.remove(&id).map(|(_, state)| state)
    }

    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Relaxed);
    }
}

impl<S: Clone + Send + Sync + 'static> Default for InMemoryStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: Clone + Send + Sync + 'static> StateStore<S> for InMemoryStore<S> {
    async fn load(&self, identity: &ActorIdentity) -> Result<Option<S>, PersistenceError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        if self.fail_loads.load(Ordering::Relaxed) {
            return Err(PersistenceError::load(format!("injected load failure for {}", identity)));
        }
        Ok(self.get(identity.id()))
    }

    async fn save(&self, identity: &ActorIdentity, state: &S) -> Result<(), PersistenceError> {
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(PersistenceError::save(format!("injected save failure for {}", identity)));
        }
        self.saves.fetch_add(1, Ordering::Relaxed);
        self.records.insert(identity.id(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemoryStore::<u32>::new();
        let identity = ActorIdentity::new(3, "player");

        assert_eq!(store.load(&identity).await.unwrap(), None);
        store.save(&identity, &11).await.unwrap();
        assert_eq!(store.load(&identity).await.unwrap(), Some(11));
        assert_eq!(store.load_count(), 2);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryStore::<u32>::new();
        let identity = ActorIdentity::new(3, "player");
        store.insert(3, 1);

        store.set_fail_saves(true);
        assert!(store.save(&identity, &2).await.is_err());
        assert_eq!(store.get(3), Some(1));

        store.set_fail_loads(true);
        let err = store.load(&identity).await.unwrap_err();
        assert_eq!(err.operation, "load");
    }
}
