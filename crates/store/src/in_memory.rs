//! In-memory event store, useful for testing and ephemeral sessions.

use async_trait::async_trait;
use foldline_core::error::PersistenceError;
use foldline_core::event::Event;
use foldline_core::store::EventStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Keeps the last persisted log in a Vec.
///
/// Writes can be made to fail on demand so hosts can exercise the
/// persistence-failure path.
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<Event>>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of the last persisted log.
    pub async fn snapshot(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn store_events(&self, events: &[Event]) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Storage("writes disabled".into()));
        }
        *self.events.write().await = events.to_vec();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_events(&self) -> Result<Vec<Event>, PersistenceError> {
        Ok(self.events.read().await.clone())
    }
}
