//! Event persistence: where the log goes after every append.
//!
//! The engine hands the store the full log on every successful fold. How it
//! gets to durable storage is the host's business; the engine only needs to
//! know whether the write succeeded.

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::event::Event;

/// The core EventStore trait.
///
/// Implementations: JSONL file, in-memory (for testing).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// The backend name (e.g., "file", "memory").
    fn name(&self) -> &str;

    /// Persist the full event list.
    async fn store_events(&self, events: &[Event]) -> Result<(), PersistenceError>;

    /// Load the persisted events, in order.
    async fn load_events(&self) -> Result<Vec<Event>, PersistenceError>;
}
