//! Event store implementations for Foldline.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::FileEventStore;
pub use in_memory::InMemoryEventStore;
