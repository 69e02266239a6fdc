//! Id generation strategies.
//!
//! Production uses random ids; tests inject [`SequentialIds`] so event logs
//! are reproducible.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

/// Generates identifiers with a kind prefix (e.g. `req`, `call`, `msg`).
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, prefix: &str) -> String;
}

/// Random v4 UUIDs: `req_5f0c...`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_{}", Uuid::new_v4().simple())
    }
}

/// Per-prefix counters starting at 1: `req_1`, `req_2`, `call_1`.
#[derive(Debug, Default)]
pub struct SequentialIds {
    counters: Mutex<HashMap<String, u64>>,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self, prefix: &str) -> String {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let counter = counters.entry(prefix.to_string()).or_insert(0);
        *counter += 1;
        format!("{prefix}_{counter}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_count_per_prefix() {
        let ids = SequentialIds::new();
        assert_eq!(ids.next_id("req"), "req_1");
        assert_eq!(ids.next_id("req"), "req_2");
        assert_eq!(ids.next_id("call"), "call_1");
    }

    #[test]
    fn uuid_ids_are_prefixed_and_unique() {
        let a = UuidIds.next_id("req");
        let b = UuidIds.next_id("req");
        assert!(a.starts_with("req_"));
        assert_ne!(a, b);
    }
}
