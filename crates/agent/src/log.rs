//! The append-only event log.

use chrono::{DateTime, Utc};
use foldline_core::error::ValidationError;
use foldline_core::event::{Event, EventInput};

/// Ordered events with strictly increasing indices.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt an existing log, checking that indices strictly increase.
    pub fn from_events(events: Vec<Event>) -> Result<Self, ValidationError> {
        for pair in events.windows(2) {
            if pair[1].event_index <= pair[0].event_index {
                return Err(ValidationError::OutOfOrder {
                    previous: pair[0].event_index,
                    found: pair[1].event_index,
                });
            }
        }
        Ok(Self { events })
    }

    /// Index the next appended event receives.
    pub fn next_index(&self) -> u64 {
        self.events.last().map_or(0, |e| e.event_index + 1)
    }

    /// Assign consecutive indices and a shared timestamp to a batch.
    pub fn stamp(&self, inputs: Vec<EventInput>, now: DateTime<Utc>) -> Vec<Event> {
        let start = self.next_index();
        inputs
            .into_iter()
            .zip(start..)
            .map(|(input, index)| input.into_event(index, now))
            .collect()
    }

    pub fn extend(&mut self, events: &[Event]) {
        self.events.extend_from_slice(events);
    }

    /// Drop everything from `len` on. Only used to roll back an append whose
    /// persistence failed.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
