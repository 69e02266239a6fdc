//! The fold: events in, state out.
//!
//! Core reducer first, then every slice reducer in registration order. Pure
//! and synchronous; the engine folds into a working copy and only commits
//! once persistence succeeds.

use foldline_core::error::{Result, ValidationError};
use foldline_core::event::Event;
use foldline_core::state::AgentCoreState;

use crate::registry::SliceRegistry;

/// Fold one event into `state`.
///
/// `state` may be partially updated on error; callers fold into a copy.
pub fn fold_event(registry: &SliceRegistry, state: &mut AgentCoreState, event: &Event) -> Result<()> {
    if !registry.claims(&event.event_type) {
        return Err(ValidationError::UnknownEventType(event.event_type.clone()).into());
    }

    state.apply_core(event)?;

    for slice in registry.slices() {
        // The slice sees the core state without its own entry while reducing
        let mut substate = state
            .slices
            .remove(slice.name())
            .unwrap_or_else(|| slice.initial_state());
        let reduced = slice.reduce(&mut substate, event, state);
        state.slices.insert(slice.name().to_string(), substate);
        reduced?;
    }
    Ok(())
}

/// Fold a whole log from the registry's initial state.
pub fn fold_events(registry: &SliceRegistry, events: &[Event]) -> Result<AgentCoreState> {
    let mut state = registry.initial_state();
    for event in events {
        fold_event(registry, &mut state, event)?;
    }
    Ok(state)
}
