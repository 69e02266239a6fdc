//! Slice composition.
//!
//! The registry is built once per engine. It owns the merged event-type
//! vocabulary, the host's capabilities, and the order in which rules run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use foldline_core::error::{Error, Result, ValidationError};
use foldline_core::event::{CORE_EVENT_TYPES, CORE_NAMESPACE};
use foldline_core::slice::{Capabilities, Command, RuleContext, Slice};
use foldline_core::state::AgentCoreState;
use tracing::debug;

pub struct SliceRegistry {
    slices: Vec<Arc<dyn Slice>>,
    /// Slice-owned event type -> owning slice name
    owners: HashMap<String, String>,
    capabilities: Capabilities,
}

impl SliceRegistry {
    /// Compose `slices` in order against the host's capabilities.
    pub fn new(slices: Vec<Arc<dyn Slice>>, capabilities: Capabilities) -> Result<Self> {
        let mut names = HashSet::new();
        let mut owners = HashMap::new();

        for slice in &slices {
            let name = slice.name().to_string();
            if !names.insert(name.clone()) {
                return Err(Error::Config {
                    message: format!("slice name '{name}' is registered twice"),
                });
            }

            for event_type in slice.event_types() {
                if event_type.starts_with(CORE_NAMESPACE) || owners.contains_key(&event_type) {
                    return Err(ValidationError::DuplicateEventType {
                        event_type,
                        slice: name,
                    }
                    .into());
                }
                owners.insert(event_type, name.clone());
            }

            for requirement in slice.required_capabilities() {
                if !capabilities.satisfies(&requirement) {
                    return Err(Error::Config {
                        message: format!(
                            "slice '{name}' requires capability {} which was not provided",
                            requirement.type_name
                        ),
                    });
                }
            }
        }

        debug!(
            slices = slices.len(),
            event_types = owners.len(),
            capabilities = capabilities.len(),
            "Slice registry composed"
        );
        Ok(Self {
            slices,
            owners,
            capabilities,
        })
    }

    /// A registry with no slices.
    pub fn empty() -> Self {
        Self {
            slices: Vec::new(),
            owners: HashMap::new(),
            capabilities: Capabilities::new(),
        }
    }

    /// Whether core or some slice claims `event_type`.
    pub fn claims(&self, event_type: &str) -> bool {
        CORE_EVENT_TYPES.contains(&event_type) || self.owners.contains_key(event_type)
    }

    pub fn slices(&self) -> &[Arc<dyn Slice>] {
        &self.slices
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// State before any event: core defaults plus every slice's initial substate.
    pub fn initial_state(&self) -> AgentCoreState {
        let mut state = AgentCoreState::default();
        for slice in &self.slices {
            state
                .slices
                .insert(slice.name().to_string(), slice.initial_state());
        }
        state
    }

    /// Run the built-in trigger rule, then every slice's rules in
    /// registration order.
    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Command> {
        let mut commands = core_rules(ctx.state);
        for slice in &self.slices {
            commands.extend(slice.rules(ctx));
        }
        commands
    }
}

/// Start a request for an unserved trigger; stop the open one while paused.
fn core_rules(state: &AgentCoreState) -> Vec<Command> {
    if state.paused {
        if state.is_request_open() {
            return vec![Command::CancelLlmRequest {
                reason: "paused".into(),
            }];
        }
        return Vec::new();
    }
    if state.pending_trigger.is_some() {
        return vec![Command::StartLlmRequest];
    }
    Vec::new()
}
