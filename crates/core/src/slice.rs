//! Slices: composable extensions of the agent core.
//!
//! A slice contributes three things:
//! 1. the event types it owns (namespaced, disjoint from `CORE:*` and from
//!    every other slice),
//! 2. the capabilities it needs the host to provide,
//! 3. a pure reducer for its own substate and a pure rule function that turns
//!    state into follow-up [`Command`]s.
//!
//! Side effects only ever happen through commands, which the engine applies
//! after the fold.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::{Result, ValidationError};
use crate::event::{Event, EventInput};
use crate::message::FunctionCall;
use crate::state::AgentCoreState;

/// Entry point background work uses to write back into the log.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append events through the serialized pipeline.
    async fn add_events(&self, inputs: Vec<EventInput>) -> Result<Vec<Event>>;
}

/// Fire-and-forget work scheduled by a rule.
pub type BackgroundJob =
    Box<dyn FnOnce(Arc<dyn EventSink>) -> BoxFuture<'static, Result<()>> + Send>;

/// A follow-up action produced by a rule.
pub enum Command {
    /// Start a model request, superseding any open one.
    StartLlmRequest,

    /// Cancel the open model request, if any.
    CancelLlmRequest { reason: String },

    /// Execute a tool call against the currently declared tools. The call
    /// and its result are both recorded, and the result triggers a request.
    InvokeTool { call: FunctionCall },

    /// Append further events (folded and evaluated in turn).
    AppendEvents(Vec<EventInput>),

    /// Run a job on the background tracker.
    Background { name: String, job: BackgroundJob },
}

impl Command {
    /// Schedule a background job.
    pub fn background<F, Fut>(name: impl Into<String>, job: F) -> Self
    where
        F: FnOnce(Arc<dyn EventSink>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        Self::Background {
            name: name.into(),
            job: Box::new(move |sink| Box::pin(job(sink))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartLlmRequest => "start_llm_request",
            Self::CancelLlmRequest { .. } => "cancel_llm_request",
            Self::InvokeTool { .. } => "invoke_tool",
            Self::AppendEvents(_) => "append_events",
            Self::Background { .. } => "background",
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartLlmRequest => f.write_str("StartLlmRequest"),
            Self::CancelLlmRequest { reason } => f
                .debug_struct("CancelLlmRequest")
                .field("reason", reason)
                .finish(),
            Self::InvokeTool { call } => f.debug_struct("InvokeTool").field("call", call).finish(),
            Self::AppendEvents(inputs) => f.debug_tuple("AppendEvents").field(inputs).finish(),
            Self::Background { name, .. } => f
                .debug_struct("Background")
                .field("name", name)
                .finish_non_exhaustive(),
        }
    }
}

/// Identifies a capability type a slice requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilityRequirement {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl CapabilityRequirement {
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

/// The merged dependency set the host supplies for all slices.
///
/// A type map: one value per type, usually an `Arc<dyn SomeTrait>`.
#[derive(Default)]
pub struct Capabilities {
    values: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide a capability. Replaces any existing value of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn satisfies(&self, requirement: &CapabilityRequirement) -> bool {
        self.values.contains_key(&requirement.type_id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("count", &self.values.len())
            .finish()
    }
}

/// What a rule sees after a fold.
pub struct RuleContext<'a> {
    pub state: &'a AgentCoreState,

    /// Auxiliary data from the host's `RuleMatchData` provider
    pub match_data: &'a Value,

    /// The events appended by the batch that produced `state`
    pub new_events: &'a [Event],

    pub capabilities: &'a Capabilities,
}

impl RuleContext<'_> {
    /// Whether the batch contained an event of the given type.
    pub fn saw(&self, event_type: &str) -> bool {
        self.new_events.iter().any(|e| e.event_type == event_type)
    }
}

/// A composable extension of the core.
pub trait Slice: Send + Sync {
    /// Unique slice name; also the key of its substate.
    fn name(&self) -> &str;

    /// Event types this slice owns.
    fn event_types(&self) -> Vec<String> {
        Vec::new()
    }

    /// Capabilities the host must provide.
    fn required_capabilities(&self) -> Vec<CapabilityRequirement> {
        Vec::new()
    }

    /// Substate before any event has been folded.
    fn initial_state(&self) -> Value {
        Value::Null
    }

    /// Fold one event into this slice's substate.
    ///
    /// Called for every event, core or not, after the core reducer. Must be
    /// pure and deterministic.
    fn reduce(
        &self,
        _substate: &mut Value,
        _event: &Event,
        _core: &AgentCoreState,
    ) -> std::result::Result<(), ValidationError> {
        Ok(())
    }

    /// React to the new state.
    fn rules(&self, _ctx: &RuleContext<'_>) -> Vec<Command> {
        Vec::new()
    }
}

/// Provides the auxiliary data rules receive alongside state.
pub trait RuleMatchData: Send + Sync {
    fn match_data(&self, state: &AgentCoreState) -> Value;
}
