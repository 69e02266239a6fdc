//! Slack assistant-thread status.
//!
//! Slack shows an "is thinking..." line under a thread while the agent works.
//! [`build_slack_thread_status_payload`] maps a status string to the payload
//! for `assistant.threads.setStatus`; [`ThreadStatusSlice`] derives the
//! status from the event log and pushes changes to a [`ThreadStatusSink`]
//! the host provides. Talking to the Slack API is the sink's job.

use std::sync::Arc;

use async_trait::async_trait;
use foldline_core::error::{Result, ValidationError};
use foldline_core::event::{CoreEvent, Event};
use foldline_core::message::ConversationItem;
use foldline_core::slice::{CapabilityRequirement, Command, RuleContext, Slice};
use foldline_core::state::AgentCoreState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::status_indicator::{StatusIndicatorRequest, resolve_status_indicator_text};

/// Statuses starting with this marker mean the agent is writing a reply.
pub const WRITING_MARKER: &str = "✏️";

/// Status while a model request is open and no tool is running.
pub const THINKING_STATUS: &str = "🧠 thinking";

/// Body of an `assistant.threads.setStatus` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackThreadStatusPayload {
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loading_messages: Option<Vec<String>>,
}

/// Map a status string to a thread status payload. `None` clears it.
pub fn build_slack_thread_status_payload(value: Option<&str>) -> SlackThreadStatusPayload {
    let Some(value) = value else {
        return SlackThreadStatusPayload {
            status: String::new(),
            loading_messages: None,
        };
    };
    let status = if value.starts_with(WRITING_MARKER) {
        "is typing..."
    } else {
        "is thinking..."
    };
    SlackThreadStatusPayload {
        status: status.to_string(),
        loading_messages: Some(vec![format!("{value}...")]),
    }
}

/// Where thread status updates go.
#[async_trait]
pub trait ThreadStatusSink: Send + Sync {
    async fn set_status(&self, payload: SlackThreadStatusPayload) -> Result<()>;
}

/// Substate of [`ThreadStatusSlice`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadStatus {
    /// Current status text; `None` when idle
    #[serde(default)]
    pub status: Option<String>,

    /// Index of the event that last changed `status`
    #[serde(default)]
    pub changed_at: Option<u64>,
}

/// Tracks what the agent is doing and mirrors it to a Slack thread.
///
/// | Event | Status |
/// |-------|--------|
/// | request start | [`THINKING_STATUS`] |
/// | function call item | the tool's rendered status indicator |
/// | request end | cleared, unless calls are still waiting to run |
/// | request cancel | cleared |
/// | last call output or tool error, no request open | cleared |
///
/// Requires an `Arc<dyn ThreadStatusSink>` capability.
pub struct ThreadStatusSlice {
    template_context: Map<String, Value>,
    last_pushed: Arc<Mutex<Option<u64>>>,
}

impl ThreadStatusSlice {
    pub const NAME: &'static str = "slack_thread_status";

    pub fn new() -> Self {
        Self {
            template_context: Map::new(),
            last_pushed: Arc::new(Mutex::new(None)),
        }
    }

    /// Extra names visible to status indicator templates.
    pub fn with_template_context(mut self, context: Map<String, Value>) -> Self {
        self.template_context = context;
        self
    }

    fn tool_status(&self, core: &AgentCoreState, name: &str, arguments: &str) -> String {
        let template = core
            .tool_specs
            .iter()
            .find(|spec| spec.name().as_deref() == Some(name))
            .and_then(|spec| spec.status_indicator_text());

        let mut request = StatusIndicatorRequest::new(name)
            .with_args_text(arguments)
            .with_context(self.template_context.clone());
        request.status_indicator_text = template.map(String::from);
        resolve_status_indicator_text(&request)
    }

    fn next_status(&self, current: &ThreadStatus, event: &Event, core: &AgentCoreState) -> Option<Option<String>> {
        let decoded = CoreEvent::decode(&event.event_type, &event.data).ok().flatten()?;
        let idle = !core.is_request_open() && core.unanswered_calls().is_empty();

        let next = match decoded {
            CoreEvent::LlmRequestStart(_) => Some(Some(THINKING_STATUS.to_string())),
            CoreEvent::LlmRequestCancel(_) => Some(None),
            CoreEvent::LlmRequestEnd(_) if core.unanswered_calls().is_empty() => Some(None),
            CoreEvent::LlmInputItem(input) => match input.item {
                ConversationItem::FunctionCall {
                    name, arguments, ..
                } => Some(Some(self.tool_status(core, &name, &arguments))),
                ConversationItem::FunctionCallOutput { .. } if idle => Some(None),
                _ => None,
            },
            CoreEvent::ToolCallError(_) if idle => Some(None),
            _ => None,
        };
        next.filter(|next| *next != current.status)
    }
}

impl Default for ThreadStatusSlice {
    fn default() -> Self {
        Self::new()
    }
}

impl Slice for ThreadStatusSlice {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn required_capabilities(&self) -> Vec<CapabilityRequirement> {
        vec![CapabilityRequirement::of::<Arc<dyn ThreadStatusSink>>()]
    }

    fn initial_state(&self) -> Value {
        serde_json::json!({ "status": null, "changedAt": null })
    }

    fn reduce(
        &self,
        substate: &mut Value,
        event: &Event,
        core: &AgentCoreState,
    ) -> std::result::Result<(), ValidationError> {
        let mut current: ThreadStatus =
            serde_json::from_value(substate.clone()).map_err(|e| ValidationError::MalformedEvent {
                event_type: event.event_type.clone(),
                reason: format!("thread status substate: {e}"),
            })?;

        if let Some(next) = self.next_status(&current, event, core) {
            current.status = next;
            current.changed_at = Some(event.event_index);
            *substate = serde_json::to_value(&current).unwrap_or(Value::Null);
        }
        Ok(())
    }

    fn rules(&self, ctx: &RuleContext<'_>) -> Vec<Command> {
        let Some(current) = ctx
            .state
            .slice_state(Self::NAME)
            .and_then(|v| serde_json::from_value::<ThreadStatus>(v.clone()).ok())
        else {
            return Vec::new();
        };
        let Some(changed_at) = current.changed_at else {
            return Vec::new();
        };
        if !ctx.new_events.iter().any(|e| e.event_index == changed_at) {
            return Vec::new();
        }
        let Some(sink) = ctx.capabilities.get::<Arc<dyn ThreadStatusSink>>().cloned() else {
            return Vec::new();
        };

        let payload = build_slack_thread_status_payload(current.status.as_deref());
        let last_pushed = Arc::clone(&self.last_pushed);
        vec![Command::background("slack:thread_status", move |_events| async move {
            // Jobs may finish out of order; never overwrite a newer status
            let mut last = last_pushed.lock().await;
            if last.is_some_and(|seen| seen >= changed_at) {
                debug!(changed_at, "Skipping stale thread status");
                return Ok(());
            }
            sink.set_status(payload).await?;
            *last = Some(changed_at);
            Ok(())
        })]
    }
}
