//! Agent state: the pure fold of the event log.
//!
//! [`AgentCoreState::apply_core`] is the core reducer. It never reads the
//! clock or any other ambient input, so replaying the same prefix always yields
//! an identical state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConcurrencyViolation, Result};
use crate::event::{CoreEvent, Event};
use crate::message::ConversationItem;
use crate::tool::ToolSpec;

/// Model selection and sampling options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOpts {
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Provider-specific options passed through to the request body
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ModelOpts {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl Default for ModelOpts {
    fn default() -> Self {
        Self::new("gpt-4.1")
    }
}

/// Whether a model request is open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LlmRequestStatus {
    #[default]
    Idle,
    InFlight {
        request_id: String,
        started_at_index: u64,
    },
}

impl LlmRequestStatus {
    /// The id of the open request, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::InFlight { request_id, .. } => Some(request_id),
        }
    }
}

/// The complete state derived from an event prefix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCoreState {
    pub system_prompt: String,

    pub model_opts: ModelOpts,

    /// Ordered conversation sent to the model
    pub input_items: Vec<ConversationItem>,

    /// Tools the model may call on the next request
    pub tool_specs: Vec<ToolSpec>,

    pub llm_request: LlmRequestStatus,

    /// Index of the latest request-triggering event not yet served by a START
    pub pending_trigger: Option<u64>,

    /// While paused no new requests are started
    pub paused: bool,

    pub last_event_index: Option<u64>,

    /// Slice substates keyed by slice name
    pub slices: BTreeMap<String, Value>,
}

impl AgentCoreState {
    /// Substate of a slice.
    pub fn slice_state(&self, name: &str) -> Option<&Value> {
        self.slices.get(name)
    }

    /// Whether a model request is open.
    pub fn is_request_open(&self) -> bool {
        matches!(self.llm_request, LlmRequestStatus::InFlight { .. })
    }

    /// The most recent assistant message text.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.input_items.iter().rev().find_map(|item| match item {
            ConversationItem::Message {
                role: crate::message::Role::Assistant,
                content,
            } => Some(content.as_str()),
            _ => None,
        })
    }

    /// Function calls in the conversation with no output yet, as
    /// `(call_id, name)` in conversation order.
    pub fn unanswered_calls(&self) -> Vec<(&str, &str)> {
        let answered: std::collections::HashSet<&str> = self
            .input_items
            .iter()
            .filter_map(|item| match item {
                ConversationItem::FunctionCallOutput { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();

        self.input_items
            .iter()
            .filter_map(|item| match item {
                ConversationItem::FunctionCall { call_id, name, .. }
                    if !answered.contains(call_id.as_str()) =>
                {
                    Some((call_id.as_str(), name.as_str()))
                }
                _ => None,
            })
            .collect()
    }

    /// Fold one event into the core part of the state.
    ///
    /// Slice-owned events only touch the bookkeeping fields here; slice
    /// reducers run separately. Returns whether the event type is a core type.
    pub fn apply_core(&mut self, event: &Event) -> Result<bool> {
        let decoded = CoreEvent::decode(&event.event_type, &event.data)?;

        if let Some(core) = &decoded {
            self.apply_decoded(core, event.event_index)?;
        }

        if event.triggers_llm_request() {
            self.pending_trigger = Some(event.event_index);
        }
        self.last_event_index = Some(event.event_index);

        Ok(decoded.is_some())
    }

    fn apply_decoded(&mut self, event: &CoreEvent, event_index: u64) -> Result<()> {
        match event {
            CoreEvent::SetSystemPrompt(p) => self.system_prompt = p.prompt.clone(),
            CoreEvent::SetModelOpts(opts) => self.model_opts = opts.clone(),
            CoreEvent::LlmInputItem(p) => self.input_items.push(p.item.clone()),
            CoreEvent::LlmRequestStart(p) => {
                if let Some(open) = self.llm_request.request_id() {
                    return Err(ConcurrencyViolation::RequestAlreadyOpen {
                        open: open.to_string(),
                        attempted: p.request_id.clone(),
                    }
                    .into());
                }
                self.llm_request = LlmRequestStatus::InFlight {
                    request_id: p.request_id.clone(),
                    started_at_index: event_index,
                };
                self.pending_trigger = None;
            }
            CoreEvent::LlmRequestEnd(p) => self.close_request(&p.request_id),
            CoreEvent::LlmRequestCancel(p) => self.close_request(&p.request_id),
            CoreEvent::AddToolSpecs(p) => {
                for spec in &p.specs {
                    // A spec with the same name replaces the earlier one
                    if let Some(name) = spec.name() {
                        self.tool_specs
                            .retain(|s| s.name().as_deref() != Some(name.as_str()));
                    }
                    self.tool_specs.push(spec.clone());
                }
            }
            CoreEvent::RemoveToolSpecs(p) => {
                self.tool_specs
                    .retain(|s| s.name().is_none_or(|name| !p.names.contains(&name)));
            }
            CoreEvent::ToolCallError(p) => {
                self.input_items.push(ConversationItem::function_output(
                    &p.call_id,
                    format!("Error: {}", p.detail),
                ));
            }
            CoreEvent::PauseLlmRequests => self.paused = true,
            CoreEvent::ResumeLlmRequests => self.paused = false,
        }
        Ok(())
    }

    fn close_request(&mut self, request_id: &str) {
        if self.llm_request.request_id() == Some(request_id) {
            self.llm_request = LlmRequestStatus::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::event::{EventInput, LLM_REQUEST_END, LLM_REQUEST_START};
    use chrono::{TimeZone, Utc};

    fn stamp(inputs: Vec<EventInput>) -> Vec<Event> {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        inputs
            .into_iter()
            .enumerate()
            .map(|(i, input)| input.into_event(i as u64, ts))
            .collect()
    }

    fn fold(events: &[Event]) -> AgentCoreState {
        let mut state = AgentCoreState::default();
        for e in events {
            state.apply_core(e).unwrap();
        }
        state
    }

    fn start(id: &str) -> EventInput {
        EventInput::new(LLM_REQUEST_START, serde_json::json!({ "requestId": id }))
    }

    fn end(id: &str) -> EventInput {
        EventInput::new(
            LLM_REQUEST_END,
            serde_json::json!({ "requestId": id, "outcome": "success" }),
        )
    }

    #[test]
    fn fold_is_deterministic() {
        let events = stamp(vec![
            CoreEvent::system_prompt("You are terse."),
            CoreEvent::user_message("hi"),
            start("req_1"),
            CoreEvent::input_item(ConversationItem::assistant("hello")),
            end("req_1"),
        ]);
        let a = serde_json::to_string(&fold(&events)).unwrap();
        let b = serde_json::to_string(&fold(&events)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn trigger_is_pending_until_start() {
        let events = stamp(vec![CoreEvent::user_message("hi")]);
        let state = fold(&events);
        assert_eq!(state.pending_trigger, Some(0));

        let events = stamp(vec![CoreEvent::user_message("hi"), start("req_1")]);
        let state = fold(&events);
        assert_eq!(state.pending_trigger, None);
        assert_eq!(state.llm_request.request_id(), Some("req_1"));
    }

    #[test]
    fn end_closes_only_the_matching_request() {
        let events = stamp(vec![start("req_1"), end("req_0")]);
        assert!(fold(&events).is_request_open());

        let events = stamp(vec![start("req_1"), end("req_1")]);
        assert!(!fold(&events).is_request_open());
    }

    #[test]
    fn second_start_is_a_concurrency_violation() {
        let events = stamp(vec![start("req_1"), start("req_2")]);
        let mut state = AgentCoreState::default();
        state.apply_core(&events[0]).unwrap();
        let err = state.apply_core(&events[1]).unwrap_err();
        assert!(matches!(err, Error::Concurrency(_)));
    }

    #[test]
    fn tool_call_error_becomes_function_output() {
        let events = stamp(vec![
            CoreEvent::ToolCallError(crate::event::ToolCallError {
                call_id: "call_1".into(),
                tool_name: "exec".into(),
                detail: "permission denied".into(),
            })
            .into_input(),
        ]);
        let state = fold(&events);
        assert_eq!(
            state.input_items,
            vec![ConversationItem::function_output("call_1", "Error: permission denied")]
        );
    }

    #[test]
    fn tool_specs_replace_and_remove_by_name() {
        let spec = |name: &str| ToolSpec::local(name);
        let events = stamp(vec![
            CoreEvent::add_tool_specs(vec![spec("a"), spec("b")]),
            CoreEvent::add_tool_specs(vec![spec("a")]),
            CoreEvent::RemoveToolSpecs(crate::event::RemoveToolSpecs {
                names: vec!["b".into()],
            })
            .into_input(),
        ]);
        let state = fold(&events);
        assert_eq!(state.tool_specs, vec![spec("a")]);
    }

    #[test]
    fn unanswered_calls_skip_answered_ones() {
        let call = |id: &str| ConversationItem::FunctionCall {
            call_id: id.into(),
            name: "exec".into(),
            arguments: "{}".into(),
        };
        let events = stamp(vec![
            CoreEvent::input_item(call("c1")),
            CoreEvent::input_item(call("c2")),
            CoreEvent::input_item(ConversationItem::function_output("c1", "ok")),
        ]);
        assert_eq!(fold(&events).unanswered_calls(), vec![("c2", "exec")]);
    }

    #[test]
    fn last_assistant_text() {
        let events = stamp(vec![
            CoreEvent::user_message("hi"),
            CoreEvent::input_item(ConversationItem::assistant("first")),
            CoreEvent::input_item(ConversationItem::assistant("second")),
        ]);
        assert_eq!(fold(&events).last_assistant_text(), Some("second"));
    }
}
