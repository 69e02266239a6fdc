//! Events: the append-only record every piece of agent state derives from.
//!
//! An [`Event`] is immutable once appended. The `CORE:*` vocabulary is defined
//! here as [`CoreEvent`]; slices contribute their own namespaced types and are
//! responsible for their own payloads.
//!
//! Payload structs only ever gain optional (`#[serde(default)]`) fields so that
//! older persisted logs keep folding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::message::ConversationItem;
use crate::state::ModelOpts;
use crate::tool::ToolSpec;

pub const SET_SYSTEM_PROMPT: &str = "CORE:SET_SYSTEM_PROMPT";
pub const SET_MODEL_OPTS: &str = "CORE:SET_MODEL_OPTS";
pub const LLM_INPUT_ITEM: &str = "CORE:LLM_INPUT_ITEM";
pub const LLM_REQUEST_START: &str = "CORE:LLM_REQUEST_START";
pub const LLM_REQUEST_END: &str = "CORE:LLM_REQUEST_END";
pub const LLM_REQUEST_CANCEL: &str = "CORE:LLM_REQUEST_CANCEL";
pub const ADD_TOOL_SPECS: &str = "CORE:ADD_TOOL_SPECS";
pub const REMOVE_TOOL_SPECS: &str = "CORE:REMOVE_TOOL_SPECS";
pub const TOOL_CALL_ERROR: &str = "CORE:TOOL_CALL_ERROR";
pub const PAUSE_LLM_REQUESTS: &str = "CORE:PAUSE_LLM_REQUESTS";
pub const RESUME_LLM_REQUESTS: &str = "CORE:RESUME_LLM_REQUESTS";

/// Every event type the core itself claims.
pub const CORE_EVENT_TYPES: &[&str] = &[
    SET_SYSTEM_PROMPT,
    SET_MODEL_OPTS,
    LLM_INPUT_ITEM,
    LLM_REQUEST_START,
    LLM_REQUEST_END,
    LLM_REQUEST_CANCEL,
    ADD_TOOL_SPECS,
    REMOVE_TOOL_SPECS,
    TOOL_CALL_ERROR,
    PAUSE_LLM_REQUESTS,
    RESUME_LLM_REQUESTS,
];

/// Prefix reserved for core event types.
pub const CORE_NAMESPACE: &str = "CORE:";

/// An immutable, ordered record of a state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub data: Value,

    /// Strictly increasing position in the log, assigned at append time
    pub event_index: u64,

    pub timestamp: DateTime<Utc>,

    #[serde(
        rename = "triggerLLMRequest",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub trigger_llm_request: Option<bool>,
}

impl Event {
    /// Whether this event asks for a new model request.
    pub fn triggers_llm_request(&self) -> bool {
        self.trigger_llm_request.unwrap_or(false)
    }
}

/// An event before it has been given an index and a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub data: Value,

    #[serde(
        rename = "triggerLLMRequest",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub trigger_llm_request: Option<bool>,
}

impl EventInput {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            trigger_llm_request: None,
        }
    }

    /// Mark this input as starting a new model request once folded.
    pub fn triggering(mut self) -> Self {
        self.trigger_llm_request = Some(true);
        self
    }

    /// Stamp the input with its position in the log.
    pub fn into_event(self, event_index: u64, timestamp: DateTime<Utc>) -> Event {
        Event {
            event_type: self.event_type,
            data: self.data,
            event_index,
            timestamp,
            trigger_llm_request: self.trigger_llm_request,
        }
    }
}

/// Outcome of a finished model request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestOutcome {
    Success,
    Error,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetSystemPrompt {
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmInputItem {
    pub item: ConversationItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequestStart {
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequestEnd {
    pub request_id: String,
    pub outcome: RequestOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequestCancel {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddToolSpecs {
    pub specs: Vec<ToolSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveToolSpecs {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallError {
    pub call_id: String,
    pub tool_name: String,
    pub detail: String,
}

/// The typed core event vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    SetSystemPrompt(SetSystemPrompt),
    SetModelOpts(ModelOpts),
    LlmInputItem(LlmInputItem),
    LlmRequestStart(LlmRequestStart),
    LlmRequestEnd(LlmRequestEnd),
    LlmRequestCancel(LlmRequestCancel),
    AddToolSpecs(AddToolSpecs),
    RemoveToolSpecs(RemoveToolSpecs),
    ToolCallError(ToolCallError),
    PauseLlmRequests,
    ResumeLlmRequests,
}

fn payload<T: serde::de::DeserializeOwned>(
    event_type: &str,
    data: &Value,
) -> Result<T, ValidationError> {
    T::deserialize(data).map_err(|e| ValidationError::MalformedEvent {
        event_type: event_type.to_string(),
        reason: e.to_string(),
    })
}

fn to_data<T: Serialize>(value: &T) -> Value {
    // Payload types are plain data; serialization cannot fail.
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl CoreEvent {
    /// Decode a core event. Returns `Ok(None)` for non-core types.
    pub fn decode(event_type: &str, data: &Value) -> Result<Option<Self>, ValidationError> {
        let event = match event_type {
            SET_SYSTEM_PROMPT => Self::SetSystemPrompt(payload(event_type, data)?),
            SET_MODEL_OPTS => Self::SetModelOpts(payload(event_type, data)?),
            LLM_INPUT_ITEM => Self::LlmInputItem(payload(event_type, data)?),
            LLM_REQUEST_START => Self::LlmRequestStart(payload(event_type, data)?),
            LLM_REQUEST_END => Self::LlmRequestEnd(payload(event_type, data)?),
            LLM_REQUEST_CANCEL => Self::LlmRequestCancel(payload(event_type, data)?),
            ADD_TOOL_SPECS => Self::AddToolSpecs(
                AddToolSpecs::deserialize(data)
                    .map_err(|e| ValidationError::MalformedToolSpec(e.to_string()))?,
            ),
            REMOVE_TOOL_SPECS => Self::RemoveToolSpecs(payload(event_type, data)?),
            TOOL_CALL_ERROR => Self::ToolCallError(payload(event_type, data)?),
            PAUSE_LLM_REQUESTS => Self::PauseLlmRequests,
            RESUME_LLM_REQUESTS => Self::ResumeLlmRequests,
            other if other.starts_with(CORE_NAMESPACE) => {
                return Err(ValidationError::UnknownEventType(other.to_string()));
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// The wire type string for this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SetSystemPrompt(_) => SET_SYSTEM_PROMPT,
            Self::SetModelOpts(_) => SET_MODEL_OPTS,
            Self::LlmInputItem(_) => LLM_INPUT_ITEM,
            Self::LlmRequestStart(_) => LLM_REQUEST_START,
            Self::LlmRequestEnd(_) => LLM_REQUEST_END,
            Self::LlmRequestCancel(_) => LLM_REQUEST_CANCEL,
            Self::AddToolSpecs(_) => ADD_TOOL_SPECS,
            Self::RemoveToolSpecs(_) => REMOVE_TOOL_SPECS,
            Self::ToolCallError(_) => TOOL_CALL_ERROR,
            Self::PauseLlmRequests => PAUSE_LLM_REQUESTS,
            Self::ResumeLlmRequests => RESUME_LLM_REQUESTS,
        }
    }

    /// Encode as an input ready for `add_events`.
    pub fn into_input(self) -> EventInput {
        let data = match &self {
            Self::SetSystemPrompt(p) => to_data(p),
            Self::SetModelOpts(p) => to_data(p),
            Self::LlmInputItem(p) => to_data(p),
            Self::LlmRequestStart(p) => to_data(p),
            Self::LlmRequestEnd(p) => to_data(p),
            Self::LlmRequestCancel(p) => to_data(p),
            Self::AddToolSpecs(p) => to_data(p),
            Self::RemoveToolSpecs(p) => to_data(p),
            Self::ToolCallError(p) => to_data(p),
            Self::PauseLlmRequests | Self::ResumeLlmRequests => Value::Object(Default::default()),
        };
        EventInput::new(self.event_type(), data)
    }

    // Convenience constructors for the inputs hosts send most often.

    pub fn system_prompt(prompt: impl Into<String>) -> EventInput {
        Self::SetSystemPrompt(SetSystemPrompt {
            prompt: prompt.into(),
        })
        .into_input()
    }

    pub fn input_item(item: ConversationItem) -> EventInput {
        Self::LlmInputItem(LlmInputItem { item }).into_input()
    }

    /// A user message that starts a new model request.
    pub fn user_message(content: impl Into<String>) -> EventInput {
        Self::input_item(ConversationItem::user(content)).triggering()
    }

    pub fn add_tool_specs(specs: Vec<ToolSpec>) -> EventInput {
        Self::AddToolSpecs(AddToolSpecs { specs }).into_input()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_shape_uses_camel_case() {
        let event = CoreEvent::user_message("hello").into_event(7, Utc::now());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CORE:LLM_INPUT_ITEM");
        assert_eq!(json["eventIndex"], 7);
        assert_eq!(json["triggerLLMRequest"], true);
        assert_eq!(json["data"]["item"]["content"], "hello");
    }

    #[test]
    fn trigger_flag_is_omitted_when_unset() {
        let event = CoreEvent::system_prompt("be brief").into_event(0, Utc::now());
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("triggerLLMRequest"));
        assert!(!event.triggers_llm_request());
    }

    #[test]
    fn decode_core_event() {
        let data = serde_json::json!({"requestId": "req_1", "outcome": "error", "detail": "boom"});
        let event = CoreEvent::decode(LLM_REQUEST_END, &data).unwrap().unwrap();
        match event {
            CoreEvent::LlmRequestEnd(end) => {
                assert_eq!(end.request_id, "req_1");
                assert_eq!(end.outcome, RequestOutcome::Error);
                assert_eq!(end.detail.as_deref(), Some("boom"));
                assert!(end.usage.is_none());
            }
            _ => panic!("Expected LlmRequestEnd"),
        }
    }

    #[test]
    fn decode_skips_slice_types() {
        let decoded = CoreEvent::decode("SLACK:MESSAGE", &Value::Null).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn decode_rejects_unknown_core_type() {
        let err = CoreEvent::decode("CORE:NOT_A_THING", &Value::Null).unwrap_err();
        assert_eq!(err, ValidationError::UnknownEventType("CORE:NOT_A_THING".into()));
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        let err = CoreEvent::decode(LLM_REQUEST_START, &serde_json::json!({"id": 3})).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedEvent { .. }));
    }

    #[test]
    fn decode_rejects_unknown_tool_spec_kind() {
        let data = serde_json::json!({"specs": [{"type": "shell_script", "name": "rm"}]});
        let err = CoreEvent::decode(ADD_TOOL_SPECS, &data).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedToolSpec(_)));
        assert!(err.to_string().starts_with("malformed tool spec"));
    }

    #[test]
    fn pause_encodes_empty_object() {
        let input = CoreEvent::PauseLlmRequests.into_input();
        assert_eq!(input.event_type, PAUSE_LLM_REQUESTS);
        assert_eq!(input.data, serde_json::json!({}));
    }
}
