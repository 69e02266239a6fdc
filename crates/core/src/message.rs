//! Conversation item domain types.
//!
//! These are the values carried by `CORE:LLM_INPUT_ITEM` events and sent back
//! to the model as request input: user text, assistant replies, the function
//! calls the model asked for, and the outputs of those calls.

use serde::{Deserialize, Serialize};

/// The role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
    /// Developer instructions (higher priority than user)
    Developer,
}

/// One item of the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ConversationItem {
    /// A text message.
    Message { role: Role, content: String },

    /// A function call the model requested.
    FunctionCall {
        call_id: String,
        name: String,
        /// Arguments as the raw JSON text produced by the model
        arguments: String,
    },

    /// The result of a function call.
    FunctionCallOutput { call_id: String, output: String },
}

impl ConversationItem {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::Message {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Message {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a developer message.
    pub fn developer(content: impl Into<String>) -> Self {
        Self::Message {
            role: Role::Developer,
            content: content.into(),
        }
    }

    /// Create a function call output.
    pub fn function_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::FunctionCallOutput {
            call_id: call_id.into(),
            output: output.into(),
        }
    }

    /// The text of a message item, if this is one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Message { content, .. } => Some(content),
            _ => None,
        }
    }
}

/// A function call requested by the model, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    /// Unique call ID (matches the model's `call_id`)
    pub call_id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON text
    pub arguments: String,
}

impl FunctionCall {
    /// The conversation item recording this call.
    pub fn to_item(&self) -> ConversationItem {
        ConversationItem::FunctionCall {
            call_id: self.call_id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_item_wire_shape() {
        let json = serde_json::to_value(ConversationItem::user("hi")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "message", "role": "user", "content": "hi"})
        );
    }

    #[test]
    fn function_call_uses_camel_case_fields() {
        let json = r#"{"type":"function_call","callId":"call_1","name":"exec","arguments":"{}"}"#;
        let item: ConversationItem = serde_json::from_str(json).unwrap();
        match item {
            ConversationItem::FunctionCall { call_id, name, .. } => {
                assert_eq!(call_id, "call_1");
                assert_eq!(name, "exec");
            }
            _ => panic!("Expected FunctionCall"),
        }
    }

    #[test]
    fn text_only_for_messages() {
        assert_eq!(ConversationItem::assistant("done").text(), Some("done"));
        assert_eq!(ConversationItem::function_output("c", "x").text(), None);
    }
}
