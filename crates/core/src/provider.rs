//! Model client traits: the boundary to the LLM provider transport.
//!
//! A client opens one streaming request and hands back the receiving half of
//! a bounded channel. The consumer closes the stream by dropping the receiver;
//! producers must stop as soon as a send fails.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::StreamError;
use crate::event::Usage;
use crate::message::{ConversationItem, FunctionCall, Role};
use crate::state::ModelOpts;

/// Everything needed to open one streaming model request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Engine-assigned id, echoed in the START/END events
    pub request_id: String,

    pub model_opts: ModelOpts,

    /// System prompt, sent as the request's instructions
    pub instructions: String,

    /// Conversation snapshot at the time the request started
    pub input: Vec<ConversationItem>,

    /// Tool definitions in provider format
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
}

/// A completed output item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message { role: Role, content: String },
    FunctionCall(FunctionCall),
}

/// One chunk of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamChunk {
    /// The provider accepted the request.
    ResponseCreated { response_id: String },

    /// Partial output text. Forwarded live, never persisted.
    OutputTextDelta { delta: String },

    /// A finished output item.
    OutputItemDone { item: OutputItem },

    /// The response finished normally.
    ResponseCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    /// The provider reported an error inside the stream.
    Error { message: String },
}

/// Receiving half of a streamed response.
pub type ChunkReceiver = mpsc::Receiver<Result<StreamChunk, StreamError>>;

/// A client capable of opening streaming requests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// A human-readable name (e.g., "openai", "scripted").
    fn name(&self) -> &str;

    /// Open a streaming request. `buffer` is the channel capacity to use.
    async fn open_stream(
        &self,
        request: LlmRequest,
        buffer: usize,
    ) -> Result<ChunkReceiver, StreamError>;
}

/// Resolves, asynchronously, the client to use for the next request.
#[async_trait]
pub trait LlmClientFactory: Send + Sync {
    async fn client(&self) -> Result<Arc<dyn LlmClient>, StreamError>;
}

/// A factory that always hands out the same client.
pub struct StaticClientFactory {
    client: Arc<dyn LlmClient>,
}

impl StaticClientFactory {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LlmClientFactory for StaticClientFactory {
    async fn client(&self) -> Result<Arc<dyn LlmClient>, StreamError> {
        Ok(Arc::clone(&self.client))
    }
}

/// Live observer of streamed chunks (typing indicators, terminal output).
pub trait StreamListener: Send + Sync {
    fn on_chunk(&self, request_id: &str, chunk: &StreamChunk);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_serialization() {
        let chunk = StreamChunk::OutputTextDelta { delta: "Hel".into() };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains(r#""kind":"output_text_delta""#));
        assert!(json.contains(r#""delta":"Hel""#));
    }

    #[test]
    fn function_call_item_round_trips_through_chunk() {
        let json = r#"{"kind":"output_item_done","item":{"type":"function_call","callId":"c1","name":"exec","arguments":"{}"}}"#;
        let chunk: StreamChunk = serde_json::from_str(json).unwrap();
        match chunk {
            StreamChunk::OutputItemDone {
                item: OutputItem::FunctionCall(call),
            } => assert_eq!(call.name, "exec"),
            _ => panic!("Expected function call item"),
        }
    }
}
