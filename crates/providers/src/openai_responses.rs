//! OpenAI Responses API streaming client.
//!
//! Works with OpenAI and any endpoint that implements `POST /responses` with
//! `stream: true`. The SSE body is parsed in a spawned task that feeds a
//! bounded channel; the task exits as soon as the receiver is dropped.

use async_trait::async_trait;
use foldline_config::ProviderConfig;
use foldline_core::error::StreamError;
use foldline_core::event::Usage;
use foldline_core::message::{ConversationItem, FunctionCall, Role};
use foldline_core::provider::{ChunkReceiver, LlmClient, LlmRequest, OutputItem, StreamChunk};
use futures::StreamExt;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use crate::sse::SseBuffer;

pub struct OpenAiResponsesClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiResponsesClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| StreamError::ClientUnavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, StreamError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            StreamError::ClientUnavailable(
                "no API key configured (set FOLDLINE_API_KEY or OPENAI_API_KEY)".into(),
            )
        })?;
        Self::new(&config.api_url, api_key)
    }

    /// Build the JSON body for a streaming request.
    pub fn request_body(request: &LlmRequest) -> Value {
        let mut body = serde_json::Map::new();
        for (k, v) in &request.model_opts.extra {
            body.insert(k.clone(), v.clone());
        }
        body.insert("model".into(), json!(request.model_opts.model));
        body.insert("input".into(), json!(to_api_input(&request.input)));
        body.insert("stream".into(), json!(true));
        body.insert("store".into(), json!(false));
        if !request.instructions.is_empty() {
            body.insert("instructions".into(), json!(request.instructions));
        }
        if let Some(t) = request.model_opts.temperature {
            body.insert("temperature".into(), json!(t));
        }
        if !request.tools.is_empty() {
            body.insert("tools".into(), json!(request.tools));
        }
        Value::Object(body)
    }
}

/// Convert conversation items to Responses API input items.
pub fn to_api_input(items: &[ConversationItem]) -> Vec<Value> {
    items
        .iter()
        .map(|item| match item {
            ConversationItem::Message { role, content } => json!({
                "type": "message",
                "role": role,
                "content": content,
            }),
            ConversationItem::FunctionCall {
                call_id,
                name,
                arguments,
            } => json!({
                "type": "function_call",
                "call_id": call_id,
                "name": name,
                "arguments": arguments,
            }),
            ConversationItem::FunctionCallOutput { call_id, output } => json!({
                "type": "function_call_output",
                "call_id": call_id,
                "output": output,
            }),
        })
        .collect()
}

/// Map one streamed Responses API event to a chunk.
///
/// Events the engine has no use for (reasoning, content-part bookkeeping)
/// map to `None`.
pub fn map_event(event: &Value) -> Option<StreamChunk> {
    let str_at = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

    match event.get("type").and_then(Value::as_str)? {
        "response.created" => Some(StreamChunk::ResponseCreated {
            response_id: str_at(&event["response"], "id"),
        }),
        "response.output_text.delta" => Some(StreamChunk::OutputTextDelta {
            delta: str_at(event, "delta"),
        }),
        "response.output_item.done" => {
            let item = event.get("item")?;
            match item.get("type").and_then(Value::as_str)? {
                "message" => {
                    let content = item
                        .get("content")
                        .and_then(Value::as_array)
                        .map(|parts| {
                            parts
                                .iter()
                                .filter(|p| p["type"] == "output_text")
                                .filter_map(|p| p["text"].as_str())
                                .collect::<String>()
                        })
                        .unwrap_or_default();
                    Some(StreamChunk::OutputItemDone {
                        item: OutputItem::Message {
                            role: Role::Assistant,
                            content,
                        },
                    })
                }
                "function_call" => Some(StreamChunk::OutputItemDone {
                    item: OutputItem::FunctionCall(FunctionCall {
                        call_id: str_at(item, "call_id"),
                        name: str_at(item, "name"),
                        arguments: str_at(item, "arguments"),
                    }),
                }),
                _ => None,
            }
        }
        "response.completed" => Some(StreamChunk::ResponseCompleted {
            usage: event["response"].get("usage").map(|u| Usage {
                input_tokens: u["input_tokens"].as_u64().unwrap_or(0),
                output_tokens: u["output_tokens"].as_u64().unwrap_or(0),
                total_tokens: u["total_tokens"].as_u64().unwrap_or(0),
            }),
        }),
        "response.failed" => Some(StreamChunk::Error {
            message: event["response"]["error"]["message"]
                .as_str()
                .unwrap_or("response failed")
                .to_string(),
        }),
        "response.incomplete" => Some(StreamChunk::Error {
            message: format!(
                "response incomplete: {}",
                event["response"]["incomplete_details"]["reason"]
                    .as_str()
                    .unwrap_or("unknown")
            ),
        }),
        "error" => Some(StreamChunk::Error {
            message: str_at(event, "message"),
        }),
        _ => None,
    }
}

fn is_terminal(chunk: &StreamChunk) -> bool {
    matches!(
        chunk,
        StreamChunk::ResponseCompleted { .. } | StreamChunk::Error { .. }
    )
}

#[async_trait]
impl LlmClient for OpenAiResponsesClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn open_stream(
        &self,
        request: LlmRequest,
        buffer: usize,
    ) -> Result<ChunkReceiver, StreamError> {
        let url = format!("{}/responses", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            request_id = %request.request_id,
            model = %request.model_opts.model,
            items = request.input.len(),
            tools = request.tools.len(),
            "Sending streaming request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| StreamError::Open(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(StreamError::Open(
                "Invalid API key or insufficient permissions".into(),
            ));
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_body, "Provider streaming error");
            return Err(StreamError::Open(format!("HTTP {}: {error_body}", status.as_u16())));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(buffer.max(1));
        let request_id = request.request_id;

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut sse = SseBuffer::new();

            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        debug!(request_id = %request_id, "Stream receiver dropped");
                        return;
                    }
                    next = byte_stream.next() => next,
                };

                let bytes = match next {
                    Some(Ok(b)) => b,
                    Some(Err(e)) => {
                        let _ = tx.send(Err(StreamError::Transport(e.to_string()))).await;
                        return;
                    }
                    // Body ended; the consumer sees the channel close
                    None => return,
                };

                for data in sse.push(&bytes) {
                    if data == "[DONE]" {
                        return;
                    }
                    let event: Value = match serde_json::from_str(&data) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(error = %e, "Skipping unparsable SSE payload");
                            continue;
                        }
                    };
                    let Some(chunk) = map_event(&event) else {
                        trace!(event_type = %event["type"], "Ignoring stream event");
                        continue;
                    };
                    let terminal = is_terminal(&chunk);
                    if tx.send(Ok(chunk)).await.is_err() {
                        return;
                    }
                    if terminal {
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}
