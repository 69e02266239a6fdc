//! A scripted model client for tests and offline runs.
//!
//! Each `open_stream` call pops the next [`Script`] and plays it into the
//! channel. Requests are recorded so tests can assert what the engine sent.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use foldline_core::error::StreamError;
use foldline_core::event::Usage;
use foldline_core::message::{FunctionCall, Role};
use foldline_core::provider::{ChunkReceiver, LlmClient, LlmRequest, OutputItem, StreamChunk};

/// One scripted response.
#[derive(Debug, Clone)]
pub enum Script {
    /// Send these chunks, then close the channel.
    Chunks(Vec<Result<StreamChunk, StreamError>>),

    /// Send these chunks, then keep the channel open until the receiver is
    /// dropped.
    HoldOpen(Vec<Result<StreamChunk, StreamError>>),

    /// Fail to open the stream.
    OpenError(StreamError),
}

impl Script {
    /// A complete text reply, streamed word by word.
    pub fn text(reply: &str) -> Self {
        let mut chunks = vec![Ok(StreamChunk::ResponseCreated {
            response_id: "resp_scripted".into(),
        })];
        chunks.extend(reply.split_inclusive(' ').map(|word| {
            Ok(StreamChunk::OutputTextDelta {
                delta: word.to_string(),
            })
        }));
        chunks.push(Ok(StreamChunk::OutputItemDone {
            item: OutputItem::Message {
                role: Role::Assistant,
                content: reply.to_string(),
            },
        }));
        chunks.push(Ok(StreamChunk::ResponseCompleted {
            usage: Some(Usage {
                input_tokens: 10,
                output_tokens: reply.split_whitespace().count() as u64,
                total_tokens: 10 + reply.split_whitespace().count() as u64,
            }),
        }));
        Self::Chunks(chunks)
    }

    /// A completed response asking for the given tool calls.
    pub fn tool_calls(calls: Vec<FunctionCall>) -> Self {
        let mut chunks: Vec<_> = calls
            .into_iter()
            .map(|call| {
                Ok(StreamChunk::OutputItemDone {
                    item: OutputItem::FunctionCall(call),
                })
            })
            .collect();
        chunks.push(Ok(StreamChunk::ResponseCompleted { usage: None }));
        Self::Chunks(chunks)
    }

    /// A response that never finishes on its own.
    pub fn hang() -> Self {
        Self::HoldOpen(vec![Ok(StreamChunk::ResponseCreated {
            response_id: "resp_hanging".into(),
        })])
    }
}

/// Plays back scripts in order.
pub struct ScriptedClient {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<LlmRequest>>,
    released: Arc<AtomicUsize>,
}

impl ScriptedClient {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue another script.
    pub fn push(&self, script: Script) {
        self.scripts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(script);
    }

    /// Every request opened so far, in order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// How many held-open streams saw their receiver dropped.
    pub fn released_streams(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open_stream(
        &self,
        request: LlmRequest,
        buffer: usize,
    ) -> Result<ChunkReceiver, StreamError> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request);

        let script = self
            .scripts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .ok_or_else(|| StreamError::Open("no scripted response left".into()))?;

        let (chunks, hold_open) = match script {
            Script::Chunks(chunks) => (chunks, false),
            Script::HoldOpen(chunks) => (chunks, true),
            Script::OpenError(e) => return Err(e),
        };

        let (tx, rx) = tokio::sync::mpsc::channel(buffer.max(1));
        let released = Arc::clone(&self.released);
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
            if hold_open {
                tx.closed().await;
                released.fetch_add(1, Ordering::SeqCst);
            }
        });
        Ok(rx)
    }
}
