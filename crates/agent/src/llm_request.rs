//! The model request lifecycle.
//!
//! ```text
//! idle -> started -> (completed | canceled | errored) -> idle
//! ```
//!
//! At most one request is open per engine. Starting while one is open
//! appends its CANCEL before the new START. The stream consumer runs on the
//! background tracker and writes back through the pipeline, re-checking on
//! every write that its request is still the active one; output from a
//! superseded or canceled request is discarded.
//!
//! Tool results are the exception. They answer calls already in the log, so
//! they are appended even when a newer request opened while the tools ran,
//! and their trigger supersedes that request: it was built without the
//! outputs.

use std::sync::Arc;

use foldline_core::error::{Result, StreamError};
use foldline_core::event::{
    CoreEvent, Event, EventInput, LlmRequestCancel, LlmRequestEnd, LlmRequestStart,
    RequestOutcome, ToolCallError, Usage,
};
use foldline_core::message::ConversationItem;
use foldline_core::provider::{LlmRequest, OutputItem, StreamChunk};
use foldline_core::state::AgentCoreState;
use foldline_core::tool::RuntimeTool;
use foldline_tools::execute_batch;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{AgentCore, Pipeline};

/// The runtime half of an open request. Never persisted.
pub(crate) struct ActiveRequest {
    pub(crate) request_id: String,
    pub(crate) token: CancellationToken,
}

/// How a request ended, short of cancellation.
pub(crate) enum Termination {
    Completed(Option<Usage>),
    Failed(String),
}

impl Termination {
    fn end_input(self, request_id: &str) -> EventInput {
        let (outcome, detail, usage) = match self {
            Self::Completed(usage) => (RequestOutcome::Success, None, usage),
            Self::Failed(detail) => (RequestOutcome::Error, Some(detail), None),
        };
        CoreEvent::LlmRequestEnd(LlmRequestEnd {
            request_id: request_id.to_string(),
            outcome,
            detail,
            usage,
        })
        .into_input()
    }
}

/// Errors closing every function call still waiting for output.
fn close_unanswered_calls(state: &AgentCoreState, detail: &str) -> Vec<EventInput> {
    state
        .unanswered_calls()
        .into_iter()
        .map(|(call_id, name)| {
            CoreEvent::ToolCallError(ToolCallError {
                call_id: call_id.to_string(),
                tool_name: name.to_string(),
                detail: detail.to_string(),
            })
            .into_input()
        })
        .collect()
}

impl AgentCore {
    /// Open a new request, superseding any open one.
    pub(crate) async fn start_locked(&self, p: &mut Pipeline) -> Result<Vec<Event>> {
        let mut appended = Vec::new();
        if p.state.is_request_open() {
            appended.extend(self.cancel_locked(p, "superseded").await?);
        }

        let request_id = self.inner.ids.next_id("req");
        let start = CoreEvent::LlmRequestStart(LlmRequestStart {
            request_id: request_id.clone(),
        })
        .into_input();
        appended.extend(self.append_locked(p, vec![start]).await?);

        let token = CancellationToken::new();
        p.active = Some(ActiveRequest {
            request_id: request_id.clone(),
            token: token.clone(),
        });
        info!(
            request_id = %request_id,
            model = %p.state.model_opts.model,
            items = p.state.input_items.len(),
            "LLM request started"
        );

        match self.inner.tool_resolver.resolve(&p.state.tool_specs) {
            Ok(tools) => {
                let request = LlmRequest {
                    request_id: request_id.clone(),
                    model_opts: p.state.model_opts.clone(),
                    instructions: p.state.system_prompt.clone(),
                    input: p.state.input_items.clone(),
                    tools: tools.iter().map(RuntimeTool::to_definition).collect(),
                };
                self.inner.background.spawn(
                    format!("llm:{request_id}"),
                    self.clone().stream_task(request, tools, token),
                );
            }
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Tool resolution failed");
                p.active = None;
                let end = Termination::Failed(e.to_string()).end_input(&request_id);
                appended.extend(self.append_locked(p, vec![end]).await?);
            }
        }
        Ok(appended)
    }

    /// Cancel the open request, if any.
    pub(crate) async fn cancel_locked(&self, p: &mut Pipeline, reason: &str) -> Result<Vec<Event>> {
        let Some(request_id) = p.state.llm_request.request_id().map(str::to_string) else {
            return Ok(Vec::new());
        };

        let mut inputs = vec![
            CoreEvent::LlmRequestCancel(LlmRequestCancel {
                request_id: request_id.clone(),
                reason: Some(reason.to_string()),
            })
            .into_input(),
        ];
        inputs.extend(close_unanswered_calls(&p.state, "model request was canceled"));

        // Fire before the append: nothing from this stream may be forwarded
        // once CANCEL is in the log. The stream task drops its receiver.
        if let Some(active) = p.active.take_if(|a| a.request_id == request_id) {
            active.token.cancel();
        }
        let appended = self.append_locked(p, inputs).await?;
        info!(request_id = %request_id, reason, "LLM request canceled");
        Ok(appended)
    }

    /// Append stream output if `request_id` is still the active request.
    pub(crate) async fn write_back(&self, request_id: &str, inputs: Vec<EventInput>) -> Result<bool> {
        let mut p = self.inner.pipeline.lock().await;
        if !p.is_active(request_id) {
            debug!(request_id, "Discarding stale stream output");
            return Ok(false);
        }
        self.process_locked(&mut p, inputs).await?;
        Ok(true)
    }

    /// Append the terminal event if `request_id` is still the active request.
    pub(crate) async fn finish_request(&self, request_id: &str, termination: Termination) -> Result<bool> {
        let mut p = self.inner.pipeline.lock().await;
        if !p.is_active(request_id) {
            debug!(request_id, "Request already closed; dropping terminal event");
            return Ok(false);
        }

        let mut inputs = Vec::new();
        let orphans = match &termination {
            Termination::Completed(_) => {
                info!(request_id, "LLM request completed");
                Vec::new()
            }
            Termination::Failed(detail) => {
                warn!(request_id, error = %detail, "LLM request failed");
                close_unanswered_calls(&p.state, "model request ended before the call ran")
            }
        };
        inputs.push(termination.end_input(request_id));
        inputs.extend(orphans);

        let active = p.active.take();
        match self.process_locked(&mut p, inputs).await {
            Ok(_) => Ok(true),
            Err(e) => {
                p.active = active;
                Err(e)
            }
        }
    }

    /// Consume one response stream until it ends or the token fires.
    fn stream_task(
        self,
        request: LlmRequest,
        tools: Vec<RuntimeTool>,
        token: CancellationToken,
    ) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            let request_id = request.request_id.clone();
            let buffer = self.inner.config.stream_buffer;
            let factory = Arc::clone(&self.inner.client_factory);

            let opened = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                opened = async move {
                    let client = factory.client().await?;
                    debug!(client = client.name(), "Opening stream");
                    client.open_stream(request, buffer).await
                } => opened,
            };
            let mut rx = match opened {
                Ok(rx) => rx,
                Err(e) => {
                    self.finish_request(&request_id, Termination::Failed(e.to_string()))
                        .await?;
                    return Ok(());
                }
            };

            let mut calls = Vec::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(request_id = %request_id, "Stream canceled");
                        return Ok(());
                    }
                    next = rx.recv() => next,
                };

                let chunk = match next {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(e)) => {
                        self.finish_request(&request_id, Termination::Failed(e.to_string()))
                            .await?;
                        return Ok(());
                    }
                    None => {
                        let detail = StreamError::ClosedEarly.to_string();
                        self.finish_request(&request_id, Termination::Failed(detail))
                            .await?;
                        return Ok(());
                    }
                };

                if token.is_cancelled() {
                    debug!(request_id = %request_id, "Stream canceled");
                    return Ok(());
                }
                if let Some(listener) = &self.inner.stream_listener {
                    listener.on_chunk(&request_id, &chunk);
                }

                match chunk {
                    StreamChunk::ResponseCreated { response_id } => {
                        debug!(request_id = %request_id, response_id = %response_id, "Response created");
                    }
                    StreamChunk::OutputTextDelta { .. } => {}
                    StreamChunk::OutputItemDone { item } => {
                        let input = match item {
                            OutputItem::Message { role, content } => {
                                CoreEvent::input_item(ConversationItem::Message { role, content })
                            }
                            OutputItem::FunctionCall(call) => {
                                let input = CoreEvent::input_item(call.to_item());
                                calls.push(call);
                                input
                            }
                        };
                        if !self.write_back(&request_id, vec![input]).await? {
                            return Ok(());
                        }
                    }
                    StreamChunk::ResponseCompleted { usage } => {
                        if !self
                            .finish_request(&request_id, Termination::Completed(usage))
                            .await?
                        {
                            return Ok(());
                        }
                        if !calls.is_empty() {
                            info!(request_id = %request_id, calls = calls.len(), "Dispatching tool calls");
                            let results = execute_batch(&tools, &calls).await;
                            self.add_events(results).await?;
                        }
                        return Ok(());
                    }
                    StreamChunk::Error { message } => {
                        self.finish_request(&request_id, Termination::Failed(message))
                            .await?;
                        return Ok(());
                    }
                }
            }
        })
    }
}
