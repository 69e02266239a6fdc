//! `AgentCore`: the serialized append pipeline.
//!
//! Every append (host input, stream output, tool results, rule commands)
//! goes through one `tokio::sync::Mutex`, so no two folds interleave and
//! event indices are assigned in a single total order:
//!
//! 1. validate the batch's event types
//! 2. stamp indices and a timestamp
//! 3. fold into a working copy of state
//! 4. persist the full log
//! 5. commit, then evaluate rules and apply their commands
//!
//! Rules whose commands append further events are evaluated again on those
//! events, up to `max_rule_cascade` rounds.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use foldline_config::EngineConfig;
use foldline_core::error::{DispatchError, Error, Result, ValidationError};
use foldline_core::event::{CoreEvent, Event, EventInput, ToolCallError};
use foldline_core::ids::{IdGenerator, UuidIds};
use foldline_core::message::FunctionCall;
use foldline_core::provider::{LlmClientFactory, StreamListener};
use foldline_core::slice::{
    BackgroundJob, Capabilities, Command, EventSink, RuleContext, RuleMatchData, Slice,
};
use foldline_core::state::AgentCoreState;
use foldline_core::store::EventStore;
use foldline_core::tool::{RuntimeTool, ToolResolver};
use foldline_tools::execute_call;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::background::BackgroundTracker;
use crate::fold::{fold_event, fold_events};
use crate::llm_request::ActiveRequest;
use crate::log::EventLog;
use crate::registry::SliceRegistry;

/// Everything the pipeline lock guards.
pub(crate) struct Pipeline {
    pub(crate) log: EventLog,
    pub(crate) state: AgentCoreState,
    pub(crate) active: Option<ActiveRequest>,
}

impl Pipeline {
    pub(crate) fn is_active(&self, request_id: &str) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.request_id == request_id)
    }
}

pub(crate) struct Inner {
    pub(crate) pipeline: Mutex<Pipeline>,
    pub(crate) registry: SliceRegistry,
    pub(crate) store: Arc<dyn EventStore>,
    pub(crate) client_factory: Arc<dyn LlmClientFactory>,
    pub(crate) tool_resolver: Arc<dyn ToolResolver>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) stream_listener: Option<Arc<dyn StreamListener>>,
    pub(crate) match_data: Option<Arc<dyn RuleMatchData>>,
    pub(crate) background: BackgroundTracker,
    pub(crate) config: EngineConfig,
}

/// The agent core for one conversation. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AgentCore {
    pub(crate) inner: Arc<Inner>,
}

/// Builder for [`AgentCore`].
pub struct AgentCoreBuilder {
    store: Arc<dyn EventStore>,
    client_factory: Arc<dyn LlmClientFactory>,
    tool_resolver: Arc<dyn ToolResolver>,
    slices: Vec<Arc<dyn Slice>>,
    capabilities: Capabilities,
    ids: Arc<dyn IdGenerator>,
    stream_listener: Option<Arc<dyn StreamListener>>,
    match_data: Option<Arc<dyn RuleMatchData>>,
    config: EngineConfig,
}

impl AgentCoreBuilder {
    /// Register a slice. Rules run in registration order.
    pub fn with_slice(mut self, slice: Arc<dyn Slice>) -> Self {
        self.slices.push(slice);
        self
    }

    /// Provide a capability for slices to use.
    pub fn with_capability<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.capabilities.insert(value);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_stream_listener(mut self, listener: Arc<dyn StreamListener>) -> Self {
        self.stream_listener = Some(listener);
        self
    }

    pub fn with_match_data(mut self, provider: Arc<dyn RuleMatchData>) -> Self {
        self.match_data = Some(provider);
        self
    }

    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<AgentCore> {
        if self.config.stream_buffer == 0 || self.config.max_rule_cascade == 0 {
            return Err(Error::Config {
                message: "stream_buffer and max_rule_cascade must be > 0".into(),
            });
        }

        let registry = SliceRegistry::new(self.slices, self.capabilities)?;
        let state = registry.initial_state();
        let background = BackgroundTracker::new(self.config.background_soft_limit);

        Ok(AgentCore {
            inner: Arc::new(Inner {
                pipeline: Mutex::new(Pipeline {
                    log: EventLog::new(),
                    state,
                    active: None,
                }),
                registry,
                store: self.store,
                client_factory: self.client_factory,
                tool_resolver: self.tool_resolver,
                ids: self.ids,
                stream_listener: self.stream_listener,
                match_data: self.match_data,
                background,
                config: self.config,
            }),
        })
    }
}

impl AgentCore {
    pub fn builder(
        store: Arc<dyn EventStore>,
        client_factory: Arc<dyn LlmClientFactory>,
        tool_resolver: Arc<dyn ToolResolver>,
    ) -> AgentCoreBuilder {
        AgentCoreBuilder {
            store,
            client_factory,
            tool_resolver,
            slices: Vec::new(),
            capabilities: Capabilities::new(),
            ids: Arc::new(UuidIds),
            stream_listener: None,
            match_data: None,
            config: EngineConfig::default(),
        }
    }

    /// Replace the log with `events` and refold from scratch.
    ///
    /// Runs no rules and persists nothing. Any running request task is
    /// canceled; a request the log leaves open stays open in state until
    /// the next start supersedes it.
    pub async fn initialize_with_events(&self, events: Vec<Event>) -> Result<()> {
        let log = EventLog::from_events(events)?;
        let state = fold_events(&self.inner.registry, log.events())?;

        let mut p = self.inner.pipeline.lock().await;
        if let Some(active) = p.active.take() {
            active.token.cancel();
        }
        info!(events = log.len(), "Event log initialized");
        p.log = log;
        p.state = state;
        Ok(())
    }

    /// Load the store's log and initialize from it. Returns the event count.
    pub async fn restore(&self) -> Result<usize> {
        let events = self.inner.store.load_events().await?;
        let count = events.len();
        self.initialize_with_events(events).await?;
        Ok(count)
    }

    /// Append events, fold them, persist, and run rules.
    ///
    /// Returns once the batch is committed and rule commands are applied;
    /// model requests and tool executions it triggers continue in the
    /// background. An empty batch does nothing.
    pub async fn add_events(&self, inputs: Vec<EventInput>) -> Result<Vec<Event>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let mut p = self.inner.pipeline.lock().await;
        self.process_locked(&mut p, inputs).await
    }

    /// Cancel the open model request, if any.
    pub async fn cancel_llm_request(&self, reason: &str) -> Result<Vec<Event>> {
        let mut p = self.inner.pipeline.lock().await;
        let appended = self.cancel_locked(&mut p, reason).await?;
        self.run_cascade(&mut p, appended.clone()).await;
        Ok(appended)
    }

    pub async fn state(&self) -> AgentCoreState {
        self.inner.pipeline.lock().await.state.clone()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.inner.pipeline.lock().await.log.events().to_vec()
    }

    pub async fn event_count(&self) -> usize {
        self.inner.pipeline.lock().await.log.len()
    }

    /// Wait for every background task (streams, tools, jobs) to settle.
    pub async fn wait_idle(&self) {
        self.inner.background.wait_idle().await;
    }

    /// Number of live background tasks.
    pub fn background_tasks(&self) -> usize {
        self.inner.background.len()
    }

    /// Validate, stamp, fold, persist, commit. No rules.
    pub(crate) async fn append_locked(
        &self,
        p: &mut Pipeline,
        inputs: Vec<EventInput>,
    ) -> Result<Vec<Event>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(unclaimed) = inputs
            .iter()
            .find(|i| !self.inner.registry.claims(&i.event_type))
        {
            return Err(ValidationError::UnknownEventType(unclaimed.event_type.clone()).into());
        }

        let events = p.log.stamp(inputs, Utc::now());
        let mut working = p.state.clone();
        for event in &events {
            fold_event(&self.inner.registry, &mut working, event)?;
        }

        let previous_len = p.log.len();
        p.log.extend(&events);
        if let Err(e) = self.inner.store.store_events(p.log.events()).await {
            p.log.truncate(previous_len);
            warn!(store = self.inner.store.name(), error = %e, "Persisting events failed; batch discarded");
            return Err(e.into());
        }
        p.state = working;

        debug!(
            count = events.len(),
            first_index = events[0].event_index,
            "Events appended"
        );
        Ok(events)
    }

    /// Append, then run the rule cascade on what was appended.
    pub(crate) async fn process_locked(
        &self,
        p: &mut Pipeline,
        inputs: Vec<EventInput>,
    ) -> Result<Vec<Event>> {
        let appended = self.append_locked(p, inputs).await?;
        self.run_cascade(p, appended.clone()).await;
        Ok(appended)
    }

    async fn run_cascade(&self, p: &mut Pipeline, mut batch: Vec<Event>) {
        let limit = self.inner.config.max_rule_cascade;
        let mut rounds = 0;
        while !batch.is_empty() {
            if rounds == limit {
                warn!(limit, pending = batch.len(), "Rule cascade limit reached; stopping");
                return;
            }
            rounds += 1;
            let commands = self.evaluate_rules(p, &batch);
            batch = self.apply_commands(p, commands).await;
        }
    }

    fn evaluate_rules(&self, p: &Pipeline, batch: &[Event]) -> Vec<Command> {
        let match_data = self
            .inner
            .match_data
            .as_ref()
            .map_or(Value::Null, |m| m.match_data(&p.state));
        let ctx = RuleContext {
            state: &p.state,
            match_data: &match_data,
            new_events: batch,
            capabilities: self.inner.registry.capabilities(),
        };
        let commands = self.inner.registry.evaluate(&ctx);
        if !commands.is_empty() {
            debug!(count = commands.len(), "Rules produced commands");
        }
        commands
    }

    /// Apply commands in order. Returns the events they appended.
    ///
    /// A failing command is logged and skipped; the batch that triggered it
    /// is already committed.
    async fn apply_commands(&self, p: &mut Pipeline, commands: Vec<Command>) -> Vec<Event> {
        let mut appended = Vec::new();
        let mut started = false;

        for command in commands {
            let kind = command.kind();
            let result = match command {
                // One start per round; a second would only supersede the first
                Command::StartLlmRequest if started => Ok(Vec::new()),
                Command::StartLlmRequest => {
                    started = true;
                    self.start_locked(p).await
                }
                Command::CancelLlmRequest { reason } => self.cancel_locked(p, &reason).await,
                Command::InvokeTool { call } => {
                    self.invoke_tool(p, call);
                    Ok(Vec::new())
                }
                Command::AppendEvents(inputs) => self.append_locked(p, inputs).await,
                Command::Background { name, job } => {
                    self.spawn_job(name, job);
                    Ok(Vec::new())
                }
            };

            match result {
                Ok(events) => appended.extend(events),
                Err(e) => warn!(command = kind, error = %e, "Rule command failed"),
            }
        }
        appended
    }

    fn invoke_tool(&self, p: &Pipeline, call: FunctionCall) {
        let tools = self.inner.tool_resolver.resolve(&p.state.tool_specs);
        self.inner
            .background
            .spawn(format!("tool:{}", call.name), self.clone().tool_task(tools, call));
    }

    fn tool_task(
        self,
        tools: std::result::Result<Vec<RuntimeTool>, DispatchError>,
        call: FunctionCall,
    ) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            let result = match tools {
                Ok(tools) => execute_call(&tools, &call).await,
                Err(e) => CoreEvent::ToolCallError(ToolCallError {
                    call_id: call.call_id.clone(),
                    tool_name: call.name.clone(),
                    detail: e.to_string(),
                })
                .into_input(),
            };
            self.add_events(vec![CoreEvent::input_item(call.to_item()), result.triggering()])
                .await?;
            Ok(())
        })
    }

    fn spawn_job(&self, name: String, job: BackgroundJob) {
        let sink: Arc<dyn EventSink> = Arc::new(self.clone());
        self.inner.background.spawn(name, job(sink));
    }
}

#[async_trait]
impl EventSink for AgentCore {
    async fn add_events(&self, inputs: Vec<EventInput>) -> Result<Vec<Event>> {
        AgentCore::add_events(self, inputs).await
    }
}
