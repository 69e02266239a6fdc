//! End-to-end integration tests for the Foldline agent core.
//!
//! These tests drive a full `AgentCore` (store, scripted model client, tool
//! dispatcher, slices) the way the CLI does, and check the resulting log.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use foldline_agent::{AgentCore, EventLog, SliceRegistry, fold_events};
use foldline_channels::{
    SlackThreadStatusPayload, StatusIndicatorRequest, ThreadStatusSink, ThreadStatusSlice,
    build_slack_thread_status_payload, resolve_status_indicator_text,
};
use foldline_config::AppConfig;
use foldline_core::error::{DispatchError, Result};
use foldline_core::event::{
    CoreEvent, Event, LLM_REQUEST_CANCEL, LLM_REQUEST_END, LLM_REQUEST_START,
};
use foldline_core::message::FunctionCall;
use foldline_core::provider::StaticClientFactory;
use foldline_core::store::EventStore;
use foldline_core::tool::{ToolResolver, ToolSpec};
use foldline_providers::{Script, ScriptedClient};
use foldline_store::{FileEventStore, InMemoryEventStore};
use foldline_tools::default_dispatcher;

// ── Helpers ──────────────────────────────────────────────────────────────

fn build_core(store: Arc<dyn EventStore>, client: Arc<ScriptedClient>) -> AgentCore {
    AgentCore::builder(
        store,
        Arc::new(StaticClientFactory::new(client)),
        Arc::new(default_dispatcher()),
    )
    .build()
    .unwrap()
}

fn open_requests(events: &[Event]) -> Vec<String> {
    let mut open: Vec<String> = Vec::new();
    for e in events {
        let id = e.data["requestId"].as_str().unwrap_or_default().to_string();
        match e.event_type.as_str() {
            LLM_REQUEST_START => open.push(id),
            LLM_REQUEST_END | LLM_REQUEST_CANCEL => open.retain(|o| *o != id),
            _ => {}
        }
        assert!(open.len() <= 1, "two requests open at index {}", e.event_index);
    }
    open
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}

// ── Conversation turns ───────────────────────────────────────────────────

#[tokio::test]
async fn e2e_file_session_survives_restart_and_replays() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions").join("chat.jsonl");

    let client = Arc::new(ScriptedClient::new(vec![
        Script::text("Hello! How can I help?"),
        Script::text("Still here."),
    ]));
    let core = build_core(Arc::new(FileEventStore::new(&path)), client.clone());
    core.add_events(vec![
        CoreEvent::system_prompt("You are concise."),
        CoreEvent::user_message("hi"),
    ])
    .await
    .unwrap();
    core.wait_idle().await;
    let first_state = core.state().await;

    // A new process picks the conversation back up
    let resumed = build_core(Arc::new(FileEventStore::new(&path)), client.clone());
    assert_eq!(resumed.restore().await.unwrap(), 5);
    assert_eq!(resumed.state().await, first_state);

    resumed
        .add_events(vec![CoreEvent::user_message("you there?")])
        .await
        .unwrap();
    resumed.wait_idle().await;

    let second = &client.requests()[1];
    assert_eq!(second.instructions, "You are concise.");
    assert_eq!(second.input.len(), 3);

    // Offline replay of the file matches the live state
    let events = FileEventStore::new(&path).load_events().await.unwrap();
    let log = EventLog::from_events(events).unwrap();
    let replayed = fold_events(&SliceRegistry::empty(), log.events()).unwrap();
    assert_eq!(replayed, resumed.state().await);
    assert_eq!(replayed.last_assistant_text(), Some("Still here."));
    assert!(open_requests(log.events()).is_empty());
}

#[tokio::test]
async fn e2e_builtin_clock_tool_round_trip() {
    let client = Arc::new(ScriptedClient::new(vec![
        Script::tool_calls(vec![FunctionCall {
            call_id: "call_time".into(),
            name: "current_time".into(),
            arguments: r#"{"utc_offset_hours": 2}"#.into(),
        }]),
        Script::text("It is afternoon."),
    ]));
    let core = build_core(Arc::new(InMemoryEventStore::new()), client.clone());
    core.add_events(vec![
        CoreEvent::add_tool_specs(vec![ToolSpec::local("current_time")]),
        CoreEvent::user_message("what time is it?"),
    ])
    .await
    .unwrap();
    core.wait_idle().await;

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools[0]["name"], "current_time");

    let output = requests[1]
        .input
        .iter()
        .find_map(|item| match item {
            foldline_core::ConversationItem::FunctionCallOutput { call_id, output }
                if call_id == "call_time" =>
            {
                Some(output.clone())
            }
            _ => None,
        })
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert!(parsed["iso8601"].as_str().unwrap().ends_with("+02:00"));
    assert_eq!(
        core.state().await.last_assistant_text(),
        Some("It is afternoon.")
    );
}

#[tokio::test]
async fn e2e_rapid_messages_never_overlap_requests() {
    let client = Arc::new(ScriptedClient::new(vec![
        Script::hang(),
        Script::hang(),
        Script::text("Final answer."),
    ]));
    let core = build_core(Arc::new(InMemoryEventStore::new()), client.clone());

    for (i, text) in ["one", "two", "three"].into_iter().enumerate() {
        core.add_events(vec![CoreEvent::user_message(text)])
            .await
            .unwrap();
        wait_for(|| client.requests().len() == i + 1).await;
    }
    core.wait_idle().await;

    let events = core.events().await;
    assert!(open_requests(&events).is_empty());
    let cancels: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == LLM_REQUEST_CANCEL)
        .collect();
    assert_eq!(cancels.len(), 2);
    assert!(cancels.iter().all(|e| e.data["reason"] == "superseded"));

    // Every CANCEL sits directly before the START that superseded it
    for cancel in cancels {
        let next = events
            .iter()
            .find(|e| e.event_index == cancel.event_index + 1)
            .unwrap();
        assert_eq!(next.event_type, LLM_REQUEST_START);
    }
    assert_eq!(
        core.state().await.last_assistant_text(),
        Some("Final answer.")
    );
    wait_for(|| client.released_streams() == 2).await;
}

#[tokio::test]
async fn e2e_idle_core_stays_quiet() {
    let client = Arc::new(ScriptedClient::new(vec![Script::text("Done.")]));
    let source = build_core(Arc::new(InMemoryEventStore::new()), client);
    source
        .add_events(vec![CoreEvent::user_message("hello")])
        .await
        .unwrap();
    source.wait_idle().await;
    let settled = source.event_count().await;
    tokio::task::yield_now().await;
    assert_eq!(source.event_count().await, settled);
    assert_eq!(source.background_tasks(), 0);

    // Initializing from the log and adding nothing leaves the state alone
    let store = Arc::new(InMemoryEventStore::new());
    let replica = build_core(store.clone(), Arc::new(ScriptedClient::new(vec![])));
    replica
        .initialize_with_events(source.events().await)
        .await
        .unwrap();
    let before = replica.state().await;
    assert!(replica.add_events(vec![]).await.unwrap().is_empty());
    assert_eq!(replica.state().await, before);
    assert_eq!(store.write_count(), 0);
}

// ── Tool resolution ──────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_unregistered_tool_fails_resolution() {
    let dispatcher = default_dispatcher();
    let err = dispatcher
        .resolve(&[ToolSpec::local("current_time"), ToolSpec::callable("lookup_order")])
        .unwrap_err();
    assert_eq!(
        err,
        DispatchError::Unresolved {
            tool: "lookup_order".into(),
            kind: "serialized_callable_tool".into(),
        }
    );
}

// ── Status surfaces ──────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_status_indicator_scenarios() {
    assert_eq!(
        resolve_status_indicator_text(&StatusIndicatorRequest::new("exec")),
        "🛠️ exec..."
    );
    assert_eq!(
        resolve_status_indicator_text(
            &StatusIndicatorRequest::new("exec")
                .with_template("⚙️ ${args.command}")
                .with_args_text(r#"{"command":"ls -la"}"#)
        ),
        "⚙️ ls -la"
    );
    assert_eq!(
        resolve_status_indicator_text(
            &StatusIndicatorRequest::new("exec")
                .with_template("command: ${args.command}")
                .with_args_text("{ invalid json")
        ),
        "command: "
    );

    assert_eq!(build_slack_thread_status_payload(None).status, "");
    let typing = build_slack_thread_status_payload(Some("✏️ writing response"));
    assert_eq!(typing.status, "is typing...");
    assert_eq!(
        typing.loading_messages,
        Some(vec!["✏️ writing response...".to_string()])
    );
    let thinking = build_slack_thread_status_payload(Some("🧠 thinking"));
    assert_eq!(thinking.status, "is thinking...");
    assert_eq!(
        thinking.loading_messages,
        Some(vec!["🧠 thinking...".to_string()])
    );
}

#[derive(Default)]
struct SlackRecorder(Mutex<Vec<SlackThreadStatusPayload>>);

#[async_trait]
impl ThreadStatusSink for SlackRecorder {
    async fn set_status(&self, payload: SlackThreadStatusPayload) -> Result<()> {
        self.0.lock().unwrap().push(payload);
        Ok(())
    }
}

#[tokio::test]
async fn e2e_slack_thread_status_follows_the_turn() {
    let recorder = Arc::new(SlackRecorder::default());
    let sink: Arc<dyn ThreadStatusSink> = recorder.clone();
    let client = Arc::new(ScriptedClient::new(vec![Script::text("Hi there.")]));

    let core = AgentCore::builder(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(StaticClientFactory::new(client)),
        Arc::new(default_dispatcher()),
    )
    .with_slice(Arc::new(ThreadStatusSlice::new()))
    .with_capability(sink)
    .build()
    .unwrap();

    core.add_events(vec![CoreEvent::user_message("hey")])
        .await
        .unwrap();
    core.wait_idle().await;

    let pushed = recorder.0.lock().unwrap().clone();
    assert_eq!(
        pushed,
        vec![
            build_slack_thread_status_payload(Some("🧠 thinking")),
            build_slack_thread_status_payload(None),
        ]
    );
}

// ── Configuration ────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_config_file_drives_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[provider]
default_model = "gpt-4.1-mini"
default_temperature = 0.3

[engine]
max_rule_cascade = 4

[store]
backend = "memory"
"#,
    )
    .unwrap();

    let mut config = AppConfig::load_from(&path).unwrap();
    config.apply_env(|key| (key == "OPENAI_API_KEY").then(|| "sk-test".to_string()));
    assert!(config.has_api_key());
    assert_eq!(config.engine.max_rule_cascade, 4);
    assert_eq!(config.engine.stream_buffer, 64);

    let core = AgentCore::builder(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(StaticClientFactory::new(Arc::new(ScriptedClient::new(vec![])))),
        Arc::new(default_dispatcher()),
    )
    .with_engine_config(config.engine.clone())
    .build()
    .unwrap();
    let mut opts = foldline_core::ModelOpts::new(&config.provider.default_model);
    opts.temperature = config.provider.default_temperature;
    core.add_events(vec![CoreEvent::SetModelOpts(opts).into_input()])
        .await
        .unwrap();
    assert_eq!(core.state().await.model_opts.model, "gpt-4.1-mini");
}
