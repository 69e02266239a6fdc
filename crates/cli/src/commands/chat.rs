//! `foldline chat`: one conversation turn, streamed to the terminal.
//!
//! The session log is restored from the store first, so repeated runs with
//! the same `--session` continue one conversation.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use foldline_agent::AgentCore;
use foldline_channels::{StatusIndicatorRequest, resolve_status_indicator_text};
use foldline_config::{AppConfig, StoreBackend};
use foldline_core::event::{CoreEvent, LLM_REQUEST_END};
use foldline_core::provider::{OutputItem, StaticClientFactory, StreamChunk, StreamListener};
use foldline_core::state::ModelOpts;
use foldline_core::store::EventStore;
use foldline_core::tool::ToolSpec;
use foldline_providers::OpenAiResponsesClient;
use foldline_store::{FileEventStore, InMemoryEventStore};
use tracing::info;

/// Prints reply text as it streams and tool activity to stderr.
struct TerminalListener;

impl StreamListener for TerminalListener {
    fn on_chunk(&self, _request_id: &str, chunk: &StreamChunk) {
        match chunk {
            StreamChunk::OutputTextDelta { delta } => {
                let mut stdout = std::io::stdout();
                let _ = write!(stdout, "{delta}");
                let _ = stdout.flush();
            }
            StreamChunk::OutputItemDone {
                item: OutputItem::FunctionCall(call),
            } => {
                let request = StatusIndicatorRequest::new(&call.name).with_args_text(&call.arguments);
                eprintln!("\n  {}", resolve_status_indicator_text(&request));
            }
            _ => {}
        }
    }
}

pub async fn run(message: String, session: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set FOLDLINE_API_KEY or OPENAI_API_KEY, or add it to:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }
    let client = OpenAiResponsesClient::from_config(&config.provider)?;

    let store: Arc<dyn EventStore> = match config.store.backend {
        StoreBackend::File => {
            let path = session.unwrap_or_else(|| config.store.sessions_dir().join("default.jsonl"));
            Arc::new(FileEventStore::new(path))
        }
        StoreBackend::Memory => Arc::new(InMemoryEventStore::new()),
    };

    let dispatcher = foldline_tools::default_dispatcher();
    let specs: Vec<ToolSpec> = dispatcher
        .local_names()
        .into_iter()
        .map(ToolSpec::local)
        .collect();

    let core = AgentCore::builder(
        store,
        Arc::new(StaticClientFactory::new(Arc::new(client))),
        Arc::new(dispatcher),
    )
    .with_stream_listener(Arc::new(TerminalListener))
    .with_engine_config(config.engine.clone())
    .build()?;

    let restored = core.restore().await?;
    if restored == 0 {
        let mut opts = ModelOpts::new(&config.provider.default_model);
        opts.temperature = config.provider.default_temperature;
        core.add_events(vec![
            CoreEvent::system_prompt(&config.provider.system_prompt),
            CoreEvent::SetModelOpts(opts).into_input(),
            CoreEvent::add_tool_specs(specs),
        ])
        .await?;
    } else {
        info!(events = restored, "Session restored");
    }

    let sent = core.add_events(vec![CoreEvent::user_message(message)]).await?;
    core.wait_idle().await;
    println!();

    let first_new = sent.first().map_or(0, |e| e.event_index);
    let failure = core
        .events()
        .await
        .into_iter()
        .filter(|e| e.event_index > first_new && e.event_type == LLM_REQUEST_END)
        .filter(|e| e.data["outcome"] == "error")
        .last()
        .and_then(|e| e.data["detail"].as_str().map(String::from));
    if let Some(detail) = failure {
        return Err(format!("Model request failed: {detail}").into());
    }
    Ok(())
}
