//! Foldline CLI: the main entry point.
//!
//! Commands:
//! - `onboard`  Write the default config and session directory
//! - `chat`     Run one conversation turn against the configured model
//! - `replay`   Fold a session log and print the resulting state
//! - `status`   Render a tool's status indicator and Slack payload

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use foldline_config::{AppConfig, LogFormat, LoggingConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "foldline",
    about = "Foldline: an event-sourced agent core",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and the session directory
    Onboard,

    /// Send one message and stream the reply
    Chat {
        /// The user message
        #[arg(short, long)]
        message: String,

        /// Session log to resume and append to (JSONL)
        #[arg(short, long)]
        session: Option<PathBuf>,
    },

    /// Fold a session log and print the state as JSON
    Replay {
        /// Session log (JSONL)
        file: PathBuf,
    },

    /// Render a tool status indicator
    Status {
        /// Tool name
        #[arg(short, long)]
        tool: String,

        /// Status indicator template, e.g. "⚙️ ${args.command}"
        #[arg(long)]
        template: Option<String>,

        /// Call arguments as JSON text
        #[arg(short, long)]
        args: Option<String>,
    },
}

fn init_tracing(verbose: bool, json: bool, logging: &LoggingConfig) {
    let fallback = if verbose {
        "debug".to_string()
    } else {
        logging.filter.clone().unwrap_or_else(|| "info".to_string())
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));

    // Logs go to stderr so streamed replies own stdout
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json || logging.format == LogFormat::Json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let logging = AppConfig::load()
        .map(|c| c.logging)
        .unwrap_or_default();
    init_tracing(cli.verbose, cli.json_logs, &logging);

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat { message, session } => commands::chat::run(message, session).await?,
        Commands::Replay { file } => commands::replay::run(file).await?,
        Commands::Status {
            tool,
            template,
            args,
        } => commands::status::run(tool, template, args)?,
    }

    Ok(())
}
