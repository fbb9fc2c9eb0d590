//! Clawbot CLI — entry point.
//!
//! # Commands
//!
//! - `clawbot agent [-m MESSAGE] [-s SESSION]` — one message, or an interactive REPL
//! - `clawbot gateway` — long-running bot: tool servers, agent runner, channels
//! - `clawbot status` — configuration and credential status
//! - `clawbot tools` — start the tool servers and list every tool the model would see

mod gateway;
mod helpers;
mod repl;
mod status;
mod tools_cmd;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use clawbot_agent::AgentRunner;
use clawbot_core::bus::{MessageBus, DEFAULT_BUS_CAPACITY};
use clawbot_core::config::{load_config, Config};

/// 🦀 Clawbot — a chat assistant that uses external tool servers
#[derive(Parser)]
#[command(name = "clawbot", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (single message or interactive REPL)
    Agent {
        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Session identifier ("channel:id")
        #[arg(short, long, default_value = "cli:default")]
        session: String,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Run the bot: tool servers, agent runner and chat channels
    Gateway {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Show configuration and credential status
    Status,

    /// Start the tool servers and list the available tools
    Tools {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is the normal case.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = load_config(None);

    match cli.command {
        Commands::Agent { message, session, logs } => {
            init_logging(&config, logs, "warn");
            run_agent(config, message, session).await
        }
        Commands::Gateway { logs } => {
            init_logging(&config, logs, "info");
            gateway::run(config).await
        }
        Commands::Status => status::run(&config),
        Commands::Tools { logs } => {
            init_logging(&config, logs, "warn");
            tools_cmd::run(&config).await
        }
    }
}

async fn run_agent(config: Config, message: Option<String>, session: String) -> Result<()> {
    let model = helpers::build_model(&config)?;
    let (servers, report) = helpers::start_tool_servers(&config).await;
    info!(servers = report.servers_started, tools = report.tool_count, "tool servers ready");

    let sessions = helpers::open_sessions()?;
    let memory = helpers::open_memory(&config)?;
    let registry = helpers::build_registry(&config, servers.clone(), &sessions, None);
    let conversation = helpers::build_conversation(&config, model, registry, &sessions, memory.clone());

    let bus = Arc::new(MessageBus::new(DEFAULT_BUS_CAPACITY));
    let mut runner =
        AgentRunner::new(bus, sessions, Arc::new(conversation)).with_max_history(config.ai.max_history_messages);
    if let Some(memory) = memory {
        runner = runner.with_memory(memory);
    }

    let result = match message {
        Some(text) => runner
            .process(&helpers::session_message(&session, &text))
            .await
            .context("agent processing failed")
            .map(|outcome| helpers::print_response(&outcome.final_text)),
        None => repl::run(&runner, &session).await,
    };

    servers.shutdown_all().await;
    result
}

/// `RUST_LOG` wins; then `--logs`; then the config's `logLevel`; then `default`.
fn init_logging(config: &Config, verbose: bool, default: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = if verbose {
            "clawbot=debug,info"
        } else {
            config.log_level.as_deref().unwrap_or(default)
        };
        EnvFilter::new(directive)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
