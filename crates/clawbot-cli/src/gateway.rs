//! Gateway command: tool servers, agent runner and chat channels in one process.
//!
//! Startup:
//! 1. Model client (fails fast without an API key)
//! 2. Tool servers, each started independently
//! 3. Sessions, memory, message bus
//! 4. Channels, whose actions join the tool registry
//! 5. Runner + channel manager until Ctrl+C, then ordered shutdown

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use clawbot_agent::AgentRunner;
use clawbot_channels::ChannelManager;
use clawbot_core::bus::{MessageBus, DEFAULT_BUS_CAPACITY};
use clawbot_core::config::Config;

use crate::helpers;

pub async fn run(config: Config) -> Result<()> {
    helpers::print_banner();
    println!("  Mode: Gateway");
    println!();

    let model = helpers::build_model(&config)?;
    let (servers, report) = helpers::start_tool_servers(&config).await;
    println!(
        "  Tool servers: {} started, {} tools",
        report.servers_started, report.tool_count
    );

    let sessions = helpers::open_sessions()?;
    let memory = helpers::open_memory(&config)?;
    let bus = Arc::new(MessageBus::new(DEFAULT_BUS_CAPACITY));

    #[allow(unused_mut)]
    let mut channels = ChannelManager::new(bus.clone());
    #[allow(unused_mut)]
    let mut registry = None;

    #[cfg(feature = "telegram")]
    {
        if config.telegram.is_configured() {
            use clawbot_channels::telegram::TelegramChannel;
            use clawbot_channels::BotStatus;

            let telegram = TelegramChannel::new(
                &config.telegram.token,
                bus.clone(),
                sessions.clone(),
                config.telegram.allowed_users.clone(),
            );
            let actions: Arc<dyn clawbot_agent::ChannelActions> = Arc::new(telegram.actions());
            let tools = helpers::build_registry(&config, servers.clone(), &sessions, Some(actions));
            let telegram = telegram.with_status(BotStatus {
                model: config.ai.model.clone(),
                memory_enabled: memory.is_some(),
                rag_enabled: config.rag.enabled,
                tool_count: tools.aggregate().len(),
            });
            channels.register(Arc::new(telegram));
            registry = Some(tools);
        }
    }

    if channels.is_empty() {
        warn!("no chat channel configured; set telegram.token and build with --features telegram");
        println!("  ⚠  No channels registered. Configure telegram.token in ~/.clawbot/config.json");
        println!("     and build with `--features telegram`.");
    }

    let registry = registry.unwrap_or_else(|| helpers::build_registry(&config, servers.clone(), &sessions, None));
    let conversation = helpers::build_conversation(&config, model, registry, &sessions, memory.clone());
    let mut runner = AgentRunner::new(bus.clone(), sessions, Arc::new(conversation))
        .with_max_history(config.ai.max_history_messages);
    if let Some(memory) = memory {
        runner = runner.with_memory(memory);
    }
    let runner = Arc::new(runner);

    info!(
        model = %config.ai.model,
        channels = ?channels.channel_names(),
        tools = runner.conversation().list_tools().len(),
        "gateway starting"
    );
    println!("  Model:    {}", config.ai.model);
    println!("  Channels: {} registered", channels.len());
    println!();
    println!("  Ctrl+C to stop");
    println!();

    let channel_tasks = channels.start_all();
    let runner_task = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.run().await })
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C, shutting down");
    }
    println!();
    println!("  Shutting down...");
    info!("shutdown requested");

    channels.stop_all().await;
    runner_task.abort();
    for task in channel_tasks {
        task.abort();
    }
    servers.shutdown_all().await;

    println!("  Gateway stopped. Goodbye!");
    Ok(())
}
