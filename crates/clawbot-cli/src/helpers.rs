//! Stack assembly shared by the commands, plus terminal output helpers.

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::{info, warn};

use clawbot_agent::context::PromptBuilder;
use clawbot_agent::tools::{action_tools, ChannelActions, SearchKnowledgeTool, SessionKnowledgeBase};
use clawbot_agent::{ConversationLoop, FileMemory, MemoryService, ToolDispatcher, ToolRegistry};
use clawbot_core::bus::InboundMessage;
use clawbot_core::config::Config;
use clawbot_core::session::SessionManager;
use clawbot_core::types::{ToolDescriptor, ToolOrigin};
use clawbot_mcp::{load_server_configs, ServerTimeouts, StartupReport, ToolServers};
use clawbot_providers::{AnthropicClient, ModelClient, ModelRequestConfig};

pub fn build_model(config: &Config) -> Result<Arc<dyn ModelClient>> {
    let request = ModelRequestConfig {
        max_tokens: config.ai.max_tokens,
        temperature: config.ai.temperature,
    };
    let client = AnthropicClient::new(&config.providers.anthropic, &config.ai.model, request)?;
    Ok(Arc::new(client))
}

/// Start every configured tool server. Failures only shrink the tool set.
pub async fn start_tool_servers(config: &Config) -> (Arc<ToolServers>, StartupReport) {
    let configs = load_server_configs(&config.mcp);
    let (servers, report) = ToolServers::initialize_all(&configs, ServerTimeouts::from_config(&config.mcp)).await;
    for (name, reason) in &report.failures {
        warn!(server = %name, "tool server skipped: {reason}");
    }
    (Arc::new(servers), report)
}

pub fn open_sessions() -> Result<Arc<SessionManager>> {
    Ok(Arc::new(
        SessionManager::new(None).context("failed to open session store")?,
    ))
}

pub fn open_memory(config: &Config) -> Result<Option<Arc<dyn MemoryService>>> {
    if !config.memory.enabled {
        return Ok(None);
    }
    let memory = FileMemory::new(None).context("failed to open memory store")?;
    info!(dir = %memory.dir().display(), "memory enabled");
    let memory: Arc<dyn MemoryService> = Arc::new(memory);
    Ok(Some(memory))
}

/// Tool namespace: the knowledge search when RAG is on, channel actions
/// when a platform adapter provides them, and every live server's tools.
pub fn build_registry(
    config: &Config,
    servers: Arc<ToolServers>,
    sessions: &Arc<SessionManager>,
    actions: Option<Arc<dyn ChannelActions>>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new(servers);
    if config.rag.enabled {
        let knowledge = Arc::new(SessionKnowledgeBase::new(sessions.clone()));
        registry.register_builtin(Arc::new(SearchKnowledgeTool::new(
            knowledge,
            config.rag.max_results,
            config.rag.min_score,
        )));
    }
    if let Some(actions) = actions {
        for tool in action_tools(actions) {
            registry.register_action(tool);
        }
    }
    registry
}

pub fn build_conversation(
    config: &Config,
    model: Arc<dyn ModelClient>,
    registry: ToolRegistry,
    sessions: &Arc<SessionManager>,
    memory: Option<Arc<dyn MemoryService>>,
) -> ConversationLoop {
    let mut prompt = match &config.ai.system_prompt {
        Some(persona) => PromptBuilder::new(persona.clone()),
        None => PromptBuilder::default(),
    };
    if let Some(memory) = memory {
        prompt = prompt.with_memory(memory, config.memory.max_results);
    }
    if config.rag.enabled {
        prompt = prompt.with_knowledge(
            Arc::new(SessionKnowledgeBase::new(sessions.clone())),
            config.rag.max_results,
            config.rag.min_score,
        );
    }
    ConversationLoop::new(model, ToolDispatcher::new(Arc::new(registry)), prompt)
        .with_max_rounds(config.ai.max_tool_rounds as usize)
}

/// `"channel:chat"` session ids; a bare id lives on the `cli` channel.
pub fn session_message(session: &str, text: &str) -> InboundMessage {
    let (channel, chat) = session.split_once(':').unwrap_or(("cli", session));
    InboundMessage::new(channel, "user", chat, text)
}

pub fn origin_label(origin: &ToolOrigin) -> String {
    match origin {
        ToolOrigin::BuiltIn => "built-in".to_string(),
        ToolOrigin::ChannelAction => "channel".to_string(),
        ToolOrigin::External { server } => format!("server:{server}"),
    }
}

pub fn print_tools(tools: &[ToolDescriptor]) {
    if tools.is_empty() {
        println!("  {}", "· no tools available".dimmed());
        return;
    }
    for tool in tools {
        println!(
            "  {} {} {}",
            format!("{:<36}", tool.name).bold(),
            format!("{:<18}", origin_label(&tool.origin)).dimmed(),
            clawbot_core::utils::truncate_string(&tool.description, 60)
        );
    }
}

pub fn print_response(response: &str) {
    println!();
    println!("{}", "🦀 Clawbot".cyan().bold());
    if response.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{response}");
    }
    println!();
}

pub fn print_banner() {
    println!();
    println!("{}  v{}", "🦀 Clawbot".cyan().bold(), env!("CARGO_PKG_VERSION").dimmed());
    println!("{}", "Type a message, or \"exit\" to quit.".dimmed());
    println!();
}

pub fn print_thinking() {
    eprint!("{}", "⠿ thinking...".dimmed());
}

pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}
