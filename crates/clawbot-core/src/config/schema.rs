//! Configuration schema — typed settings for the model, channels, and tool servers.
//!
//! Hierarchy: `Config` → `AiConfig`, `ProvidersConfig`, `TelegramConfig`,
//! `McpConfig`, `MemoryConfig`, `RagConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.clawbot/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub ai: AiConfig,
    pub providers: ProvidersConfig,
    pub telegram: TelegramConfig,
    pub mcp: McpConfig,
    pub memory: MemoryConfig,
    pub rag: RagConfig,
    /// Log filter used when `RUST_LOG` is not set (e.g. `"info"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

// ─────────────────────────────────────────────
// Model
// ─────────────────────────────────────────────

/// Conversation loop and model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiConfig {
    /// Model identifier sent to the provider.
    pub model: String,
    /// Maximum tokens to generate per model call.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 1.0).
    pub temperature: f64,
    /// Upper bound on model calls within one user turn.
    pub max_tool_rounds: u32,
    /// How many stored turns are replayed as history.
    pub max_history_messages: usize,
    /// Replaces the built-in persona prompt when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            max_tool_rounds: 10,
            max_history_messages: 20,
            system_prompt: None,
        }
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Credentials and endpoint for one model provider.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub api_key: String,
    /// Custom API base URL (overrides the provider default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl ProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub anthropic: ProviderConfig,
}

// ─────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────

/// Telegram bot settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelegramConfig {
    pub token: String,
    /// User ids or usernames allowed to talk to the bot. Empty allows everyone.
    pub allowed_users: Vec<String>,
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        !self.token.is_empty()
    }
}

// ─────────────────────────────────────────────
// Tool servers
// ─────────────────────────────────────────────

/// External tool-server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpConfig {
    /// File with `{"mcpServers": {...}}`; relative paths resolve against the working directory.
    pub config_file: String,
    /// Inline server table, used when the file is absent or empty.
    pub servers: BTreeMap<String, McpServerEntry>,
    /// Start the GitHub / Notion servers when their tokens are in the environment.
    pub token_presets: bool,
    /// Per-call response timeout.
    pub request_timeout_secs: u64,
    /// Time a server gets to exit before it is killed.
    pub shutdown_grace_secs: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            config_file: "mcp-config.json".to_string(),
            servers: BTreeMap::new(),
            token_presets: true,
            request_timeout_secs: 30,
            shutdown_grace_secs: 5,
        }
    }
}

/// How to launch one tool server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerEntry {
    #[serde(default = "default_server_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Values of the exact form `${NAME}` are read from the environment at load time.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_server_command() -> String {
    "npx".to_string()
}

// ─────────────────────────────────────────────
// Memory & retrieval
// ─────────────────────────────────────────────

/// Long-term memory collaborator settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryConfig {
    pub enabled: bool,
    /// Memories injected into the system prompt per turn.
    pub max_results: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_results: 5,
        }
    }
}

/// Chat-history retrieval settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RagConfig {
    pub enabled: bool,
    /// Hits scoring below this are dropped (0.0 – 1.0).
    pub min_score: f64,
    pub max_results: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_score: 0.3,
            max_results: 10,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
