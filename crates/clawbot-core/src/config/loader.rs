//! Config loader — reads `~/.clawbot/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.clawbot/config.json`
//! 3. Environment variables `CLAWBOT_<SECTION>__<FIELD>` (override JSON)
//! 4. Conventional variables (`ANTHROPIC_API_KEY`, `TELEGRAM_BOT_TOKEN`) fill
//!    credentials that are still empty

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from `path` (or the default path) plus the process environment.
///
/// Falls back to `Config::default()` if the file is missing or unreadable.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    apply_env_overrides(load_config_from_path(&config_path))
}

fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }
    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to parse config {}: {}", path.display(), e);
            Config::default()
        }
    }
}

/// Save configuration as pretty camelCase JSON.
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;
    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: Config) -> Config {
    apply_overrides_from(config, |key| std::env::var(key).ok())
}

/// Apply overrides read through `lookup`.
///
/// Supported keys:
/// - `CLAWBOT_AI__MODEL`, `CLAWBOT_AI__MAX_TOKENS`, `CLAWBOT_AI__TEMPERATURE`,
///   `CLAWBOT_AI__MAX_TOOL_ROUNDS`, `CLAWBOT_AI__MAX_HISTORY_MESSAGES`
/// - `CLAWBOT_PROVIDERS__ANTHROPIC__API_KEY`, `CLAWBOT_PROVIDERS__ANTHROPIC__API_BASE`
/// - `CLAWBOT_TELEGRAM__TOKEN`
/// - `CLAWBOT_MCP__CONFIG_FILE`, `CLAWBOT_MCP__REQUEST_TIMEOUT_SECS`
/// - `CLAWBOT_MEMORY__ENABLED`, `CLAWBOT_RAG__ENABLED`
/// - `CLAWBOT_LOG_LEVEL`
pub fn apply_overrides_from(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(val) = lookup("CLAWBOT_AI__MODEL") {
        config.ai.model = val;
    }
    if let Some(n) = parsed(&lookup, "CLAWBOT_AI__MAX_TOKENS") {
        config.ai.max_tokens = n;
    }
    if let Some(t) = parsed(&lookup, "CLAWBOT_AI__TEMPERATURE") {
        config.ai.temperature = t;
    }
    if let Some(n) = parsed(&lookup, "CLAWBOT_AI__MAX_TOOL_ROUNDS") {
        config.ai.max_tool_rounds = n;
    }
    if let Some(n) = parsed(&lookup, "CLAWBOT_AI__MAX_HISTORY_MESSAGES") {
        config.ai.max_history_messages = n;
    }

    if let Some(val) = lookup("CLAWBOT_PROVIDERS__ANTHROPIC__API_KEY") {
        config.providers.anthropic.api_key = val;
    }
    if let Some(val) = lookup("CLAWBOT_PROVIDERS__ANTHROPIC__API_BASE") {
        config.providers.anthropic.api_base = Some(val);
    }
    if let Some(val) = lookup("CLAWBOT_TELEGRAM__TOKEN") {
        config.telegram.token = val;
    }

    if let Some(val) = lookup("CLAWBOT_MCP__CONFIG_FILE") {
        config.mcp.config_file = val;
    }
    if let Some(n) = parsed(&lookup, "CLAWBOT_MCP__REQUEST_TIMEOUT_SECS") {
        config.mcp.request_timeout_secs = n;
    }

    if let Some(val) = lookup("CLAWBOT_MEMORY__ENABLED") {
        config.memory.enabled = is_truthy(&val);
    }
    if let Some(val) = lookup("CLAWBOT_RAG__ENABLED") {
        config.rag.enabled = is_truthy(&val);
    }
    if let Some(val) = lookup("CLAWBOT_LOG_LEVEL") {
        config.log_level = Some(val);
    }

    if !config.providers.anthropic.is_configured() {
        if let Some(key) = lookup("ANTHROPIC_API_KEY").filter(|k| !k.is_empty()) {
            config.providers.anthropic.api_key = key;
        }
    }
    if !config.telegram.is_configured() {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.is_empty()) {
            config.telegram.token = token;
        }
    }

    config
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {key}={raw}: not a valid value");
            None
        }
    }
}

fn is_truthy(val: &str) -> bool {
    matches!(val.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
