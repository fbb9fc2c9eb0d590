//! Tool-server configuration — source selection and `${NAME}` placeholder resolution.
//!
//! Servers come from the first non-empty source: the `mcpServers` file,
//! the inline `mcp.servers` table, then the GitHub / Notion token presets.
//! Placeholder resolution is pure: callers pass the variable lookup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clawbot_core::config::{McpConfig, McpServerEntry};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A server entry with its environment already resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Variables overlaid on the inherited environment at spawn time.
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct ServersFile {
    #[serde(rename = "mcpServers", default)]
    servers: BTreeMap<String, McpServerEntry>,
}

/// The variable name inside a whole-value `${NAME}` placeholder.
fn placeholder_name(value: &str) -> Option<&str> {
    let name = value.strip_prefix("${")?.strip_suffix('}')?;
    (!name.is_empty() && !name.contains('}')).then_some(name)
}

/// Resolve `${NAME}` values through `lookup`.
///
/// Unset or empty variables drop their key with a warning. Any other value
/// is kept verbatim.
pub fn resolve_placeholders(
    server: &str,
    env: &BTreeMap<String, String>,
    lookup: &impl Fn(&str) -> Option<String>,
) -> BTreeMap<String, String> {
    let mut resolved = BTreeMap::new();
    for (key, value) in env {
        match placeholder_name(value) {
            Some(var) => match lookup(var).filter(|v| !v.is_empty()) {
                Some(actual) => {
                    resolved.insert(key.clone(), actual);
                }
                None => {
                    warn!(server, key = %key, var, "environment variable not set, dropping");
                }
            },
            None => {
                resolved.insert(key.clone(), value.clone());
            }
        }
    }
    resolved
}

pub fn resolve_entry(
    name: &str,
    entry: &McpServerEntry,
    lookup: &impl Fn(&str) -> Option<String>,
) -> ServerConfig {
    ServerConfig {
        name: name.to_string(),
        command: entry.command.clone(),
        args: entry.args.clone(),
        env: resolve_placeholders(name, &entry.env, lookup),
    }
}

/// Read a `{"mcpServers": {...}}` file.
pub fn read_servers_file(path: &Path) -> Result<BTreeMap<String, McpServerEntry>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: ServersFile = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.servers)
}

/// GitHub and Notion servers for whichever tokens are present.
pub fn token_presets(lookup: &impl Fn(&str) -> Option<String>) -> BTreeMap<String, McpServerEntry> {
    let has = |var: &str| lookup(var).is_some_and(|v| !v.is_empty());
    let mut presets = BTreeMap::new();

    if has("GITHUB_TOKEN") {
        presets.insert(
            "github".to_string(),
            McpServerEntry {
                command: "npx".to_string(),
                args: vec!["-y".into(), "@modelcontextprotocol/server-github".into()],
                env: BTreeMap::from([(
                    "GITHUB_PERSONAL_ACCESS_TOKEN".to_string(),
                    "${GITHUB_TOKEN}".to_string(),
                )]),
            },
        );
    }
    if has("NOTION_TOKEN") {
        presets.insert(
            "notion".to_string(),
            McpServerEntry {
                command: "npx".to_string(),
                args: vec!["-y".into(), "@notionhq/notion-mcp-server".into()],
                env: BTreeMap::from([("NOTION_TOKEN".to_string(), "${NOTION_TOKEN}".to_string())]),
            },
        );
    }
    presets
}

/// Pick the server source and resolve every entry.
pub fn server_configs_from(
    mcp: &McpConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<ServerConfig> {
    let file_path = clawbot_core::utils::expand_home(&mcp.config_file);
    let from_file = if mcp.config_file.is_empty() || !file_path.exists() {
        BTreeMap::new()
    } else {
        match read_servers_file(&file_path) {
            Ok(servers) => servers,
            Err(e) => {
                warn!("ignoring tool-server file: {e}");
                BTreeMap::new()
            }
        }
    };

    let (source, entries) = if !from_file.is_empty() {
        ("file", from_file)
    } else if !mcp.servers.is_empty() {
        ("config", mcp.servers.clone())
    } else if mcp.token_presets {
        ("token presets", token_presets(&lookup))
    } else {
        ("none", BTreeMap::new())
    };

    if entries.is_empty() {
        debug!("no tool servers configured");
    } else {
        info!(source, count = entries.len(), "tool servers configured");
    }

    entries
        .iter()
        .map(|(name, entry)| resolve_entry(name, entry, &lookup))
        .collect()
}

/// Same as [`server_configs_from`], reading the process environment.
pub fn load_server_configs(mcp: &McpConfig) -> Vec<ServerConfig> {
    server_configs_from(mcp, |key| std::env::var(key).ok())
}
