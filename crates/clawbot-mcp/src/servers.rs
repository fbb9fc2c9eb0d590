//! The set of running tool servers, created once at startup and passed
//! explicitly to whoever needs it.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::McpError;
use crate::supervisor::{ExternalServer, ServerTimeouts};

/// Outcome of [`ToolServers::initialize_all`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StartupReport {
    pub servers_started: usize,
    pub tool_count: usize,
    /// `(server, reason)` for every server that did not come up.
    pub failures: Vec<(String, String)>,
}

#[derive(Default)]
pub struct ToolServers {
    servers: BTreeMap<String, ExternalServer>,
}

impl ToolServers {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start every configured server independently. A server that fails to
    /// spawn or handshake is logged and skipped; zero servers is fine.
    pub async fn initialize_all(configs: &[ServerConfig], timeouts: ServerTimeouts) -> (Self, StartupReport) {
        let mut servers = BTreeMap::new();
        let mut report = StartupReport::default();

        for config in configs {
            if servers.contains_key(&config.name) {
                warn!(server = %config.name, "duplicate tool server name, skipping");
                report
                    .failures
                    .push((config.name.clone(), "duplicate server name".to_string()));
                continue;
            }
            match ExternalServer::start(config, timeouts).await {
                Ok(server) => {
                    report.servers_started += 1;
                    report.tool_count += server.tools().len();
                    servers.insert(config.name.clone(), server);
                }
                Err(e) => {
                    error!(server = %config.name, "tool server unavailable: {e}");
                    report.failures.push((config.name.clone(), e.to_string()));
                }
            }
        }

        info!(
            servers = report.servers_started,
            tools = report.tool_count,
            failed = report.failures.len(),
            "tool servers initialized"
        );
        (Self { servers }, report)
    }

    /// Build from servers that are already handshaken.
    pub fn from_servers(list: impl IntoIterator<Item = ExternalServer>) -> Self {
        let mut servers = BTreeMap::new();
        for server in list {
            let name = server.name().to_string();
            if servers.contains_key(&name) {
                warn!(server = %name, "duplicate tool server name, skipping");
                continue;
            }
            servers.insert(name, server);
        }
        Self { servers }
    }

    pub fn get(&self, name: &str) -> Option<&ExternalServer> {
        self.servers.get(name)
    }

    /// Servers whose connection is still open, in name order.
    pub fn live(&self) -> impl Iterator<Item = &ExternalServer> {
        self.servers.values().filter(|s| s.is_alive())
    }

    pub fn live_names(&self) -> Vec<&str> {
        self.live().map(ExternalServer::name).collect()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Call `tool` on `server`. An unknown or dead server is reported as closed.
    pub async fn call_tool(&self, server: &str, tool: &str, arguments: Value) -> Result<Value, McpError> {
        match self.servers.get(server) {
            Some(s) if s.is_alive() => s.call_tool(tool, arguments).await,
            _ => Err(McpError::Closed {
                server: server.to_string(),
            }),
        }
    }

    /// Shut every server down. Idempotent.
    pub async fn shutdown_all(&self) {
        for server in self.servers.values() {
            server.shutdown().await;
        }
        if !self.servers.is_empty() {
            info!(count = self.servers.len(), "tool servers shut down");
        }
    }
}
