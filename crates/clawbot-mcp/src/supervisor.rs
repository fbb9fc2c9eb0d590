//! Server supervisor — spawn, handshake, and shut down one tool-server process.

use std::process::Stdio;
use std::time::Duration;

use clawbot_core::config::McpConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::{ProtocolClient, DEFAULT_REQUEST_TIMEOUT};
use crate::config::ServerConfig;
use crate::error::McpError;
use crate::protocol::{
    METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, PROTOCOL_VERSION,
};

pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const CLIENT_NAME: &str = "clawbot";

/// Timing knobs shared by every server.
#[derive(Clone, Copy, Debug)]
pub struct ServerTimeouts {
    pub request: Duration,
    pub shutdown_grace: Duration,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            request: DEFAULT_REQUEST_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl ServerTimeouts {
    pub fn from_config(mcp: &McpConfig) -> Self {
        Self {
            request: Duration::from_secs(mcp.request_timeout_secs.max(1)),
            shutdown_grace: Duration::from_secs(mcp.shutdown_grace_secs),
        }
    }
}

/// A tool as listed by its server, before namespacing.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RemoteTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Option<Value>,
}

impl RemoteTool {
    pub fn description_for(&self, server: &str) -> String {
        match self.description.as_deref() {
            Some(d) if !d.trim().is_empty() => d.to_string(),
            _ => format!("{server} tool: {}", self.name),
        }
    }

    pub fn schema(&self) -> Value {
        match &self.input_schema {
            Some(schema @ Value::Object(_)) => schema.clone(),
            _ => clawbot_core::types::empty_input_schema(),
        }
    }
}

#[derive(Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<RemoteTool>,
}

/// One running tool server: its process, connection, and discovered tools.
pub struct ExternalServer {
    name: String,
    child: Mutex<Option<Child>>,
    client: ProtocolClient,
    tools: Vec<RemoteTool>,
    grace: Duration,
}

impl ExternalServer {
    /// Spawn the process and handshake. On handshake failure the process is
    /// shut down before the error is returned.
    pub async fn start(config: &ServerConfig, timeouts: ServerTimeouts) -> Result<Self, McpError> {
        let mut server = Self::spawn(config, timeouts)?;
        if let Err(e) = server.handshake().await {
            server.shutdown().await;
            return Err(McpError::Handshake {
                server: config.name.clone(),
                source: Box::new(e),
            });
        }
        Ok(server)
    }

    /// Start the process with the configured env overlaid on ours and its pipes captured.
    pub fn spawn(config: &ServerConfig, timeouts: ServerTimeouts) -> Result<Self, McpError> {
        let spawn_error = |source| McpError::Spawn {
            server: config.name.clone(),
            source,
        };

        debug!(server = %config.name, command = %config.command, args = ?config.args, "spawning tool server");
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(spawn_error(std::io::Error::other("stdio pipes were not captured")));
        };
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(config.name.clone(), stderr));
        }

        let client = ProtocolClient::start(&config.name, stdout, stdin, timeouts.request);
        Ok(Self {
            name: config.name.clone(),
            child: Mutex::new(Some(child)),
            client,
            tools: Vec::new(),
            grace: timeouts.shutdown_grace,
        })
    }

    /// Attach to an already-connected stream pair with no owned process.
    pub fn attach<R, W>(name: impl Into<String>, reader: R, writer: W, timeouts: ServerTimeouts) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let name = name.into();
        let client = ProtocolClient::start(&name, reader, writer, timeouts.request);
        Self {
            name,
            child: Mutex::new(None),
            client,
            tools: Vec::new(),
            grace: timeouts.shutdown_grace,
        }
    }

    /// initialize → notifications/initialized → tools/list.
    pub async fn handshake(&mut self) -> Result<(), McpError> {
        let init = self
            .client
            .call(
                METHOD_INITIALIZE,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": CLIENT_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )
            .await?;
        if let Some(info) = init.get("serverInfo") {
            debug!(server = %self.name, server_info = %info, "initialized");
        }

        self.client.notify(METHOD_INITIALIZED, json!({})).await;

        let listed = self.client.call(METHOD_TOOLS_LIST, json!({})).await?;
        let parsed: ToolsListResult =
            serde_json::from_value(listed).map_err(|e| McpError::Protocol {
                server: self.name.clone(),
                message: format!("invalid tools/list result: {e}"),
            })?;
        self.tools = parsed.tools;

        info!(server = %self.name, tools = self.tools.len(), "tool server ready");
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &[RemoteTool] {
        &self.tools
    }

    pub fn client(&self) -> &ProtocolClient {
        &self.client
    }

    /// Live means the connection is still readable.
    pub fn is_alive(&self) -> bool {
        !self.client.is_closed()
    }

    /// `tools/call` with the server's own (un-namespaced) tool name.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, McpError> {
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        self.client
            .call(METHOD_TOOLS_CALL, json!({ "name": tool, "arguments": arguments }))
            .await
    }

    /// Close input, ask the process to terminate, and kill it after the
    /// grace period. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.client.close_input().await;

        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(server = %self.name, %status, "tool server already exited");
                return;
            }
            Ok(None) => request_termination(&self.name, &child),
            Err(e) => warn!(server = %self.name, "could not poll tool server: {e}"),
        }

        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(Ok(status)) => info!(server = %self.name, %status, "tool server stopped"),
            Ok(Err(e)) => warn!(server = %self.name, "error waiting for tool server: {e}"),
            Err(_) => {
                warn!(server = %self.name, grace_secs = self.grace.as_secs(), "tool server ignored termination, killing");
                if let Err(e) = child.kill().await {
                    warn!(server = %self.name, "failed to kill tool server: {e}");
                }
            }
        }
    }
}

#[cfg(unix)]
fn request_termination(server: &str, child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!(server, "SIGTERM failed: {e}");
    }
}

#[cfg(not(unix))]
fn request_termination(_server: &str, _child: &Child) {
    // Closing stdin is the only graceful request available here.
}

async fn drain_stderr<R>(server: String, stderr: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            debug!(server = %server, "stderr: {line}");
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
