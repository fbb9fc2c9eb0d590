//! Clawbot tool-server client.
//!
//! Talks newline-delimited JSON-RPC 2.0 to external tool servers over their
//! stdin/stdout:
//! - [`client::ProtocolClient`] correlates requests and responses by id
//! - [`supervisor::ExternalServer`] owns one process and its handshake
//! - [`servers::ToolServers`] is the startup-created set of live servers
//! - [`config`] resolves server entries and `${NAME}` placeholders
//! - [`format`] renders call results as text

pub mod client;
pub mod config;
pub mod error;
pub mod format;
pub mod protocol;
pub mod servers;
pub mod supervisor;

pub use client::ProtocolClient;
pub use config::{load_server_configs, ServerConfig};
pub use error::McpError;
pub use format::render_tool_result;
pub use servers::{StartupReport, ToolServers};
pub use supervisor::{ExternalServer, RemoteTool, ServerTimeouts};
