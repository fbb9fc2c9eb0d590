//! Error taxonomy for tool-server communication.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to start tool server '{server}': {source}")]
    Spawn {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("handshake with tool server '{server}' failed: {source}")]
    Handshake {
        server: String,
        #[source]
        source: Box<McpError>,
    },

    #[error("tool server '{server}' did not answer '{method}' within {}s", .after.as_secs())]
    Timeout {
        server: String,
        method: String,
        after: Duration,
    },

    #[error("protocol error from tool server '{server}': {message}")]
    Protocol { server: String, message: String },

    #[error("tool server '{server}' returned error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },

    #[error("failed to write to tool server '{server}': {source}")]
    Transport {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to tool server '{server}' is closed")]
    Closed { server: String },
}

impl McpError {
    pub fn server(&self) -> &str {
        match self {
            McpError::Spawn { server, .. }
            | McpError::Handshake { server, .. }
            | McpError::Timeout { server, .. }
            | McpError::Protocol { server, .. }
            | McpError::Rpc { server, .. }
            | McpError::Transport { server, .. }
            | McpError::Closed { server } => server,
        }
    }

    /// True for failures reported by the server or the wire format,
    /// as opposed to timeouts and local I/O.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            McpError::Protocol { .. } | McpError::Rpc { .. } | McpError::Closed { .. }
        )
    }
}
