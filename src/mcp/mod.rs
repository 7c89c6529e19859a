//! Remote tool manager
//!
//! A multi-endpoint JSON-RPC 2.0 client speaking HTTP POST, Server-Sent
//! Events, and WebSocket to N configured tool servers, with priority-ordered
//! failover, health checks, and explicit lifecycle control.
//!
//! - [`protocol`] - wire types and error-code constants
//! - [`config`] - the JSON configuration document
//! - [`client`] - one server: HTTP transport, handshake, pending-request map
//! - [`manager`] - the aggregate: union tool listing, failover calls
//! - [`sse`] / [`ws`] - the streaming transports

mod client;
mod config;
mod manager;
pub mod protocol;
mod sse;
mod ws;

pub use client::{McpServer, ServerState};
pub use config::{McpClientConfig, McpConfig, McpServerConfig};
pub use manager::McpManager;
pub use protocol::{McpErrorBody, McpRequest, McpResponse, RemoteTool, ToolCallResult, ToolContent};
pub use sse::{SseConnection, SseEvent};
pub use ws::WsConnection;

use thiserror::Error;

/// Errors surfaced by the remote tool manager
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error {code}: {message}")]
    Protocol { code: i64, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Unknown server: {0}")]
    ServerNotFound(String),

    #[error("Server {0} not initialized")]
    NotInitialized(String),

    #[error("No server advertises tool '{0}'")]
    ToolNotFound(String),

    #[error("All servers failed for tool '{tool}': {last_error}")]
    AllServersFailed { tool: String, last_error: String },

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<reqwest::Error> for McpError {
    fn from(e: reqwest::Error) -> Self {
        McpError::Transport(e.to_string())
    }
}

impl McpError {
    /// Transport-level failures trigger failover to the next server
    pub fn is_transport(&self) -> bool {
        matches!(self, McpError::Transport(_) | McpError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_trigger_failover() {
        assert!(McpError::Transport("connection refused".into()).is_transport());
        assert!(McpError::Timeout(std::time::Duration::from_secs(30)).is_transport());
        assert!(
            !McpError::Protocol {
                code: protocol::TOOL_NOT_FOUND,
                message: "nope".into()
            }
            .is_transport()
        );
        assert!(!McpError::Config("bad".into()).is_transport());
    }
}
