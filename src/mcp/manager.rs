//! The aggregate tool manager: N servers, union listing, failover calls

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicI64;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::client::McpServer;
use super::protocol::{RemoteTool, ToolCallResult};
use super::sse::SseConnection;
use super::ws::WsConnection;
use super::{McpConfig, McpError};

/// Multi-endpoint JSON-RPC client with pooling, health checks, and failover
pub struct McpManager {
    config: McpConfig,
    servers: Vec<Arc<McpServer>>,
}

impl McpManager {
    /// Build server handles from configuration. Disabled servers are skipped.
    pub fn new(config: McpConfig) -> Result<Self, McpError> {
        config.validate()?;

        let next_id = Arc::new(AtomicI64::new(1));
        let mut servers = Vec::new();

        for (id, server_config) in config.servers_by_priority() {
            let server = McpServer::new(id, server_config.clone(), config.client.clone(), Arc::clone(&next_id))?;
            servers.push(Arc::new(server));
        }

        Ok(Self { config, servers })
    }

    /// An empty manager (no servers configured)
    pub fn disabled() -> Self {
        Self {
            config: McpConfig::default(),
            servers: Vec::new(),
        }
    }

    pub fn config(&self) -> &McpConfig {
        &self.config
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Look up a server handle by id
    pub fn server(&self, id: &str) -> Result<&Arc<McpServer>, McpError> {
        self.servers
            .iter()
            .find(|s| s.id() == id)
            .ok_or_else(|| McpError::ServerNotFound(id.to_string()))
    }

    /// Initialize every enabled server. Individual failures mark the server
    /// unavailable but do not fail the overall call.
    pub async fn initialize(&self) -> usize {
        let mut initialized = 0;
        for server in &self.servers {
            match server.initialize().await {
                Ok(_) => {
                    info!(server = %server.id(), "remote server initialized");
                    initialized += 1;
                }
                Err(e) => {
                    warn!(server = %server.id(), error = %e, "remote server unavailable");
                }
            }
        }
        initialized
    }

    /// Union of tools across all initialized servers, tagged with server ids
    pub async fn list_all_tools(&self) -> Vec<RemoteTool> {
        let mut all = Vec::new();
        for server in &self.servers {
            if !server.is_initialized().await {
                continue;
            }
            match server.list_tools().await {
                Ok(tools) => all.extend(tools),
                Err(e) => warn!(server = %server.id(), error = %e, "tools/list failed"),
            }
        }
        all
    }

    /// Call a tool on the highest-priority server advertising it, failing
    /// over to the next candidate on transport errors.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        // Servers are already priority-ordered from construction
        let mut candidates = Vec::new();
        for server in &self.servers {
            if !server.is_initialized().await {
                continue;
            }
            match server.list_tools().await {
                Ok(tools) if tools.iter().any(|t| t.name == name) => candidates.push(Arc::clone(server)),
                Ok(_) => {}
                Err(e) => warn!(server = %server.id(), error = %e, "tools/list failed during selection"),
            }
        }

        if candidates.is_empty() {
            return Err(McpError::ToolNotFound(name.to_string()));
        }

        let mut last_error = String::new();
        for server in candidates {
            debug!(server = %server.id(), tool = name, "calling tool");
            match server.call_tool(name, arguments.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transport() => {
                    warn!(server = %server.id(), error = %e, "tool call failed, trying next server");
                    last_error = e.to_string();
                }
                Err(e) => return Err(e),
            }
        }

        Err(McpError::AllServersFailed {
            tool: name.to_string(),
            last_error,
        })
    }

    /// True iff at least one server answers a ping
    pub async fn ping_all(&self) -> bool {
        for server in &self.servers {
            if server.ping().await {
                return true;
            }
        }
        false
    }

    /// Connection status per server id
    pub async fn server_status(&self) -> HashMap<String, bool> {
        let mut status = HashMap::new();
        for server in &self.servers {
            status.insert(server.id().to_string(), server.is_initialized().await);
        }
        status
    }

    /// Re-run the initialize handshake for one server
    pub async fn reconnect(&self, id: &str) -> Result<(), McpError> {
        let server = self.server(id)?;
        server.disconnect().await;
        server.initialize().await.map(|_| ())
    }

    /// Drop one server's session state
    pub async fn disconnect(&self, id: &str) -> Result<(), McpError> {
        let server = self.server(id)?;
        server.disconnect().await;
        Ok(())
    }

    /// Drop every server's session state
    pub async fn disconnect_all(&self) {
        for server in &self.servers {
            server.disconnect().await;
        }
    }

    /// Open an SSE stream to one server
    pub async fn open_sse(&self, id: &str) -> Result<SseConnection, McpError> {
        let server = self.server(id)?;
        SseConnection::open(server).await
    }

    /// Open a WebSocket connection to one server
    pub async fn open_ws(&self, id: &str) -> Result<WsConnection, McpError> {
        let server = self.server(id)?;
        WsConnection::open(server).await
    }
}
