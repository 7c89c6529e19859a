//! One remote server: HTTP transport, initialize handshake, request ids

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

use super::protocol::{self, McpRequest, McpResponse, RemoteTool, ToolCallResult};
use super::{McpClientConfig, McpError, McpServerConfig};

/// Runtime state of one server
#[derive(Debug, Clone, Default)]
pub struct ServerState {
    pub initialized: bool,
    pub capabilities: Option<Value>,
    pub last_error: Option<String>,
}

/// Pending-request map: correlates outbound request ids to waiters.
/// Entries are inserted by the sender and removed by the response handler
/// or on transport error.
pub(crate) type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<McpResponse>>>>;

/// Handle for a single configured remote server
pub struct McpServer {
    id: String,
    config: McpServerConfig,
    client_config: McpClientConfig,
    http: reqwest::Client,
    next_id: Arc<AtomicI64>,
    pending: PendingMap,
    state: Mutex<ServerState>,
}

impl McpServer {
    /// Build a server handle; the reqwest client carries the configured
    /// timeouts and default headers.
    pub fn new(
        id: impl Into<String>,
        config: McpServerConfig,
        client_config: McpClientConfig,
        next_id: Arc<AtomicI64>,
    ) -> Result<Self, McpError> {
        let id = id.into();

        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::try_from(key.as_str())
                .map_err(|e| McpError::Config(format!("server '{}' header '{}': {}", id, key, e)))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|e| McpError::Config(format!("server '{}' header '{}': {}", id, key, e)))?;
            headers.insert(name, value);
        }

        let connect_timeout = Duration::from_millis(config.connect_timeout_ms.unwrap_or(client_config.connect_timeout_ms));
        let read_timeout = Duration::from_millis(config.read_timeout_ms.unwrap_or(client_config.read_timeout_ms));

        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            id,
            config,
            client_config,
            http,
            next_id,
            pending: Arc::new(Mutex::new(HashMap::new())),
            state: Mutex::new(ServerState::default()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    pub fn priority(&self) -> u32 {
        self.config.priority
    }

    pub fn config(&self) -> &McpServerConfig {
        &self.config
    }

    pub(crate) fn client_config(&self) -> &McpClientConfig {
        &self.client_config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn pending(&self) -> PendingMap {
        Arc::clone(&self.pending)
    }

    pub(crate) fn request_ids(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.next_id)
    }

    pub async fn state(&self) -> ServerState {
        self.state.lock().await.clone()
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.initialized
    }

    async fn record_error(&self, error: &McpError) {
        let mut state = self.state.lock().await;
        state.last_error = Some(error.to_string());
    }

    /// Send one JSON-RPC request over HTTP POST and await the correlated
    /// response.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = McpRequest::new(id, method, params);
        let url = format!("{}{}", self.url(), protocol::endpoint_path(method));

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        debug!(server = %self.id, %method, request_id = id, "sending request");

        let outcome = self.post_and_correlate(&url, &request, id).await;
        if let Err(e) = outcome {
            // Remove the orphaned entry so the map does not leak waiters
            self.pending.lock().await.remove(&id);
            self.record_error(&e).await;
            return Err(e);
        }

        let response = rx
            .await
            .map_err(|_| McpError::Transport("response channel closed".to_string()))?;

        if !response.is_well_formed() {
            let e = McpError::Malformed("response carries both result and error".to_string());
            self.record_error(&e).await;
            return Err(e);
        }

        if let Some(error) = response.error {
            let e = McpError::Protocol {
                code: error.code,
                message: error.message,
            };
            self.record_error(&e).await;
            return Err(e);
        }

        // well-formed and not an error, so result is present
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// POST the request and route the parsed response through the pending map
    async fn post_and_correlate(&self, url: &str, request: &McpRequest, id: i64) -> Result<(), McpError> {
        let http_response = self
            .http
            .post(url)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = http_response.status();
        if !status.is_success() {
            return Err(McpError::Transport(format!("HTTP {} from {}", status.as_u16(), url)));
        }

        let response: McpResponse = http_response
            .json()
            .await
            .map_err(|e| McpError::Malformed(format!("invalid JSON-RPC response: {}", e)))?;

        let echoed = response.id.as_ref().and_then(Value::as_i64);
        if echoed != Some(id) {
            warn!(server = %self.id, expected = id, got = ?echoed, "response id mismatch");
        }

        match self.pending.lock().await.remove(&id) {
            Some(waiter) => {
                let _ = waiter.send(response);
                Ok(())
            }
            None => Err(McpError::Transport(format!("no waiter registered for request {}", id))),
        }
    }

    /// Perform the initialize handshake and store the advertised capabilities
    pub async fn initialize(&self) -> Result<Value, McpError> {
        let params = json!({
            "protocolVersion": protocol::PROTOCOL_VERSION,
            "capabilities": { "tools": {}, "resources": {} },
            "clientInfo": {
                "name": self.client_config.name,
                "version": self.client_config.version,
            },
        });

        match self.request("initialize", Some(params)).await {
            Ok(result) => {
                let mut state = self.state.lock().await;
                state.initialized = true;
                state.capabilities = result.get("capabilities").cloned();
                state.last_error = None;
                debug!(server = %self.id, "initialized");
                Ok(result)
            }
            Err(e) => {
                let mut state = self.state.lock().await;
                state.initialized = false;
                state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Mark the server disconnected
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        state.initialized = false;
        state.capabilities = None;
        self.pending.lock().await.clear();
        debug!(server = %self.id, "disconnected");
    }

    /// List tools advertised by this server, tagged with its id
    pub async fn list_tools(&self) -> Result<Vec<RemoteTool>, McpError> {
        let result = self.request("tools/list", None).await?;
        let tools = result.get("tools").cloned().unwrap_or(Value::Array(Vec::new()));
        let mut tools: Vec<RemoteTool> = serde_json::from_value(tools)
            .map_err(|e| McpError::Malformed(format!("invalid tools/list payload: {}", e)))?;
        for tool in &mut tools {
            tool.server_id = Some(self.id.clone());
        }
        Ok(tools)
    }

    /// Invoke a tool on this server
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        let result = self
            .request("tools/call", Some(json!({ "name": name, "arguments": arguments })))
            .await?;
        serde_json::from_value(result).map_err(|e| McpError::Malformed(format!("invalid tools/call payload: {}", e)))
    }

    /// Liveness probe
    pub async fn ping(&self) -> bool {
        self.request("ping", None).await.is_ok()
    }
}
