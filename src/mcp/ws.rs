//! WebSocket transport
//!
//! The URL is derived from the server's HTTP URL by scheme substitution
//! (`http` -> `ws`, `https` -> `wss`) plus `/mcp/ws`. Frames are UTF-8
//! JSON-RPC messages; responses are correlated through the server's
//! pending-request map, everything else is forwarded to the caller.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use super::McpError;
use super::client::{McpServer, PendingMap};
use super::protocol::{McpRequest, McpResponse};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Derive the WebSocket URL from an HTTP base URL
pub fn ws_url(http_url: &str) -> Result<String, McpError> {
    let base = http_url.trim_end_matches('/');
    let swapped = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        return Err(McpError::Config(format!("cannot derive ws url from '{}'", http_url)));
    };
    Ok(format!("{}/mcp/ws", swapped))
}

/// A live bidirectional connection to one server
pub struct WsConnection {
    server_id: String,
    sink: WsSink,
    /// Frames that are not correlated responses (notifications, server pushes)
    messages: mpsc::Receiver<String>,
    reader: JoinHandle<()>,
    pending: PendingMap,
    next_id: std::sync::Arc<std::sync::atomic::AtomicI64>,
}

impl WsConnection {
    /// Connect and start the reader task
    pub async fn open(server: &McpServer) -> Result<Self, McpError> {
        let url = ws_url(server.url())?;
        debug!(server = %server.id(), %url, "opening websocket");

        let (stream, _response) = connect_async(&url).await.map_err(|e| McpError::Transport(e.to_string()))?;
        let (sink, source) = stream.split();

        let pending = server.pending();
        let (message_tx, messages) = mpsc::channel(64);
        let reader = Self::spawn_reader(server.id().to_string(), source, server.pending(), message_tx);

        Ok(Self {
            server_id: server.id().to_string(),
            sink,
            messages,
            reader,
            pending,
            next_id: server.request_ids(),
        })
    }

    fn spawn_reader(
        server_id: String,
        mut source: WsSource,
        pending: PendingMap,
        message_tx: mpsc::Sender<String>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        let text = text.to_string();
                        // A frame that parses as a response with a known id
                        // resolves its waiter; everything else is forwarded.
                        if let Ok(response) = serde_json::from_str::<McpResponse>(&text) {
                            if let Some(id) = response.id.as_ref().and_then(Value::as_i64) {
                                if let Some(waiter) = pending.lock().await.remove(&id) {
                                    let _ = waiter.send(response);
                                    continue;
                                }
                            }
                        }
                        if message_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!(server = %server_id, "websocket closed by peer");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(server = %server_id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
        })
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Send a raw text frame
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), McpError> {
        self.sink
            .send(Message::Text(text.into().into()))
            .await
            .map_err(|e| McpError::Transport(e.to_string()))
    }

    /// Send a JSON-RPC request over the socket and await the correlated
    /// response from the reader task.
    pub async fn request(&mut self, method: &str, params: Option<Value>) -> Result<McpResponse, McpError> {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let request = McpRequest::new(id, method, params);
        let payload = serde_json::to_string(&request).map_err(|e| McpError::Malformed(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.send_text(payload).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        rx.await
            .map_err(|_| McpError::Transport("websocket closed before response".to_string()))
    }

    /// Receive the next uncorrelated frame; None once the socket is closed
    pub async fn next_message(&mut self) -> Option<String> {
        self.messages.recv().await
    }

    /// Close the socket and stop the reader
    pub async fn close(mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
        let _ = (&mut self.reader).await;
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_http() {
        assert_eq!(ws_url("http://localhost:8080").unwrap(), "ws://localhost:8080/mcp/ws");
    }

    #[test]
    fn test_ws_url_https() {
        assert_eq!(
            ws_url("https://tools.example.com/").unwrap(),
            "wss://tools.example.com/mcp/ws"
        );
    }

    #[test]
    fn test_ws_url_rejects_other_schemes() {
        assert!(ws_url("ftp://example.com").is_err());
    }
}
