//! Server-Sent Events transport
//!
//! Each connection is an event loop task consuming the stream and forwarding
//! data payloads through a channel; dropping or stopping the connection
//! closes the underlying transport.

use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::client::McpServer;
use super::McpError;

/// One event received from the stream
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub id: String,
    pub event: String,
    pub data: String,
}

/// A live SSE subscription to one server
pub struct SseConnection {
    server_id: String,
    events: mpsc::Receiver<SseEvent>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SseConnection {
    /// Open the stream at `/mcp/sse?clientId=<name>`, falling back to
    /// `/mcp/stream` once if the primary path 404s.
    pub async fn open(server: &McpServer) -> Result<Self, McpError> {
        let client_id = server.client_config().name.clone();

        let mut source = match Self::connect(server, "/mcp/sse", &client_id).await {
            Ok(source) => source,
            Err(McpError::Transport(msg)) if msg.contains("404") => {
                debug!(server = %server.id(), "primary SSE path not found, trying /mcp/stream");
                Self::connect(server, "/mcp/stream", &client_id).await?
            }
            Err(e) => return Err(e),
        };

        let (event_tx, events) = mpsc::channel(64);
        let (stop, mut stopped) = watch::channel(false);
        let server_id = server.id().to_string();
        let task_server_id = server_id.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped.changed() => {
                        source.close();
                        break;
                    }
                    next = source.next() => {
                        match next {
                            Some(Ok(Event::Open)) => {
                                debug!(server = %task_server_id, "SSE stream open");
                            }
                            Some(Ok(Event::Message(message))) => {
                                let event = SseEvent {
                                    id: message.id,
                                    event: message.event,
                                    data: message.data,
                                };
                                if event_tx.send(event).await.is_err() {
                                    source.close();
                                    break;
                                }
                            }
                            Some(Err(e)) => {
                                warn!(server = %task_server_id, error = %e, "SSE stream error");
                                source.close();
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        Ok(Self {
            server_id,
            events,
            stop,
            task,
        })
    }

    async fn connect(server: &McpServer, path: &str, client_id: &str) -> Result<EventSource, McpError> {
        let url = format!("{}{}?clientId={}", server.url(), path, client_id);
        let builder = server.http().get(&url).header("Accept", "text/event-stream");

        let mut source = EventSource::new(builder).map_err(|e| McpError::Transport(e.to_string()))?;

        // Wait for the stream to open (or fail) before handing it out
        match source.next().await {
            Some(Ok(Event::Open)) => Ok(source),
            Some(Ok(Event::Message(_))) => Ok(source),
            Some(Err(e)) => Err(McpError::Transport(e.to_string())),
            None => Err(McpError::Transport(format!("SSE stream at {} closed immediately", url))),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Receive the next event; None once the stream is closed
    pub async fn next_event(&mut self) -> Option<SseEvent> {
        self.events.recv().await
    }

    /// Close the transport and stop the consumer task
    pub async fn close(mut self) {
        let _ = self.stop.send(true);
        let _ = (&mut self.task).await;
    }
}

impl Drop for SseConnection {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
        self.task.abort();
    }
}
