//! Remote tool strategies: tool calls, resource access, server administration

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::domain::{Task, TaskKind, TaskResult};
use crate::mcp::McpManager;

use super::{ExecContext, ExecError, Strategy};

/// Invoke a remote tool through the manager, with failover
pub struct RemoteToolCallStrategy {
    mcp: Arc<McpManager>,
}

impl RemoteToolCallStrategy {
    pub fn new(mcp: Arc<McpManager>) -> Self {
        Self { mcp }
    }
}

#[async_trait]
impl Strategy for RemoteToolCallStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let tool_name = task
            .param_str("tool_name")
            .ok_or_else(|| ExecError::missing(TaskKind::RemoteToolCall, "tool_name"))?;
        let arguments = task.parameters.get("arguments").cloned().unwrap_or_else(|| json!({}));

        println!("agent calling remote tool: {}", tool_name);
        ctx.cancel.check()?;

        let call = self.mcp.call_tool(tool_name, arguments);
        let outcome = tokio::select! {
            outcome = call => outcome?,
            _ = ctx.cancel.cancelled() => return Err(ExecError::Cancelled),
        };

        let mut result = TaskResult {
            success: !outcome.is_error,
            output: outcome.text(),
            ..Default::default()
        };
        if outcome.is_error {
            result.error = Some(result.output.clone());
        }
        result.artifacts.insert("tool_name".to_string(), tool_name.into());
        Ok(result)
    }
}

/// Read a remote resource by URI
pub struct RemoteResourceAccessStrategy {
    mcp: Arc<McpManager>,
}

impl RemoteResourceAccessStrategy {
    pub fn new(mcp: Arc<McpManager>) -> Self {
        Self { mcp }
    }
}

#[async_trait]
impl Strategy for RemoteResourceAccessStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let server_id = task
            .param_str("server_id")
            .ok_or_else(|| ExecError::missing(TaskKind::RemoteResourceAccess, "server_id"))?;
        let uri = task
            .param_str("uri")
            .ok_or_else(|| ExecError::missing(TaskKind::RemoteResourceAccess, "uri"))?;

        println!("agent reading remote resource: {} from {}", uri, server_id);
        ctx.cancel.check()?;

        let server = self.mcp.server(server_id)?;
        if !server.is_initialized().await {
            return Err(crate::mcp::McpError::NotInitialized(server_id.to_string()).into());
        }
        let value = server.request("resources/read", Some(json!({ "uri": uri }))).await?;

        let text = extract_resource_text(&value).unwrap_or_else(|| value.to_string());
        Ok(TaskResult::success(text).with_artifact("uri", uri.into()))
    }
}

/// Pull the text of the first contents entry, when the payload has one
fn extract_resource_text(value: &Value) -> Option<String> {
    value
        .get("contents")
        .and_then(Value::as_array)
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// ping / connect / disconnect a specific server
pub struct RemoteServerAdminStrategy {
    mcp: Arc<McpManager>,
}

impl RemoteServerAdminStrategy {
    pub fn new(mcp: Arc<McpManager>) -> Self {
        Self { mcp }
    }
}

#[async_trait]
impl Strategy for RemoteServerAdminStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let action = task
            .param_str("action")
            .ok_or_else(|| ExecError::missing(TaskKind::RemoteServerAdmin, "action"))?;
        let server_id = task
            .param_str("server_id")
            .ok_or_else(|| ExecError::missing(TaskKind::RemoteServerAdmin, "server_id"))?;

        println!("agent server admin: {} {}", action, server_id);
        ctx.cancel.check()?;

        match action {
            "ping" => {
                let alive = self.mcp.server(server_id)?.ping().await;
                Ok(TaskResult::success(format!("server {} {}", server_id, if alive { "answered" } else { "did not answer" }))
                    .with_artifact("alive", alive.into()))
            }
            "connect" => {
                self.mcp.reconnect(server_id).await?;
                Ok(TaskResult::success(format!("server {} connected", server_id)))
            }
            "disconnect" => {
                self.mcp.disconnect(server_id).await?;
                Ok(TaskResult::success(format!("server {} disconnected", server_id)))
            }
            other => Err(ExecError::InvalidParameter(format!(
                "unknown admin action '{}' (expected ping, connect, disconnect)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::McpError;

    fn disabled_manager() -> Arc<McpManager> {
        Arc::new(McpManager::disabled())
    }

    #[tokio::test]
    async fn test_tool_call_requires_tool_name() {
        let strategy = RemoteToolCallStrategy::new(disabled_manager());
        let ctx = ExecContext::new(".");
        let task = Task::new(TaskKind::RemoteToolCall, "call");

        let err = strategy.execute(&task, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::MissingParameter { name: "tool_name", .. }));
    }

    #[tokio::test]
    async fn test_tool_call_unknown_tool_surfaces_remote_error() {
        let strategy = RemoteToolCallStrategy::new(disabled_manager());
        let ctx = ExecContext::new(".");
        let task = Task::new(TaskKind::RemoteToolCall, "call").with_parameter("tool_name", "echo");

        let err = strategy.execute(&task, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::Remote(McpError::ToolNotFound(_))));
    }

    #[tokio::test]
    async fn test_admin_rejects_unknown_action() {
        let strategy = RemoteServerAdminStrategy::new(disabled_manager());
        let ctx = ExecContext::new(".");
        let task = Task::new(TaskKind::RemoteServerAdmin, "admin")
            .with_parameter("action", "restart")
            .with_parameter("server_id", "alpha");

        let err = strategy.execute(&task, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_admin_unknown_server() {
        let strategy = RemoteServerAdminStrategy::new(disabled_manager());
        let ctx = ExecContext::new(".");
        let task = Task::new(TaskKind::RemoteServerAdmin, "admin")
            .with_parameter("action", "ping")
            .with_parameter("server_id", "ghost");

        let err = strategy.execute(&task, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::Remote(McpError::ServerNotFound(_))));
    }

    #[test]
    fn test_extract_resource_text() {
        let payload = json!({
            "contents": [ { "uri": "file:///x", "text": "resource body" } ]
        });
        assert_eq!(extract_resource_text(&payload).as_deref(), Some("resource body"));
        assert!(extract_resource_text(&json!({"contents": []})).is_none());
    }
}
