//! JSON-RPC 2.0 wire types for the remote tool protocol

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol revision sent in the initialize handshake
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// JSON-RPC standard error codes
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

// Protocol-specific error codes
pub const INIT_FAILED: i64 = -32000;
pub const TOOL_NOT_FOUND: i64 = -32001;
pub const RESOURCE_NOT_FOUND: i64 = -32002;
pub const PERMISSION_DENIED: i64 = -32003;

/// A JSON-RPC 2.0 request. A request without an id is a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn new(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(Value::from(id)),
            method: method.into(),
            params,
        }
    }

    /// A request with no id, expecting no response
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A JSON-RPC 2.0 response: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,

    #[serde(default)]
    pub id: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<McpErrorBody>,
}

impl McpResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: None,
            error: Some(McpErrorBody {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// A response is well-formed when exactly one of result/error is present
    pub fn is_well_formed(&self) -> bool {
        self.result.is_some() != self.error.is_some()
    }
}

/// The error member of a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpErrorBody {
    pub code: i64,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A tool advertised by a server, tagged with its origin once aggregated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTool {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,

    /// Id of the server advertising this tool; filled in by the manager
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

/// One content item inside a tool-call result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

/// Result payload of `tools/call`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,

    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Concatenate the textual content items into one string
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ToolContent::Text { text } => Some(text.as_str()),
                ToolContent::Resource { text: Some(text), .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Map a JSON-RPC method to its HTTP endpoint path
pub fn endpoint_path(method: &str) -> String {
    match method {
        "initialize" => "/mcp/initialize".to_string(),
        "tools/list" => "/mcp/tools/list".to_string(),
        "tools/call" => "/mcp/tools/call".to_string(),
        "ping" => "/mcp/ping".to_string(),
        other => format!("/mcp/{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let request = McpRequest::new(
            7,
            "tools/call",
            Some(serde_json::json!({"name": "echo", "arguments": {"text": "x"}})),
        );
        let json = serde_json::to_string(&request).unwrap();
        let back: McpRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
        assert!(!back.is_notification());
    }

    #[test]
    fn test_notification_has_no_id() {
        let request = McpRequest::notification("ping", None);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("id").is_none());
        assert!(request.is_notification());
    }

    #[test]
    fn test_response_success_roundtrip() {
        let response = McpResponse::success(Value::from(1), serde_json::json!({"ok": true}));
        assert!(response.is_well_formed());

        let json = serde_json::to_string(&response).unwrap();
        let back: McpResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
        assert!(back.error.is_none());
    }

    #[test]
    fn test_response_error_roundtrip() {
        let response = McpResponse::failure(Value::from(2), TOOL_NOT_FOUND, "no such tool");
        assert!(response.is_well_formed());

        let json = serde_json::to_string(&response).unwrap();
        let back: McpResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.error.as_ref().unwrap().code, TOOL_NOT_FOUND);
        assert!(back.result.is_none());
    }

    #[test]
    fn test_both_members_is_malformed() {
        let response = McpResponse {
            jsonrpc: "2.0".to_string(),
            id: Some(Value::from(3)),
            result: Some(Value::Null),
            error: Some(McpErrorBody {
                code: INTERNAL_ERROR,
                message: "boom".to_string(),
                data: None,
            }),
        };
        assert!(!response.is_well_formed());
    }

    #[test]
    fn test_endpoint_mapping() {
        assert_eq!(endpoint_path("initialize"), "/mcp/initialize");
        assert_eq!(endpoint_path("tools/list"), "/mcp/tools/list");
        assert_eq!(endpoint_path("tools/call"), "/mcp/tools/call");
        assert_eq!(endpoint_path("ping"), "/mcp/ping");
        assert_eq!(endpoint_path("resources/read"), "/mcp/resources/read");
    }

    #[test]
    fn test_tool_call_result_text_concatenation() {
        let result = ToolCallResult {
            content: vec![
                ToolContent::Text { text: "one".to_string() },
                ToolContent::Image {
                    data: "AAAA".to_string(),
                    mime_type: "image/png".to_string(),
                },
                ToolContent::Text { text: "two".to_string() },
            ],
            is_error: false,
        };
        assert_eq!(result.text(), "one\ntwo");
    }

    #[test]
    fn test_tool_content_tagged_serde() {
        let json = r#"{"type":"text","text":"Echo: x"}"#;
        let content: ToolContent = serde_json::from_str(json).unwrap();
        assert_eq!(
            content,
            ToolContent::Text {
                text: "Echo: x".to_string()
            }
        );
    }
}
