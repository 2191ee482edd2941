//! JSON-RPC 2.0 envelope and MCP message shapes.
//!
//! Field names follow the MCP wire format (camelCase with explicit
//! renames where it deviates, e.g. `inputSchema` and `isError`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// A JSON-RPC 2.0 request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request ID, echoed in the response.
    pub id: u64,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request.
    #[must_use]
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no response expected).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Build a notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// ID of the request this answers. `None` for parse failures.
    pub id: Option<u64>,
    /// Result payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
}

/// Parameters for `initialize`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol revision.
    pub protocol_version: String,
    /// Client capabilities (empty object).
    pub capabilities: Value,
    /// Client identification.
    pub client_info: ClientInfo,
}

/// Client identification sent in `initialize`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

/// Result of `initialize`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol revision the server speaks.
    #[serde(default)]
    pub protocol_version: String,
    /// Server identification.
    pub server_info: ServerInfo,
}

/// Server identification from `initialize`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    #[serde(default)]
    pub version: String,
}

/// A tool advertised by a provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct McpToolInfo {
    /// Tool name as the provider knows it (un-namespaced).
    pub name: String,
    /// Tool description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool's input.
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// Result of `tools/list`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// Advertised tools.
    pub tools: Vec<McpToolInfo>,
}

/// Parameters for `tools/call`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Un-namespaced tool name.
    pub name: String,
    /// Tool arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Result of `tools/call`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Content blocks produced by the tool.
    #[serde(default)]
    pub content: Vec<ToolContent>,
    /// Whether the tool reported failure.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

/// One content block in a tool result.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Base64-encoded image.
    Image {
        /// Encoded data.
        data: String,
        /// MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Anything else (resources, audio). Preserved but not rendered.
    #[serde(other)]
    Other,
}

impl CallToolResult {
    /// Flatten content blocks into one text payload for the model.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            match block {
                ToolContent::Text { text } => {
                    out.push_str(text);
                    out.push('\n');
                }
                ToolContent::Image { mime_type, .. } => {
                    out.push_str(&format!("[image: {mime_type}]\n"));
                }
                ToolContent::Other => out.push_str("[unsupported content]\n"),
            }
        }
        out.trim_end().to_owned()
    }
}
