//! One connected provider: handshake, tool listing, tool calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, instrument};

use crate::errors::McpError;
use crate::protocol::{
    CallToolParams, CallToolResult, ClientInfo, InitializeParams, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, ListToolsResult, McpToolInfo, PROTOCOL_VERSION,
};
use crate::transport::Transport;

/// JSON-RPC client bound to one provider transport.
pub struct McpClient {
    name: String,
    transport: Arc<dyn Transport>,
    request_id: AtomicU64,
}

impl McpClient {
    /// Wrap a transport. Call [`initialize`](Self::initialize) before use.
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            transport,
            request_id: AtomicU64::new(1),
        }
    }

    /// Provider name this client is connected to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn call(&self, method: &str, params: Option<serde_json::Value>) -> Result<serde_json::Value, McpError> {
        let request = JsonRpcRequest::new(self.next_id(), method, params);
        let response = self.transport.request(request).await?;
        if let Some(err) = response.error {
            return Err(McpError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }

    /// Run the MCP handshake: `initialize` then `notifications/initialized`.
    #[instrument(skip_all, fields(provider = %self.name))]
    pub async fn initialize(&self) -> Result<InitializeResult, McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: json!({}),
            client_info: ClientInfo {
                name: "strand".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        };
        let result = self
            .call("initialize", Some(serde_json::to_value(&params)?))
            .await?;
        let init: InitializeResult = serde_json::from_value(result)?;
        debug!(
            server = %init.server_info.name,
            version = %init.server_info.version,
            "provider initialized"
        );
        self.transport
            .notify(JsonRpcNotification::new("notifications/initialized", None))
            .await?;
        Ok(init)
    }

    /// Fetch the provider's advertised tools.
    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let result = self.call("tools/list", None).await?;
        let listed: ListToolsResult = serde_json::from_value(result)?;
        Ok(listed.tools)
    }

    /// Invoke a tool by its un-namespaced name.
    #[instrument(skip_all, fields(provider = %self.name, tool = %name))]
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult, McpError> {
        let params = CallToolParams {
            name: name.to_owned(),
            arguments,
        };
        let result = self
            .call("tools/call", Some(serde_json::to_value(&params)?))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Tear down the underlying transport.
    pub async fn close(&self) {
        self.transport.close().await;
    }

    /// Whether the transport is still usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
}
