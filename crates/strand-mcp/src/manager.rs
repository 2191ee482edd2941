//! Provider connection table.
//!
//! Each configured provider gets one connection attempt at startup.
//! Failures are recorded, not fatal: a failed provider stays in the
//! table so callers can see what is down and ask for a reconnect.
//! Tool names are exposed as `<provider>_<tool>` so different
//! providers can advertise the same tool name without collision.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use strand_core::tools::ToolDefinition;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::client::McpClient;
use crate::config::{McpConfig, ProviderConfig, TransportConfig};
use crate::errors::McpError;
use crate::protocol::{CallToolResult, McpToolInfo};
use crate::transport::{HttpTransport, StdioTransport, Transport};

/// Connection state of one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProviderStatus {
    /// Handshake completed, tools listed.
    Connected,
    /// Connection or handshake failed.
    Failed {
        /// What went wrong.
        error: String,
    },
}

/// Summary of one provider for listing endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    /// Provider name from config.
    pub name: String,
    /// Current connection state.
    #[serde(flatten)]
    pub status: ProviderStatus,
    /// Allowed tool names, without the provider prefix.
    pub tools: Vec<String>,
    /// Number of tools advertised after filtering.
    pub tool_count: usize,
}

struct ProviderConnection {
    config: ProviderConfig,
    status: ProviderStatus,
    tools: Vec<McpToolInfo>,
    client: Option<Arc<McpClient>>,
}

/// Registry of provider connections. Instances are independent; two
/// managers never share state.
#[derive(Default)]
pub struct ProviderManager {
    providers: RwLock<HashMap<String, ProviderConnection>>,
}

impl ProviderManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn_transport(config: &ProviderConfig) -> Result<Arc<dyn Transport>, McpError> {
        match &config.transport {
            TransportConfig::Stdio { command, args, env } => Ok(Arc::new(StdioTransport::spawn(
                command,
                args,
                env,
                config.request_timeout_ms,
            )?)),
            TransportConfig::Http { url, headers } => Ok(Arc::new(HttpTransport::new(
                url.clone(),
                headers.clone(),
                config.request_timeout_ms,
            ))),
        }
    }

    async fn connect_one(
        name: &str,
        config: ProviderConfig,
        transport: Arc<dyn Transport>,
    ) -> ProviderConnection {
        let client = Arc::new(McpClient::new(name, transport));
        let result = async {
            let _ = client.initialize().await?;
            client.list_tools().await
        }
        .await;

        match result {
            Ok(tools) => {
                info!(provider = name, tools = tools.len(), "provider connected");
                ProviderConnection {
                    config,
                    status: ProviderStatus::Connected,
                    tools,
                    client: Some(client),
                }
            }
            Err(e) => {
                warn!(provider = name, error = %e, "provider connection failed");
                client.close().await;
                ProviderConnection {
                    config,
                    status: ProviderStatus::Failed {
                        error: e.to_string(),
                    },
                    tools: Vec::new(),
                    client: None,
                }
            }
        }
    }

    async fn connect_entry(name: &str, config: ProviderConfig) -> ProviderConnection {
        match Self::spawn_transport(&config) {
            Ok(transport) => Self::connect_one(name, config, transport).await,
            Err(e) => {
                warn!(provider = name, error = %e, "provider spawn failed");
                ProviderConnection {
                    config,
                    status: ProviderStatus::Failed {
                        error: e.to_string(),
                    },
                    tools: Vec::new(),
                    client: None,
                }
            }
        }
    }

    /// Connect every enabled provider in the config. Failures are
    /// recorded per provider and never abort the rest.
    #[instrument(skip_all, fields(providers = config.providers.len()))]
    pub async fn connect_all(&self, config: McpConfig) {
        for (name, provider_config) in config.providers {
            if !provider_config.enabled {
                continue;
            }
            let connection = Self::connect_entry(&name, provider_config).await;
            let _ = self.providers.write().await.insert(name, connection);
        }
    }

    /// Tear down and re-establish one provider's connection.
    pub async fn reconnect(&self, name: &str) -> Result<ProviderStatus, McpError> {
        let config = {
            let table = self.providers.read().await;
            let entry = table.get(name).ok_or_else(|| McpError::UnknownProvider {
                provider: name.to_owned(),
            })?;
            entry.config.clone()
        };

        // Close the old connection outside the write lock
        let old_client = {
            let mut table = self.providers.write().await;
            table.get_mut(name).and_then(|entry| entry.client.take())
        };
        if let Some(client) = old_client {
            client.close().await;
        }

        let connection = Self::connect_entry(name, config).await;
        let status = connection.status.clone();
        let _ = self.providers.write().await.insert(name.to_owned(), connection);
        Ok(status)
    }

    /// Every configured provider with its status, failed ones included.
    pub async fn list(&self) -> Vec<ProviderInfo> {
        let table = self.providers.read().await;
        let mut infos: Vec<ProviderInfo> = table
            .iter()
            .map(|(name, connection)| {
                let tools: Vec<String> = connection
                    .allowed_tools()
                    .map(|tool| tool.name.clone())
                    .collect();
                ProviderInfo {
                    name: name.clone(),
                    status: connection.status.clone(),
                    tool_count: tools.len(),
                    tools,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Namespaced definitions for every allowed tool on every
    /// connected provider.
    pub async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let table = self.providers.read().await;
        let mut definitions: Vec<ToolDefinition> = table
            .iter()
            .flat_map(|(name, connection)| {
                connection.allowed_tools().map(move |tool| ToolDefinition {
                    name: format!("{name}_{}", tool.name),
                    description: tool.description.clone(),
                    input_schema: tool.input_schema.clone(),
                })
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Invoke a namespaced tool. `full_name` is `<provider>_<tool>`;
    /// when underscores make the split ambiguous the longest matching
    /// provider name wins.
    #[instrument(skip_all, fields(tool = %full_name))]
    pub async fn call(
        &self,
        full_name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult, McpError> {
        // Resolve the provider and grab the client under the read
        // lock, then release it before dispatching so slow tool calls
        // never block the table
        let (client, tool_name) = {
            let table = self.providers.read().await;
            let mut best: Option<(&str, &ProviderConnection, &str)> = None;
            for (name, connection) in table.iter() {
                if let Some(rest) = full_name.strip_prefix(name.as_str()) {
                    if let Some(tool) = rest.strip_prefix('_') {
                        if best.is_none_or(|(prev, _, _)| name.len() > prev.len()) {
                            best = Some((name, connection, tool));
                        }
                    }
                }
            }
            let (provider, connection, tool) =
                best.ok_or_else(|| McpError::UnknownTool {
                    name: full_name.to_owned(),
                })?;
            if !connection.config.tool_allowed(tool) {
                return Err(McpError::UnknownTool {
                    name: full_name.to_owned(),
                });
            }
            let client = connection
                .client
                .clone()
                .ok_or_else(|| McpError::NotConnected {
                    provider: provider.to_owned(),
                })?;
            (client, tool.to_owned())
        };

        client.call_tool(&tool_name, arguments).await
    }

    /// Close every connection.
    pub async fn shutdown(&self) {
        let mut table = self.providers.write().await;
        for (name, connection) in table.iter_mut() {
            if let Some(client) = connection.client.take() {
                info!(provider = %name, "closing provider");
                client.close().await;
            }
        }
    }
}

impl ProviderConnection {
    fn allowed_tools(&self) -> impl Iterator<Item = &McpToolInfo> {
        self.tools
            .iter()
            .filter(|tool| self.config.tool_allowed(&tool.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RpcError};

    struct StubTransport {
        responses: Mutex<HashMap<String, Result<Value, (i64, String)>>>,
        connected: AtomicBool,
    }

    impl StubTransport {
        fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                connected: AtomicBool::new(true),
            }
        }

        fn respond(self, method: &str, result: Value) -> Self {
            let _ = self.responses.lock().insert(method.to_owned(), Ok(result));
            self
        }

        fn fail(self, method: &str, code: i64, message: &str) -> Self {
            let _ = self
                .responses
                .lock()
                .insert(method.to_owned(), Err((code, message.to_owned())));
            self
        }

        fn healthy(tools: Value) -> Self {
            Self::new()
                .respond(
                    "initialize",
                    json!({"serverInfo": {"name": "stub", "version": "0.1.0"}}),
                )
                .respond("tools/list", json!({"tools": tools}))
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
            match self.responses.lock().get(&request.method).cloned() {
                Some(Ok(result)) => Ok(JsonRpcResponse {
                    id: Some(request.id),
                    result: Some(result),
                    error: None,
                }),
                Some(Err((code, message))) => Ok(JsonRpcResponse {
                    id: Some(request.id),
                    result: None,
                    error: Some(RpcError { code, message }),
                }),
                None => Err(McpError::Transport {
                    message: format!("no canned response for {}", request.method),
                }),
            }
        }

        async fn notify(&self, _notification: JsonRpcNotification) -> Result<(), McpError> {
            Ok(())
        }

        async fn close(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    fn stdio_config() -> ProviderConfig {
        serde_json::from_value(json!({"command": "true"})).unwrap()
    }

    async fn insert_stubbed(
        manager: &ProviderManager,
        name: &str,
        config: ProviderConfig,
        transport: StubTransport,
    ) {
        let connection =
            ProviderManager::connect_one(name, config, Arc::new(transport)).await;
        let _ = manager
            .providers
            .write()
            .await
            .insert(name.to_owned(), connection);
    }

    #[tokio::test]
    async fn failed_provider_stays_listed() {
        let manager = ProviderManager::new();
        insert_stubbed(
            &manager,
            "broken",
            stdio_config(),
            StubTransport::new().fail("initialize", -32000, "boom"),
        )
        .await;
        insert_stubbed(
            &manager,
            "files",
            stdio_config(),
            StubTransport::healthy(json!([{"name": "search"}])),
        )
        .await;

        let infos = manager.list().await;
        assert_eq!(infos.len(), 2);
        assert!(matches!(infos[0].status, ProviderStatus::Failed { .. }));
        assert_eq!(infos[1].status, ProviderStatus::Connected);
        assert_eq!(infos[1].tool_count, 1);
        assert_eq!(infos[1].tools, ["search"]);
    }

    #[tokio::test]
    async fn tool_definitions_are_namespaced() {
        let manager = ProviderManager::new();
        insert_stubbed(
            &manager,
            "files",
            stdio_config(),
            StubTransport::healthy(json!([{"name": "search"}, {"name": "fetch"}])),
        )
        .await;
        insert_stubbed(
            &manager,
            "db",
            stdio_config(),
            StubTransport::healthy(json!([{"name": "search"}])),
        )
        .await;

        let names: Vec<String> = manager
            .tool_definitions()
            .await
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, ["db_search", "files_fetch", "files_search"]);
    }

    #[tokio::test]
    async fn deny_filter_hides_tools() {
        let manager = ProviderManager::new();
        let config: ProviderConfig =
            serde_json::from_value(json!({"command": "true", "deny": ["fetch"]})).unwrap();
        insert_stubbed(
            &manager,
            "files",
            config,
            StubTransport::healthy(json!([{"name": "search"}, {"name": "fetch"}])),
        )
        .await;

        let names: Vec<String> = manager
            .tool_definitions()
            .await
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, ["files_search"]);

        let err = manager.call("files_fetch", None).await.unwrap_err();
        assert!(matches!(err, McpError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn call_routes_to_longest_provider_match() {
        let manager = ProviderManager::new();
        insert_stubbed(
            &manager,
            "git",
            stdio_config(),
            StubTransport::healthy(json!([{"name": "hub_search"}]))
                .fail("tools/call", -32000, "wrong provider"),
        )
        .await;
        insert_stubbed(
            &manager,
            "git_hub",
            stdio_config(),
            StubTransport::healthy(json!([{"name": "search"}]))
                .respond("tools/call", json!({"content": [{"type": "text", "text": "ok"}]})),
        )
        .await;

        let result = manager.call("git_hub_search", None).await.unwrap();
        assert_eq!(result.render_text(), "ok");
    }

    #[tokio::test]
    async fn call_on_failed_provider_is_not_connected() {
        let manager = ProviderManager::new();
        insert_stubbed(
            &manager,
            "broken",
            stdio_config(),
            StubTransport::new().fail("initialize", -32000, "boom"),
        )
        .await;
        // A failed provider has no tool list, so the name cannot
        // resolve past the prefix
        let err = manager.call("broken_search", None).await.unwrap_err();
        assert!(matches!(err, McpError::NotConnected { .. }));
    }

    #[tokio::test]
    async fn unknown_tool_name_rejected() {
        let manager = ProviderManager::new();
        let err = manager.call("nope_search", None).await.unwrap_err();
        assert!(matches!(err, McpError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn managers_are_independent() {
        let a = ProviderManager::new();
        let b = ProviderManager::new();
        insert_stubbed(
            &a,
            "files",
            stdio_config(),
            StubTransport::healthy(json!([{"name": "search"}])),
        )
        .await;

        assert_eq!(a.list().await.len(), 1);
        assert!(b.list().await.is_empty());
    }
}
