//! Provider configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default per-request timeout for provider calls.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;

/// Top-level MCP configuration: a named set of providers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConfig {
    /// Providers keyed by name. The name becomes the tool prefix.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

/// Configuration for one tool provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// How to reach the provider.
    #[serde(flatten)]
    pub transport: TransportConfig,
    /// Whether the provider participates at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Tool names to expose. Empty means all.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Tool names to hide. Wins over `allow`.
    #[serde(default)]
    pub deny: Vec<String>,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Provider transport.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum TransportConfig {
    /// Subprocess speaking line-delimited JSON-RPC over stdio.
    Stdio {
        /// Executable to spawn.
        command: String,
        /// Command arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment variables.
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// HTTP endpoint accepting JSON-RPC POSTs.
    Http {
        /// Endpoint URL.
        url: String,
        /// Extra request headers.
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl ProviderConfig {
    /// Whether a tool name passes this provider's allow/deny lists.
    #[must_use]
    pub fn tool_allowed(&self, name: &str) -> bool {
        if self.deny.iter().any(|d| d == name) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|a| a == name)
    }
}
