//! # strand-mcp
//!
//! Model Context Protocol (MCP) integration for the Strand agent server.
//!
//! External tool providers are spawned as subprocesses (stdio transport)
//! or reached over HTTP, speaking JSON-RPC 2.0. The [`ProviderManager`]
//! owns every connection: providers that fail to connect stay listed
//! with their error, tool names are namespaced `<provider>_<tool>`, and
//! each provider can be reconnected explicitly without restarting the
//! server.

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod errors;
pub mod manager;
pub mod protocol;
pub mod proxy;
pub mod transport;

pub use client::McpClient;
pub use config::{McpConfig, ProviderConfig, TransportConfig};
pub use errors::McpError;
pub use manager::{ProviderManager, ProviderStatus};
pub use proxy::ProviderProxyTool;
