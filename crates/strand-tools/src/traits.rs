//! Core tool trait and execution context.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use strand_core::ids::{SessionId, ToolCallId};
use strand_core::tools::{ToolDefinition, ToolOutput};

use crate::errors::ToolError;

/// Execution context passed to every tool invocation.
#[derive(Clone, Debug)]
pub struct ToolContext {
    /// Unique ID of this tool call.
    pub tool_call_id: ToolCallId,
    /// Session invoking this tool.
    pub session_id: SessionId,
    /// Working directory for path resolution.
    pub working_directory: String,
    /// Cancellation token for cooperative cancellation.
    pub cancellation: CancellationToken,
}

impl ToolContext {
    /// Resolve `path` against the context's working directory.
    ///
    /// Absolute paths pass through unchanged.
    #[must_use]
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            Path::new(&self.working_directory).join(p)
        }
    }
}

/// The core trait that every tool must implement.
///
/// Each tool provides a schema via [`definition()`](Tool::definition)
/// that is sent to the model, and execution via
/// [`execute()`](Tool::execute) with the model's JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, the exact string sent to/from the model.
    fn name(&self) -> &str;

    /// Whether the tool only observes state. Read-only tools bypass
    /// stricter permission policies.
    fn read_only(&self) -> bool {
        false
    }

    /// Optional per-tool timeout in milliseconds. Overrides the
    /// runtime's default tool deadline.
    fn timeout_ms(&self) -> Option<u64> {
        None
    }

    /// Generate the schema for the model.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with JSON arguments.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError>;
}

/// Extract a required string parameter, or produce a validation error.
pub fn require_string(params: &Value, key: &str) -> Result<String, ToolError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| ToolError::Validation {
            message: format!("missing required parameter: {key}"),
        })
}
