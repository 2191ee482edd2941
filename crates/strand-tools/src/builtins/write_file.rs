//! `write_file` tool, writes content to a file.
//!
//! Parent directories are created as needed. Overwrites silently; the
//! model is expected to read before rewriting existing files.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use strand_core::tools::{ToolDefinition, ToolOutput};

use crate::errors::ToolError;
use crate::traits::{require_string, Tool, ToolContext};

/// File writing tool.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "write_file",
            "Write content to a file, creating parent directories as needed. \
             Overwrites the file if it already exists.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "The path to write to (absolute or relative)"
                    },
                    "content": {
                        "type": "string",
                        "description": "The full content to write"
                    }
                },
                "required": ["path", "content"]
            }),
        )
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let path = require_string(&params, "path")?;
        let content = require_string(&params, "content")?;
        let resolved = ctx.resolve_path(&path);

        if tokio::fs::metadata(&resolved).await.is_ok_and(|m| m.is_dir()) {
            return Err(ToolError::IsDirectory {
                path: resolved.to_string_lossy().into_owned(),
            });
        }

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&resolved, content.as_bytes()).await?;

        debug!(path = %resolved.display(), bytes = content.len(), "file written");
        Ok(ToolOutput::text(format!(
            "wrote {} bytes to {}",
            content.len(),
            resolved.display()
        )))
    }
}
