//! `glob` tool, finds files matching a glob pattern.

use std::fmt::Write;

use async_trait::async_trait;
use globset::Glob;
use serde_json::{json, Value};
use walkdir::WalkDir;

use strand_core::tools::{ToolDefinition, ToolOutput};

use crate::errors::ToolError;
use crate::traits::{require_string, Tool, ToolContext};

/// Maximum paths returned in one call.
const MAX_RESULTS: usize = 500;

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &["node_modules", "target", ".git", "dist", "build"];

/// File name pattern matching tool.
pub struct GlobTool;

fn should_skip(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with('.') || SKIP_DIRS.contains(&n))
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn read_only(&self) -> bool {
        true
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "glob",
            "Find files whose path matches a glob pattern, e.g. **/*.rs. \
             Returns one path per line.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "The glob pattern to match against relative paths"
                    },
                    "path": {
                        "type": "string",
                        "description": "Directory to search in (default: working directory)"
                    }
                },
                "required": ["pattern"]
            }),
        )
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let pattern = require_string(&params, "pattern")?;
        let matcher = Glob::new(&pattern)
            .map_err(|e| ToolError::Validation {
                message: format!("invalid glob: {e}"),
            })?
            .compile_matcher();

        let root = ctx.resolve_path(
            params
                .get("path")
                .and_then(Value::as_str)
                .unwrap_or("."),
        );

        let cancellation = ctx.cancellation.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut output = String::new();
            let mut count = 0usize;
            let mut truncated = false;

            for entry in WalkDir::new(&root)
                .into_iter()
                .filter_entry(|e| !should_skip(e))
                .filter_map(Result::ok)
            {
                if cancellation.is_cancelled() {
                    return Err(ToolError::Cancelled);
                }
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
                if matcher.is_match(relative) {
                    if count >= MAX_RESULTS {
                        truncated = true;
                        break;
                    }
                    let _ = writeln!(output, "{}", entry.path().display());
                    count += 1;
                }
            }

            if truncated {
                let _ = writeln!(output, "... (result limit reached)");
            }
            Ok((output, count))
        })
        .await
        .map_err(|e| ToolError::Internal {
            message: format!("glob task failed: {e}"),
        })?;

        let (output, count) = result?;
        if count == 0 {
            Ok(ToolOutput::text("no files matched"))
        } else {
            Ok(ToolOutput::text(output))
        }
    }
}
