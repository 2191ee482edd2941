//! `grep` tool, regex search across files under a directory.
//!
//! Walks the tree skipping hidden directories and common build output,
//! applying an optional glob filter before matching each line against
//! the pattern. Results are capped to keep tool output bounded.

use std::fmt::Write;

use async_trait::async_trait;
use globset::Glob;
use regex::Regex;
use serde_json::{json, Value};
use walkdir::WalkDir;

use strand_core::tools::{ToolDefinition, ToolOutput};

use crate::errors::ToolError;
use crate::traits::{require_string, Tool, ToolContext};

/// Maximum matches returned in one call.
const MAX_MATCHES: usize = 200;
/// Files larger than this are skipped.
const MAX_FILE_BYTES: u64 = 2_000_000;

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &["node_modules", "target", ".git", "dist", "build"];

/// Regex content search tool.
pub struct GrepTool;

fn should_skip(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with('.') || SKIP_DIRS.contains(&n))
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn read_only(&self) -> bool {
        true
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "grep",
            "Search file contents with a regular expression. Returns matching \
             lines as path:line:content.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "The regular expression to search for"
                    },
                    "path": {
                        "type": "string",
                        "description": "Directory to search in (default: working directory)"
                    },
                    "glob": {
                        "type": "string",
                        "description": "Glob filter for file names, e.g. *.rs"
                    }
                },
                "required": ["pattern"]
            }),
        )
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let pattern = require_string(&params, "pattern")?;
        let regex = Regex::new(&pattern).map_err(|e| ToolError::Validation {
            message: format!("invalid regex: {e}"),
        })?;

        let root = ctx.resolve_path(
            params
                .get("path")
                .and_then(Value::as_str)
                .unwrap_or("."),
        );
        let glob = params
            .get("glob")
            .and_then(Value::as_str)
            .map(|g| {
                Glob::new(g).map(|g| g.compile_matcher()).map_err(|e| {
                    ToolError::Validation {
                        message: format!("invalid glob: {e}"),
                    }
                })
            })
            .transpose()?;

        // Blocking walk moved off the async executor
        let cancellation = ctx.cancellation.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut output = String::new();
            let mut matches = 0usize;
            let mut truncated = false;

            'walk: for entry in WalkDir::new(&root)
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
                if entry.metadata().is_ok_and(|m| m.len() > MAX_FILE_BYTES) {
                    continue;
                }
                if let Some(ref matcher) = glob {
                    if !matcher.is_match(entry.file_name()) {
                        continue;
                    }
                }
                let Ok(content) = std::fs::read_to_string(entry.path()) else {
                    continue;
                };
                for (line_no, line) in content.lines().enumerate() {
                    if regex.is_match(line) {
                        if matches >= MAX_MATCHES {
                            truncated = true;
                            break 'walk;
                        }
                        let _ = writeln!(
                            output,
                            "{}:{}:{}",
                            entry.path().display(),
                            line_no + 1,
                            line.trim_end()
                        );
                        matches += 1;
                    }
                }
            }

            if truncated {
                let _ = writeln!(output, "... (match limit reached)");
            }
            Ok((output, matches))
        })
        .await
        .map_err(|e| ToolError::Internal {
            message: format!("search task failed: {e}"),
        })?;

        let (output, matches) = result?;
        if matches == 0 {
            Ok(ToolOutput::text("no matches"))
        } else {
            Ok(ToolOutput::text(output))
        }
    }
}
