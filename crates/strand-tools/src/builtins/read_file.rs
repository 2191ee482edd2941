//! `read_file` tool, reads file contents with line numbers.
//!
//! Output lines are prefixed with right-aligned 1-based line numbers.
//! Supports offset/limit for partial reads and rejects binary files.

use std::fmt::Write;

use async_trait::async_trait;
use serde_json::{json, Value};

use strand_core::tools::{ToolDefinition, ToolOutput};

use crate::errors::ToolError;
use crate::traits::{require_string, Tool, ToolContext};

/// Lines longer than this are cut off.
const MAX_LINE_LENGTH: usize = 2000;
/// Hard cap on lines returned in one call.
const MAX_LINES: usize = 2000;

/// File reading tool.
pub struct ReadFileTool;

fn format_lines(lines: &[&str], start: usize) -> String {
    let width = format!("{}", start + lines.len()).len().max(5);
    let mut output = String::new();
    for (i, line) in lines.iter().enumerate() {
        let line_num = start + i + 1;
        if line.len() > MAX_LINE_LENGTH {
            let mut cut = MAX_LINE_LENGTH;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            let _ = writeln!(output, "{line_num:>width$}| {}... [line truncated]", &line[..cut]);
        } else {
            let _ = writeln!(output, "{line_num:>width$}| {line}");
        }
    }
    output
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn read_only(&self) -> bool {
        true
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "read_file",
            "Read the contents of a file. Returns the file content with line numbers.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "The path to the file to read (absolute or relative)"
                    },
                    "offset": {
                        "type": "number",
                        "description": "Line number to start reading from (0-indexed)"
                    },
                    "limit": {
                        "type": "number",
                        "description": "Maximum number of lines to read"
                    }
                },
                "required": ["path"]
            }),
        )
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let path = require_string(&params, "path")?;
        let resolved = ctx.resolve_path(&path);
        let offset = params.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
        let limit = params
            .get("limit")
            .and_then(Value::as_u64)
            .map_or(MAX_LINES, |l| (l as usize).min(MAX_LINES));

        let meta = tokio::fs::metadata(&resolved).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolError::FileNotFound {
                    path: resolved.to_string_lossy().into_owned(),
                }
            } else {
                ToolError::Io(e)
            }
        })?;
        if meta.is_dir() {
            return Err(ToolError::IsDirectory {
                path: resolved.to_string_lossy().into_owned(),
            });
        }

        let bytes = tokio::fs::read(&resolved).await?;

        // Binary detection over the first 8 KiB
        let check_len = bytes.len().min(8192);
        if bytes[..check_len].contains(&0) {
            return Ok(ToolOutput::error(format!(
                "cannot read binary file: {}",
                resolved.display()
            )));
        }

        let content = String::from_utf8_lossy(&bytes);
        let all_lines: Vec<&str> = content.lines().collect();
        let total = all_lines.len();
        let start = offset.min(total);
        let end = (start + limit).min(total);
        let selected = &all_lines[start..end];

        if selected.is_empty() {
            return Ok(ToolOutput::text(format!(
                "(no lines in range; file has {total} lines)"
            )));
        }

        let mut output = format_lines(selected, start);
        if end < total {
            let _ = writeln!(output, "... ({} more lines)", total - end);
        }
        Ok(ToolOutput::text(output))
    }
}
