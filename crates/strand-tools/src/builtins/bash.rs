//! `bash` tool, runs a shell command in the session's working directory.
//!
//! The command runs under `bash -c` with stdout and stderr captured.
//! Execution races against the timeout and the call's cancellation
//! token; both produce an error output rather than a hung run.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use strand_core::tools::{ToolDefinition, ToolOutput};

use crate::errors::ToolError;
use crate::traits::{require_string, Tool, ToolContext};

/// Default command timeout.
const DEFAULT_TIMEOUT_MS: u64 = 120_000;
/// Upper bound on the caller-supplied timeout.
const MAX_TIMEOUT_MS: u64 = 600_000;
/// Output beyond this is truncated from the middle.
const MAX_OUTPUT_BYTES: usize = 48_000;

/// Shell command execution tool.
pub struct BashTool {
    default_timeout_ms: u64,
}

impl BashTool {
    /// Create a tool with a custom default timeout.
    #[must_use]
    pub fn new(default_timeout_ms: u64) -> Self {
        Self { default_timeout_ms }
    }
}

impl Default for BashTool {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS)
    }
}

fn truncate_middle(text: &str) -> String {
    if text.len() <= MAX_OUTPUT_BYTES {
        return text.to_owned();
    }
    let half = MAX_OUTPUT_BYTES / 2;
    let mut head_end = half;
    while !text.is_char_boundary(head_end) {
        head_end -= 1;
    }
    let mut tail_start = text.len() - half;
    while !text.is_char_boundary(tail_start) {
        tail_start += 1;
    }
    format!(
        "{}\n... [output truncated] ...\n{}",
        &text[..head_end],
        &text[tail_start..]
    )
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn timeout_ms(&self) -> Option<u64> {
        Some(self.default_timeout_ms)
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "bash",
            "Run a shell command and return its output. Commands run in the \
             session's working directory with a timeout.",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute"
                    },
                    "timeout_ms": {
                        "type": "number",
                        "description": "Timeout in milliseconds (default 120000, max 600000)"
                    }
                },
                "required": ["command"]
            }),
        )
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let command = require_string(&params, "command")?;
        let timeout_ms = params
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .unwrap_or(self.default_timeout_ms)
            .min(MAX_TIMEOUT_MS);

        let start = Instant::now();
        let mut cmd = tokio::process::Command::new("bash");
        let _ = cmd
            .arg("-c")
            .arg(&command)
            .current_dir(&ctx.working_directory)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        debug!(command = %command, working_dir = %ctx.working_directory, "spawning process");

        let child = cmd.spawn().map_err(|e| ToolError::Internal {
            message: format!("Failed to spawn process: {e}"),
        })?;

        let timeout = std::time::Duration::from_millis(timeout_ms);
        let output = tokio::select! {
            result = child.wait_with_output() => {
                result.map_err(|e| ToolError::Internal {
                    message: format!("Process wait failed: {e}"),
                })?
            }
            () = tokio::time::sleep(timeout) => {
                warn!(command = %command, timeout_ms, "process timed out");
                return Err(ToolError::Timeout { timeout_ms });
            }
            () = ctx.cancellation.cancelled() => {
                debug!(command = %command, "process cancelled");
                return Err(ToolError::Cancelled);
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut combined = String::new();
        combined.push_str(&stdout);
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        let combined = truncate_middle(combined.trim_end());

        debug!(
            command = %command,
            exit_code,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "process completed"
        );

        if exit_code == 0 {
            Ok(ToolOutput::text(combined))
        } else {
            Ok(ToolOutput::error(format!(
                "exit code {exit_code}\n{combined}"
            )))
        }
    }
}
