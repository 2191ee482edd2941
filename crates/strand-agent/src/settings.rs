//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`StrandSettings::default()`]
//! 2. If `~/.strand/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strand_llm::RetryConfig;
use strand_mcp::McpConfig;
use tracing::debug;

/// Default model when settings and CLI specify none.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Top-level settings for the agent server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrandSettings {
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Agent run settings.
    pub agent: AgentSettings,
    /// Provider retry policy.
    pub retry: RetryConfig,
    /// Tool permission lists.
    pub permissions: PermissionSettings,
    /// External tool providers.
    pub mcp: McpConfig,
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind (0 for auto-assign).
    pub port: u16,
    /// SSE keep-alive interval in seconds.
    pub keep_alive_secs: u64,
    /// Per-subscriber event buffer.
    pub subscriber_buffer: usize,
    /// Per-session input queue capacity.
    pub queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 4242,
            keep_alive_secs: 15,
            subscriber_buffer: 256,
            queue_capacity: 100,
        }
    }
}

/// Agent run settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    /// Model ID.
    pub model: String,
    /// System prompt for every run.
    pub system_prompt: String,
    /// Working directory handed to tools.
    pub working_directory: String,
    /// Maximum model turns per run.
    pub max_turns: u32,
    /// Per-attempt model call timeout in milliseconds.
    pub model_timeout_ms: u64,
    /// Default per-tool timeout in milliseconds.
    pub tool_timeout_ms: u64,
    /// Default `max_tokens` per model call.
    pub max_tokens: Option<u32>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_owned(),
            system_prompt: "You are a helpful coding agent.".to_owned(),
            working_directory: ".".to_owned(),
            max_turns: 25,
            model_timeout_ms: 120_000,
            tool_timeout_ms: 60_000,
            max_tokens: None,
        }
    }
}

/// Static tool permission lists.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionSettings {
    /// Tools rejected outright.
    pub deny: Vec<String>,
    /// Tools that require an approver (rejected when none is attached).
    pub ask: Vec<String>,
}

/// Resolve the path to the settings file (`~/.strand/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
    PathBuf::from(home).join(".strand").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<StrandSettings> {
    let defaults = serde_json::to_value(StrandSettings::default())
        .context("serializing default settings")?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let user: Value = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: StrandSettings =
        serde_json::from_value(merged).context("deserializing merged settings")?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut StrandSettings) {
    if let Some(v) = read_env_string("STRAND_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("STRAND_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_usize("STRAND_QUEUE_CAPACITY", 1, 100_000) {
        settings.server.queue_capacity = v;
    }
    if let Some(v) = read_env_string("STRAND_MODEL") {
        settings.agent.model = v;
    }
    if let Some(v) = read_env_u32("STRAND_MAX_TURNS", 1, 1000) {
        settings.agent.max_turns = v;
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_simple_override() {
        let target = json!({"a": 1, "b": 2});
        let source = json!({"a": 10});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 10);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_nested_override() {
        let target = json!({"server": {"port": 8080, "host": "localhost"}});
        let source = json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_array_replace() {
        let target = json!({"items": [1, 2, 3]});
        let source = json!({"items": [4, 5]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], json!([4, 5]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = json!({"a": 1});
        let source = json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_new_keys_added() {
        let target = json!({"a": 1});
        let source = json!({"b": 2});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.server.port, 4242);
        assert_eq!(settings.agent.model, DEFAULT_MODEL);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "retry": {"maxRetries": 2}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.retry.max_retries, 2);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.retry.base_delay_ms, 1000);
    }

    #[test]
    fn load_mcp_providers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"mcp": {"providers": {"files": {"command": "mcp-fs", "args": ["/tmp"]}}}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.mcp.providers.len(), 1);
        assert!(settings.mcp.providers["files"].enabled);
    }

    #[test]
    fn load_permission_lists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"permissions": {"deny": ["bash"]}}"#).unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.permissions.deny, vec!["bash".to_owned()]);
        assert!(settings.permissions.ask.is_empty());
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("9090", 1, 65535), Some(9090));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("not_a_number", 1, 65535), None);
    }

    #[test]
    fn parse_u32_bounds() {
        assert_eq!(parse_u32_range("25", 1, 1000), Some(25));
        assert_eq!(parse_u32_range("5000", 1, 1000), None);
    }

    #[test]
    fn parse_usize_bounds() {
        assert_eq!(parse_usize_range("50", 1, 10_000), Some(50));
        assert_eq!(parse_usize_range("0", 1, 10_000), None);
    }

    #[test]
    fn settings_path_under_strand_dir() {
        let path = settings_path();
        assert!(path.to_string_lossy().contains(".strand"));
        assert!(path.to_string_lossy().ends_with("settings.json"));
    }
}
