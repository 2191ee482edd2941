//! # strand-agent
//!
//! Strand agent server binary: wires the model provider, built-in
//! tools, external tool providers, and the runtime together and starts
//! the HTTP/SSE server.

#![deny(unsafe_code)]

mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use strand_llm::anthropic::{AnthropicConfig, AnthropicProvider};
use strand_llm::{Provider, SendOptions};
use strand_mcp::{ProviderManager, ProviderProxyTool};
use strand_runtime::{MemoryMessageStore, RunConfig, StaticPolicy};
use strand_server::{AppState, ServerConfig, StrandServer};
use strand_tools::{builtins, ToolRegistry};
use tracing_subscriber::EnvFilter;

use crate::settings::StrandSettings;

/// Strand agent server.
#[derive(Parser, Debug)]
#[command(name = "strand-agent", about = "Strand agent server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file (default `~/.strand/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Model ID (overrides settings).
    #[arg(long)]
    model: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_config(settings: &StrandSettings) -> RunConfig {
    RunConfig {
        system_prompt: settings.agent.system_prompt.clone(),
        working_directory: settings.agent.working_directory.clone(),
        max_turns: settings.agent.max_turns,
        model_timeout_ms: settings.agent.model_timeout_ms,
        tool_timeout_ms: settings.agent.tool_timeout_ms,
        send_options: SendOptions {
            max_tokens: settings.agent.max_tokens,
            ..SendOptions::default()
        },
        retry: settings.retry.clone(),
    }
}

fn server_config(settings: &StrandSettings, args: &Cli) -> ServerConfig {
    ServerConfig {
        host: args.host.clone().unwrap_or_else(|| settings.server.host.clone()),
        port: args.port.unwrap_or(settings.server.port),
        keep_alive_secs: settings.server.keep_alive_secs,
        subscriber_buffer: settings.server.subscriber_buffer,
        queue_capacity: settings.server.queue_capacity,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing();

    let settings_path = args.settings.clone().unwrap_or_else(settings::settings_path);
    let settings = settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;

    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .context("ANTHROPIC_API_KEY is not set")?;
    let model = args.model.clone().unwrap_or_else(|| settings.agent.model.clone());
    tracing::info!(model = %model, "model provider configured");
    let provider: Arc<dyn Provider> = Arc::new(AnthropicProvider::new(AnthropicConfig {
        api_key,
        model,
        base_url: None,
        max_tokens: settings.agent.max_tokens,
    }));

    // Built-in tools
    let mut registry = ToolRegistry::new();
    builtins::register_builtins(&mut registry);

    // External tool providers, proxied into the same registry
    let providers = Arc::new(ProviderManager::new());
    providers.connect_all(settings.mcp.clone()).await;
    for definition in providers.tool_definitions().await {
        registry.register(Arc::new(ProviderProxyTool::new(
            providers.clone(),
            definition,
        )));
    }
    tracing::info!(tool_count = registry.len(), "tool registry ready");

    let permissions = Arc::new(StaticPolicy::new(
        settings.permissions.deny.clone(),
        settings.permissions.ask.clone(),
    ));

    let state = AppState::new(
        server_config(&settings, &args),
        provider,
        Arc::new(registry),
        providers,
        Arc::new(MemoryMessageStore::new()),
        permissions,
        run_config(&settings),
    );

    let server = StrandServer::new(state);
    server
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down");
        })
        .await
        .context("server error")?;

    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_defaults_to_settings() {
        let cli = Cli::parse_from(["strand-agent"]);
        assert_eq!(cli.host, None);
        assert_eq!(cli.port, None);
        assert_eq!(cli.model, None);
    }

    #[test]
    fn cli_custom_host_and_port() {
        let cli = Cli::parse_from(["strand-agent", "--host", "0.0.0.0", "--port", "8080"]);
        assert_eq!(cli.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(cli.port, Some(8080));
    }

    #[test]
    fn cli_settings_path() {
        let cli = Cli::parse_from(["strand-agent", "--settings", "/tmp/s.json"]);
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/s.json")));
    }

    #[test]
    fn cli_overrides_win_in_server_config() {
        let cli = Cli::parse_from(["strand-agent", "--host", "0.0.0.0", "--port", "0"]);
        let settings = StrandSettings::default();
        let config = server_config(&settings, &cli);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 0);
        assert_eq!(config.queue_capacity, settings.server.queue_capacity);
    }

    #[test]
    fn run_config_reflects_settings() {
        let mut settings = StrandSettings::default();
        settings.agent.max_turns = 7;
        settings.agent.max_tokens = Some(2048);
        let config = run_config(&settings);
        assert_eq!(config.max_turns, 7);
        assert_eq!(config.send_options.max_tokens, Some(2048));
    }
}
