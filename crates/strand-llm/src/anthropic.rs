//! Anthropic provider implementing the [`Provider`] trait.
//!
//! Builds non-streaming requests against the Anthropic Messages API and
//! maps the response back to the provider-neutral types. Tool results
//! are sent as `tool_result` blocks inside user messages, matching the
//! Messages API conversation shape.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use strand_core::messages::{Message, Role, TokenUsage, ToolCall};
use strand_core::tools::ToolDefinition;

use crate::provider::{
    Provider, ProviderError, ProviderResponse, ProviderResult, SendOptions, StopReason,
};
use crate::retry::parse_retry_after_header;

/// Default base URL for the Anthropic API.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// API version header value.
const API_VERSION: &str = "2023-06-01";

/// Default `max_tokens` when neither config nor options specify one.
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

/// Fallback retry delay for 429 responses without a Retry-After header.
const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 5000;

/// Configuration for the Anthropic provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnthropicConfig {
    /// API key for `x-api-key` authentication.
    pub api_key: String,
    /// Model ID.
    pub model: String,
    /// Base URL override (testing, proxies).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Default `max_tokens` when a send does not specify one.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Anthropic LLM provider.
pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<Value>,
}

#[derive(Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: ApiUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    #[must_use]
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Create a provider with a shared HTTP client.
    #[must_use]
    pub fn with_client(config: AnthropicConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    fn build_headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let _ = headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        let _ = headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.config.api_key).map_err(|e| ProviderError::Auth {
                message: format!("Invalid API key header: {e}"),
            })?,
        );
        Ok(headers)
    }

    fn build_request(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &SendOptions,
    ) -> ApiRequest {
        ApiRequest {
            model: self.config.model.clone(),
            max_tokens: options.max_tokens.unwrap_or_else(|| {
                self.config.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS)
            }),
            messages: convert_messages(messages),
            system: if system.is_empty() {
                None
            } else {
                Some(system.to_owned())
            },
            tools: tools
                .iter()
                .map(|t| ApiTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.input_schema.clone(),
                })
                .collect(),
            temperature: options.temperature,
            stop_sequences: options.stop_sequences.clone(),
        }
    }

    async fn map_error_response(response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after_header);

        let message = match response.text().await {
            Ok(body) => serde_json::from_str::<ApiErrorBody>(&body).map_or(body, |parsed| {
                format!("{}: {}", parsed.error.error_type, parsed.error.message)
            }),
            Err(e) => format!("failed to read error body: {e}"),
        };

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return ProviderError::RateLimited {
                retry_after_ms: retry_after.unwrap_or(DEFAULT_RATE_LIMIT_DELAY_MS),
                message,
            };
        }
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return ProviderError::Auth { message };
        }
        ProviderError::Api {
            status: status.as_u16(),
            message,
            retryable: status.is_server_error()
                || status == reqwest::StatusCode::REQUEST_TIMEOUT,
        }
    }
}

/// Convert provider-neutral messages to Messages API shape.
///
/// Tool-result messages become user messages carrying `tool_result`
/// blocks. Messages that would serialize to empty content are dropped
/// since the API rejects them.
fn convert_messages(messages: &[Message]) -> Vec<ApiMessage> {
    let mut out = Vec::with_capacity(messages.len());
    for msg in messages {
        let converted = match msg.role {
            Role::User => ApiMessage {
                role: "user",
                content: vec![json!({"type": "text", "text": msg.content})],
            },
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !msg.content.is_empty() {
                    blocks.push(json!({"type": "text", "text": msg.content}));
                }
                for call in &msg.tool_calls {
                    blocks.push(tool_use_block(call));
                }
                ApiMessage {
                    role: "assistant",
                    content: blocks,
                }
            }
            Role::Tool => ApiMessage {
                role: "user",
                content: msg
                    .tool_results
                    .iter()
                    .map(|r| {
                        json!({
                            "type": "tool_result",
                            "tool_use_id": r.tool_call_id.as_str(),
                            "content": r.content,
                            "is_error": r.is_error,
                        })
                    })
                    .collect(),
            },
        };
        if !converted.content.is_empty() {
            out.push(converted);
        }
    }
    out
}

fn tool_use_block(call: &ToolCall) -> Value {
    json!({
        "type": "tool_use",
        "id": call.id.as_str(),
        "name": call.name,
        "input": call.arguments,
    })
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip_all, fields(model = %self.config.model, messages = messages.len()))]
    async fn send(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &SendOptions,
    ) -> ProviderResult<ProviderResponse> {
        let request = self.build_request(system, messages, tools, options);
        let url = format!("{}/v1/messages", self.base_url());

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::map_error_response(response).await);
        }

        let body: ApiResponse = response.json().await?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in body.content {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall {
                        id: id.into(),
                        name,
                        arguments: input,
                    });
                }
                ContentBlock::Unknown => {}
            }
        }

        let usage = TokenUsage {
            input_tokens: body.usage.input_tokens,
            output_tokens: body.usage.output_tokens,
        };
        let stop_reason = body
            .stop_reason
            .as_deref()
            .map_or(StopReason::EndTurn, StopReason::parse);

        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            tool_calls = tool_calls.len(),
            "model turn complete"
        );

        Ok(ProviderResponse {
            content,
            tool_calls,
            usage,
            stop_reason,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
