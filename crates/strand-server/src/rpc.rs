//! `POST /rpc`: the JSON-RPC 2.0 surface.
//!
//! `messages.send` blocks until the run's terminal result; everything
//! else answers immediately. Unknown methods get -32601, malformed
//! params -32602, execution failures -32000.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strand_core::ids::SessionId;
use strand_runtime::{QueuedInput, RunOutcome, RuntimeError};
use tokio::sync::oneshot;
use tracing::{debug, instrument};

use crate::server::AppState;

/// Method not found.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Parameters failed validation.
pub const INVALID_PARAMS: i64 = -32602;
/// Request envelope was not valid JSON-RPC.
pub const INVALID_REQUEST: i64 = -32600;
/// Execution failed server-side.
pub const SERVER_ERROR: i64 = -32000;

/// Incoming JSON-RPC request envelope.
#[derive(Clone, Debug, Deserialize)]
pub struct RpcRequest {
    /// Must be `"2.0"`.
    #[serde(default)]
    pub jsonrpc: String,
    /// Request ID, echoed back. Absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name (e.g. `messages.send`).
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

/// Outgoing JSON-RPC response envelope.
#[derive(Clone, Debug, Serialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Echoed request ID.
    pub id: Value,
    /// Result payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

/// Structured error inside an [`RpcResponse`].
#[derive(Clone, Debug, Serialize)]
pub struct RpcErrorBody {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

impl RpcResponse {
    /// Build a success response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    #[must_use]
    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcErrorBody {
                code,
                message: message.into(),
            }),
        }
    }
}

/// A method-level failure, mapped to the error envelope.
struct RpcFailure {
    code: i64,
    message: String,
}

impl RpcFailure {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
        }
    }

    fn server_error(message: impl Into<String>) -> Self {
        Self {
            code: SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<RuntimeError> for RpcFailure {
    fn from(e: RuntimeError) -> Self {
        Self::server_error(e.to_string())
    }
}

/// POST /rpc
pub async fn rpc_handler(State(state): State<AppState>, Json(body): Json<Value>) -> Json<RpcResponse> {
    let request: RpcRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return Json(RpcResponse::error(
                Value::Null,
                INVALID_REQUEST,
                format!("invalid request: {e}"),
            ));
        }
    };
    let id = request.id.clone().unwrap_or(Value::Null);
    let response = match dispatch(&state, &request).await {
        Ok(result) => RpcResponse::success(id, result),
        Err(failure) => RpcResponse::error(id, failure.code, failure.message),
    };
    Json(response)
}

#[instrument(skip_all, fields(method = %request.method))]
async fn dispatch(state: &AppState, request: &RpcRequest) -> Result<Value, RpcFailure> {
    let params = request.params.clone().unwrap_or(Value::Null);
    match request.method.as_str() {
        "messages.send" => messages_send(state, params).await,
        "sessions.create" => sessions_create(state, params),
        "sessions.list" => Ok(json!({ "sessions": state.registry.list() })),
        "sessions.get" => sessions_get(state, params).await,
        "sessions.delete" => sessions_delete(state, params).await,
        "tools.list" => tools_list(state).await,
        "providers.list" => Ok(json!({ "providers": state.providers.list().await })),
        "providers.reconnect" => providers_reconnect(state, params).await,
        _ => Err(RpcFailure {
            code: METHOD_NOT_FOUND,
            message: format!("method not found: {}", request.method),
        }),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionParams {
    session_id: SessionId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    #[serde(default)]
    session_id: Option<SessionId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendParams {
    session_id: SessionId,
    content: String,
}

fn parse<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, RpcFailure> {
    serde_json::from_value(params).map_err(|e| RpcFailure::invalid_params(e.to_string()))
}

fn sessions_create(state: &AppState, params: Value) -> Result<Value, RpcFailure> {
    let params: CreateParams = parse(params)?;
    let entry = match params.session_id {
        Some(id) => state.registry.create_with_id(id),
        None => state.registry.create(),
    };
    state.dispatcher.ensure_running(&entry);
    debug!(session_id = %entry.id, "session created via rpc");
    Ok(json!({ "session": entry.info() }))
}

async fn sessions_get(state: &AppState, params: Value) -> Result<Value, RpcFailure> {
    let params: SessionParams = parse(params)?;
    let entry = state.registry.get(&params.session_id)?;
    let messages = state.store.list(&entry.id).await?;
    Ok(json!({ "session": entry.info(), "messages": messages }))
}

async fn sessions_delete(state: &AppState, params: Value) -> Result<Value, RpcFailure> {
    let params: SessionParams = parse(params)?;
    // delete cancels any active run before the entry goes away
    state.registry.delete(&params.session_id)?;
    state.hub.remove_session(&params.session_id);
    state.store.remove(&params.session_id).await?;
    Ok(json!({ "deleted": true }))
}

async fn messages_send(state: &AppState, params: Value) -> Result<Value, RpcFailure> {
    let params: SendParams = parse(params)?;
    if params.content.trim().is_empty() {
        return Err(RpcFailure::invalid_params("content must not be empty"));
    }
    let entry = state.registry.create_with_id(params.session_id);

    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .dispatcher
        .submit(&entry, QueuedInput::with_reply(params.content, reply_tx))
        .map_err(|e| RpcFailure::server_error(e.to_string()))?;

    let outcome = reply_rx
        .await
        .map_err(|_| RpcFailure::server_error("run was abandoned"))?;
    match outcome {
        RunOutcome::Completed {
            message_id,
            content,
            usage,
        } => Ok(json!({
            "id": message_id,
            "role": "assistant",
            "response": content,
            "usage": usage,
        })),
        RunOutcome::Cancelled => Ok(json!({ "cancelled": true })),
        RunOutcome::Failed { error } => Err(RpcFailure::server_error(error)),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderParams {
    provider: String,
}

async fn providers_reconnect(state: &AppState, params: Value) -> Result<Value, RpcFailure> {
    let params: ProviderParams = parse(params)?;
    let status = state
        .providers
        .reconnect(&params.provider)
        .await
        .map_err(|e| RpcFailure::server_error(e.to_string()))?;
    let mut result =
        serde_json::to_value(&status).map_err(|e| RpcFailure::server_error(e.to_string()))?;
    if let Value::Object(ref mut map) = result {
        let _ = map.insert("provider".into(), json!(params.provider));
    }
    Ok(result)
}

async fn tools_list(state: &AppState) -> Result<Value, RpcFailure> {
    let mut definitions = state.tools.definitions();
    definitions.extend(state.providers.tool_definitions().await);
    Ok(json!({ "tools": definitions }))
}
