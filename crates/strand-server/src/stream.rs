//! SSE streaming surface.
//!
//! `GET|POST /stream` opens an event stream for a session (creating it
//! on first contact) and optionally enqueues an initial prompt. The
//! subscriber detaches when the client goes away; the response stream
//! owns the detach.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use strand_core::ids::{SessionId, SubscriberId};
use strand_runtime::{QueueError, QueuedInput, StreamHub};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StreamParams {
    session_id: SessionId,
    #[serde(default)]
    content: Option<String>,
}

/// Detaches the subscriber when the SSE response is dropped.
struct DetachOnDrop {
    hub: Arc<StreamHub>,
    session_id: SessionId,
    subscriber_id: SubscriberId,
    has_active_run: Box<dyn Fn() -> bool + Send>,
}

impl Drop for DetachOnDrop {
    fn drop(&mut self) {
        self.hub.detach(&self.session_id, &self.subscriber_id);
        self.hub
            .maybe_gc(&self.session_id, (self.has_active_run)());
        debug!(session_id = %self.session_id, "sse client disconnected");
    }
}

/// GET /stream?sessionId=...&content=...
pub async fn stream_get(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    open_stream(state, params)
}

/// POST /stream with a JSON body.
pub async fn stream_post(
    State(state): State<AppState>,
    Json(params): Json<StreamParams>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    open_stream(state, params)
}

fn open_stream(
    state: AppState,
    params: StreamParams,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<serde_json::Value>)>
{
    let entry = state.registry.create_with_id(params.session_id);
    state.dispatcher.ensure_running(&entry);

    let mut subscriber = state.hub.attach(&entry.id);

    if let Some(content) = params.content {
        if !content.trim().is_empty() {
            if let Err(e) = state
                .dispatcher
                .submit(&entry, QueuedInput::fire_and_forget(content))
            {
                state.hub.detach(&entry.id, &subscriber.id);
                return Err(queue_error_response(&e));
            }
        }
    }

    let guard = DetachOnDrop {
        hub: state.hub.clone(),
        session_id: entry.id.clone(),
        subscriber_id: subscriber.id.clone(),
        has_active_run: {
            let entry = entry.clone();
            Box::new(move || entry.has_active_run())
        },
    };
    let keep_alive_secs = state.config.keep_alive_secs;

    let stream = async_stream::stream! {
        // Moved in so the subscriber detaches when the client drops
        let _guard = guard;
        while let Some(event) = subscriber.recv().await {
            match Event::default().event(event.event_name()).json_data(&event) {
                Ok(sse_event) => yield Ok::<_, Infallible>(sse_event),
                Err(e) => warn!(error = %e, "failed to serialize sse event"),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(keep_alive_secs))
            .text("keep-alive"),
    ))
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageBody {
    content: String,
}

/// POST /stream/{session}/message
pub async fn post_message(
    State(state): State<AppState>,
    Path(session): Path<SessionId>,
    Json(body): Json<MessageBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, Json<serde_json::Value>)> {
    let entry = state
        .registry
        .get(&session)
        .map_err(|e| (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))))?;

    state
        .dispatcher
        .submit(&entry, QueuedInput::fire_and_forget(body.content))
        .map_err(|e| queue_error_response(&e))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "queued": entry.queue.len() })),
    ))
}

/// POST /stream/{session}/pause
pub async fn post_pause(
    State(state): State<AppState>,
    Path(session): Path<SessionId>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let entry = state
        .registry
        .get(&session)
        .map_err(|e| (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))))?;
    entry.pause();
    Ok(Json(json!({ "paused": true })))
}

/// POST /stream/{session}/resume
pub async fn post_resume(
    State(state): State<AppState>,
    Path(session): Path<SessionId>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let entry = state
        .registry
        .get(&session)
        .map_err(|e| (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))))?;
    entry.resume();
    Ok(Json(json!({ "paused": false })))
}

fn queue_error_response(e: &QueueError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match e {
        QueueError::QueueFull { .. } => StatusCode::TOO_MANY_REQUESTS,
        QueueError::Closed => StatusCode::GONE,
    };
    (status, Json(json!({ "error": e.to_string() })))
}
