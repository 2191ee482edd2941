//! `StrandServer`: Axum HTTP + SSE server.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use strand_llm::Provider;
use strand_mcp::ProviderManager;
use strand_runtime::{
    Dispatcher, MessageStore, PermissionChecker, RunConfig, RunCoordinator, SessionRegistry,
    StreamHub,
};
use strand_tools::ToolRegistry;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::rpc;
use crate::stream;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: ServerConfig,
    /// Live sessions.
    pub registry: Arc<SessionRegistry>,
    /// Event fan-out.
    pub hub: Arc<StreamHub>,
    /// Run coordinator.
    pub coordinator: Arc<RunCoordinator>,
    /// Per-session dispatch tasks.
    pub dispatcher: Arc<Dispatcher>,
    /// External tool providers.
    pub providers: Arc<ProviderManager>,
    /// Built-in tool registry.
    pub tools: Arc<ToolRegistry>,
    /// Conversation history.
    pub store: Arc<dyn MessageStore>,
    /// When the server started.
    pub start_time: Instant,
}

impl AppState {
    /// Wire the runtime together from its collaborators.
    pub fn new(
        config: ServerConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        providers: Arc<ProviderManager>,
        store: Arc<dyn MessageStore>,
        permissions: Arc<dyn PermissionChecker>,
        run_config: RunConfig,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::with_queue_capacity(config.queue_capacity));
        let hub = Arc::new(StreamHub::with_buffer(config.subscriber_buffer));
        let coordinator = Arc::new(RunCoordinator::new(
            provider,
            tools.clone(),
            store.clone(),
            permissions,
            hub.clone(),
            run_config,
        ));
        let dispatcher = Arc::new(Dispatcher::new(coordinator.clone(), hub.clone()));
        Self {
            config,
            registry,
            hub,
            coordinator,
            dispatcher,
            providers,
            tools,
            store,
            start_time: Instant::now(),
        }
    }
}

/// The main Strand server.
pub struct StrandServer {
    state: AppState,
}

impl StrandServer {
    /// Create a server around pre-wired state.
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/rpc", post(rpc::rpc_handler))
            .route("/stream", get(stream::stream_get).post(stream::stream_post))
            .route("/stream/{session}/message", post(stream::post_message))
            .route("/stream/{session}/pause", post(stream::post_pause))
            .route("/stream/{session}/resume", post(stream::post_resume))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Shared state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind and serve until `shutdown` resolves, then tear down
    /// dispatch tasks and provider connections.
    pub async fn serve<F>(&self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.state.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "strand server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        self.state.dispatcher.shutdown();
        self.state.providers.shutdown().await;
        info!("strand server stopped");
        Ok(())
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let resp = health::health_check(
        state.start_time,
        state.hub.total_subscribers(),
        state.registry.len(),
    );
    Json(resp)
}
