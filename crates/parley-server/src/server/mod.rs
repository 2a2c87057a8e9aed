use std::sync::Arc;

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, response::Json, routing::get, Router};
use parley_signal::{ConnectionRegistry, SignalRouter};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use crate::config::ServerConfig;

mod routes;

pub use routes::peers::PeersResponse;

/// Server application state
pub struct AppState {
    /// Signaling router, shared by every WebSocket session
    pub router: Arc<SignalRouter>,
}

impl AppState {
    pub fn new(router: Arc<SignalRouter>) -> Self {
        Self { router }
    }

    /// Fresh state with an empty registry.
    pub fn from_config(config: &ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self::new(Arc::new(SignalRouter::new(registry, config.relay.clone())))
    }
}

/// Start the HTTP server
pub async fn start(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("Starting Axum HTTP server on {}", listener.local_addr()?);

    let state = Arc::new(AppState::from_config(&config));
    serve(listener, state, &config).await
}

/// Serve on an already-bound listener until it fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>, config: &ServerConfig) -> Result<()> {
    let app = create_router(state, config);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let index = ServeFile::new(config.ui_dir.join("index.html"));
    let assets = ServeDir::new(config.ui_dir.join("static"));

    Router::new()
        .route("/health", get(health_handler))
        .with_state(Arc::clone(&state))
        .merge(routes::websocket::router(Arc::clone(&state)))
        .merge(routes::peers::router(state))
        .route_service("/", index)
        .nest_service("/static", assets)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
}

/// Simple health check endpoint (for load balancers)
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "parley-server",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.router.registry().len(),
    }))
}
