//! Read-only view of the connection registry.

use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};

use crate::server::AppState;

/// Response for GET /api/v1/peers
#[derive(Debug, Serialize, Deserialize)]
pub struct PeersResponse {
    /// Registered names, sorted
    pub peers: Vec<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/peers", get(list_peers))
        .with_state(state)
}

async fn list_peers(State(state): State<Arc<AppState>>) -> Json<PeersResponse> {
    Json(PeersResponse {
        peers: state.router.registry().snapshot(),
    })
}
