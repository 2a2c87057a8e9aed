//! Signaling over WebSocket.
//!
//! Each upgraded socket becomes one relay session: text and binary frames
//! are fed to the signaling router, replies go back as text frames.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{future, SinkExt, StreamExt};
use parley_signal::{run_session, Frame, SessionEnd};
use tracing::{info, warn};

use crate::server::AppState;

/// Create the WebSocket router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/websocket", get(websocket_handler))
        .with_state(state)
}

/// GET /websocket
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("Client subscribed");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();

    let inbound = receiver.filter_map(|msg| {
        future::ready(match msg {
            Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
            Ok(Message::Binary(bytes)) => Some(Ok(Frame::Binary(bytes))),
            Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
            // axum answers pings itself
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
            Err(e) => Some(Err(e)),
        })
    });
    let outbound = sender.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text))));

    let report = run_session(Arc::clone(&state.router), inbound, outbound).await;
    match report.end {
        SessionEnd::Closed => info!(
            conn_id = %report.id,
            name = ?report.name,
            handled = report.handled,
            faults = report.faults,
            "WebSocket connection closed"
        ),
        SessionEnd::Transport(err) => warn!(
            conn_id = %report.id,
            name = ?report.name,
            error = %err,
            "WebSocket connection dropped"
        ),
    }
}
