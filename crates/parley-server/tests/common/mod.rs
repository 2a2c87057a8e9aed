//! Test utilities for end-to-end relay tests.
//!
//! Starts the server on an ephemeral port and drives it with
//! `tokio-tungstenite` clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parley_server::{serve, AppState, ServerConfig};
use parley_signal::Reply;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait before concluding nothing was delivered.
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// A running server bound to localhost.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(ServerConfig::default()).await
    }

    pub async fn start_with(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(AppState::from_config(&config));

        let served = Arc::clone(&state);
        tokio::spawn(async move {
            serve(listener, served, &config).await.unwrap();
        });

        Self { addr, state }
    }

    pub async fn connect(&self) -> TestClient {
        let url = format!("ws://{}/websocket", self.addr);
        let (ws, _) = timeout(DEFAULT_TIMEOUT, connect_async(url))
            .await
            .expect("connect timed out")
            .expect("WebSocket handshake failed");
        TestClient { ws }
    }

    /// Wait until the registry holds exactly `names`.
    pub async fn wait_for_peers(&self, names: &[&str]) {
        let expected: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        timeout(DEFAULT_TIMEOUT, async {
            loop {
                if self.state.router.registry().snapshot() == expected {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("registry never reached expected names");
    }
}

/// One WebSocket client.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    pub async fn send_text(&mut self, text: &str) {
        self.ws.send(Message::Text(text.into())).await.unwrap();
    }

    pub async fn send_json(&mut self, value: serde_json::Value) {
        self.send_text(&value.to_string()).await;
    }

    /// Next reply from the server.
    pub async fn recv(&mut self) -> Reply {
        let raw = self.recv_raw().await;
        Reply::decode_str(&raw).unwrap_or_else(|e| panic!("bad reply {}: {}", raw, e))
    }

    /// Next text frame from the server as JSON.
    pub async fn recv_value(&mut self) -> serde_json::Value {
        serde_json::from_str(&self.recv_raw().await).unwrap()
    }

    async fn recv_raw(&mut self) -> String {
        loop {
            let msg = timeout(DEFAULT_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for reply")
                .expect("connection closed")
                .expect("WebSocket error");
            if let Message::Text(text) = msg {
                return text.as_str().to_string();
            }
        }
    }

    /// Assert that nothing arrives within [`QUIET_PERIOD`].
    pub async fn expect_silence(&mut self) {
        if let Ok(Some(Ok(Message::Text(text)))) = timeout(QUIET_PERIOD, self.ws.next()).await {
            panic!("unexpected message: {}", text.as_str());
        }
    }

    pub async fn login(&mut self, name: &str) -> bool {
        self.send_json(serde_json::json!({"type": "login", "name": name}))
            .await;
        match self.recv().await {
            Reply::Login { success } => success,
            other => panic!("expected login reply, got {:?}", other),
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
