//! # parley-server
//!
//! HTTP front end for the Parley signaling relay: WebSocket upgrade at
//! `/websocket`, the browser UI at `/` and `/static/`, plus health and
//! registry diagnostics.

pub mod config;
pub mod server;
pub mod telemetry;

pub use config::{Cli, ConfigError, LogFormat, ServerConfig};
pub use server::{create_router, serve, start, AppState};
