//! Per-connection receive loop.
//!
//! The transport layer hands [`run_session`] a stream of inbound frames and
//! a sink for outbound text. The session owns the [`Connection`], feeds each
//! frame through the [`SignalRouter`] strictly in arrival order, and spawns
//! a writer task that drains the connection's outbound queue into the sink.
//!
//! Only transport failure or close ends the loop. Decode and routing faults
//! are logged and the loop moves on to the next frame.

use std::fmt::Display;
use std::sync::Arc;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionId};
use crate::error::RelayError;
use crate::router::SignalRouter;

/// One inbound transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Peer requested close
    Close,
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// Client closed the channel
    Closed,
    /// Reading or writing failed
    Transport(RelayError),
}

/// Summary returned when a session finishes.
#[derive(Debug)]
pub struct SessionReport {
    pub id: ConnectionId,
    /// Name the connection held when it closed
    pub name: Option<String>,
    /// Frames routed successfully
    pub handled: u64,
    /// Frames dropped because of per-message faults
    pub faults: u64,
    pub end: SessionEnd,
}

/// Run one client's receive loop until its transport closes.
pub async fn run_session<I, E, O>(router: Arc<SignalRouter>, inbound: I, outbound: O) -> SessionReport
where
    I: Stream<Item = Result<Frame, E>>,
    E: Display,
    O: Sink<String> + Send + 'static,
    O::Error: Display,
{
    let (mut conn, mut rx) = Connection::channel(router.config().outbound_buffer);
    let id = conn.id();
    info!(conn_id = %id, "Session started");

    let mut writer = tokio::spawn(async move {
        let mut outbound = Box::pin(outbound);
        while let Some(reply) = rx.recv().await {
            outbound
                .send(reply.encode())
                .await
                .map_err(|e| RelayError::transport(e.to_string()))?;
        }
        Ok::<(), RelayError>(())
    });

    let mut inbound = std::pin::pin!(inbound);
    let mut handled = 0u64;
    let mut faults = 0u64;

    let end = loop {
        tokio::select! {
            frame = inbound.next() => {
                let result = match frame {
                    Some(Ok(Frame::Text(text))) => router.handle_text(&mut conn, &text),
                    Some(Ok(Frame::Binary(bytes))) => router.handle_bytes(&mut conn, &bytes),
                    Some(Ok(Frame::Close)) | None => break SessionEnd::Closed,
                    Some(Err(e)) => {
                        warn!(conn_id = %id, error = %e, "Transport read failed");
                        break SessionEnd::Transport(RelayError::transport(e.to_string()));
                    }
                };
                match result {
                    Ok(()) => handled += 1,
                    Err(err) if err.is_fatal() => break SessionEnd::Transport(err),
                    Err(_) => faults += 1,
                }
            }
            written = &mut writer => {
                let err = match written {
                    Ok(Ok(())) => RelayError::transport("outbound queue closed"),
                    Ok(Err(err)) => err,
                    Err(join) => RelayError::transport(join.to_string()),
                };
                warn!(conn_id = %id, error = %err, "Transport write failed");
                break SessionEnd::Transport(err);
            }
        }
    };

    let name = conn.name().map(str::to_string);
    router.disconnect(&mut conn);
    writer.abort();

    debug!(conn_id = %id, handled, faults, "Session finished");
    info!(conn_id = %id, name = ?name, "Session closed");

    SessionReport {
        id,
        name,
        handled,
        faults,
        end,
    }
}
