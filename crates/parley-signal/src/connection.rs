//! Per-client connection state.
//!
//! A [`Connection`] is owned by the receive loop of one client. Once it
//! logs in, a cheap [`ConnectionHandle`] clone is stored in the registry so
//! other loops can enqueue replies to it and pair/unpair it.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::codec::Reply;

/// Unique identity of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a connection as seen by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not logged in yet
    Anonymous,
    /// Logged in, no current peer
    Named,
    /// Logged in with a recorded peer
    Paired,
    /// Transport closed
    Closed,
}

/// Result of attempting to enqueue a reply for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// Reply was queued for delivery
    Sent,
    /// The recipient is not registered
    NotConnected,
    /// The recipient's outbound queue is full (backpressure)
    ChannelFull,
    /// The recipient's writer has gone away
    ChannelClosed,
}

impl SendResult {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendResult::Sent)
    }
}

/// Name of the current peer, shared between a connection and its
/// registry handle so the router of another connection can update it.
#[derive(Debug, Clone, Default)]
pub struct PeerSlot(Arc<Mutex<Option<String>>>);

impl PeerSlot {
    /// Current peer name, if paired.
    pub fn get(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Record `name` as the current peer.
    pub fn set(&self, name: impl Into<String>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(name.into());
    }

    /// Forget the current peer, returning it.
    pub fn clear(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Forget the current peer only if it is `name`.
    ///
    /// Returns true if the slot was cleared.
    pub fn clear_if(&self, name: &str) -> bool {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_deref() == Some(name) {
            *slot = None;
            true
        } else {
            false
        }
    }
}

/// Shared, clonable view of a logged-in connection.
///
/// This is what the registry stores. It never owns the transport.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    name: String,
    sender: mpsc::Sender<Reply>,
    peer: PeerSlot,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Name this connection is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared peer slot of the connection.
    pub fn peer(&self) -> &PeerSlot {
        &self.peer
    }

    /// Enqueue a reply without waiting.
    pub fn send(&self, reply: Reply) -> SendResult {
        try_enqueue(&self.sender, &self.id, reply)
    }
}

/// One client's connection, owned by its receive loop.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    name: Option<String>,
    peer: PeerSlot,
    sender: mpsc::Sender<Reply>,
    closed: bool,
}

impl Connection {
    /// Wrap an outbound queue in a new anonymous connection.
    pub fn new(sender: mpsc::Sender<Reply>) -> Self {
        Self {
            id: ConnectionId::new(),
            name: None,
            peer: PeerSlot::default(),
            sender,
            closed: false,
        }
    }

    /// Create a connection together with the receiving end of its
    /// outbound queue.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Reply>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Registered name, `None` until login succeeds.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Current peer name, `None` if unpaired.
    pub fn peer_name(&self) -> Option<String> {
        self.peer.get()
    }

    pub fn peer(&self) -> &PeerSlot {
        &self.peer
    }

    pub fn state(&self) -> ConnectionState {
        if self.closed {
            ConnectionState::Closed
        } else if self.name.is_none() {
            ConnectionState::Anonymous
        } else if self.peer.get().is_none() {
            ConnectionState::Named
        } else {
            ConnectionState::Paired
        }
    }

    /// Enqueue a reply to this connection's own client.
    pub fn send(&self, reply: Reply) -> SendResult {
        try_enqueue(&self.sender, &self.id, reply)
    }

    /// Registry handle for this connection under `name`.
    pub(crate) fn handle_for(&self, name: &str) -> ConnectionHandle {
        ConnectionHandle {
            id: self.id,
            name: name.to_string(),
            sender: self.sender.clone(),
            peer: self.peer.clone(),
        }
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
    }
}

fn try_enqueue(sender: &mpsc::Sender<Reply>, id: &ConnectionId, reply: Reply) -> SendResult {
    match sender.try_send(reply) {
        Ok(()) => SendResult::Sent,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(conn_id = %id, "Outbound queue full, dropping reply");
            SendResult::ChannelFull
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(conn_id = %id, "Outbound queue closed, connection may have dropped");
            SendResult::ChannelClosed
        }
    }
}
