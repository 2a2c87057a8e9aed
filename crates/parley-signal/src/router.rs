//! Signaling state machine.
//!
//! The `SignalRouter` consumes decoded messages from one connection,
//! updates the shared [`ConnectionRegistry`] and that connection's state,
//! and enqueues replies on the sender and/or its peer.
//!
//! # State machine
//!
//! ```text
//! Anonymous --login ok--> Named --offer/answer--> Paired --leave--> Named
//!     \                     \                       \
//!      `-------------------- `---- transport close --`--> Closed
//! ```
//!
//! `offer` names its target explicitly. `answer`, `candidate` and `leave`
//! go to the sender's recorded peer; a `name` on those messages is only
//! used when no peer has been recorded yet.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::codec::{Message, Reply};
use crate::connection::{Connection, ConnectionHandle, ConnectionState, SendResult};
use crate::error::RelayError;
use crate::registry::ConnectionRegistry;

/// Tunables for the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
    /// Reply `{"type":"error"}` to malformed or out-of-order messages
    pub error_notices: bool,
    /// Send the peer a leave notice when a paired connection drops
    pub notify_peer_on_disconnect: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 256,
            error_notices: true,
            notify_peer_on_disconnect: false,
        }
    }
}

impl RelayConfig {
    pub fn with_outbound_buffer(mut self, outbound_buffer: usize) -> Self {
        self.outbound_buffer = outbound_buffer;
        self
    }

    pub fn with_error_notices(mut self, enabled: bool) -> Self {
        self.error_notices = enabled;
        self
    }

    pub fn with_notify_peer_on_disconnect(mut self, enabled: bool) -> Self {
        self.notify_peer_on_disconnect = enabled;
        self
    }
}

/// Routes signaling messages between registered connections.
#[derive(Debug)]
pub struct SignalRouter {
    registry: Arc<ConnectionRegistry>,
    config: RelayConfig,
}

impl SignalRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, config: RelayConfig) -> Self {
        info!(
            outbound_buffer = config.outbound_buffer,
            error_notices = config.error_notices,
            notify_peer_on_disconnect = config.notify_peer_on_disconnect,
            "SignalRouter initialized"
        );
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Decode and route one text frame.
    pub fn handle_text(&self, conn: &mut Connection, text: &str) -> Result<(), RelayError> {
        let result = Message::decode_str(text)
            .map_err(RelayError::from)
            .and_then(|msg| self.dispatch(conn, msg));
        self.report(conn, result)
    }

    /// Decode and route one binary frame.
    pub fn handle_bytes(&self, conn: &mut Connection, bytes: &[u8]) -> Result<(), RelayError> {
        let result = Message::decode(bytes)
            .map_err(RelayError::from)
            .and_then(|msg| self.dispatch(conn, msg));
        self.report(conn, result)
    }

    /// Route an already-decoded message.
    #[instrument(skip(self, conn, msg), fields(conn_id = %conn.id(), kind = %msg.kind()))]
    pub fn dispatch(&self, conn: &mut Connection, msg: Message) -> Result<(), RelayError> {
        if conn.state() == ConnectionState::Closed {
            return Err(RelayError::transport("connection closed"));
        }

        match msg {
            Message::Login { name } => self.login(conn, name),
            Message::Offer { target, offer } => self.offer(conn, target, offer),
            Message::Answer { answer, target } => self.answer(conn, answer, target),
            Message::Candidate { candidate, target } => self.candidate(conn, candidate, target),
            Message::Leave { target } => self.leave(conn, target),
            Message::NoOp { kind } => {
                debug!(kind = %kind, "Ignoring unknown message type");
                Ok(())
            }
        }
    }

    /// Tear down a connection whose transport has closed.
    ///
    /// Releases its name and, if configured, tells its peer it left.
    /// Calling this twice is harmless.
    #[instrument(skip(self, conn), fields(conn_id = %conn.id()))]
    pub fn disconnect(&self, conn: &mut Connection) {
        if conn.state() == ConnectionState::Closed {
            return;
        }
        conn.mark_closed();

        let Some(name) = conn.name().map(str::to_string) else {
            debug!("Anonymous connection closed");
            return;
        };

        self.registry.unregister(&name, conn.id());
        let peer = conn.peer().clear();
        info!(name = %name, peer = ?peer, "Connection closed");

        if !self.config.notify_peer_on_disconnect {
            return;
        }
        if let Some(handle) = peer.and_then(|p| self.registry.lookup(&p)) {
            if handle.peer().clear_if(&name) {
                debug!(peer = %handle.name(), "Notifying peer of disconnect");
                handle.send(Reply::Leave);
            }
        }
    }

    fn login(&self, conn: &mut Connection, name: String) -> Result<(), RelayError> {
        if let Some(current) = conn.name() {
            let err = RelayError::InvalidLogin(format!("already logged in as '{}'", current));
            conn.send(Reply::Login { success: false });
            return Err(err);
        }
        if name.is_empty() {
            conn.send(Reply::Login { success: false });
            return Err(RelayError::InvalidLogin("empty name".to_string()));
        }

        if !self.registry.register(&name, conn) {
            info!(name = %name, "Login rejected, name taken");
            conn.send(Reply::Login { success: false });
            return Err(RelayError::RegistrationConflict(name));
        }

        info!(name = %name, "User logged in");
        conn.set_name(name);
        conn.send(Reply::Login { success: true });
        Ok(())
    }

    fn offer(&self, conn: &mut Connection, target: String, offer: Value) -> Result<(), RelayError> {
        let own = self.require_name(conn)?;
        if target == own {
            return Err(RelayError::TargetUnreachable(target));
        }

        let handle = self
            .registry
            .lookup(&target)
            .ok_or_else(|| RelayError::TargetUnreachable(target.clone()))?;

        debug!(from = %own, to = %target, "Relaying offer");
        self.deliver(
            &handle,
            Reply::Offer {
                offer,
                name: own.clone(),
            },
        )?;
        pair(conn, &own, &handle);
        Ok(())
    }

    fn answer(
        &self,
        conn: &mut Connection,
        answer: Value,
        target: Option<String>,
    ) -> Result<(), RelayError> {
        let own = self.require_name(conn)?;
        let handle = self.resolve_peer(conn, target)?;

        debug!(from = %own, to = %handle.name(), "Relaying answer");
        self.deliver(&handle, Reply::Answer { answer })?;
        pair(conn, &own, &handle);
        Ok(())
    }

    fn candidate(
        &self,
        conn: &mut Connection,
        candidate: Value,
        target: Option<String>,
    ) -> Result<(), RelayError> {
        let own = self.require_name(conn)?;
        let peer = self.peer_target(conn, target)?;

        debug!(from = %own, to = %peer, "Relaying candidate");
        match self.registry.send_to(&peer, Reply::Candidate { candidate }) {
            SendResult::Sent => Ok(()),
            _ => Err(RelayError::TargetUnreachable(peer)),
        }
    }

    fn leave(&self, conn: &mut Connection, target: Option<String>) -> Result<(), RelayError> {
        let own = self.require_name(conn)?;
        let Some(peer) = conn.peer().clear().or(target) else {
            debug!(name = %own, "Leave without a peer");
            return Ok(());
        };

        let handle = self
            .registry
            .lookup(&peer)
            .ok_or_else(|| RelayError::TargetUnreachable(peer.clone()))?;

        if !handle.peer().clear_if(&own) {
            debug!(name = %own, peer = %peer, "Peer already paired elsewhere");
            return Ok(());
        }
        info!(name = %own, peer = %peer, "Leaving peer");
        self.deliver(&handle, Reply::Leave)
    }

    fn require_name(&self, conn: &Connection) -> Result<String, RelayError> {
        conn.name()
            .map(str::to_string)
            .ok_or(RelayError::NotLoggedIn)
    }

    /// Recorded peer first, then the explicit name from the message.
    fn peer_target(&self, conn: &Connection, explicit: Option<String>) -> Result<String, RelayError> {
        conn.peer_name()
            .or(explicit)
            .ok_or_else(|| RelayError::TargetUnreachable("<no peer>".to_string()))
    }

    fn resolve_peer(
        &self,
        conn: &Connection,
        explicit: Option<String>,
    ) -> Result<ConnectionHandle, RelayError> {
        let name = self.peer_target(conn, explicit)?;
        self.registry
            .lookup(&name)
            .ok_or(RelayError::TargetUnreachable(name))
    }

    fn deliver(&self, handle: &ConnectionHandle, reply: Reply) -> Result<(), RelayError> {
        if handle.send(reply).is_sent() {
            Ok(())
        } else {
            Err(RelayError::TargetUnreachable(handle.name().to_string()))
        }
    }

    /// Log a per-message fault and notify the sender if configured.
    fn report(&self, conn: &Connection, result: Result<(), RelayError>) -> Result<(), RelayError> {
        if let Err(err) = &result {
            match err {
                RelayError::TargetUnreachable(target) => {
                    debug!(conn_id = %conn.id(), target = %target, "Dropping relay to unreachable peer");
                }
                RelayError::Decode(_) | RelayError::NotLoggedIn => {
                    debug!(conn_id = %conn.id(), error = %err, "Rejected message");
                    if self.config.error_notices {
                        conn.send(Reply::error(err));
                    }
                }
                _ => debug!(conn_id = %conn.id(), error = %err, "Message not applied"),
            }
        }
        result
    }
}

fn pair(conn: &Connection, own: &str, handle: &ConnectionHandle) {
    conn.peer().set(handle.name());
    handle.peer().set(own);
}
