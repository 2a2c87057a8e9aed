//! # parley-signal
//!
//! Connection registry and message router for Parley, a signaling relay
//! for peer-to-peer session negotiation.
//!
//! Peers log in under a name, then exchange offers, answers and network
//! candidates with a named peer. The relay never looks inside the
//! negotiation payloads.
//!
//! ## Architecture
//!
//! - **Codec**: JSON envelope <-> [`Message`] / [`Reply`]
//! - **Connection**: one client's name, current peer and outbound queue
//! - **Registry**: name -> connection map shared by every session
//! - **Router**: per-message state machine (login, offer, answer,
//!   candidate, leave, disconnect)
//! - **Session**: receive loop driving the router over any frame
//!   stream/sink, one tokio task per client
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use parley_signal::{ConnectionRegistry, RelayConfig, SignalRouter, run_session};
//!
//! let registry = Arc::new(ConnectionRegistry::new());
//! let router = Arc::new(SignalRouter::new(registry, RelayConfig::default()));
//!
//! // For every accepted transport:
//! tokio::spawn(run_session(Arc::clone(&router), frames, sink));
//! ```

pub mod codec;
pub mod connection;
pub mod registry;
pub mod router;
pub mod session;

mod error;

pub use codec::{Message, Reply};
pub use connection::{
    Connection, ConnectionHandle, ConnectionId, ConnectionState, PeerSlot, SendResult,
};
pub use error::{DecodeError, RelayError};
pub use registry::ConnectionRegistry;
pub use router::{RelayConfig, SignalRouter};
pub use session::{run_session, Frame, SessionEnd, SessionReport};
