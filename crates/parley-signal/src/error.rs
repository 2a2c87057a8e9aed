//! Error types for the signaling relay.
//!
//! Every error here is scoped to a single connection. The session loop
//! logs and continues on all of them except [`RelayError::Transport`],
//! which ends that connection only.

use thiserror::Error;

/// Failure to turn an inbound frame into a [`Message`](crate::Message).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Frame is not valid JSON, or not a JSON object
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Binary frame that is not UTF-8 text
    #[error("message is not valid UTF-8")]
    NotUtf8,

    /// A field required by the message type is absent or null
    #[error("missing required field '{field}' for '{kind}' message")]
    MissingField {
        /// Message type being decoded
        kind: &'static str,
        /// Name of the absent field
        field: &'static str,
    },
}

impl DecodeError {
    pub(crate) fn missing(kind: &'static str, field: &'static str) -> Self {
        Self::MissingField { kind, field }
    }
}

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Inbound frame could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Login name is already held by another connection
    #[error("name '{0}' is already registered")]
    RegistrationConflict(String),

    /// Login name is empty or the connection is already logged in
    #[error("invalid login: {0}")]
    InvalidLogin(String),

    /// Addressed peer is not registered
    #[error("peer '{0}' is not reachable")]
    TargetUnreachable(String),

    /// Message requires a successful login first
    #[error("connection is not logged in")]
    NotLoggedIn,

    /// Channel read/write failure or close
    #[error("transport error: {0}")]
    Transport(String),
}

impl RelayError {
    /// Create a new transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Whether this error ends the connection's receive loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
