//! Wire codec for signaling messages.
//!
//! Every frame is one JSON object with a `type` discriminator:
//!
//! ```text
//! { "type": "login" | "offer" | "answer" | "candidate" | "leave",
//!   "name": string,
//!   "offer": <opaque>, "answer": <opaque>, "candidate": <opaque> }
//! ```
//!
//! Client frames decode into [`Message`]; server frames are [`Reply`].
//! Negotiation payloads stay `serde_json::Value` end to end and are never
//! inspected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

/// A message sent by a client.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Register this connection under `name`
    Login { name: String },
    /// Invite `target` with a session description
    Offer { target: String, offer: Value },
    /// Accept the current peer's offer. `target` is only used when the
    /// connection has no recorded peer.
    Answer { answer: Value, target: Option<String> },
    /// Forward a network candidate to the current peer
    Candidate {
        candidate: Value,
        target: Option<String>,
    },
    /// Hang up on the current peer
    Leave { target: Option<String> },
    /// Unknown message type, ignored by the router
    NoOp { kind: String },
}

impl Message {
    /// Wire name of this message's type.
    pub fn kind(&self) -> &str {
        match self {
            Message::Login { .. } => "login",
            Message::Offer { .. } => "offer",
            Message::Answer { .. } => "answer",
            Message::Candidate { .. } => "candidate",
            Message::Leave { .. } => "leave",
            Message::NoOp { kind } => kind,
        }
    }

    /// Decode a message from raw frame bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotUtf8)?;
        Self::decode_str(text)
    }

    /// Decode a message from a text frame.
    pub fn decode_str(text: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        envelope.try_into()
    }

    /// Encode this message as a JSON text frame.
    pub fn encode(&self) -> String {
        let envelope = Envelope::from(self.clone());
        // Envelope holds only strings and JSON values, serialization cannot fail
        serde_json::to_string(&envelope).unwrap_or_default()
    }
}

/// Flat wire shape shared by every client message type.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    offer: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    answer: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    candidate: Option<Value>,
}

/// A payload field that is on the wire, `null` included, is `Some`.
/// Only an absent field falls back to the `None` default.
fn present<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl TryFrom<Envelope> for Message {
    type Error = DecodeError;

    fn try_from(env: Envelope) -> Result<Self, Self::Error> {
        let kind = env
            .kind
            .ok_or_else(|| DecodeError::missing("message", "type"))?;

        let message = match kind.as_str() {
            "login" => Message::Login {
                name: env.name.ok_or_else(|| DecodeError::missing("login", "name"))?,
            },
            "offer" => Message::Offer {
                target: env.name.ok_or_else(|| DecodeError::missing("offer", "name"))?,
                offer: env
                    .offer
                    .ok_or_else(|| DecodeError::missing("offer", "offer"))?,
            },
            "answer" => Message::Answer {
                answer: env
                    .answer
                    .ok_or_else(|| DecodeError::missing("answer", "answer"))?,
                target: env.name,
            },
            "candidate" => Message::Candidate {
                candidate: env
                    .candidate
                    .ok_or_else(|| DecodeError::missing("candidate", "candidate"))?,
                target: env.name,
            },
            "leave" => Message::Leave { target: env.name },
            _ => Message::NoOp { kind },
        };

        Ok(message)
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        let mut env = Envelope {
            kind: Some(message.kind().to_string()),
            ..Default::default()
        };
        match message {
            Message::Login { name } => env.name = Some(name),
            Message::Offer { target, offer } => {
                env.name = Some(target);
                env.offer = Some(offer);
            }
            Message::Answer { answer, target } => {
                env.name = target;
                env.answer = Some(answer);
            }
            Message::Candidate { candidate, target } => {
                env.name = target;
                env.candidate = Some(candidate);
            }
            Message::Leave { target } => env.name = target,
            Message::NoOp { .. } => {}
        }
        env
    }
}

/// A message sent by the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Reply {
    /// Login acknowledgement; `success` travels as `"true"`/`"false"`
    Login {
        #[serde(with = "string_flag")]
        success: bool,
    },
    /// Relayed offer, `name` is the caller
    Offer { offer: Value, name: String },
    /// Relayed answer
    Answer { answer: Value },
    /// Relayed candidate
    Candidate { candidate: Value },
    /// Peer hung up
    Leave,
    /// Per-message fault notice
    Error { message: String },
}

impl Reply {
    /// Encode this reply as a JSON text frame.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode a server frame. Used by clients and tests.
    pub fn decode_str(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build an error notice from anything displayable.
    pub fn error(err: impl std::fmt::Display) -> Self {
        Reply::Error {
            message: err.to_string(),
        }
    }
}

mod string_flag {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "true" } else { "false" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(de::Error::invalid_value(
                de::Unexpected::Str(other),
                &"\"true\" or \"false\"",
            )),
        }
    }
}
