//! Envelope wire model.
//!
//! Every frame a hub sends to a client is an [`Envelope`]. On the wire it is
//! a flat JSON object:
//!
//! ```json
//! {"type":"message","data":{...},"chat_id":42,"user_id":1,"time":"2026-01-01T00:00:00Z"}
//! ```
//!
//! Chat envelopes carry `chat_id` (the conversation) and `user_id` (the
//! sender). Notification envelopes omit `chat_id` and carry the recipient in
//! `user_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::errors::EnvelopeError;

/// Sender id stamped on envelopes the server originates itself.
pub const SYSTEM_SENDER: i64 = 0;

/// The fan-out key an envelope is addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A chat conversation id.
    Chat(i64),
    /// A notification recipient's user id.
    User(i64),
}

impl Scope {
    /// The raw integer key.
    pub fn id(self) -> i64 {
        match self {
            Self::Chat(id) | Self::User(id) => id,
        }
    }
}

/// Typed payload, one variant per known outbound `type`.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Registration acknowledgement.
    Connected {
        /// Human-readable confirmation text.
        message: String,
    },
    /// A chat message, already persisted by the caller.
    Message(Value),
    /// Typing indicator relayed to the other participants.
    Typing {
        /// Who is typing.
        user_id: i64,
        /// `false` once the user stopped typing.
        is_typing: bool,
    },
    /// Reply to an application-level `ping`.
    Pong,
    /// Protocol-level error reported to the client.
    Error {
        /// Description of the problem.
        message: String,
    },
    /// Any other `type`, passed through untouched.
    Custom {
        /// The wire `type` string.
        kind: String,
        /// The wire `data` value.
        data: Value,
    },
}

impl Payload {
    /// The wire `type` string.
    pub fn kind(&self) -> &str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Message(_) => "message",
            Self::Typing { .. } => "typing",
            Self::Pong => "pong",
            Self::Error { .. } => "error",
            Self::Custom { kind, .. } => kind,
        }
    }

    /// The wire `data` value.
    pub fn data(&self) -> Value {
        match self {
            Self::Connected { message } | Self::Error { message } => json!({ "message": message }),
            Self::Message(data) | Self::Custom { data, .. } => data.clone(),
            Self::Typing { user_id, is_typing } => {
                json!({ "user_id": user_id, "is_typing": is_typing })
            }
            Self::Pong => Value::Null,
        }
    }

    /// Rebuild a payload from its wire parts.
    ///
    /// Known types whose `data` does not have the expected shape fall back
    /// to [`Payload::Custom`] so nothing is lost.
    pub fn from_parts(kind: String, data: Value) -> Self {
        match kind.as_str() {
            "connected" => match message_field(&data) {
                Some(message) => Self::Connected { message },
                None => Self::Custom { kind, data },
            },
            "error" => match message_field(&data) {
                Some(message) => Self::Error { message },
                None => Self::Custom { kind, data },
            },
            "message" => Self::Message(data),
            "pong" => Self::Pong,
            "typing" => {
                let user_id = data.get("user_id").and_then(Value::as_i64);
                let is_typing = data.get("is_typing").and_then(Value::as_bool);
                match (user_id, is_typing) {
                    (Some(user_id), Some(is_typing)) => Self::Typing { user_id, is_typing },
                    _ => Self::Custom { kind, data },
                }
            }
            _ => Self::Custom { kind, data },
        }
    }
}

fn message_field(data: &Value) -> Option<String> {
    data.get("message").and_then(Value::as_str).map(str::to_owned)
}

/// An immutable message addressed to one scope.
///
/// Hubs clone an envelope once per recipient; nothing mutates it after
/// construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEnvelope", try_from = "WireEnvelope")]
pub struct Envelope {
    scope: Scope,
    sender_id: i64,
    payload: Payload,
    time: DateTime<Utc>,
}

impl Envelope {
    /// Build an envelope stamped with the current time.
    pub fn new(scope: Scope, sender_id: i64, payload: Payload) -> Self {
        Self::at(scope, sender_id, payload, Utc::now())
    }

    /// Build an envelope with an explicit timestamp.
    pub fn at(scope: Scope, sender_id: i64, payload: Payload, time: DateTime<Utc>) -> Self {
        Self {
            scope,
            sender_id,
            payload,
            time,
        }
    }

    /// A server-originated envelope (sender [`SYSTEM_SENDER`]).
    pub fn system(scope: Scope, payload: Payload) -> Self {
        Self::new(scope, SYSTEM_SENDER, payload)
    }

    /// Scope the envelope is addressed to.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Originating user id, or [`SYSTEM_SENDER`].
    pub fn sender_id(&self) -> i64 {
        self.sender_id
    }

    /// Typed payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Wire `type` string.
    pub fn kind(&self) -> &str {
        self.payload.kind()
    }

    /// Creation timestamp.
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Serialize to the JSON text sent over the transport.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Flat JSON shape of an [`Envelope`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireEnvelope {
    /// Message type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload.
    #[serde(default)]
    pub data: Value,
    /// Conversation id, present on chat envelopes only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    /// Sender (chat) or recipient (notifications).
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Creation timestamp.
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
}

impl From<Envelope> for WireEnvelope {
    fn from(envelope: Envelope) -> Self {
        let (chat_id, user_id) = match envelope.scope {
            Scope::Chat(chat_id) => (Some(chat_id), envelope.sender_id),
            Scope::User(user_id) => (None, user_id),
        };
        Self {
            kind: envelope.payload.kind().to_owned(),
            data: envelope.payload.data(),
            chat_id,
            user_id: Some(user_id),
            time: Some(envelope.time),
        }
    }
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = EnvelopeError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        let (scope, sender_id) = match (wire.chat_id, wire.user_id) {
            (Some(chat_id), sender) => (Scope::Chat(chat_id), sender.unwrap_or(SYSTEM_SENDER)),
            (None, Some(user_id)) => (Scope::User(user_id), SYSTEM_SENDER),
            (None, None) => return Err(EnvelopeError::MissingScope { kind: wire.kind }),
        };
        Ok(Self {
            scope,
            sender_id,
            payload: Payload::from_parts(wire.kind, wire.data),
            time: wire.time.unwrap_or_else(Utc::now),
        })
    }
}
