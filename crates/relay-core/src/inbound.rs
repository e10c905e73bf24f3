//! Client-to-server frames.
//!
//! Clients only send a `type`; every other field is ignored. Unknown types
//! are kept as [`Inbound::Unknown`] rather than rejected.

use serde::Deserialize;

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Application-level liveness probe.
    Ping,
    /// The user started typing.
    Typing,
    /// The user stopped typing.
    StopTyping,
    /// The user has read the conversation.
    Read,
    /// Any other type.
    Unknown(String),
}

#[derive(Deserialize)]
struct InboundWire {
    #[serde(rename = "type", default)]
    kind: String,
}

impl Inbound {
    /// Decode a text frame. Fails only when the frame is not a JSON object.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let wire: InboundWire = serde_json::from_str(text)?;
        Ok(Self::from_kind(wire.kind))
    }

    /// Map a wire `type` string to its variant.
    pub fn from_kind(kind: String) -> Self {
        match kind.as_str() {
            "ping" => Self::Ping,
            "typing" => Self::Typing,
            "stop_typing" => Self::StopTyping,
            "read" => Self::Read,
            _ => Self::Unknown(kind),
        }
    }
}
