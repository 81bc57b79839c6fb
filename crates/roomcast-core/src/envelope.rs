//! Inbound envelope decoding.
//!
//! A frame is a JSON object with a reserved `type` discriminator and, for
//! room-scoped operations, a reserved `room` field. Every other key is opaque
//! application payload. Reserved keys are stripped before a payload is
//! forwarded, for every control type.

use serde_json::{Map, Value};

use crate::errors::ProtocolError;

/// Reserved discriminator key.
pub const TYPE_FIELD: &str = "type";
/// Reserved room key.
pub const ROOM_FIELD: &str = "room";

/// Application payload delivered to recipients.
pub type Payload = Map<String, Value>;

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Join `room`, leaving any previously joined room.
    Join {
        /// Target room.
        room: String,
    },
    /// Leave `room`.
    Leave {
        /// Target room.
        room: String,
    },
    /// Tear down the sending connection.
    Disconnect,
    /// Deliver `payload` to every other member of `room`.
    Multicast {
        /// Target room.
        room: String,
        /// Payload with reserved keys removed.
        payload: Payload,
    },
    /// Deliver `payload` to every other registered connection.
    Broadcast {
        /// Payload with reserved keys removed.
        payload: Payload,
    },
}

impl Envelope {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Decode an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut fields) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let kind = match fields.remove(TYPE_FIELD) {
            None => return Err(ProtocolError::MissingType),
            Some(Value::String(kind)) if kind.is_empty() => return Err(ProtocolError::MissingType),
            Some(Value::String(kind)) => kind,
            Some(_) => return Err(ProtocolError::InvalidField(TYPE_FIELD)),
        };
        let room = fields.remove(ROOM_FIELD);

        match kind.as_str() {
            "join" => Ok(Self::Join {
                room: require_room(room)?,
            }),
            "leave" => Ok(Self::Leave {
                room: require_room(room)?,
            }),
            "disconnect" => Ok(Self::Disconnect),
            "multicast" => Ok(Self::Multicast {
                room: require_room(room)?,
                payload: fields,
            }),
            "broadcast" => Ok(Self::Broadcast { payload: fields }),
            _ => Err(ProtocolError::UnknownType(kind)),
        }
    }

    /// The control-type string, as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Disconnect => "disconnect",
            Self::Multicast { .. } => "multicast",
            Self::Broadcast { .. } => "broadcast",
        }
    }
}

fn require_room(room: Option<Value>) -> Result<String, ProtocolError> {
    match room {
        None => Err(ProtocolError::MissingField(ROOM_FIELD)),
        Some(Value::String(room)) if !room.is_empty() => Ok(room),
        Some(_) => Err(ProtocolError::InvalidField(ROOM_FIELD)),
    }
}
