//! Error taxonomy for routing and delivery.
//!
//! None of these errors propagate to the client whose request caused them.
//! Send and receive failures are recovered locally and reported through the
//! [`EventSink`](crate::events::EventSink); protocol errors drop the frame.

use std::time::Duration;

use thiserror::Error;

/// Failure delivering a payload to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The recipient's connection is closed or its writer has gone away.
    #[error("connection closed")]
    Closed,
    /// The recipient did not accept the payload in time.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

impl SendError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Timeout(_) => "timeout",
        }
    }
}

/// Failure reading from one connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiveError {
    /// The transport failed while reading a frame.
    #[error("transport error: {0}")]
    Transport(String),
}

/// A frame that could not be decoded into an [`Envelope`](crate::envelope::Envelope).
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The frame is valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// Binary frame that is not UTF-8 text.
    #[error("frame is not valid UTF-8")]
    NotUtf8,
    /// The control type is absent or empty.
    #[error("missing control type")]
    MissingType,
    /// The control type is not one the router recognizes.
    #[error("unknown control type: {0}")]
    UnknownType(String),
    /// A control field required by this control type is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// A control field has the wrong shape (not a string, or empty).
    #[error("invalid field `{0}`")]
    InvalidField(&'static str),
}

impl ProtocolError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::NotAnObject => "not_an_object",
            Self::NotUtf8 => "not_utf8",
            Self::MissingType => "missing_type",
            Self::UnknownType(_) => "unknown_type",
            Self::MissingField(_) => "missing_field",
            Self::InvalidField(_) => "invalid_field",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_error_display() {
        assert_eq!(SendError::Closed.to_string(), "connection closed");
        let err = SendError::Timeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn send_error_kinds() {
        assert_eq!(SendError::Closed.error_kind(), "closed");
        assert_eq!(SendError::Timeout(Duration::ZERO).error_kind(), "timeout");
    }

    #[test]
    fn protocol_error_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: ProtocolError = json_err.into();
        assert!(matches!(err, ProtocolError::Malformed(_)));
        assert_eq!(err.error_kind(), "malformed");
    }

    #[test]
    fn protocol_error_display_names_field() {
        assert_eq!(
            ProtocolError::MissingField("room").to_string(),
            "missing field `room`"
        );
        assert_eq!(
            ProtocolError::UnknownType("bogus".into()).to_string(),
            "unknown control type: bogus"
        );
    }
}
