//! Observer hooks for delivery and receive outcomes.

use tracing::{debug, trace, warn};

use crate::connection::Connection;
use crate::envelope::Payload;
use crate::errors::{ProtocolError, ReceiveError, SendError};

/// Callbacks fired by the router. Every method defaults to a no-op, so an
/// embedding application only overrides what it cares about.
///
/// Callbacks run inline on the routing task and must not block.
pub trait EventSink: Send + Sync {
    /// A payload was delivered to `recipient`.
    fn on_sent(&self, recipient: &dyn Connection, payload: &Payload) {
        let _ = (recipient, payload);
    }

    /// Delivery to `recipient` failed. The recipient has already been evicted.
    fn on_send_error(&self, recipient: &dyn Connection, error: &SendError) {
        let _ = (recipient, error);
    }

    /// Reading from `connection` failed. The connection is about to be torn down.
    fn on_receive_error(&self, connection: &dyn Connection, error: &ReceiveError) {
        let _ = (connection, error);
    }

    /// A frame from `connection` was dropped because it could not be decoded.
    fn on_protocol_error(&self, connection: &dyn Connection, error: &ProtocolError) {
        let _ = (connection, error);
    }
}

/// Sink that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {}

/// Sink that reports every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn on_sent(&self, recipient: &dyn Connection, payload: &Payload) {
        trace!(conn_id = %recipient.id(), keys = payload.len(), "payload delivered");
    }

    fn on_send_error(&self, recipient: &dyn Connection, error: &SendError) {
        warn!(
            conn_id = %recipient.id(),
            session_id = %recipient.session_id(),
            kind = error.error_kind(),
            error = %error,
            "send failed, recipient evicted"
        );
    }

    fn on_receive_error(&self, connection: &dyn Connection, error: &ReceiveError) {
        warn!(
            conn_id = %connection.id(),
            session_id = %connection.session_id(),
            error = %error,
            "receive failed"
        );
    }

    fn on_protocol_error(&self, connection: &dyn Connection, error: &ProtocolError) {
        debug!(
            conn_id = %connection.id(),
            kind = error.error_kind(),
            error = %error,
            "frame dropped"
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;

    use super::*;
    use crate::ids::ConnectionId;

    /// Records every callback for assertions.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub sent: Mutex<Vec<(ConnectionId, Payload)>>,
        pub send_errors: Mutex<Vec<(ConnectionId, SendError)>>,
        pub receive_errors: Mutex<Vec<(ConnectionId, ReceiveError)>>,
        pub protocol_errors: Mutex<Vec<(ConnectionId, String)>>,
    }

    impl EventSink for RecordingSink {
        fn on_sent(&self, recipient: &dyn Connection, payload: &Payload) {
            self.sent.lock().push((recipient.id().clone(), payload.clone()));
        }

        fn on_send_error(&self, recipient: &dyn Connection, error: &SendError) {
            self.send_errors.lock().push((recipient.id().clone(), error.clone()));
        }

        fn on_receive_error(&self, connection: &dyn Connection, error: &ReceiveError) {
            self.receive_errors.lock().push((connection.id().clone(), error.clone()));
        }

        fn on_protocol_error(&self, connection: &dyn Connection, error: &ProtocolError) {
            self.protocol_errors
                .lock()
                .push((connection.id().clone(), error.error_kind().to_owned()));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::testing::RecordingSink;
    use super::*;
    use crate::connection::ChannelConnection;
    use crate::ids::SessionId;

    fn make_connection() -> Arc<dyn Connection> {
        let (conn, _rx) = ChannelConnection::new(SessionId::from("s"), 1);
        Arc::new(conn)
    }

    #[test]
    fn noop_sink_accepts_every_event() {
        let sink = NoopEventSink;
        let conn = make_connection();
        sink.on_sent(conn.as_ref(), &Payload::new());
        sink.on_send_error(conn.as_ref(), &SendError::Closed);
        sink.on_receive_error(conn.as_ref(), &ReceiveError::Transport("reset".into()));
        sink.on_protocol_error(conn.as_ref(), &ProtocolError::MissingType);
    }

    #[test]
    fn tracing_sink_accepts_every_event() {
        let sink = TracingEventSink;
        let conn = make_connection();
        sink.on_sent(conn.as_ref(), &Payload::new());
        sink.on_send_error(conn.as_ref(), &SendError::Closed);
        sink.on_receive_error(conn.as_ref(), &ReceiveError::Transport("reset".into()));
        sink.on_protocol_error(conn.as_ref(), &ProtocolError::UnknownType("x".into()));
    }

    #[test]
    fn default_methods_are_noops_for_partial_impls() {
        struct OnlySent(parking_lot::Mutex<usize>);
        impl EventSink for OnlySent {
            fn on_sent(&self, _recipient: &dyn Connection, _payload: &Payload) {
                *self.0.lock() += 1;
            }
        }

        let sink = OnlySent(parking_lot::Mutex::new(0));
        let conn = make_connection();
        sink.on_sent(conn.as_ref(), &Payload::new());
        sink.on_send_error(conn.as_ref(), &SendError::Closed);
        assert_eq!(*sink.0.lock(), 1);
    }

    #[test]
    fn recording_sink_records() {
        let sink = RecordingSink::default();
        let conn = make_connection();
        sink.on_send_error(conn.as_ref(), &SendError::Closed);
        sink.on_protocol_error(conn.as_ref(), &ProtocolError::MissingType);
        assert_eq!(sink.send_errors.lock().len(), 1);
        assert_eq!(sink.protocol_errors.lock()[0].1, "missing_type");
    }
}
