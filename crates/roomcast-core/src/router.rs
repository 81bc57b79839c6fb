//! Inbound message routing.
//!
//! One [`MessageRouter`] is shared by every connection task of a server. Each
//! task feeds its frames in arrival order; the router decodes them and calls
//! into the room directory, the lifecycle manager or the delivery engine.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::delivery::{DeliveryEngine, DeliveryReport};
use crate::envelope::Envelope;
use crate::errors::{ProtocolError, ReceiveError};
use crate::events::{EventSink, NoopEventSink};
use crate::lifecycle::LifecycleManager;
use crate::metrics::{
    MESSAGES_ROUTED_TOTAL, PROTOCOL_ERRORS_TOTAL, RECEIVE_ERRORS_TOTAL, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL,
};
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomDirectory;

/// Default bound on a single recipient send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Router tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterOptions {
    /// Bound on each per-recipient send during fan-out.
    pub send_timeout: Duration,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// What a routed message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// The sender joined `room`.
    Joined {
        /// Room joined.
        room: String,
        /// Room the sender was in before, if any.
        previous: Option<String>,
    },
    /// The sender left `room`.
    Left {
        /// Room named in the request.
        room: String,
        /// Whether the sender was actually a member of it.
        was_member: bool,
    },
    /// The sender was torn down.
    Disconnected,
    /// A multicast or broadcast was fanned out.
    Delivered(DeliveryReport),
    /// The sender was already closed; the frame was dropped unrouted.
    SenderClosed,
}

/// Decodes envelopes and dispatches them.
#[derive(Clone)]
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomDirectory>,
    lifecycle: LifecycleManager,
    delivery: DeliveryEngine,
    events: Arc<dyn EventSink>,
}

impl MessageRouter {
    /// Create a router with fresh, empty tables.
    pub fn new(events: Arc<dyn EventSink>, options: RouterOptions) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomDirectory::new());
        let lifecycle = LifecycleManager::new(Arc::clone(&registry), Arc::clone(&rooms));
        let delivery =
            DeliveryEngine::new(lifecycle.clone(), Arc::clone(&events), options.send_timeout);
        Self {
            registry,
            rooms,
            lifecycle,
            delivery,
            events,
        }
    }

    /// Register a newly accepted connection.
    ///
    /// A connection already registered under the same session is displaced
    /// from the registry but left open and in its room.
    pub fn accept(&self, connection: Arc<dyn Connection>) {
        let conn_id = connection.id().clone();
        let session_id = connection.session_id().clone();
        if let Some(displaced) = self.registry.register(connection) {
            warn!(
                session_id = %session_id,
                displaced = %displaced.id(),
                conn_id = %conn_id,
                "session already registered, prior connection displaced"
            );
        }
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        #[allow(clippy::cast_precision_loss)]
        gauge!(WS_CONNECTIONS_ACTIVE).set(self.registry.len() as f64);
        info!(conn_id = %conn_id, session_id = %session_id, "connection accepted");
    }

    /// Decode one text frame from `connection` and dispatch it.
    ///
    /// An undecodable frame is reported to the event sink and dropped. The
    /// connection is unaffected either way. Frames from a closed connection
    /// are dropped without being decoded.
    pub async fn handle_text(
        &self,
        connection: &Arc<dyn Connection>,
        text: &str,
    ) -> Result<Dispatched, ProtocolError> {
        if connection.is_closed() {
            debug!(conn_id = %connection.id(), "dropping frame from closed connection");
            return Ok(Dispatched::SenderClosed);
        }
        match Envelope::decode(text) {
            Ok(envelope) => Ok(self.dispatch(connection, envelope).await),
            Err(error) => {
                self.report_protocol_error(connection.as_ref(), &error);
                Err(error)
            }
        }
    }

    /// Report a frame that never reached the decoder (e.g. non-UTF-8 binary).
    pub fn report_protocol_error(&self, connection: &dyn Connection, error: &ProtocolError) {
        counter!(PROTOCOL_ERRORS_TOTAL, "error_type" => error.error_kind()).increment(1);
        debug!(conn_id = %connection.id(), error = %error, "dropping undecodable frame");
        self.events.on_protocol_error(connection, error);
    }

    /// Report a transport read failure and tear the connection down.
    pub fn receive_failed(&self, connection: &Arc<dyn Connection>, error: &ReceiveError) {
        counter!(RECEIVE_ERRORS_TOTAL).increment(1);
        self.events.on_receive_error(connection.as_ref(), error);
        let _ = self.disconnect(connection);
    }

    /// Dispatch a decoded envelope sent by `connection`.
    ///
    /// A closed sender is never routed: it cannot rejoin a room or reach
    /// peers once torn down.
    pub async fn dispatch(&self, connection: &Arc<dyn Connection>, envelope: Envelope) -> Dispatched {
        if connection.is_closed() {
            debug!(conn_id = %connection.id(), kind = envelope.kind(), "sender closed, not routing");
            return Dispatched::SenderClosed;
        }
        counter!(MESSAGES_ROUTED_TOTAL, "type" => envelope.kind()).increment(1);
        match envelope {
            Envelope::Join { room } => {
                let previous = self.rooms.join(&room, Arc::clone(connection));
                debug!(conn_id = %connection.id(), room = %room, previous = ?previous, "joined room");
                Dispatched::Joined { room, previous }
            }
            Envelope::Leave { room } => {
                let was_member = self.rooms.leave(&room, connection.id());
                debug!(conn_id = %connection.id(), room = %room, was_member, "left room");
                Dispatched::Left { room, was_member }
            }
            Envelope::Disconnect => {
                let _ = self.disconnect(connection);
                Dispatched::Disconnected
            }
            Envelope::Multicast { room, payload } => {
                Dispatched::Delivered(self.delivery.multicast(connection.id(), &room, payload).await)
            }
            Envelope::Broadcast { payload } => {
                Dispatched::Delivered(self.delivery.broadcast(connection.id(), payload).await)
            }
        }
    }

    /// Tear down `connection`. Idempotent.
    pub fn disconnect(&self, connection: &Arc<dyn Connection>) -> bool {
        self.lifecycle
            .disconnect(connection.session_id(), connection.as_ref())
    }

    /// Tear down every registered connection. Returns how many were removed.
    pub fn disconnect_all(&self) -> usize {
        let connections = self.registry.connections();
        let removed = connections
            .iter()
            .filter(|conn| self.disconnect(conn))
            .count();
        info!(removed, "all connections torn down");
        removed
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The room directory.
    pub fn rooms(&self) -> &Arc<RoomDirectory> {
        &self.rooms
    }

    /// The event sink callbacks go to.
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new(Arc::new(NoopEventSink), RouterOptions::default())
    }
}
