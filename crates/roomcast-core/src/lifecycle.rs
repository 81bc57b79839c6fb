//! Connection teardown across the registry and the room directory.

use std::sync::Arc;

use metrics::{counter, gauge};
use tracing::debug;

use crate::connection::Connection;
use crate::ids::SessionId;
use crate::metrics::{EVICTIONS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_DISCONNECTIONS_TOTAL};
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomDirectory;

/// Removes connections from every table that refers to them.
///
/// Teardown order follows the global lock order: room directory (reverse map,
/// then members), then registry. Each table lock is released before the next
/// is taken.
#[derive(Clone)]
pub struct LifecycleManager {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomDirectory>,
}

impl LifecycleManager {
    /// Create a manager over the given tables.
    pub fn new(registry: Arc<ConnectionRegistry>, rooms: Arc<RoomDirectory>) -> Self {
        Self { registry, rooms }
    }

    /// Tear down `connection`, registered under `session_id`.
    ///
    /// Removes it from its current room, drops the registry entry if it still
    /// points at this connection, then closes it. Returns whether any table
    /// was mutated; a second call for the same connection returns `false`.
    pub fn disconnect(&self, session_id: &SessionId, connection: &dyn Connection) -> bool {
        let room = self.rooms.evict(connection.id());
        let unregistered = self.registry.remove_if(session_id, connection.id());
        connection.close();

        let mutated = room.is_some() || unregistered;
        if mutated {
            counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
            #[allow(clippy::cast_precision_loss)]
            gauge!(WS_CONNECTIONS_ACTIVE).set(self.registry.len() as f64);
            debug!(
                conn_id = %connection.id(),
                session_id = %session_id,
                room = room.as_deref().unwrap_or(""),
                unregistered,
                "connection torn down"
            );
        }
        mutated
    }

    /// Disconnect a recipient whose send failed.
    pub fn evict(&self, connection: &Arc<dyn Connection>) -> bool {
        let evicted = self.disconnect(connection.session_id(), connection.as_ref());
        if evicted {
            counter!(EVICTIONS_TOTAL).increment(1);
        }
        evicted
    }

    /// The registry this manager tears down from.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The room directory this manager tears down from.
    pub fn rooms(&self) -> &Arc<RoomDirectory> {
        &self.rooms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ChannelConnection;

    fn setup() -> LifecycleManager {
        LifecycleManager::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(RoomDirectory::new()),
        )
    }

    fn make_connection(session: &str) -> Arc<dyn Connection> {
        let (conn, _rx) = ChannelConnection::new(SessionId::from(session), 4);
        Arc::new(conn)
    }

    #[test]
    fn disconnect_removes_from_registry_and_room() {
        let lifecycle = setup();
        let a = make_connection("a");
        let _ = lifecycle.registry().register(Arc::clone(&a));
        let _ = lifecycle.rooms().join("lobby", Arc::clone(&a));

        assert!(lifecycle.disconnect(a.session_id(), a.as_ref()));
        assert!(lifecycle.registry().is_empty());
        assert_eq!(lifecycle.rooms().member_count("lobby"), 0);
        assert!(lifecycle.rooms().current_room(a.id()).is_none());
        assert!(a.is_closed());
    }

    #[test]
    fn disconnect_twice_is_noop() {
        let lifecycle = setup();
        let a = make_connection("a");
        let _ = lifecycle.registry().register(Arc::clone(&a));
        let _ = lifecycle.rooms().join("lobby", Arc::clone(&a));

        assert!(lifecycle.disconnect(a.session_id(), a.as_ref()));
        assert!(!lifecycle.disconnect(a.session_id(), a.as_ref()));
        assert!(lifecycle.registry().is_empty());
    }

    #[test]
    fn disconnect_without_room_still_unregisters() {
        let lifecycle = setup();
        let a = make_connection("a");
        let _ = lifecycle.registry().register(Arc::clone(&a));

        assert!(lifecycle.disconnect(a.session_id(), a.as_ref()));
        assert!(lifecycle.registry().is_empty());
    }

    #[test]
    fn stale_disconnect_keeps_newer_registration() {
        let lifecycle = setup();
        let old = make_connection("same");
        let new = make_connection("same");
        let _ = lifecycle.registry().register(Arc::clone(&old));
        let _ = lifecycle.rooms().join("lobby", Arc::clone(&old));
        let _ = lifecycle.registry().register(Arc::clone(&new));
        let _ = lifecycle.rooms().join("lobby", Arc::clone(&new));

        assert!(lifecycle.disconnect(old.session_id(), old.as_ref()));
        assert_eq!(
            lifecycle.registry().get(&SessionId::from("same")).unwrap().id(),
            new.id()
        );
        assert_eq!(lifecycle.rooms().member_count("lobby"), 1);
        assert!(!new.is_closed());
    }

    #[test]
    fn evict_closes_connection() {
        let lifecycle = setup();
        let a = make_connection("a");
        let _ = lifecycle.registry().register(Arc::clone(&a));
        assert!(lifecycle.evict(&a));
        assert!(a.is_closed());
        assert!(!lifecycle.evict(&a));
    }
}
