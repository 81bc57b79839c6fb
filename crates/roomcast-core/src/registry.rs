//! Session-keyed table of live connections.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::connection::Connection;
use crate::ids::{ConnectionId, SessionId};

/// Maps session identifiers to live connections.
///
/// Every operation runs under one exclusive lock. Iteration hands out a
/// snapshot so callers never hold the lock across a send.
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<SessionId, Arc<dyn Connection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a connection under its session, replacing any prior mapping.
    ///
    /// The displaced connection is returned but not closed.
    pub fn register(&self, connection: Arc<dyn Connection>) -> Option<Arc<dyn Connection>> {
        let session_id = connection.session_id().clone();
        let displaced = self.connections.lock().insert(session_id, connection);
        if let Some(old) = &displaced {
            debug!(session_id = %old.session_id(), conn_id = %old.id(), "session re-registered, prior connection displaced");
        }
        displaced
    }

    /// Remove the entry for `session_id`, if present.
    pub fn remove(&self, session_id: &SessionId) -> Option<Arc<dyn Connection>> {
        self.connections.lock().remove(session_id)
    }

    /// Remove the entry for `session_id` only if it still maps to `connection_id`.
    pub fn remove_if(&self, session_id: &SessionId, connection_id: &ConnectionId) -> bool {
        let mut conns = self.connections.lock();
        if conns.get(session_id).is_some_and(|c| c.id() == connection_id) {
            let _ = conns.remove(session_id);
            true
        } else {
            false
        }
    }

    /// Look up the connection registered for `session_id`.
    pub fn get(&self, session_id: &SessionId) -> Option<Arc<dyn Connection>> {
        self.connections.lock().get(session_id).cloned()
    }

    /// Whether `connection` is the one currently registered for its session.
    pub fn contains(&self, connection: &dyn Connection) -> bool {
        self.connections
            .lock()
            .get(connection.session_id())
            .is_some_and(|c| c.id() == connection.id())
    }

    /// Snapshot of every registered connection, in no particular order.
    pub fn connections(&self) -> Vec<Arc<dyn Connection>> {
        self.connections.lock().values().cloned().collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
