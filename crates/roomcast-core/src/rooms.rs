//! Room membership.
//!
//! Two tables, each behind its own lock:
//!
//! - `memberships`: connection → the one room it is in (reverse map)
//! - `rooms`: room name → ordered member list
//!
//! Lock ordering: always `memberships` first, then `rooms`. Every compound
//! operation (join, leave, evict) takes both, in that order, so the two
//! tables are never observed out of step.
//!
//! A connection is in at most one room. Joining a second room removes it from
//! the first. Rooms are created on first join and are not pruned when they
//! empty out.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::connection::Connection;
use crate::ids::ConnectionId;

/// Room name → members, plus the reverse connection → room map.
pub struct RoomDirectory {
    memberships: Mutex<HashMap<ConnectionId, String>>,
    rooms: Mutex<HashMap<String, Vec<Arc<dyn Connection>>>>,
}

impl RoomDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self {
            memberships: Mutex::new(HashMap::new()),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Put `connection` in `room`, creating the room if needed.
    ///
    /// If the connection was in a different room it is removed from that
    /// room's member list first. Re-joining the current room leaves the
    /// member list untouched. Returns the previously joined room.
    pub fn join(&self, room: &str, connection: Arc<dyn Connection>) -> Option<String> {
        let mut memberships = self.memberships.lock();
        let mut rooms = self.rooms.lock();

        let previous = memberships.insert(connection.id().clone(), room.to_owned());
        if let Some(prev) = previous.as_deref().filter(|prev| *prev != room) {
            let _ = remove_member(&mut rooms, prev, connection.id());
        }

        let members = rooms.entry(room.to_owned()).or_default();
        if !members.iter().any(|m| m.id() == connection.id()) {
            members.push(connection);
        }
        previous
    }

    /// Remove `connection` from `room` and clear its reverse mapping.
    ///
    /// The reverse mapping is cleared even if the connection was not a member
    /// of `room`; in that case it is also dropped from the room the mapping
    /// pointed at, so it ends up in no room at all. Remaining members keep
    /// their relative order. Returns whether the connection was a member of
    /// `room`.
    pub fn leave(&self, room: &str, connection_id: &ConnectionId) -> bool {
        let mut memberships = self.memberships.lock();
        let mut rooms = self.rooms.lock();

        if let Some(current) = memberships.remove(connection_id).filter(|current| current != room) {
            let _ = remove_member(&mut rooms, &current, connection_id);
        }
        remove_member(&mut rooms, room, connection_id)
    }

    /// Remove `connection_id` from whichever room it is in.
    ///
    /// Returns the room it left, or `None` if it was in no room.
    pub fn evict(&self, connection_id: &ConnectionId) -> Option<String> {
        let mut memberships = self.memberships.lock();
        let mut rooms = self.rooms.lock();

        let room = memberships.remove(connection_id)?;
        let _ = remove_member(&mut rooms, &room, connection_id);
        Some(room)
    }

    /// The room `connection_id` is currently in.
    pub fn current_room(&self, connection_id: &ConnectionId) -> Option<String> {
        self.memberships.lock().get(connection_id).cloned()
    }

    /// Snapshot of the members of `room`, in join order.
    pub fn members(&self, room: &str) -> Vec<Arc<dyn Connection>> {
        self.rooms.lock().get(room).cloned().unwrap_or_default()
    }

    /// Number of members in `room`.
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.lock().get(room).map_or(0, Vec::len)
    }

    /// Names of every room ever joined, including empty ones.
    pub fn room_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rooms.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of rooms, including empty ones.
    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_member(
    rooms: &mut HashMap<String, Vec<Arc<dyn Connection>>>,
    room: &str,
    connection_id: &ConnectionId,
) -> bool {
    let Some(members) = rooms.get_mut(room) else {
        return false;
    };
    let before = members.len();
    members.retain(|m| m.id() != connection_id);
    members.len() != before
}
