//! Connection and room bookkeeping for realtime clients.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::ServerEvent;

/// Most channel rooms a single connection may join.
pub const MAX_CHANNEL_ROOMS: usize = 256;

/// A broadcast target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Room {
    /// Private room of one user; every connection of that user is in it
    User(i64),
    Channel(i64),
}

struct Connection {
    user_id: i64,
    rooms: HashSet<Room>,
    tx: mpsc::Sender<ServerEvent>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<Uuid, Connection>,
    rooms: HashMap<Room, HashSet<Uuid>>,
}

impl Inner {
    fn join(&mut self, id: Uuid, room: Room) -> bool {
        let Some(conn) = self.connections.get_mut(&id) else {
            return false;
        };
        if !conn.rooms.insert(room) {
            return false;
        }
        self.rooms.entry(room).or_default().insert(id);
        true
    }
}

/// Tracks live connections and the rooms they belong to.
///
/// Shared behind an `Arc`; every method takes the lock briefly and never awaits.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a verified connection and put it in its user's private room.
    pub fn register(&self, user_id: i64, tx: mpsc::Sender<ServerEvent>) -> Uuid {
        let id = Uuid::new_v4();
        let mut inner = self.lock();
        inner.connections.insert(
            id,
            Connection {
                user_id,
                rooms: HashSet::new(),
                tx,
            },
        );
        inner.join(id, Room::User(user_id));
        id
    }

    /// Join a room. Returns false if the connection is unknown or already a member.
    pub fn join(&self, id: Uuid, room: Room) -> bool {
        self.lock().join(id, room)
    }

    /// Join the channel rooms the client declares. Non-positive ids are skipped
    /// and joins stop at [`MAX_CHANNEL_ROOMS`]. Returns the channels newly joined.
    pub fn join_channels(&self, id: Uuid, channel_ids: &[i64]) -> Vec<i64> {
        let mut inner = self.lock();
        let Some(conn) = inner.connections.get(&id) else {
            return Vec::new();
        };
        let mut channels = conn
            .rooms
            .iter()
            .filter(|room| matches!(room, Room::Channel(_)))
            .count();

        let mut joined = Vec::new();
        for &channel_id in channel_ids {
            if channel_id <= 0 {
                continue;
            }
            if channels >= MAX_CHANNEL_ROOMS {
                break;
            }
            if inner.join(id, Room::Channel(channel_id)) {
                channels += 1;
                joined.push(channel_id);
            }
        }
        joined
    }

    #[cfg(test)]
    fn user_of(&self, id: Uuid) -> Option<i64> {
        self.lock().connections.get(&id).map(|conn| conn.user_id)
    }

    /// Rooms a connection belongs to, sorted.
    pub fn rooms_of(&self, id: Uuid) -> Vec<Room> {
        let mut rooms: Vec<Room> = self
            .lock()
            .connections
            .get(&id)
            .map(|conn| conn.rooms.iter().copied().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// Number of connections in a room.
    pub fn members(&self, room: Room) -> usize {
        self.lock().rooms.get(&room).map_or(0, HashSet::len)
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Queue `event` for every connection in `room`. Connections whose queue is
    /// full or closed are skipped. Returns how many received it.
    pub fn emit(&self, room: Room, event: ServerEvent) -> usize {
        let inner = self.lock();
        let Some(members) = inner.rooms.get(&room) else {
            return 0;
        };
        members
            .iter()
            .filter_map(|id| inner.connections.get(id))
            .filter(|conn| conn.tx.try_send(event.clone()).is_ok())
            .count()
    }

    /// Drop a connection and its room memberships. Empty rooms are removed.
    pub fn unregister(&self, id: Uuid) {
        let mut inner = self.lock();
        let Some(conn) = inner.connections.remove(&id) else {
            return;
        };
        for room in conn.rooms {
            if let Some(members) = inner.rooms.get_mut(&room) {
                members.remove(&id);
                if members.is_empty() {
                    inner.rooms.remove(&room);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(registry: &ConnectionRegistry, user_id: i64) -> (Uuid, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(8);
        (registry.register(user_id, tx), rx)
    }

    #[test]
    fn test_register_joins_private_room() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = connect(&registry, 7);

        assert_eq!(registry.rooms_of(id), vec![Room::User(7)]);
        assert_eq!(registry.members(Room::User(7)), 1);
        assert_eq!(registry.user_of(id), Some(7));
    }

    #[test]
    fn test_emit_reaches_every_connection_of_a_user() {
        let registry = ConnectionRegistry::new();
        let (_, mut laptop) = connect(&registry, 7);
        let (_, mut phone) = connect(&registry, 7);
        let (_, mut other) = connect(&registry, 8);

        assert_eq!(registry.emit(Room::User(7), ServerEvent::Notification), 2);

        assert_eq!(laptop.try_recv().unwrap(), ServerEvent::Notification);
        assert_eq!(phone.try_recv().unwrap(), ServerEvent::Notification);
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn test_join_channels_dedupes_and_skips_invalid_ids() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = connect(&registry, 1);

        let joined = registry.join_channels(id, &[3, 3, 0, -5, 9]);
        assert_eq!(joined, vec![3, 9]);
        assert_eq!(
            registry.rooms_of(id),
            vec![Room::User(1), Room::Channel(3), Room::Channel(9)]
        );

        assert!(registry.join_channels(id, &[3]).is_empty());
    }

    #[test]
    fn test_join_channels_is_capped() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = connect(&registry, 1);

        let ids: Vec<i64> = (1..=300).collect();
        let joined = registry.join_channels(id, &ids);

        assert_eq!(joined.len(), MAX_CHANNEL_ROOMS);
        assert!(registry.join_channels(id, &[1000]).is_empty());
    }

    #[test]
    fn test_channel_emit_only_reaches_members() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = connect(&registry, 1);
        let (_, mut rx_b) = connect(&registry, 2);
        registry.join_channels(a, &[42]);

        assert_eq!(registry.emit(Room::Channel(42), ServerEvent::Ping), 1);
        assert_eq!(rx_a.try_recv().unwrap(), ServerEvent::Ping);
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_unregister_cleans_up_rooms() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = connect(&registry, 1);
        registry.join_channels(id, &[5]);
        assert_eq!(registry.rooms_of(id).len(), 2);

        registry.unregister(id);

        assert!(registry.rooms_of(id).is_empty());
        assert_eq!(registry.user_of(id), None);

        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.members(Room::User(1)), 0);
        assert_eq!(registry.members(Room::Channel(5)), 0);
        assert_eq!(registry.emit(Room::Channel(5), ServerEvent::Ping), 0);
        assert!(!registry.join(id, Room::Channel(6)));
    }

    #[test]
    fn test_closed_receiver_is_not_counted() {
        let registry = ConnectionRegistry::new();
        let (_, rx) = connect(&registry, 1);
        drop(rx);

        assert_eq!(registry.emit(Room::User(1), ServerEvent::Ping), 0);
    }
}
