//! Room membership registry.
//!
//! Pure bookkeeping: `join` and `leave` trigger no broadcasts, and nothing
//! here is persisted — membership is reconstructed from the join calls a
//! client replays after reconnecting.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use partyline_core::ServerEvent;

/// Identifier of one physical client connection.
pub type ConnectionId = Uuid;

/// One connection's membership in a room.
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub user_id: String,
    /// Outbound event channel owned by the connection's sender task
    pub tx: mpsc::Sender<ServerEvent>,
}

#[derive(Debug, Default)]
pub(crate) struct Room {
    pub(crate) members: HashMap<ConnectionId, RoomMember>,
}

/// Tracks which active connections belong to which chat room.
///
/// Locking is room-scoped: the outer map is only held long enough to look
/// up or create the `Arc<Mutex<Room>>`, so joins, leaves, and publishes
/// for the same room serialize while different rooms proceed
/// independently.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Mutex<Room>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection as a member of a room. Idempotent: re-joining
    /// replaces the stored sender (the fresh channel after a reconnect).
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        chat_id: &str,
        user_id: &str,
        tx: mpsc::Sender<ServerEvent>,
    ) {
        let room = self.room(chat_id).await;
        let mut room = room.lock().await;
        room.members.insert(
            connection_id,
            RoomMember {
                user_id: user_id.to_string(),
                tx,
            },
        );
        debug!(%connection_id, chat_id, user_id, "joined room");
    }

    /// Remove all memberships held by a connection. Called on disconnect.
    pub async fn leave(&self, connection_id: ConnectionId) {
        let rooms: Vec<(String, Arc<Mutex<Room>>)> = {
            let map = self.rooms.read().await;
            map.iter()
                .map(|(id, room)| (id.clone(), room.clone()))
                .collect()
        };

        let mut emptied = Vec::new();
        for (chat_id, room) in rooms {
            let mut room = room.lock().await;
            if room.members.remove(&connection_id).is_some() {
                debug!(%connection_id, chat_id, "left room");
            }
            if room.members.is_empty() {
                emptied.push(chat_id);
            }
        }

        if !emptied.is_empty() {
            let mut map = self.rooms.write().await;
            for chat_id in emptied {
                // Re-check under the write lock; a join may have raced in.
                if let Some(room) = map.get(&chat_id) {
                    if room.lock().await.members.is_empty() {
                        map.remove(&chat_id);
                    }
                }
            }
        }
    }

    /// Snapshot of the connections currently joined to a room.
    pub async fn members_of(&self, chat_id: &str) -> Vec<ConnectionId> {
        let room = {
            let map = self.rooms.read().await;
            map.get(chat_id).cloned()
        };
        match room {
            Some(room) => room.lock().await.members.keys().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Get or create the lock-scoped state for a room.
    pub(crate) async fn room(&self, chat_id: &str) -> Arc<Mutex<Room>> {
        {
            let map = self.rooms.read().await;
            if let Some(room) = map.get(chat_id) {
                return room.clone();
            }
        }
        let mut map = self.rooms.write().await;
        map.entry(chat_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Room::default())))
            .clone()
    }

    /// Existing room state, if any member has joined it.
    pub(crate) async fn existing_room(&self, chat_id: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.read().await.get(chat_id).cloned()
    }
}
