//! Room lookup and lifecycle.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ether_protocol::RoomId;
use futures_util::future::join_all;
use tracing::{debug, info};

use crate::error::ManagerError;
use crate::room::{Room, TerminationReason};

/// Resolves room ids to rooms and is told when a room closes.
pub trait Manager: Send + Sync {
    /// Looks up an open room.
    fn resolve(&self, id: &RoomId) -> Result<Arc<Room>, ManagerError>;

    /// Registers a new open room. At most one concurrent creator of an id
    /// succeeds; the others get `AlreadyExists`.
    fn create_room(&self, id: RoomId) -> Result<Arc<Room>, ManagerError>;

    /// Called by a room once it is closed. Must not evict a newer open room
    /// registered under the same id.
    fn deregister(&self, id: &RoomId);
}

/// In-memory [`Manager`].
#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomId, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of the registered rooms, sorted.
    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<_> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Terminates one room. Returns `NotFound` when no such room is open.
    pub async fn terminate(&self, id: &RoomId, reason: TerminationReason) -> Result<(), ManagerError> {
        let room = self.resolve(id)?;
        room.terminate(reason, self).await;
        Ok(())
    }

    /// Terminates every registered room.
    pub async fn terminate_all(&self, reason: TerminationReason) {
        let rooms: Vec<Arc<Room>> = self.lock().values().cloned().collect();
        if rooms.is_empty() {
            return;
        }
        info!(rooms = rooms.len(), %reason, "terminating all rooms");
        join_all(rooms.iter().map(|room| room.terminate(reason, self))).await;
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RoomId, Arc<Room>>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Manager for RoomRegistry {
    fn resolve(&self, id: &RoomId) -> Result<Arc<Room>, ManagerError> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| ManagerError::NotFound(id.clone()))
    }

    fn create_room(&self, id: RoomId) -> Result<Arc<Room>, ManagerError> {
        match self.lock().entry(id) {
            Entry::Occupied(entry) => Err(ManagerError::AlreadyExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(room = %entry.key(), "room created");
                let room = Arc::new(Room::new(entry.key().clone()));
                entry.insert(Arc::clone(&room));
                Ok(room)
            }
        }
    }

    fn deregister(&self, id: &RoomId) {
        let mut rooms = self.lock();
        if rooms.get(id).is_some_and(|room| room.is_closed()) {
            rooms.remove(id);
            debug!(room = %id, "room deregistered");
        }
    }
}

impl std::fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistry")
            .field("rooms", &self.room_ids())
            .finish()
    }
}
