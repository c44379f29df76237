use crate::game::{GameError, RoomId, Session};
use crate::scheduler::RoomTimers;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A session together with the timers that drive it
pub struct Room {
    pub session: Session,
    pub timers: RoomTimers,
}

impl Room {
    pub fn new(session: Session) -> Self {
        Room {
            session,
            timers: RoomTimers::new(),
        }
    }
}

/// Shared handle to a room. The mutex serializes every read-modify-write on
/// that room's session.
pub type RoomHandle = Arc<Mutex<Room>>;

/// Owns the room → session mapping; at most one live session per room.
#[derive(Default)]
pub struct SessionRegistry {
    rooms: DashMap<RoomId, RoomHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session for `room_id` and hand back its room already
    /// locked, so nothing can observe it before the caller has set it up.
    pub async fn create(
        &self,
        room_id: RoomId,
        session: Session,
    ) -> Result<(RoomHandle, OwnedMutexGuard<Room>), GameError> {
        let handle: RoomHandle = Arc::new(Mutex::new(Room::new(session)));
        // uncontended: nobody else can see this handle yet
        let guard = handle.clone().lock_owned().await;

        match self.rooms.entry(room_id) {
            Entry::Occupied(_) => Err(GameError::AlreadyActive),
            Entry::Vacant(entry) => {
                entry.insert(handle.clone());
                Ok((handle, guard))
            }
        }
    }

    pub fn get(&self, room_id: RoomId) -> Option<RoomHandle> {
        self.rooms.get(&room_id).map(|entry| entry.value().clone())
    }

    /// Remove `room_id` only if it still maps to `handle`, so a session that
    /// replaced it is never evicted by mistake.
    pub fn remove(&self, room_id: RoomId, handle: &RoomHandle) -> bool {
        self.rooms
            .remove_if(&room_id, |_, current| Arc::ptr_eq(current, handle))
            .is_some()
    }

    pub fn contains(&self, room_id: RoomId) -> bool {
        self.rooms.contains_key(&room_id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|entry| *entry.key()).collect()
    }
}
