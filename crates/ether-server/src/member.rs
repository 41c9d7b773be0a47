//! The part of a connection that rooms can see.
//!
//! Rooms never own connections. They hold `Arc<Member>` handles that expose
//! the peer's id and sink, plus the two pieces of per-connection state other
//! tasks are allowed to touch: its set of room ids and its queue of knocks
//! awaiting an answer.

use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ether_protocol::{ConnectionId, RoomId};

use crate::sink::FrameSink;

/// A knock relayed to this member that it may still answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingKnock {
    pub room: RoomId,
    pub knocker: ConnectionId,
}

pub struct Member {
    id: ConnectionId,
    sink: Arc<dyn FrameSink>,
    // Only mutated while the corresponding room's lock is held.
    rooms: Mutex<BTreeSet<RoomId>>,
    knocks: Mutex<VecDeque<PendingKnock>>,
    knock_backlog: usize,
}

impl Member {
    pub fn new(id: ConnectionId, sink: Arc<dyn FrameSink>, knock_backlog: usize) -> Self {
        Self {
            id,
            sink,
            rooms: Mutex::new(BTreeSet::new()),
            knocks: Mutex::new(VecDeque::new()),
            knock_backlog,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn send(&self, frame: &[u8]) -> io::Result<()> {
        self.sink.send_frame(frame).await
    }

    pub async fn close(&self) {
        self.sink.close().await
    }

    /// Snapshot of the rooms this member currently belongs to.
    pub fn rooms(&self) -> Vec<RoomId> {
        lock(&self.rooms).iter().cloned().collect()
    }

    pub fn is_in(&self, room: &RoomId) -> bool {
        lock(&self.rooms).contains(room)
    }

    pub(crate) fn enter_room(&self, room: &RoomId) {
        lock(&self.rooms).insert(room.clone());
    }

    pub(crate) fn exit_room(&self, room: &RoomId) {
        lock(&self.rooms).remove(room);
    }

    /// Records a knock this member may answer, dropping the oldest one when
    /// the backlog is full.
    pub fn push_knock(&self, knock: PendingKnock) {
        if self.knock_backlog == 0 {
            return;
        }
        let mut knocks = lock(&self.knocks);
        while knocks.len() >= self.knock_backlog {
            knocks.pop_front();
        }
        knocks.push_back(knock);
    }

    /// Takes the oldest knock still waiting for an answer.
    pub fn take_knock(&self) -> Option<PendingKnock> {
        lock(&self.knocks).pop_front()
    }

    /// Removes the most recent copy of `knock`, if still pending.
    pub(crate) fn withdraw_knock(&self, knock: &PendingKnock) {
        let mut knocks = lock(&self.knocks);
        if let Some(pos) = knocks.iter().rposition(|k| k == knock) {
            knocks.remove(pos);
        }
    }

    /// Drops pending knocks for a room this member no longer belongs to.
    pub(crate) fn forget_knocks_in(&self, room: &RoomId) {
        lock(&self.knocks).retain(|k| &k.room != room);
    }
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member")
            .field("id", &self.id)
            .field("rooms", &self.rooms())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::RecordingSink;

    fn member(backlog: usize) -> Member {
        Member::new(ConnectionId(1), Arc::new(RecordingSink::default()), backlog)
    }

    fn knock(room: &str, knocker: u64) -> PendingKnock {
        PendingKnock {
            room: RoomId::try_from(room).unwrap(),
            knocker: ConnectionId(knocker),
        }
    }

    #[test]
    fn knocks_are_answered_oldest_first() {
        let m = member(4);
        m.push_knock(knock("a", 2));
        m.push_knock(knock("b", 3));
        assert_eq!(m.take_knock(), Some(knock("a", 2)));
        assert_eq!(m.take_knock(), Some(knock("b", 3)));
        assert_eq!(m.take_knock(), None);
    }

    #[test]
    fn knock_backlog_drops_oldest() {
        let m = member(2);
        m.push_knock(knock("a", 2));
        m.push_knock(knock("a", 3));
        m.push_knock(knock("a", 4));
        assert_eq!(m.take_knock(), Some(knock("a", 3)));
        assert_eq!(m.take_knock(), Some(knock("a", 4)));
    }

    #[test]
    fn forgetting_a_room_drops_its_knocks() {
        let m = member(4);
        m.push_knock(knock("a", 2));
        m.push_knock(knock("b", 3));
        m.forget_knocks_in(&RoomId::try_from("a").unwrap());
        assert_eq!(m.take_knock(), Some(knock("b", 3)));
        assert_eq!(m.take_knock(), None);
    }

    #[test]
    fn room_set_tracks_entries() {
        let m = member(1);
        let lobby = RoomId::try_from("lobby").unwrap();
        m.enter_room(&lobby);
        assert!(m.is_in(&lobby));
        assert_eq!(m.rooms(), vec![lobby.clone()]);
        m.exit_room(&lobby);
        assert!(m.rooms().is_empty());
    }
}
