//! Rooms: named sets of connections with fan-out.
//!
//! A room is `Open` from creation until it is terminated or its last member
//! leaves, then `Closed` for good. A closed room accepts no joins and is
//! dropped from the registry; a later join under the same id creates a fresh
//! room.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ether_protocol::{ConnectionId, RoomId, encode_knock_notice, encode_room_termination};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::error::RoomError;
use crate::manager::Manager;
use crate::member::{Member, PendingKnock};

/// Lifecycle of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Open,
    Closed,
}

/// Why a room was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Explicit request through the registry.
    Requested,
    /// The last member left.
    LastMemberLeft,
    /// The server is shutting down.
    ServerShutdown,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Requested => "requested",
            Self::LastMemberLeft => "last member left",
            Self::ServerShutdown => "server shutdown",
        };
        f.write_str(s)
    }
}

/// Outcome of a successful [`Room::leave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Other members are still in the room.
    Remained,
    /// The leaver was the last member; the room is now closed.
    Closed,
}

struct RoomInner {
    state: RoomState,
    members: Vec<Arc<Member>>,
}

pub struct Room {
    id: RoomId,
    inner: Mutex<RoomInner>,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            inner: Mutex::new(RoomInner {
                state: RoomState::Open,
                members: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn state(&self) -> RoomState {
        self.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == RoomState::Closed
    }

    pub fn len(&self) -> usize {
        self.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the current members, in join order.
    pub fn members(&self) -> Vec<ConnectionId> {
        self.lock().members.iter().map(|m| m.id()).collect()
    }

    pub fn join(&self, member: &Arc<Member>) -> Result<(), RoomError> {
        let mut inner = self.lock();
        if inner.state == RoomState::Closed {
            return Err(RoomError::Closed(self.id.clone()));
        }
        if inner.members.iter().any(|m| m.id() == member.id()) {
            return Err(RoomError::AlreadyMember(self.id.clone()));
        }
        inner.members.push(Arc::clone(member));
        member.enter_room(&self.id);
        debug!(room = %self.id, member = %member.id(), members = inner.members.len(), "joined room");
        Ok(())
    }

    /// Removes a member. When the room empties it closes and is deregistered.
    pub fn leave(&self, id: ConnectionId, manager: &dyn Manager) -> Result<Departure, RoomError> {
        let departure = {
            let mut inner = self.lock();
            let Some(pos) = inner.members.iter().position(|m| m.id() == id) else {
                return Err(RoomError::NotMember(self.id.clone()));
            };
            let member = inner.members.remove(pos);
            member.exit_room(&self.id);
            member.forget_knocks_in(&self.id);

            if inner.members.is_empty() {
                inner.state = RoomState::Closed;
                Departure::Closed
            } else {
                Departure::Remained
            }
        };

        debug!(room = %self.id, member = %id, ?departure, "left room");
        if departure == Departure::Closed {
            info!(room = %self.id, reason = %TerminationReason::LastMemberLeft, "room closed");
            manager.deregister(&self.id);
        }
        Ok(departure)
    }

    /// Sends `frame` to every member except `sender`. Returns the number of
    /// deliveries attempted; failures are logged and skipped.
    pub async fn broadcast(&self, sender: ConnectionId, frame: &[u8]) -> usize {
        let recipients = self.recipients(&self.lock(), sender);
        self.deliver(&recipients, frame).await;
        recipients.len()
    }

    /// Relays a knock to every other member and records it at each of them
    /// as a knock they may answer. Recipients the notice never reached do
    /// not keep it.
    pub async fn relay_knock(&self, knocker: ConnectionId) -> usize {
        let knock = PendingKnock {
            room: self.id.clone(),
            knocker,
        };
        // recorded before sending so an answer cannot outrun its knock
        let recipients = {
            let inner = self.lock();
            let recipients = self.recipients(&inner, knocker);
            for member in &recipients {
                member.push_knock(knock.clone());
            }
            recipients
        };
        let frame = encode_knock_notice(&self.id, knocker);
        let delivered = self.deliver(&recipients, &frame).await;
        for (member, delivered) in recipients.iter().zip(delivered) {
            if !delivered {
                member.withdraw_knock(&knock);
            }
        }
        recipients.len()
    }

    fn recipients(&self, inner: &RoomInner, sender: ConnectionId) -> Vec<Arc<Member>> {
        inner
            .members
            .iter()
            .filter(|m| m.id() != sender)
            .cloned()
            .collect()
    }

    /// Sends concurrently; one flag per recipient, true when it was written.
    async fn deliver(&self, recipients: &[Arc<Member>], frame: &[u8]) -> Vec<bool> {
        join_all(recipients.iter().map(|m| async move {
            match m.send(frame).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(room = %self.id, member = %m.id(), error = %e, "delivery failed");
                    false
                }
            }
        }))
        .await
    }

    /// Directed delivery to one member of this room.
    pub async fn send_to(&self, id: ConnectionId, frame: &[u8]) -> Result<(), RoomError> {
        let member = self
            .lock()
            .members
            .iter()
            .find(|m| m.id() == id)
            .cloned()
            .ok_or_else(|| RoomError::NotMember(self.id.clone()))?;

        if let Err(e) = member.send(frame).await {
            warn!(room = %self.id, member = %id, error = %e, "delivery failed");
        }
        Ok(())
    }

    /// Closes the room, removes every member, deregisters it and tells the
    /// former members. A second call is a no-op.
    pub async fn terminate(&self, reason: TerminationReason, manager: &dyn Manager) {
        let former = {
            let mut inner = self.lock();
            if inner.state == RoomState::Closed {
                return;
            }
            inner.state = RoomState::Closed;
            let former = std::mem::take(&mut inner.members);
            for member in &former {
                member.exit_room(&self.id);
                member.forget_knocks_in(&self.id);
            }
            former
        };

        info!(room = %self.id, %reason, members = former.len(), "room terminated");
        manager.deregister(&self.id);

        let frame = encode_room_termination(&self.id);
        let frame = frame.as_slice();
        join_all(former.iter().map(|m| async move {
            if let Err(e) = m.send(frame).await {
                debug!(room = %self.id, member = %m.id(), error = %e, "termination notice not delivered");
            }
        }))
        .await;
    }

    fn lock(&self) -> MutexGuard<'_, RoomInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("members", &inner.members.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ManagerError;
    use crate::manager::RoomRegistry;
    use crate::sink::testing::RecordingSink;

    fn room_id(s: &str) -> RoomId {
        RoomId::try_from(s).unwrap()
    }

    fn member(id: u64, sink: &Arc<RecordingSink>) -> Arc<Member> {
        Arc::new(Member::new(ConnectionId(id), sink.clone(), 8))
    }

    #[tokio::test]
    async fn broadcast_skips_sender_and_survives_failed_sink() {
        let registry = RoomRegistry::new();
        let room = registry.create_room(room_id("lobby")).unwrap();

        let sinks = [
            Arc::new(RecordingSink::default()),
            Arc::new(RecordingSink::failing()),
            Arc::new(RecordingSink::default()),
        ];
        let members: Vec<_> = sinks
            .iter()
            .enumerate()
            .map(|(i, s)| member(i as u64 + 1, s))
            .collect();
        for m in &members {
            room.join(m).unwrap();
        }

        let sent = room.broadcast(ConnectionId(1), b"hi").await;
        assert_eq!(sent, 2);
        assert!(sinks[0].frames().is_empty());
        assert!(sinks[1].frames().is_empty());
        assert_eq!(sinks[2].frames(), vec![b"hi".to_vec()]);
    }

    #[tokio::test]
    async fn last_member_leaving_closes_and_deregisters() {
        let registry = RoomRegistry::new();
        let room = registry.create_room(room_id("lobby")).unwrap();
        let a = member(1, &Arc::new(RecordingSink::default()));
        let b = member(2, &Arc::new(RecordingSink::default()));
        room.join(&a).unwrap();
        room.join(&b).unwrap();

        assert_eq!(room.leave(a.id(), &registry), Ok(Departure::Remained));
        assert!(a.rooms().is_empty());
        assert!(!room.is_closed());

        assert_eq!(room.leave(b.id(), &registry), Ok(Departure::Closed));
        assert!(room.is_closed());
        assert_eq!(
            registry.resolve(&room_id("lobby")).unwrap_err(),
            ManagerError::NotFound(room_id("lobby"))
        );
        assert_eq!(room.join(&a), Err(RoomError::Closed(room_id("lobby"))));
    }

    #[tokio::test]
    async fn terminate_notifies_everyone_and_clears_membership() {
        let registry = RoomRegistry::new();
        let room = registry.create_room(room_id("r")).unwrap();
        let sinks = [Arc::new(RecordingSink::default()), Arc::new(RecordingSink::default())];
        let a = member(1, &sinks[0]);
        let b = member(2, &sinks[1]);
        room.join(&a).unwrap();
        room.join(&b).unwrap();

        room.terminate(TerminationReason::Requested, &registry).await;
        room.terminate(TerminationReason::Requested, &registry).await;

        let notice = encode_room_termination(&room_id("r"));
        assert_eq!(sinks[0].frames(), vec![notice.clone()]);
        assert_eq!(sinks[1].frames(), vec![notice]);
        assert!(a.rooms().is_empty());
        assert!(b.rooms().is_empty());
        assert!(room.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn double_join_and_stranger_leave_are_refused() {
        let registry = RoomRegistry::new();
        let room = registry.create_room(room_id("r")).unwrap();
        let a = member(1, &Arc::new(RecordingSink::default()));

        room.join(&a).unwrap();
        assert_eq!(room.join(&a), Err(RoomError::AlreadyMember(room_id("r"))));
        assert_eq!(
            room.leave(ConnectionId(9), &registry),
            Err(RoomError::NotMember(room_id("r")))
        );
        assert_eq!(room.members(), vec![ConnectionId(1)]);
    }

    #[tokio::test]
    async fn send_to_requires_membership() {
        let room = Room::new(room_id("r"));
        let sink = Arc::new(RecordingSink::default());
        let a = member(1, &sink);
        room.join(&a).unwrap();

        room.send_to(ConnectionId(1), &[0xAB]).await.unwrap();
        assert_eq!(sink.frames(), vec![vec![0xAB]]);
        assert_eq!(
            room.send_to(ConnectionId(2), &[0xAB]).await,
            Err(RoomError::NotMember(room_id("r")))
        );
    }

    #[tokio::test]
    async fn relayed_knock_is_pending_at_recipients() {
        let room = Room::new(room_id("r"));
        let sinks = [Arc::new(RecordingSink::default()), Arc::new(RecordingSink::default())];
        let a = member(1, &sinks[0]);
        let b = member(2, &sinks[1]);
        room.join(&a).unwrap();
        room.join(&b).unwrap();

        assert_eq!(room.relay_knock(a.id()).await, 1);
        assert!(sinks[0].frames().is_empty());
        assert_eq!(
            sinks[1].frames(),
            vec![encode_knock_notice(&room_id("r"), ConnectionId(1))]
        );
        assert_eq!(a.take_knock(), None);
        assert_eq!(
            b.take_knock(),
            Some(PendingKnock {
                room: room_id("r"),
                knocker: ConnectionId(1)
            })
        );
    }

    #[tokio::test]
    async fn undelivered_knock_is_not_pending() {
        let room = Room::new(room_id("r"));
        let a = member(1, &Arc::new(RecordingSink::default()));
        let b = member(2, &Arc::new(RecordingSink::failing()));
        let c = member(3, &Arc::new(RecordingSink::default()));
        for m in [&a, &b, &c] {
            room.join(m).unwrap();
        }

        assert_eq!(room.relay_knock(a.id()).await, 2);
        assert_eq!(b.take_knock(), None);
        assert_eq!(
            c.take_knock(),
            Some(PendingKnock {
                room: room_id("r"),
                knocker: ConnectionId(1)
            })
        );
    }
}
