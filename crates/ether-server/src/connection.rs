//! Per-peer protocol state machine.
//!
//! ```text
//! Init --handshake v1--> KeyExchange --valid key--> Active --0xBF--> Closed
//!   |                         |                        |
//!   +-- bad frame ----------->+----- EOF / abandon --->+----------> Closed
//! ```
//!
//! One read is one frame. Every frame gets exactly one reply byte; the
//! handshake is the only stage where a bad frame ends the connection.

use std::fmt;
use std::io;
use std::sync::Arc;

use ether_protocol::{
    ConnectionId, Hex, Reply, RoomId, SessionPacket, SessionPacketError, VERSION_0001,
    decode_handshake, decode_key_packet, decode_session_packet, encode_knock_answer_notice,
    encode_message_notice,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::{InvalidTransition, ManagerError, RoomError};
use crate::key::SessionKey;
use crate::manager::Manager;
use crate::member::Member;
use crate::room::Room;
use crate::signals::ShutdownHandle;

/// Authentication stage of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Waiting for the handshake frame.
    Init,
    /// Handshake accepted, waiting for the key.
    KeyExchange,
    /// Key accepted, session packets flow.
    Active,
    /// Terminal.
    Closed,
}

impl AuthState {
    /// The single transition function. `Closed` is reachable from anywhere;
    /// everything else only moves one step forward.
    pub fn transition(self, to: AuthState) -> Result<AuthState, InvalidTransition> {
        use AuthState::*;
        match (self, to) {
            (Init, KeyExchange) | (KeyExchange, Active) | (_, Closed) => Ok(to),
            (from, to) => Err(InvalidTransition { from, to }),
        }
    }
}

/// Why the server gave up on a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// The handshake-stage ack could not be written.
    AckFailed,
    /// `max_read_errors` consecutive reads failed.
    TooManyReadErrors,
    /// Nothing arrived within `idle_timeout`.
    Idle,
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The peer sent a disconnect packet.
    Disconnected,
    /// The handshake was refused with this reply.
    Rejected(Reply),
    Abandoned(AbandonReason),
    /// The peer closed its end of the stream.
    PeerClosed,
    /// The server is shutting down.
    Stopped,
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Rejected(reply) => write!(f, "rejected with {reply}"),
            Self::Abandoned(AbandonReason::AckFailed) => f.write_str("abandoned: ack write failed"),
            Self::Abandoned(AbandonReason::TooManyReadErrors) => {
                f.write_str("abandoned: too many read errors")
            }
            Self::Abandoned(AbandonReason::Idle) => f.write_str("abandoned: idle"),
            Self::PeerClosed => f.write_str("peer closed"),
            Self::Stopped => f.write_str("server shutting down"),
        }
    }
}

enum Inbound {
    Frame(usize),
    Eof,
    Idle,
    Stopped,
    Failed(io::Error),
}

/// One accepted peer: the read half of its transport plus its [`Member`]
/// handle, which carries the write half.
pub struct Connection<R> {
    id: ConnectionId,
    state: AuthState,
    key: Option<SessionKey>,
    reader: R,
    buf: Vec<u8>,
    read_errors: u32,
    member: Arc<Member>,
    manager: Arc<dyn Manager>,
    config: ConnectionConfig,
    stop: Option<ShutdownHandle>,
}

impl<R> Connection<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(
        reader: R,
        member: Arc<Member>,
        manager: Arc<dyn Manager>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            id: member.id(),
            state: AuthState::Init,
            key: None,
            reader,
            buf: vec![0; config.read_buffer_size],
            read_errors: 0,
            member,
            manager,
            config,
            stop: None,
        }
    }

    /// Ends the connection at its next read once `stop` is triggered.
    pub fn with_shutdown(mut self, stop: ShutdownHandle) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Drives the connection to completion. Teardown runs on every exit path.
    pub async fn serve(mut self) -> Exit {
        let exit = self.run().await;
        self.teardown(exit).await;
        exit
    }

    async fn run(&mut self) -> Exit {
        if let Err(exit) = self.handshake().await {
            return exit;
        }
        if let Err(exit) = self.key_exchange().await {
            return exit;
        }
        self.session().await
    }

    async fn handshake(&mut self) -> Result<(), Exit> {
        let n = match self.read_frame().await {
            Inbound::Frame(n) => n,
            Inbound::Eof => return Err(Exit::PeerClosed),
            Inbound::Idle => return Err(Exit::Abandoned(AbandonReason::Idle)),
            Inbound::Stopped => return Err(Exit::Stopped),
            Inbound::Failed(e) => {
                warn!(error = %e, "handshake read failed");
                self.reply(Reply::ReadError).await;
                return Err(Exit::Rejected(Reply::ReadError));
            }
        };

        let handshake = match decode_handshake(&self.buf[..n]) {
            Ok(handshake) => handshake,
            Err(e) => {
                warn!(error = %e, frame = %Hex(&self.buf[..n]), "handshake refused");
                self.reply(e.reply()).await;
                return Err(Exit::Rejected(e.reply()));
            }
        };
        if handshake.version != VERSION_0001 {
            warn!(version = handshake.version, "unsupported protocol version");
            self.reply(Reply::UnsupportedVersion).await;
            return Err(Exit::Rejected(Reply::UnsupportedVersion));
        }

        self.advance(AuthState::KeyExchange);
        if let Err(e) = self.ack().await {
            warn!(error = %e, "handshake ack failed");
            return Err(Exit::Abandoned(AbandonReason::AckFailed));
        }
        Ok(())
    }

    async fn key_exchange(&mut self) -> Result<(), Exit> {
        loop {
            let n = match self.read_frame().await {
                Inbound::Frame(n) => n,
                Inbound::Eof => return Err(Exit::PeerClosed),
                Inbound::Idle => return Err(Exit::Abandoned(AbandonReason::Idle)),
                Inbound::Stopped => return Err(Exit::Stopped),
                Inbound::Failed(e) => {
                    self.read_failed(e).await?;
                    continue;
                }
            };

            match decode_key_packet(&self.buf[..n]) {
                Ok(packet) => {
                    let key = SessionKey::new(packet.key);
                    info!(key_id = %Hex(&key.id()), key_len = key.len(), "key accepted");
                    self.key = Some(key);
                    self.advance(AuthState::Active);
                    if let Err(e) = self.ack().await {
                        warn!(error = %e, "key exchange ack failed");
                        return Err(Exit::Abandoned(AbandonReason::AckFailed));
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "key packet refused");
                    self.reply(e.reply()).await;
                }
            }
        }
    }

    async fn session(&mut self) -> Exit {
        loop {
            let n = match self.read_frame().await {
                Inbound::Frame(n) => n,
                Inbound::Eof => return Exit::PeerClosed,
                Inbound::Idle => return Exit::Abandoned(AbandonReason::Idle),
                Inbound::Stopped => return Exit::Stopped,
                Inbound::Failed(e) => {
                    if let Err(exit) = self.read_failed(e).await {
                        return exit;
                    }
                    continue;
                }
            };

            let packet = match decode_session_packet(&self.buf[..n]) {
                Ok(packet) => packet,
                Err(e) => {
                    match e {
                        SessionPacketError::Unknown(byte) => {
                            warn!(byte = %Hex(&[byte]), "unknown packet")
                        }
                        _ => warn!(error = %e, "malformed packet"),
                    }
                    self.reply(e.reply()).await;
                    continue;
                }
            };

            trace!(kind = ?packet.kind(), "packet");
            let reply = match packet {
                SessionPacket::KnockRequest => Reply::Unimplemented,
                SessionPacket::RoomTermination(body) => {
                    debug!(body = %Hex(&body), "peer sent room termination");
                    Reply::Unimplemented
                }
                SessionPacket::Knock => self.knock().await,
                SessionPacket::KnockAnswer => self.answer_knock().await,
                SessionPacket::Message(payload) => self.relay_message(&payload).await,
                SessionPacket::JoinRoom(room) => self.join(room).await,
                SessionPacket::LeaveRoom(room) => self.leave(&room),
                SessionPacket::Disconnect => {
                    info!("peer disconnecting");
                    if let Err(e) = self.ack().await {
                        debug!(error = %e, "disconnect ack not delivered");
                    }
                    return Exit::Disconnected;
                }
            };

            if reply.is_ack() {
                if let Err(e) = self.ack().await {
                    debug!(error = %e, "ack not delivered");
                }
            } else {
                self.reply(reply).await;
            }
        }
    }

    async fn knock(&self) -> Reply {
        let rooms = self.joined_rooms();
        if rooms.is_empty() {
            return Reply::NotMember;
        }
        for room in rooms {
            let recipients = room.relay_knock(self.id).await;
            debug!(room = %room.id(), recipients, "knock relayed");
        }
        Reply::Ack
    }

    async fn answer_knock(&self) -> Reply {
        let Some(knock) = self.member.take_knock() else {
            warn!("knock answer out of path");
            return Reply::OutOfPath;
        };

        let notice = encode_knock_answer_notice(&knock.room, self.id);
        let delivered = match self.manager.resolve(&knock.room) {
            Ok(room) => room.send_to(knock.knocker, &notice).await.is_ok(),
            Err(_) => false,
        };
        if !delivered {
            debug!(room = %knock.room, knocker = %knock.knocker, "knocker has left, answer dropped");
        }
        Reply::Ack
    }

    async fn relay_message(&self, payload: &[u8]) -> Reply {
        let rooms = self.joined_rooms();
        if rooms.is_empty() {
            return Reply::NotMember;
        }
        for room in rooms {
            let notice = match encode_message_notice(room.id(), self.id, payload) {
                Ok(notice) => notice,
                Err(e) => {
                    debug!(error = %e, "message not relayable");
                    return Reply::MalformedPacket;
                }
            };
            let recipients = room.broadcast(self.id, &notice).await;
            debug!(room = %room.id(), recipients, len = payload.len(), "message relayed");
        }
        Reply::Ack
    }

    /// Joins `id`, creating the room when nobody has yet.
    async fn join(&self, id: RoomId) -> Reply {
        loop {
            let room = match self.manager.resolve(&id) {
                Ok(room) => room,
                Err(ManagerError::NotFound(_)) => match self.manager.create_room(id.clone()) {
                    Ok(room) => room,
                    // lost the creation race, resolve the winner's room
                    Err(_) => continue,
                },
                Err(e) => {
                    error!(error = %e, "room lookup failed");
                    return Reply::NotMember;
                }
            };

            match room.join(&self.member) {
                Ok(()) => return Reply::Ack,
                Err(RoomError::AlreadyMember(_)) => return Reply::AlreadyMember,
                Err(RoomError::Closed(_)) => {
                    // closing room is about to be deregistered
                    tokio::task::yield_now().await;
                }
                Err(RoomError::NotMember(_)) => return Reply::NotMember,
            }
        }
    }

    fn leave(&self, id: &RoomId) -> Reply {
        if !self.member.is_in(id) {
            return Reply::NotMember;
        }
        let Ok(room) = self.manager.resolve(id) else {
            return Reply::NotMember;
        };
        match room.leave(self.id, &*self.manager) {
            Ok(_) => Reply::Ack,
            Err(_) => Reply::NotMember,
        }
    }

    /// Rooms this connection currently belongs to.
    fn joined_rooms(&self) -> Vec<Arc<Room>> {
        self.member
            .rooms()
            .iter()
            .filter_map(|id| self.manager.resolve(id).ok())
            .collect()
    }

    async fn read_frame(&mut self) -> Inbound {
        let stop = self.stop.clone();
        let stopped = async move {
            match stop {
                Some(stop) => stop.wait().wait().await,
                None => std::future::pending().await,
            }
        };

        let idle_timeout = self.config.idle_timeout;
        let reader = &mut self.reader;
        let buf = &mut self.buf[..];
        let read = async move {
            match idle_timeout {
                Some(limit) => tokio::time::timeout(limit, reader.read(buf)).await.ok(),
                None => Some(reader.read(buf).await),
            }
        };

        let result = tokio::select! {
            result = read => match result {
                Some(result) => result,
                None => return Inbound::Idle,
            },
            _ = stopped => return Inbound::Stopped,
        };

        match result {
            Ok(0) => Inbound::Eof,
            Ok(n) => {
                self.read_errors = 0;
                Inbound::Frame(n)
            }
            Err(e) => Inbound::Failed(e),
        }
    }

    /// Answers a failed read and enforces the consecutive error budget.
    async fn read_failed(&mut self, e: io::Error) -> Result<(), Exit> {
        self.read_errors += 1;
        warn!(error = %e, consecutive = self.read_errors, "read failed");
        self.reply(Reply::ReadError).await;
        if self.read_errors >= self.config.max_read_errors {
            return Err(Exit::Abandoned(AbandonReason::TooManyReadErrors));
        }
        Ok(())
    }

    async fn ack(&self) -> io::Result<()> {
        self.member.send(&[Reply::Ack.byte()]).await
    }

    async fn reply(&self, reply: Reply) {
        if let Err(e) = self.member.send(&[reply.byte()]).await {
            debug!(code = %reply, error = %e, "reply not delivered");
        }
    }

    fn advance(&mut self, to: AuthState) {
        match self.state.transition(to) {
            Ok(next) => {
                trace!(from = ?self.state, to = ?next, "state");
                self.state = next;
            }
            Err(e) => error!(error = %e, "state change refused"),
        }
    }

    async fn teardown(&mut self, exit: Exit) {
        for id in self.member.rooms() {
            if let Ok(room) = self.manager.resolve(&id) {
                let _ = room.leave(self.id, &*self.manager);
            }
        }
        self.member.close().await;
        self.advance(AuthState::Closed);
        let key_id = self.key.as_ref().map(|key| Hex(&key.id()).to_string());
        info!(%exit, key_id = ?key_id, "connection closed");
    }
}
