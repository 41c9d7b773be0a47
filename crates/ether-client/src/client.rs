//! TCP client for the ether daemon.
//!
//! Before the session is active every server answer is one reply byte. Once
//! the key is accepted, replies and pushed notifications share the stream, so
//! reads go through [`decode_server_frame`] and notifications that arrive
//! while a reply is awaited are queued for [`EtherClient::next_notification`].

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use ether_protocol::{
    Reply, RoomId, ServerFrame, SessionPacket, VERSION_0001, decode_server_frame,
    encode_handshake, encode_key_packet, encode_session_packet,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// Default time to wait for a connect or a reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A client session over any byte stream; [`EtherClient::connect`] uses TCP.
pub struct EtherClient<S = TcpStream> {
    stream: S,
    timeout: Duration,
    inbox: Vec<u8>,
    notifications: VecDeque<ServerFrame>,
}

impl EtherClient<TcpStream> {
    /// Connects and performs the handshake.
    pub async fn connect(addr: SocketAddr, timeout: Duration) -> ClientResult<Self> {
        debug!(%addr, "connecting");
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout("connecting"))?
            .map_err(|e| ClientError::Connection(format!("failed to connect to {addr}: {e}")))?;
        stream.set_nodelay(true)?;
        Self::handshake(stream, timeout).await
    }
}

impl<S> EtherClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Performs the handshake on an already connected stream.
    pub async fn handshake(stream: S, timeout: Duration) -> ClientResult<Self> {
        let mut client = Self {
            stream,
            timeout,
            inbox: Vec::new(),
            notifications: VecDeque::new(),
        };
        client.write(&encode_handshake(VERSION_0001)).await?;
        client.expect_ack_byte().await?;
        Ok(client)
    }

    /// Hands the key over. Must be called once, before any session request.
    pub async fn exchange_key(&mut self, key: &[u8]) -> ClientResult<()> {
        self.write(&encode_key_packet(key)?).await?;
        self.expect_ack_byte().await
    }

    /// Joins a room, creating it if needed.
    pub async fn join(&mut self, room: &RoomId) -> ClientResult<()> {
        self.request(&SessionPacket::JoinRoom(room.clone())).await
    }

    pub async fn leave(&mut self, room: &RoomId) -> ClientResult<()> {
        self.request(&SessionPacket::LeaveRoom(room.clone())).await
    }

    /// Relays `payload` to the other members of every joined room.
    pub async fn send_message(&mut self, payload: &[u8]) -> ClientResult<()> {
        self.request(&SessionPacket::Message(payload.to_vec())).await
    }

    pub async fn knock(&mut self) -> ClientResult<()> {
        self.request(&SessionPacket::Knock).await
    }

    /// Answers the oldest knock relayed to this client.
    pub async fn answer_knock(&mut self) -> ClientResult<()> {
        self.request(&SessionPacket::KnockAnswer).await
    }

    /// Sends the disconnect packet and waits for its ack.
    pub async fn disconnect(mut self) -> ClientResult<()> {
        self.request(&SessionPacket::Disconnect).await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Next pushed notification, or `None` once the server closes the stream.
    /// Blocks without a timeout.
    pub async fn next_notification(&mut self) -> ClientResult<Option<ServerFrame>> {
        if let Some(frame) = self.notifications.pop_front() {
            return Ok(Some(frame));
        }
        loop {
            match self.next_frame().await? {
                Some(ServerFrame::Reply(reply)) => {
                    debug!(%reply, "stray reply");
                }
                other => return Ok(other),
            }
        }
    }

    async fn request(&mut self, packet: &SessionPacket) -> ClientResult<()> {
        self.write(&encode_session_packet(packet)).await?;
        let timeout = self.timeout;
        let reply = tokio::time::timeout(timeout, self.await_reply())
            .await
            .map_err(|_| ClientError::Timeout("waiting for reply"))??;
        debug!(kind = ?packet.kind(), %reply, "reply");
        if reply.is_ack() {
            Ok(())
        } else {
            Err(ClientError::Rejected(reply))
        }
    }

    async fn await_reply(&mut self) -> ClientResult<Reply> {
        loop {
            match self.next_frame().await? {
                Some(ServerFrame::Reply(reply)) => return Ok(reply),
                Some(notification) => self.notifications.push_back(notification),
                None => return Err(ClientError::Connection("server closed the connection".into())),
            }
        }
    }

    async fn next_frame(&mut self) -> ClientResult<Option<ServerFrame>> {
        loop {
            if let Some((frame, used)) = decode_server_frame(&self.inbox)? {
                self.inbox.drain(..used);
                return Ok(Some(frame));
            }
            let mut chunk = [0u8; 1024];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.inbox.extend_from_slice(&chunk[..n]);
        }
    }

    /// Pre-session answers are single raw bytes.
    async fn expect_ack_byte(&mut self) -> ClientResult<()> {
        let byte = tokio::time::timeout(self.timeout, self.stream.read_u8())
            .await
            .map_err(|_| ClientError::Timeout("waiting for reply"))?
            .map_err(|e| ClientError::Connection(format!("no reply from server: {e}")))?;
        match Reply::from_byte(byte) {
            Some(Reply::Ack) => Ok(()),
            Some(reply) => Err(ClientError::Rejected(reply)),
            None => Err(ClientError::Protocol(ether_protocol::ProtocolError::Malformed(
                "unknown reply byte",
            ))),
        }
    }

    async fn write(&mut self, frame: &[u8]) -> ClientResult<()> {
        tokio::time::timeout(self.timeout, async {
            self.stream.write_all(frame).await?;
            self.stream.flush().await
        })
        .await
        .map_err(|_| ClientError::Timeout("sending frame"))??;
        Ok(())
    }
}
