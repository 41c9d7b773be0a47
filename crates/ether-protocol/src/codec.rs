//! Client-to-server frames.
//!
//! Decoders take exactly the bytes of one read and either return a typed
//! value or a classified error; encoders are their inverses and exist for
//! clients and tests.

use crate::codes::{HANDSHAKE_LEN, HANDSHAKE_MAGIC, KEY_HEADER_LEN, KEY_MAGIC, PacketKind};
use crate::error::{
    HandshakeError, KeyPacketError, ProtocolError, ProtocolResult, SessionPacketError,
};
use crate::ids::RoomId;
use crate::MAX_KEY_LEN;

/// A valid handshake frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub version: u16,
}

/// A valid key-exchange frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPacket {
    pub key: Vec<u8>,
}

/// A decoded session frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPacket {
    KnockRequest,
    Knock,
    KnockAnswer,
    /// Opaque payload to relay to the sender's rooms.
    Message(Vec<u8>),
    /// Whatever followed the `0xAF` byte; not interpreted.
    RoomTermination(Vec<u8>),
    Disconnect,
    JoinRoom(RoomId),
    LeaveRoom(RoomId),
}

impl SessionPacket {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::KnockRequest => PacketKind::KnockRequest,
            Self::Knock => PacketKind::Knock,
            Self::KnockAnswer => PacketKind::KnockAnswer,
            Self::Message(_) => PacketKind::Message,
            Self::RoomTermination(_) => PacketKind::RoomTermination,
            Self::Disconnect => PacketKind::Disconnect,
            Self::JoinRoom(_) => PacketKind::JoinRoom,
            Self::LeaveRoom(_) => PacketKind::LeaveRoom,
        }
    }
}

/// Decodes the initial six-byte frame.
pub fn decode_handshake(bytes: &[u8]) -> Result<Handshake, HandshakeError> {
    if bytes.len() != HANDSHAKE_LEN {
        return Err(HandshakeError::WrongLength { len: bytes.len() });
    }
    if bytes[..4] != HANDSHAKE_MAGIC {
        return Err(HandshakeError::WrongMagic);
    }
    Ok(Handshake {
        version: u16::from_be_bytes([bytes[4], bytes[5]]),
    })
}

pub fn encode_handshake(version: u16) -> [u8; HANDSHAKE_LEN] {
    let [hi, lo] = version.to_be_bytes();
    let [a, b, c, d] = HANDSHAKE_MAGIC;
    [a, b, c, d, hi, lo]
}

/// Decodes a key-exchange frame.
///
/// Checks run in wire order: length floor, magic, then the declared length
/// against what was actually received.
pub fn decode_key_packet(bytes: &[u8]) -> Result<KeyPacket, KeyPacketError> {
    if bytes.len() < KEY_HEADER_LEN {
        return Err(KeyPacketError::TooShort { len: bytes.len() });
    }
    if bytes[..2] != KEY_MAGIC {
        return Err(KeyPacketError::BadMagic);
    }
    let declared = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    let actual = bytes.len() - KEY_HEADER_LEN;
    if declared != actual {
        return Err(KeyPacketError::LengthMismatch { declared, actual });
    }
    Ok(KeyPacket {
        key: bytes[KEY_HEADER_LEN..].to_vec(),
    })
}

pub fn encode_key_packet(key: &[u8]) -> ProtocolResult<Vec<u8>> {
    if key.len() > MAX_KEY_LEN {
        return Err(ProtocolError::KeyTooLong(key.len()));
    }
    let mut out = Vec::with_capacity(KEY_HEADER_LEN + key.len());
    out.extend_from_slice(&KEY_MAGIC);
    out.extend_from_slice(&(key.len() as u16).to_be_bytes());
    out.extend_from_slice(key);
    Ok(out)
}

/// Decodes an active-session frame.
pub fn decode_session_packet(bytes: &[u8]) -> Result<SessionPacket, SessionPacketError> {
    let (&lead, body) = bytes.split_first().ok_or(SessionPacketError::Empty)?;
    let kind = PacketKind::from_byte(lead).ok_or(SessionPacketError::Unknown(lead))?;

    let packet = match kind {
        PacketKind::KnockRequest => SessionPacket::KnockRequest,
        PacketKind::Knock => SessionPacket::Knock,
        PacketKind::KnockAnswer => SessionPacket::KnockAnswer,
        PacketKind::Message => SessionPacket::Message(body.to_vec()),
        PacketKind::RoomTermination => SessionPacket::RoomTermination(body.to_vec()),
        PacketKind::Disconnect => SessionPacket::Disconnect,
        PacketKind::JoinRoom => SessionPacket::JoinRoom(room_body(lead, body)?),
        PacketKind::LeaveRoom => SessionPacket::LeaveRoom(room_body(lead, body)?),
    };
    Ok(packet)
}

/// Body of a join/leave frame: `<len:u8> <roomId>` and nothing after it.
fn room_body(kind: u8, body: &[u8]) -> Result<RoomId, SessionPacketError> {
    let malformed = |reason| SessionPacketError::Malformed { kind, reason };
    match RoomId::read_prefixed(body) {
        None => Err(malformed("room id truncated")),
        Some(Err(_)) => Err(malformed("room id length out of range")),
        Some(Ok((_, used))) if used != body.len() => Err(malformed("trailing bytes after room id")),
        Some(Ok((id, _))) => Ok(id),
    }
}

pub fn encode_session_packet(packet: &SessionPacket) -> Vec<u8> {
    let mut out = vec![packet.kind().byte()];
    match packet {
        SessionPacket::Message(payload) | SessionPacket::RoomTermination(payload) => {
            out.extend_from_slice(payload)
        }
        SessionPacket::JoinRoom(room) | SessionPacket::LeaveRoom(room) => {
            room.write_prefixed(&mut out)
        }
        SessionPacket::KnockRequest
        | SessionPacket::Knock
        | SessionPacket::KnockAnswer
        | SessionPacket::Disconnect => {}
    }
    out
}
