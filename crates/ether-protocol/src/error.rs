//! Protocol error types.
//!
//! Each decoding stage has its own error enum so a caller can only ever see
//! the failures that stage can produce, and each maps to exactly one
//! [`Reply`] byte.

use thiserror::Error;

use crate::codes::Reply;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Handshake frame rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Frame is not exactly six bytes.
    #[error("handshake must be 6 bytes, got {len}")]
    WrongLength { len: usize },

    /// First four bytes are not `05 31 B0 0B`.
    #[error("handshake magic mismatch")]
    WrongMagic,
}

impl HandshakeError {
    pub fn reply(self) -> Reply {
        match self {
            Self::WrongLength { .. } => Reply::HandshakeLength,
            Self::WrongMagic => Reply::HandshakeMagic,
        }
    }
}

/// Key-exchange frame rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyPacketError {
    /// Fewer than four bytes: no room for magic and length.
    #[error("key frame too short: {len} bytes")]
    TooShort { len: usize },

    /// First two bytes are not `0E 1F`.
    #[error("key frame magic mismatch")]
    BadMagic,

    /// Declared key length disagrees with the bytes actually received.
    #[error("key length mismatch: declared {declared}, carried {actual}")]
    LengthMismatch { declared: usize, actual: usize },
}

impl KeyPacketError {
    pub fn reply(self) -> Reply {
        match self {
            Self::TooShort { .. } => Reply::KeyTooShort,
            Self::BadMagic => Reply::KeyBadMagic,
            Self::LengthMismatch { .. } => Reply::KeyLengthMismatch,
        }
    }
}

/// Session frame rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionPacketError {
    /// Zero-length frame.
    #[error("empty session packet")]
    Empty,

    /// Leading byte names no known packet.
    #[error("unknown session packet 0x{0:02X}")]
    Unknown(u8),

    /// Known packet whose body is framed wrong (room id length and the like).
    #[error("malformed {kind:#04X} packet: {reason}")]
    Malformed { kind: u8, reason: &'static str },
}

impl SessionPacketError {
    pub fn reply(self) -> Reply {
        match self {
            Self::Empty | Self::Malformed { .. } => Reply::MalformedPacket,
            Self::Unknown(_) => Reply::UnknownPacket,
        }
    }
}

/// Any failure raised by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    KeyPacket(#[from] KeyPacketError),

    #[error(transparent)]
    SessionPacket(#[from] SessionPacketError),

    /// Room ids are 1..=255 bytes so their length fits one byte.
    #[error("room id must be 1..=255 bytes, got {0}")]
    RoomIdLength(usize),

    /// Key does not fit the u16 length field.
    #[error("key too long: {0} bytes (max 65535)")]
    KeyTooLong(usize),

    /// Message payload does not fit the u16 length field of a relay notice.
    #[error("payload too long: {0} bytes (max 65535)")]
    PayloadTooLong(usize),

    /// Server-to-client frame that cannot be parsed.
    #[error("malformed server frame: {0}")]
    Malformed(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_map_to_reply_bytes() {
        assert_eq!(HandshakeError::WrongLength { len: 3 }.reply().byte(), 0xA1);
        assert_eq!(HandshakeError::WrongMagic.reply().byte(), 0xA2);
        assert_eq!(KeyPacketError::TooShort { len: 1 }.reply().byte(), 0xAA);
        assert_eq!(KeyPacketError::BadMagic.reply().byte(), 0xAB);
        assert_eq!(
            KeyPacketError::LengthMismatch { declared: 4, actual: 2 }
                .reply()
                .byte(),
            0xAC
        );
        assert_eq!(SessionPacketError::Empty.reply().byte(), 0xBA);
        assert_eq!(SessionPacketError::Unknown(0x42).reply().byte(), 0xFD);
    }

    #[test]
    fn messages_carry_detail() {
        let err = ProtocolError::from(KeyPacketError::LengthMismatch {
            declared: 10,
            actual: 3,
        });
        assert_eq!(err.to_string(), "key length mismatch: declared 10, carried 3");
        assert_eq!(
            SessionPacketError::Unknown(0x07).to_string(),
            "unknown session packet 0x07"
        );
    }
}
