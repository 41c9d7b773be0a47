//! Wire constants: magic prefixes, packet kinds and reply bytes.

use std::fmt;

/// First four bytes of every handshake frame.
pub const HANDSHAKE_MAGIC: [u8; 4] = [0x05, 0x31, 0xB0, 0x0B];

/// Exact size of a handshake frame.
pub const HANDSHAKE_LEN: usize = 6;

/// First two bytes of every key-exchange frame.
pub const KEY_MAGIC: [u8; 2] = [0x0E, 0x1F];

/// Magic plus the u16 length field.
pub const KEY_HEADER_LEN: usize = 4;

/// The only protocol version currently served.
pub const VERSION_0001: u16 = 0x0001;

/// Leading byte of a session frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// `0xBA`: ask the server for a key.
    KnockRequest,
    /// `0xEE`: presence probe to the rest of the room.
    Knock,
    /// `0xAB`: answer to a knock that was relayed to this connection.
    KnockAnswer,
    /// `0xDA`: message to relay to the room.
    Message,
    /// `0xAF`: room termination (also the outbound closure notice).
    RoomTermination,
    /// `0xBF`: orderly disconnect.
    Disconnect,
    /// `0xC1`: join a room, creating it if absent.
    JoinRoom,
    /// `0xC2`: leave a room.
    LeaveRoom,
}

impl PacketKind {
    /// Maps a leading byte to its kind.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0xBA => Some(Self::KnockRequest),
            0xEE => Some(Self::Knock),
            0xAB => Some(Self::KnockAnswer),
            0xDA => Some(Self::Message),
            0xAF => Some(Self::RoomTermination),
            0xBF => Some(Self::Disconnect),
            0xC1 => Some(Self::JoinRoom),
            0xC2 => Some(Self::LeaveRoom),
            _ => None,
        }
    }

    /// The leading byte for this kind.
    pub fn byte(self) -> u8 {
        match self {
            Self::KnockRequest => 0xBA,
            Self::Knock => 0xEE,
            Self::KnockAnswer => 0xAB,
            Self::Message => 0xDA,
            Self::RoomTermination => 0xAF,
            Self::Disconnect => 0xBF,
            Self::JoinRoom => 0xC1,
            Self::LeaveRoom => 0xC2,
        }
    }
}

/// Single-byte server reply.
///
/// Exactly one reply is written per client frame. `Ack` advances or confirms;
/// every other value names the reason the frame was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reply {
    Ack = 0xA0,
    ReadError = 0xFF,
    HandshakeLength = 0xA1,
    HandshakeMagic = 0xA2,
    UnsupportedVersion = 0xA4,
    KeyTooShort = 0xAA,
    KeyBadMagic = 0xAB,
    KeyLengthMismatch = 0xAC,
    MalformedPacket = 0xBA,
    OutOfPath = 0xE0,
    AlreadyMember = 0xE1,
    NotMember = 0xE2,
    UnknownPacket = 0xFD,
    Unimplemented = 0xFE,
}

impl Reply {
    /// Wire byte for this reply.
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Decodes a reply byte.
    ///
    /// `0xAB` and `0xBA` are ambiguous with session notices; callers in the
    /// active state should go through [`crate::decode_server_frame`] instead.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let reply = match byte {
            0xA0 => Self::Ack,
            0xFF => Self::ReadError,
            0xA1 => Self::HandshakeLength,
            0xA2 => Self::HandshakeMagic,
            0xA4 => Self::UnsupportedVersion,
            0xAA => Self::KeyTooShort,
            0xAB => Self::KeyBadMagic,
            0xAC => Self::KeyLengthMismatch,
            0xBA => Self::MalformedPacket,
            0xE0 => Self::OutOfPath,
            0xE1 => Self::AlreadyMember,
            0xE2 => Self::NotMember,
            0xFD => Self::UnknownPacket,
            0xFE => Self::Unimplemented,
            _ => return None,
        };
        Some(reply)
    }

    pub fn is_ack(self) -> bool {
        self == Self::Ack
    }

    /// Short human-readable reason, used by the client when a frame is refused.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Ack => "acknowledged",
            Self::ReadError => "server failed to read the frame",
            Self::HandshakeLength => "handshake frame has the wrong length",
            Self::HandshakeMagic => "handshake frame has the wrong magic",
            Self::UnsupportedVersion => "protocol version not supported",
            Self::KeyTooShort => "key frame too short",
            Self::KeyBadMagic => "key frame has the wrong magic",
            Self::KeyLengthMismatch => "key length does not match the frame",
            Self::MalformedPacket => "malformed session packet",
            Self::OutOfPath => "knock answer without a pending knock",
            Self::AlreadyMember => "already a member of the room",
            Self::NotMember => "not a member of the room",
            Self::UnknownPacket => "unknown session packet",
            Self::Unimplemented => "not supported by this server",
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} ({})", self.byte(), self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_kind_bytes_are_stable() {
        for byte in 0u8..=255 {
            if let Some(kind) = PacketKind::from_byte(byte) {
                assert_eq!(kind.byte(), byte);
            }
        }
        assert_eq!(PacketKind::from_byte(0x00), None);
        assert_eq!(PacketKind::from_byte(0xBF), Some(PacketKind::Disconnect));
    }

    #[test]
    fn reply_bytes_match_wire_table() {
        assert_eq!(Reply::Ack.byte(), 0xA0);
        assert_eq!(Reply::HandshakeLength.byte(), 0xA1);
        assert_eq!(Reply::HandshakeMagic.byte(), 0xA2);
        assert_eq!(Reply::UnsupportedVersion.byte(), 0xA4);
        assert_eq!(Reply::KeyTooShort.byte(), 0xAA);
        assert_eq!(Reply::KeyBadMagic.byte(), 0xAB);
        assert_eq!(Reply::KeyLengthMismatch.byte(), 0xAC);
        assert_eq!(Reply::MalformedPacket.byte(), 0xBA);
        assert_eq!(Reply::OutOfPath.byte(), 0xE0);
        assert_eq!(Reply::UnknownPacket.byte(), 0xFD);
        assert_eq!(Reply::Unimplemented.byte(), 0xFE);
        assert_eq!(Reply::ReadError.byte(), 0xFF);
    }

    #[test]
    fn reply_from_byte_inverts_byte() {
        for byte in 0u8..=255 {
            if let Some(reply) = Reply::from_byte(byte) {
                assert_eq!(reply.byte(), byte);
            }
        }
        assert!(Reply::from_byte(0x00).is_none());
    }

    #[test]
    fn reply_display() {
        assert_eq!(
            Reply::Unimplemented.to_string(),
            "0xFE (not supported by this server)"
        );
    }
}
