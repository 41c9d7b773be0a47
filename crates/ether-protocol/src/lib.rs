//! Wire format for the ether room network.
//!
//! A connection walks through three framings, each self-delimiting per read:
//!
//! ```text
//! handshake    05 31 B0 0B <version:u16 BE>                 (exactly 6 bytes)
//! key exchange 0E 1F <len:u16 BE> <key; len bytes>          (4 + len bytes)
//! session      <kind:u8> <payload...>                       (>= 1 byte)
//! ```
//!
//! The server answers every client frame with a single reply byte (see
//! [`Reply`]). Once a session is active it may also push notifications
//! (room closure, relayed knocks and messages), decoded on the client side by
//! [`decode_server_frame`].
//!
//! Everything in this crate is pure: no I/O, no allocation beyond the
//! returned buffers, and no panics on malformed input.
//!
//! # Example
//!
//! ```rust
//! use ether_protocol::{RoomId, decode_handshake, encode_room_termination};
//!
//! let handshake = decode_handshake(&[0x05, 0x31, 0xB0, 0x0B, 0x00, 0x01]).unwrap();
//! assert_eq!(handshake.version, 1);
//!
//! let room = RoomId::new(vec![0x01, 0x02, 0x03]).unwrap();
//! assert_eq!(encode_room_termination(&room), vec![0xAF, 0x03, 0x01, 0x02, 0x03]);
//! ```

mod codec;
mod codes;
mod error;
mod hex;
mod ids;
mod notify;

pub use codec::{
    Handshake, KeyPacket, SessionPacket, decode_handshake, decode_key_packet,
    decode_session_packet, encode_handshake, encode_key_packet, encode_session_packet,
};
pub use codes::{
    HANDSHAKE_LEN, HANDSHAKE_MAGIC, KEY_HEADER_LEN, KEY_MAGIC, PacketKind, Reply, VERSION_0001,
};
pub use error::{
    HandshakeError, KeyPacketError, ProtocolError, ProtocolResult, SessionPacketError,
};
pub use hex::Hex;
pub use ids::{ConnectionId, MAX_ROOM_ID_LEN, RoomId};
pub use notify::{
    ServerFrame, decode_server_frame, encode_knock_answer_notice, encode_knock_notice,
    encode_message_notice, encode_room_termination,
};

/// Largest key a key-exchange frame can carry (the length field is a u16).
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// Largest message payload that fits a relayed message notice.
pub const MAX_MESSAGE_PAYLOAD: usize = u16::MAX as usize;
