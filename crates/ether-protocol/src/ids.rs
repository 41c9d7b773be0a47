//! Identifiers carried on the wire.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::{ProtocolError, ProtocolResult};
use crate::hex::Hex;

/// Room ids are length-prefixed with a single byte.
pub const MAX_ROOM_ID_LEN: usize = u8::MAX as usize;

/// Opaque room identifier, 1..=255 bytes.
///
/// The bound is checked once at construction, so every encoder can write the
/// length as a single byte without re-validating.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(Vec<u8>);

impl RoomId {
    /// Validates and wraps raw room id bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> ProtocolResult<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() || bytes.len() > MAX_ROOM_ID_LEN {
            return Err(ProtocolError::RoomIdLength(bytes.len()));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length as written on the wire. Always fits because of the constructor bound.
    pub fn wire_len(&self) -> u8 {
        self.0.len() as u8
    }

    /// Appends `<len:u8> <bytes>` to `out`.
    pub(crate) fn write_prefixed(&self, out: &mut Vec<u8>) {
        out.push(self.wire_len());
        out.extend_from_slice(&self.0);
    }

    /// Reads `<len:u8> <bytes>` from the front of `buf`, returning the id and
    /// the number of bytes consumed, or `None` if `buf` is too short.
    pub(crate) fn read_prefixed(buf: &[u8]) -> Option<ProtocolResult<(Self, usize)>> {
        let len = *buf.first()? as usize;
        let bytes = buf.get(1..1 + len)?;
        Some(Self::new(bytes.to_vec()).map(|id| (id, 1 + len)))
    }
}

impl TryFrom<&str> for RoomId {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.as_bytes().to_vec())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) if text.chars().all(|c| !c.is_control()) => f.write_str(text),
            _ => write!(f, "{}", Hex(&self.0)),
        }
    }
}

impl fmt::Debug for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoomId({self})")
    }
}

impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Server-assigned identity of one accepted connection.
///
/// Carried as a big-endian u64 in relayed notices so recipients can tell
/// senders apart without learning anything about their keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_bounds() {
        assert!(matches!(RoomId::new(Vec::new()), Err(ProtocolError::RoomIdLength(0))));
        assert!(RoomId::new(vec![7u8; 255]).is_ok());
        assert!(matches!(
            RoomId::new(vec![7u8; 256]),
            Err(ProtocolError::RoomIdLength(256))
        ));
    }

    #[test]
    fn room_id_display() {
        assert_eq!(RoomId::try_from("lobby").unwrap().to_string(), "lobby");
        assert_eq!(RoomId::new(vec![0x01, 0xFF]).unwrap().to_string(), "01 ff");
    }

    #[test]
    fn prefixed_read_handles_short_input() {
        assert!(RoomId::read_prefixed(&[]).is_none());
        assert!(RoomId::read_prefixed(&[3, b'a']).is_none());
        let (id, used) = RoomId::read_prefixed(&[2, b'h', b'i', 0xFF]).unwrap().unwrap();
        assert_eq!(id.as_bytes(), b"hi");
        assert_eq!(used, 3);
        assert!(matches!(
            RoomId::read_prefixed(&[0]),
            Some(Err(ProtocolError::RoomIdLength(0)))
        ));
    }

    #[test]
    fn connection_id_round_trips_through_bytes() {
        let id = ConnectionId(0x0102_0304_0506_0708);
        assert_eq!(ConnectionId::from_be_bytes(id.to_be_bytes()), id);
        assert_eq!(id.to_string(), "#72623859790382856");
    }
}
