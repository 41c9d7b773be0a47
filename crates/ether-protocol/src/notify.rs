//! Server-to-client frames of an active session.
//!
//! ```text
//! reply            <code:u8>
//! room closed      AF <len:u8> <roomId>
//! knock            EE <len:u8> <roomId> <knocker:u64 BE>
//! knock answer     AB <len:u8> <roomId> <answerer:u64 BE>
//! message          DA <len:u8> <roomId> <sender:u64 BE> <len:u16 BE> <payload>
//! ```
//!
//! Unlike client frames these may arrive back to back in one read, so the
//! decoder is incremental and reports how many bytes it consumed.

use crate::codes::{PacketKind, Reply};
use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::{ConnectionId, RoomId};
use crate::MAX_MESSAGE_PAYLOAD;

/// A frame pushed by the server once the session is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Answer to the client's last frame.
    Reply(Reply),
    /// The room was terminated; membership is already revoked.
    RoomClosed(RoomId),
    /// Another member knocked. Answer with a knock-answer packet.
    Knock { room: RoomId, from: ConnectionId },
    /// A member answered a knock this client sent.
    KnockAnswer { room: RoomId, from: ConnectionId },
    /// A message relayed from another member.
    Message {
        room: RoomId,
        from: ConnectionId,
        payload: Vec<u8>,
    },
}

/// `AF <len> <roomId>`, sent to every member of a room being terminated.
pub fn encode_room_termination(room: &RoomId) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + room.as_bytes().len());
    out.push(PacketKind::RoomTermination.byte());
    room.write_prefixed(&mut out);
    out
}

pub fn encode_knock_notice(room: &RoomId, knocker: ConnectionId) -> Vec<u8> {
    room_notice(PacketKind::Knock, room, knocker)
}

pub fn encode_knock_answer_notice(room: &RoomId, answerer: ConnectionId) -> Vec<u8> {
    room_notice(PacketKind::KnockAnswer, room, answerer)
}

pub fn encode_message_notice(
    room: &RoomId,
    sender: ConnectionId,
    payload: &[u8],
) -> ProtocolResult<Vec<u8>> {
    if payload.len() > MAX_MESSAGE_PAYLOAD {
        return Err(ProtocolError::PayloadTooLong(payload.len()));
    }
    let mut out = room_notice(PacketKind::Message, room, sender);
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

fn room_notice(kind: PacketKind, room: &RoomId, who: ConnectionId) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + room.as_bytes().len() + 8);
    out.push(kind.byte());
    room.write_prefixed(&mut out);
    out.extend_from_slice(&who.to_be_bytes());
    out
}

/// Decodes the next frame from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` holds only part of a frame; the caller
/// should read more and try again.
pub fn decode_server_frame(buf: &[u8]) -> ProtocolResult<Option<(ServerFrame, usize)>> {
    let Some(&lead) = buf.first() else {
        return Ok(None);
    };

    let kind = match lead {
        0xAF => PacketKind::RoomTermination,
        0xEE => PacketKind::Knock,
        0xAB => PacketKind::KnockAnswer,
        0xDA => PacketKind::Message,
        other => {
            let reply = Reply::from_byte(other).ok_or(ProtocolError::Malformed("unknown lead byte"))?;
            return Ok(Some((ServerFrame::Reply(reply), 1)));
        }
    };

    let (room, mut used) = match RoomId::read_prefixed(&buf[1..]) {
        None => return Ok(None),
        Some(parsed) => {
            let (room, n) = parsed?;
            (room, 1 + n)
        }
    };

    if kind == PacketKind::RoomTermination {
        return Ok(Some((ServerFrame::RoomClosed(room), used)));
    }

    let Some(id_bytes) = buf.get(used..used + 8) else {
        return Ok(None);
    };
    let mut raw = [0u8; 8];
    raw.copy_from_slice(id_bytes);
    let from = ConnectionId::from_be_bytes(raw);
    used += 8;

    let frame = match kind {
        PacketKind::Knock => ServerFrame::Knock { room, from },
        PacketKind::KnockAnswer => ServerFrame::KnockAnswer { room, from },
        _ => {
            let Some(len_bytes) = buf.get(used..used + 2) else {
                return Ok(None);
            };
            let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
            used += 2;
            let Some(payload) = buf.get(used..used + len) else {
                return Ok(None);
            };
            used += len;
            ServerFrame::Message {
                room,
                from,
                payload: payload.to_vec(),
            }
        }
    };
    Ok(Some((frame, used)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::Hex;

    fn room(bytes: &[u8]) -> RoomId {
        RoomId::new(bytes.to_vec()).unwrap()
    }

    #[test]
    fn room_termination_layout() {
        let frame = encode_room_termination(&room(&[0x01, 0x02, 0x03]));
        assert_eq!(frame, vec![0xAF, 0x03, 0x01, 0x02, 0x03]);
        insta::assert_snapshot!(Hex(&frame).to_string(), @"af 03 01 02 03");
    }

    #[test]
    fn message_notice_layout() {
        let frame = encode_message_notice(&room(b"r"), ConnectionId(2), b"yo").unwrap();
        insta::assert_snapshot!(
            Hex(&frame).to_string(),
            @"da 01 72 00 00 00 00 00 00 00 02 00 02 79 6f"
        );
    }

    #[test]
    fn knock_notices_layout() {
        let knock = encode_knock_notice(&room(b"r"), ConnectionId(9));
        assert_eq!(knock, vec![0xEE, 1, b'r', 0, 0, 0, 0, 0, 0, 0, 9]);
        let answer = encode_knock_answer_notice(&room(b"r"), ConnectionId(9));
        assert_eq!(answer[0], 0xAB);
        assert_eq!(answer[1..], knock[1..]);
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let lobby = room(b"lobby");
        let mut stream = vec![0xA0];
        stream.extend(encode_message_notice(&lobby, ConnectionId(4), b"hello").unwrap());
        stream.extend(encode_knock_notice(&lobby, ConnectionId(5)));
        stream.extend(encode_room_termination(&lobby));

        let mut frames = Vec::new();
        let mut offset = 0;
        while let Some((frame, used)) = decode_server_frame(&stream[offset..]).unwrap() {
            frames.push(frame);
            offset += used;
        }

        assert_eq!(offset, stream.len());
        assert_eq!(
            frames,
            vec![
                ServerFrame::Reply(Reply::Ack),
                ServerFrame::Message {
                    room: lobby.clone(),
                    from: ConnectionId(4),
                    payload: b"hello".to_vec(),
                },
                ServerFrame::Knock {
                    room: lobby.clone(),
                    from: ConnectionId(5),
                },
                ServerFrame::RoomClosed(lobby),
            ]
        );
    }

    #[test]
    fn partial_frames_wait_for_more_bytes() {
        let frame = encode_message_notice(&room(b"abc"), ConnectionId(1), b"payload").unwrap();
        for cut in 0..frame.len() {
            assert_eq!(decode_server_frame(&frame[..cut]).unwrap(), None, "cut at {cut}");
        }
        let (_, used) = decode_server_frame(&frame).unwrap().unwrap();
        assert_eq!(used, frame.len());
    }

    #[test]
    fn rejects_unknown_lead_byte() {
        assert_eq!(
            decode_server_frame(&[0x10]),
            Err(ProtocolError::Malformed("unknown lead byte"))
        );
    }

    #[test]
    fn rejects_oversized_payload() {
        let payload = vec![0u8; MAX_MESSAGE_PAYLOAD + 1];
        assert!(matches!(
            encode_message_notice(&room(b"r"), ConnectionId(1), &payload),
            Err(ProtocolError::PayloadTooLong(_))
        ));
    }
}
