//! `ether listen`: join a room and print what arrives.

use ether_protocol::{ConnectionId, RoomId, ServerFrame};
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::ConnectArgs;
use crate::config::EtherConfig;
use crate::error::{ClientError, ClientResult};

/// One printed notification in `--json` mode.
#[derive(Debug, Serialize)]
pub struct Notification<'a> {
    pub event: &'static str,
    pub room: &'a RoomId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<ConnectionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl<'a> Notification<'a> {
    /// `None` for bare replies, which are not notifications.
    pub fn from_frame(frame: &'a ServerFrame) -> Option<Self> {
        let (event, room, from, payload) = match frame {
            ServerFrame::Reply(_) => return None,
            ServerFrame::RoomClosed(room) => ("room_closed", room, None, None),
            ServerFrame::Knock { room, from } => ("knock", room, Some(*from), None),
            ServerFrame::KnockAnswer { room, from } => ("knock_answer", room, Some(*from), None),
            ServerFrame::Message { room, from, payload } => (
                "message",
                room,
                Some(*from),
                Some(String::from_utf8_lossy(payload).into_owned()),
            ),
        };
        Some(Self {
            event,
            room,
            from,
            payload,
        })
    }

    /// Human-readable single line.
    pub fn line(&self) -> String {
        let from = self.from.map(|id| format!(" {id}")).unwrap_or_default();
        match &self.payload {
            Some(payload) => format!("[{}]{from} {}: {payload}", self.room, self.event),
            None => format!("[{}]{from} {}", self.room, self.event),
        }
    }
}

pub async fn run(
    args: &ConnectArgs,
    room: &str,
    json: bool,
    config: &EtherConfig,
) -> ClientResult<()> {
    let room = super::parse_room(room)?;
    let mut client = super::open_session(args, config).await?;
    client.join(&room).await?;
    info!(%room, "listening");

    loop {
        let frame = tokio::select! {
            frame = client.next_notification() => frame?,
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                return client.disconnect().await;
            }
        };
        let Some(frame) = frame else {
            return Err(ClientError::Connection("server closed the connection".into()));
        };

        if let Some(notification) = Notification::from_frame(&frame) {
            if json {
                let line = serde_json::to_string(&notification)
                    .map_err(|e| ClientError::Config(format!("failed to render notification: {e}")))?;
                println!("{line}");
            } else {
                println!("{}", notification.line());
            }
        }

        if frame == ServerFrame::RoomClosed(room.clone()) {
            info!(%room, "room closed");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> RoomId {
        RoomId::try_from("lobby").unwrap()
    }

    #[test]
    fn message_renders_both_ways() {
        let frame = ServerFrame::Message {
            room: room(),
            from: ConnectionId(7),
            payload: b"hi".to_vec(),
        };
        let n = Notification::from_frame(&frame).unwrap();
        assert_eq!(n.line(), "[lobby] #7 message: hi");
        assert_eq!(
            serde_json::to_string(&n).unwrap(),
            r#"{"event":"message","room":"lobby","from":7,"payload":"hi"}"#
        );
    }

    #[test]
    fn closure_has_no_sender() {
        let frame = ServerFrame::RoomClosed(room());
        let n = Notification::from_frame(&frame).unwrap();
        assert_eq!(n.line(), "[lobby] room_closed");
        assert_eq!(
            serde_json::to_string(&n).unwrap(),
            r#"{"event":"room_closed","room":"lobby"}"#
        );
    }

    #[test]
    fn replies_are_not_printed() {
        let frame = ServerFrame::Reply(ether_protocol::Reply::Ack);
        assert!(Notification::from_frame(&frame).is_none());
    }
}
