//! Events delivered from a [`SessionChannel`](crate::channel::SessionChannel)
//! to its owner.
//!
//! Relay frames map one-to-one onto variants; `Connected`, `Disconnected`
//! and `Reconnecting` are synthesized by the channel itself.

use std::time::Duration;

use crate::protocol::{
    BoardDataPayload, ConnectionId, GameStartPayload, RoomId, ServerMessage,
};

/// Everything a [`GameSession`](crate::session::GameSession) reacts to from
/// the network side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The relay finished its handshake and assigned us `id`.
    Connected { id: ConnectionId },
    /// The transport went away. `reason` is `None` for a clean close.
    Disconnected { reason: Option<String> },
    /// The channel will try to reconnect after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// `roomCreated`
    RoomCreated { room_id: RoomId },
    /// `gameStart`
    GameStart(GameStartPayload),
    /// `boardData`
    BoardData(BoardDataPayload),
    /// `restartGame`
    RestartGame { room_id: RoomId },
    /// `leftGame`
    OpponentSteppedAway,
    /// `userLeft`
    OpponentLeft,
}

impl From<ServerMessage> for SessionEvent {
    fn from(msg: ServerMessage) -> Self {
        match msg {
            ServerMessage::Connect(handshake) => SessionEvent::Connected { id: handshake.sid },
            ServerMessage::RoomCreated(room_id) => SessionEvent::RoomCreated { room_id },
            ServerMessage::GameStart(payload) => SessionEvent::GameStart(payload),
            ServerMessage::BoardData(payload) => SessionEvent::BoardData(payload),
            ServerMessage::RestartGame(room_id) => SessionEvent::RestartGame { room_id },
            ServerMessage::LeftGame => SessionEvent::OpponentSteppedAway,
            ServerMessage::UserLeft => SessionEvent::OpponentLeft,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HandshakePayload, Mark};

    #[test]
    fn handshake_becomes_connected() {
        let event = SessionEvent::from(ServerMessage::Connect(HandshakePayload {
            sid: "abc".into(),
        }));
        assert_eq!(event, SessionEvent::Connected { id: "abc".into() });
    }

    #[test]
    fn relay_messages_map_through() {
        let board = BoardDataPayload {
            number: 4,
            current_player: Mark::X,
        };
        assert_eq!(
            SessionEvent::from(ServerMessage::BoardData(board)),
            SessionEvent::BoardData(board)
        );
        assert_eq!(
            SessionEvent::from(ServerMessage::RoomCreated("R".into())),
            SessionEvent::RoomCreated {
                room_id: "R".into()
            }
        );
        assert_eq!(
            SessionEvent::from(ServerMessage::UserLeft),
            SessionEvent::OpponentLeft
        );
    }
}
