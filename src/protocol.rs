//! Wire types for the relay's room protocol.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": <payload>}`. Events without a payload omit
//! `data`. Payload fields use camelCase to match the relay.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque room identifier assigned by the relay.
pub type RoomId = String;

/// Connection identifier assigned by the relay during the handshake.
pub type ConnectionId = String;

/// Number of cells on the board.
pub const CELL_COUNT: usize = 9;

// ── Enums ───────────────────────────────────────────────────────────

/// The mark a player places on the board.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Mark {
    /// Always moves first after a reset.
    #[default]
    X,
    O,
}

impl Mark {
    /// The mark that moves after this one.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::X => f.write_str("X"),
            Mark::O => f.write_str("O"),
        }
    }
}

// ── Payloads ────────────────────────────────────────────────────────

/// Payload of the relay's connection handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakePayload {
    /// Connection id the relay uses to address this client.
    pub sid: ConnectionId,
}

/// Payload of an outbound `boardClick` command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BoardClickPayload {
    pub room_id: RoomId,
    pub current_player: Mark,
    pub number: u8,
}

/// Payload carrying only the room id (`reset`, outbound `userLeft`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    pub room_id: RoomId,
}

/// Payload of the inbound `gameStart` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameStartPayload {
    pub room_id: RoomId,
    /// Connection ids of both participants. `users[0]` plays X first.
    pub users: [ConnectionId; 2],
}

/// Payload of the inbound `boardData` event: one authoritative move.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BoardDataPayload {
    pub number: u8,
    pub current_player: Mark,
}

// ── Client → Relay ──────────────────────────────────────────────────

/// Commands sent from this client to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Ask the relay for a fresh room.
    CreateRoom,
    /// Join an existing room by its code.
    JoinRoom(String),
    /// Place the sender's mark on a cell.
    BoardClick(BoardClickPayload),
    /// Ask both participants to restart the game.
    Reset(RoomPayload),
    /// Tell the peer that this player is leaving.
    UserLeft(RoomPayload),
}

impl ClientMessage {
    /// Event name as it appears on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::CreateRoom => "createRoom",
            ClientMessage::JoinRoom(_) => "joinRoom",
            ClientMessage::BoardClick(_) => "boardClick",
            ClientMessage::Reset(_) => "reset",
            ClientMessage::UserLeft(_) => "userLeft",
        }
    }

    /// Encode as one relay text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Serialization`](crate::SessionError::Serialization)
    /// if encoding fails.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Relay → Client ──────────────────────────────────────────────────

/// Events delivered by the relay to this client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Connection handshake; always the first frame on a connection.
    Connect(HandshakePayload),
    /// A room was created for us; waiting for a peer.
    RoomCreated(RoomId),
    /// Both participants are paired and the game begins.
    GameStart(GameStartPayload),
    /// An authoritative move, including the echo of our own.
    BoardData(BoardDataPayload),
    /// Both participants must clear the board.
    RestartGame(RoomId),
    /// The peer stepped away; the game is not over.
    LeftGame,
    /// The peer left for good.
    UserLeft,
}

impl ServerMessage {
    /// Event name as it appears on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::Connect(_) => "connect",
            ServerMessage::RoomCreated(_) => "roomCreated",
            ServerMessage::GameStart(_) => "gameStart",
            ServerMessage::BoardData(_) => "boardData",
            ServerMessage::RestartGame(_) => "restartGame",
            ServerMessage::LeftGame => "leftGame",
            ServerMessage::UserLeft => "userLeft",
        }
    }

    /// Decode one relay text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Serialization`](crate::SessionError::Serialization)
    /// for malformed JSON, unknown events, or payloads of the wrong shape.
    pub fn from_frame(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_room_has_no_data() {
        let json = serde_json::to_value(ClientMessage::CreateRoom).unwrap();
        assert_eq!(json, json!({ "event": "createRoom" }));
    }

    #[test]
    fn board_click_uses_camel_case_fields() {
        let msg = ClientMessage::BoardClick(BoardClickPayload {
            room_id: "R1".into(),
            current_player: Mark::O,
            number: 7,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!({
                "event": "boardClick",
                "data": { "roomId": "R1", "currentPlayer": "O", "number": 7 }
            })
        );
    }

    #[test]
    fn join_room_carries_bare_code() {
        let json = serde_json::to_value(ClientMessage::JoinRoom("ABC123".into())).unwrap();
        assert_eq!(json, json!({ "event": "joinRoom", "data": "ABC123" }));
    }

    #[test]
    fn game_start_decodes_both_users() {
        let raw = r#"{"event":"gameStart","data":{"roomId":"R1","users":["p1","p2"]}}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(
            msg,
            ServerMessage::GameStart(GameStartPayload {
                room_id: "R1".into(),
                users: ["p1".into(), "p2".into()],
            })
        );
    }

    #[test]
    fn game_start_rejects_wrong_user_count() {
        let raw = r#"{"event":"gameStart","data":{"roomId":"R1","users":["p1"]}}"#;
        assert!(serde_json::from_str::<ServerMessage>(raw).is_err());
    }

    #[test]
    fn payloadless_events_decode() {
        let left: ServerMessage = serde_json::from_str(r#"{"event":"leftGame"}"#).unwrap();
        assert_eq!(left, ServerMessage::LeftGame);
        let gone: ServerMessage = serde_json::from_str(r#"{"event":"userLeft"}"#).unwrap();
        assert_eq!(gone, ServerMessage::UserLeft);
    }

    #[test]
    fn unknown_event_is_an_error() {
        assert!(serde_json::from_str::<ServerMessage>(r#"{"event":"chat","data":"hi"}"#).is_err());
    }

    #[test]
    fn event_names_match_wire_tags() {
        let msgs = [
            ServerMessage::Connect(HandshakePayload { sid: "s".into() }),
            ServerMessage::RoomCreated("R".into()),
            ServerMessage::BoardData(BoardDataPayload {
                number: 0,
                current_player: Mark::X,
            }),
            ServerMessage::RestartGame("R".into()),
            ServerMessage::LeftGame,
            ServerMessage::UserLeft,
        ];
        for msg in msgs {
            let json = serde_json::to_value(&msg).unwrap();
            assert_eq!(json["event"], msg.event_name());
        }
    }

    #[test]
    fn frame_helpers_wrap_serde_errors() {
        let frame = ClientMessage::CreateRoom.to_frame().unwrap();
        assert_eq!(frame, r#"{"event":"createRoom"}"#);
        let err = ServerMessage::from_frame("{not json").unwrap_err();
        assert!(matches!(err, crate::SessionError::Serialization(_)));
    }

    #[test]
    fn mark_opponent_alternates() {
        assert_eq!(Mark::X.opponent(), Mark::O);
        assert_eq!(Mark::O.opponent(), Mark::X);
        assert_eq!(Mark::default(), Mark::X);
    }
}
