#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests against JSON fixtures shaped like real relay traffic.
//!
//! Unit tests in `protocol.rs` cover the individual variants; these check
//! whole transcripts and the exact bytes the client puts on the wire.

use serde_json::json;
use tictactoe_room_client::protocol::{
    BoardClickPayload, BoardDataPayload, ClientMessage, GameStartPayload, HandshakePayload, Mark,
    RoomPayload, ServerMessage,
};
use tictactoe_room_client::{Board, Outcome, SessionEvent};
use tokio_test::{assert_err, assert_ok};

// ════════════════════════════════════════════════════════════════════
// Relay → client fixtures
// ════════════════════════════════════════════════════════════════════

/// One player's inbound frames for a full game that X wins on the diagonal.
const WON_GAME_TRANSCRIPT: &[&str] = &[
    r#"{"event":"connect","data":{"sid":"k3J9aQ"}}"#,
    r#"{"event":"roomCreated","data":"8f2c41"}"#,
    r#"{"event":"gameStart","data":{"roomId":"8f2c41","users":["k3J9aQ","Zp01xm"]}}"#,
    r#"{"event":"boardData","data":{"number":0,"currentPlayer":"X"}}"#,
    r#"{"event":"boardData","data":{"number":1,"currentPlayer":"O"}}"#,
    r#"{"event":"boardData","data":{"number":4,"currentPlayer":"X"}}"#,
    r#"{"event":"boardData","data":{"number":2,"currentPlayer":"O"}}"#,
    r#"{"event":"boardData","data":{"number":8,"currentPlayer":"X"}}"#,
    r#"{"event":"restartGame","data":"8f2c41"}"#,
    r#"{"event":"leftGame"}"#,
    r#"{"event":"userLeft"}"#,
];

#[test]
fn transcript_decodes_in_order() {
    let msgs: Vec<ServerMessage> = WON_GAME_TRANSCRIPT
        .iter()
        .map(|raw| assert_ok!(serde_json::from_str(raw), "rejected {raw}"))
        .collect();

    assert_eq!(
        msgs[0],
        ServerMessage::Connect(HandshakePayload {
            sid: "k3J9aQ".into()
        })
    );
    assert_eq!(msgs[1], ServerMessage::RoomCreated("8f2c41".into()));
    assert_eq!(
        msgs[2],
        ServerMessage::GameStart(GameStartPayload {
            room_id: "8f2c41".into(),
            users: ["k3J9aQ".into(), "Zp01xm".into()],
        })
    );
    assert_eq!(msgs[8], ServerMessage::RestartGame("8f2c41".into()));
    assert_eq!(msgs[9], ServerMessage::LeftGame);
    assert_eq!(msgs[10], ServerMessage::UserLeft);
}

#[test]
fn transcript_moves_replay_to_a_diagonal_win() {
    let mut board = Board::new();
    for raw in WON_GAME_TRANSCRIPT {
        if let ServerMessage::BoardData(BoardDataPayload {
            number,
            current_player,
        }) = serde_json::from_str(raw).unwrap()
        {
            board.place(usize::from(number), current_player);
        }
    }
    assert_eq!(board.outcome(), Outcome::Win(Mark::X));
}

#[test]
fn transcript_maps_to_session_events() {
    let events: Vec<SessionEvent> = WON_GAME_TRANSCRIPT
        .iter()
        .map(|raw| serde_json::from_str::<ServerMessage>(raw).unwrap().into())
        .collect();

    assert_eq!(
        events[0],
        SessionEvent::Connected {
            id: "k3J9aQ".into()
        }
    );
    assert_eq!(
        events[3],
        SessionEvent::BoardData(BoardDataPayload {
            number: 0,
            current_player: Mark::X,
        })
    );
    assert_eq!(events[9], SessionEvent::OpponentSteppedAway);
    assert_eq!(events[10], SessionEvent::OpponentLeft);
}

#[test]
fn extra_payload_fields_are_tolerated() {
    let raw = r#"{"event":"boardData","data":{"number":5,"currentPlayer":"O","roomId":"8f2c41","ts":1712}}"#;
    let msg: ServerMessage = serde_json::from_str(raw).unwrap();
    assert_eq!(
        msg,
        ServerMessage::BoardData(BoardDataPayload {
            number: 5,
            current_player: Mark::O,
        })
    );
}

#[test]
fn malformed_frames_are_rejected() {
    let bad = [
        r#"{"event":"boardData","data":{"number":-1,"currentPlayer":"X"}}"#,
        r#"{"event":"boardData","data":{"number":3,"currentPlayer":"Z"}}"#,
        r#"{"event":"boardData"}"#,
        r#"{"event":"roomCreated","data":42}"#,
        r#"{"data":"8f2c41"}"#,
        "[]",
    ];
    for raw in bad {
        assert_err!(serde_json::from_str::<ServerMessage>(raw), "accepted {raw}");
    }
}

// ════════════════════════════════════════════════════════════════════
// Client → relay fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn outbound_commands_match_relay_expectations() {
    let cases = [
        (ClientMessage::CreateRoom, json!({ "event": "createRoom" })),
        (
            ClientMessage::JoinRoom("8f2c41".into()),
            json!({ "event": "joinRoom", "data": "8f2c41" }),
        ),
        (
            ClientMessage::BoardClick(BoardClickPayload {
                room_id: "8f2c41".into(),
                current_player: Mark::X,
                number: 4,
            }),
            json!({
                "event": "boardClick",
                "data": { "roomId": "8f2c41", "currentPlayer": "X", "number": 4 }
            }),
        ),
        (
            ClientMessage::Reset(RoomPayload {
                room_id: "8f2c41".into(),
            }),
            json!({ "event": "reset", "data": { "roomId": "8f2c41" } }),
        ),
        (
            ClientMessage::UserLeft(RoomPayload {
                room_id: "8f2c41".into(),
            }),
            json!({ "event": "userLeft", "data": { "roomId": "8f2c41" } }),
        ),
    ];
    for (msg, expected) in cases {
        assert_eq!(serde_json::to_value(&msg).unwrap(), expected, "{msg:?}");
        assert_eq!(expected["event"], msg.event_name());
    }
}
