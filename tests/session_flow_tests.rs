#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end session tests.
//!
//! Each player gets a real [`SessionChannel`] over a [`MockConnector`]; the
//! test plays the relay, reading commands off one player's transport and
//! fanning the resulting events out to both.

mod common;

use std::time::Duration;

use tictactoe_room_client::protocol::{
    BoardClickPayload, ClientMessage, Mark, RoomPayload, ServerMessage,
};
use tictactoe_room_client::session::{LOSE_TEXT, OPPONENT_LEFT_TEXT, WIN_TEXT};
use tictactoe_room_client::{
    ChannelConfig, GameSession, Outcome, Phase, SessionChannel, SessionEvent,
};
use tokio::sync::mpsc;

use common::{
    board_data, game_start, handshake, init_tracing, next_event, restart_game, room_created,
    MockConnector, RelayEnd,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

struct Player {
    session: GameSession<SessionChannel>,
    events: mpsc::Receiver<SessionEvent>,
    relays: Vec<RelayEnd>,
}

impl Player {
    /// Start a player whose connector allows `connections` connections, and
    /// complete the handshake on the first one as `sid`.
    async fn connect(sid: &str, connections: usize) -> Self {
        let (connector, relays) = MockConnector::new(connections);
        let config = ChannelConfig::new("mock://relay")
            .with_reconnection_delay(Duration::from_millis(5))
            .with_reconnection_delay_max(Duration::from_millis(20))
            .with_shutdown_timeout(Duration::from_millis(200));
        let (channel, events) = SessionChannel::start(connector, config);
        let mut player = Self {
            session: GameSession::new(channel),
            events,
            relays,
        };
        player.relay().push(&handshake(sid));
        player.pump().await;
        player
    }

    fn relay(&mut self) -> &mut RelayEnd {
        self.relays.first_mut().expect("no relay left")
    }

    /// Feed the next channel event into the session and return it.
    async fn pump(&mut self) -> SessionEvent {
        let event = next_event(&mut self.events).await;
        self.session.handle_event(event.clone());
        event
    }
}

/// Deliver `msg` to both players and let each session handle it.
async fn broadcast(a: &mut Player, b: &mut Player, msg: &ServerMessage) {
    a.relay().push(msg);
    b.relay().push(msg);
    a.pump().await;
    b.pump().await;
}

/// `mover` clicks `number`; the relay echoes the move to both players.
async fn play(mover: &mut Player, other: &mut Player, number: usize) {
    assert!(mover.session.click_cell(number), "click on {number} refused");
    let ClientMessage::BoardClick(click) = mover.relay().next_command().await else {
        panic!("expected a boardClick");
    };
    broadcast(mover, other, &board_data(click.number, click.current_player)).await;
}

/// Two connected players in room `R1`; `p1` created it and plays X first.
async fn paired_players() -> (Player, Player) {
    let mut host = Player::connect("p1", 1).await;
    let mut guest = Player::connect("p2", 1).await;

    assert!(host.session.create_room());
    assert_eq!(host.relay().next_command().await, ClientMessage::CreateRoom);
    host.relay().push(&room_created("R1"));
    host.pump().await;

    assert!(guest.session.choose_join());
    guest.session.set_joining_code("R1");
    assert!(guest.session.enter_room());
    assert_eq!(
        guest.relay().next_command().await,
        ClientMessage::JoinRoom("R1".into())
    );

    broadcast(&mut host, &mut guest, &game_start("R1", "p1", "p2")).await;
    (host, guest)
}

// ════════════════════════════════════════════════════════════════════
// Flows
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn create_room_then_wait_for_peer() {
    init_tracing();
    let mut host = Player::connect("p1", 1).await;

    assert!(host.session.create_room());
    assert!(host.session.is_loading());
    assert_eq!(host.relay().next_command().await, ClientMessage::CreateRoom);

    host.relay().push(&room_created("ABC123"));
    assert_eq!(
        host.pump().await,
        SessionEvent::RoomCreated {
            room_id: "ABC123".into()
        }
    );
    assert_eq!(host.session.room_id(), Some("ABC123"));
    assert!(!host.session.is_loading());
    assert_eq!(host.session.phase(), Phase::WaitingForPeer);
    assert_eq!(
        host.session.sink().storage().get("roomId").as_deref(),
        Some("ABC123")
    );
}

#[tokio::test]
async fn rebuilt_session_on_same_channel_remembers_room() {
    init_tracing();
    let mut host = Player::connect("p1", 1).await;
    assert!(host.session.create_room());
    assert_eq!(host.relay().next_command().await, ClientMessage::CreateRoom);
    host.relay().push(&room_created("R1"));
    host.pump().await;

    let Player {
        session,
        mut relays,
        events: _events,
    } = host;
    let mut session = GameSession::new(session.into_sink());
    assert_eq!(session.room_id(), Some("R1"));
    assert_eq!(session.phase(), Phase::Idle);

    session.navigate_home();
    assert_eq!(
        relays[0].next_command().await,
        ClientMessage::UserLeft(RoomPayload {
            room_id: "R1".into()
        })
    );
    assert!(session.sink().storage().is_empty());
}

#[tokio::test]
async fn both_players_see_the_same_game() {
    init_tracing();
    let (mut host, mut guest) = paired_players().await;

    assert_eq!(host.session.user_id(), Some("p1"));
    assert_eq!(guest.session.user_id(), Some("p2"));
    assert!(host.session.is_my_turn());
    assert!(!guest.session.is_my_turn());

    play(&mut host, &mut guest, 4).await;
    play(&mut guest, &mut host, 0).await;
    play(&mut host, &mut guest, 8).await;

    for player in [&host, &guest] {
        let board = player.session.board();
        assert_eq!(board.get(4), Some(Mark::X));
        assert_eq!(board.get(0), Some(Mark::O));
        assert_eq!(board.get(8), Some(Mark::X));
        assert_eq!(player.session.outcome(), Outcome::InProgress);
        assert_eq!(player.session.current_user(), Some("p2"));
        assert_eq!(player.session.current_player(), Mark::O);
    }
    assert_eq!(host.session.board(), guest.session.board());
}

#[tokio::test]
async fn winner_and_loser_then_replay() {
    init_tracing();
    let (mut host, mut guest) = paired_players().await;

    play(&mut host, &mut guest, 0).await;
    play(&mut guest, &mut host, 3).await;
    play(&mut host, &mut guest, 1).await;
    play(&mut guest, &mut host, 4).await;
    play(&mut host, &mut guest, 2).await;

    assert_eq!(host.session.outcome(), Outcome::Win(Mark::X));
    assert_eq!(host.session.win_text(), WIN_TEXT);
    assert_eq!(guest.session.win_text(), LOSE_TEXT);
    assert_eq!(guest.session.phase(), Phase::GameOver);
    assert!(!guest.session.click_cell(5));
    assert!(guest.relay().is_quiet());

    assert!(guest.session.replay());
    assert_eq!(
        guest.relay().next_command().await,
        ClientMessage::Reset(RoomPayload {
            room_id: "R1".into()
        })
    );
    broadcast(&mut host, &mut guest, &restart_game("R1")).await;

    for player in [&host, &guest] {
        assert!(player.session.board().is_clear());
        assert_eq!(player.session.phase(), Phase::Playing);
        assert_eq!(player.session.current_user(), Some("p1"));
        assert_eq!(player.session.win_text(), "");
    }
    // Restart never echoes a reset.
    assert!(host.relay().is_quiet());
    assert!(guest.relay().is_quiet());
}

#[tokio::test]
async fn leaving_player_notifies_opponent() {
    init_tracing();
    let (mut host, mut guest) = paired_players().await;
    play(&mut host, &mut guest, 4).await;

    host.session.navigate_home();
    assert_eq!(
        host.relay().next_command().await,
        ClientMessage::UserLeft(RoomPayload {
            room_id: "R1".into()
        })
    );
    assert_eq!(host.session.phase(), Phase::Idle);
    assert!(host.session.sink().storage().is_empty());

    guest.relay().push(&ServerMessage::UserLeft);
    assert_eq!(guest.pump().await, SessionEvent::OpponentLeft);
    assert!(guest.session.is_game_over());
    assert!(guest.session.replay_disabled());
    assert_eq!(guest.session.win_text(), OPPONENT_LEFT_TEXT);
    assert!(!guest.session.replay());
    assert!(guest.relay().is_quiet());
}

#[tokio::test]
async fn clicks_are_dropped_while_disconnected() {
    init_tracing();
    let mut player = Player::connect("p1", 2).await;
    player.relay().push(&game_start("R1", "p1", "p2"));
    player.pump().await;

    player.relay().hang_up();
    assert_eq!(
        player.pump().await,
        SessionEvent::Disconnected { reason: None }
    );
    assert!(!player.session.click_cell(0));
    assert!(player.session.board().is_clear());
    assert!(matches!(
        player.pump().await,
        SessionEvent::Reconnecting { attempt: 1, .. }
    ));

    let mut second = player.relays.remove(1);
    second.push(&handshake("p1-again"));
    assert_eq!(
        player.pump().await,
        SessionEvent::Connected {
            id: "p1-again".into()
        }
    );

    assert!(player.session.click_cell(0));
    assert_eq!(
        second.next_command().await,
        ClientMessage::BoardClick(BoardClickPayload {
            room_id: "R1".into(),
            current_player: Mark::X,
            number: 0,
        })
    );
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    init_tracing();
    let mut player = Player::connect("p1", 1).await;
    player.relay().push(&game_start("R1", "p1", "p2"));
    player.pump().await;

    player.relay().push_raw("not json at all");
    player.relay().push_raw(r#"{"event":"fireworks"}"#);
    player
        .relay()
        .push_raw(r#"{"event":"boardData","data":{"number":12,"currentPlayer":"X"}}"#);
    player.relay().push(&board_data(4, Mark::X));

    // Only the two decodable frames surface.
    player.pump().await;
    player.pump().await;
    assert_eq!(player.session.board().cells().flatten().count(), 1);
    assert_eq!(player.session.board().get(4), Some(Mark::X));
    assert_eq!(player.session.current_user(), Some("p2"));
}

#[tokio::test]
async fn teardown_closes_transport_and_ends_events() {
    init_tracing();
    let mut player = Player::connect("p1", 1).await;
    player.relay().push(&room_created("R1"));
    player.pump().await;

    player.session.teardown().await;
    assert!(player.relay().closed.load(std::sync::atomic::Ordering::Relaxed));
    assert!(player.session.sink().storage().is_empty());
    assert!(!player.session.create_room());

    assert!(matches!(
        player.pump().await,
        SessionEvent::Disconnected { .. }
    ));
    assert!(player.events.recv().await.is_none());
}
