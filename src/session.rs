//! The room/turn state machine for one player.
//!
//! [`GameSession`] owns a [`CommandSink`] (normally a
//! [`SessionChannel`](crate::channel::SessionChannel)) and reacts to two
//! kinds of input, one at a time:
//!
//! - UI actions: [`create_room`](GameSession::create_room),
//!   [`click_cell`](GameSession::click_cell), [`replay`](GameSession::replay), ...
//! - relay events, fed in through [`handle_event`](GameSession::handle_event).
//!
//! Moves are applied twice. A local click writes the display board and flips
//! `current_player` straight away ([`apply_local_move`](GameSession::apply_local_move)).
//! The relay then echoes the move to both players as `boardData`, and only
//! that path ([`apply_remote_move`](GameSession::apply_remote_move)) updates
//! the authoritative board, runs win/tie detection and advances the turn.
//!
//! ```text
//! Idle ──create──▶ Choosing(Create) ──roomCreated──▶ WaitingForPeer ─┐
//!   └───join────▶ Choosing(Join) ──joinRoom──────────────────────────┤
//!                                                          gameStart ▼
//!                    GameOver ◀──win/tie/userLeft── Playing ◀──restartGame
//! ```

use tracing::{debug, warn};

use crate::board::{Board, Outcome, Placement};
use crate::channel::CommandSink;
use crate::event::SessionEvent;
use crate::protocol::{
    BoardClickPayload, BoardDataPayload, ClientMessage, ConnectionId, GameStartPayload, Mark,
    RoomId, RoomPayload,
};
use crate::storage::ROOM_ID_KEY;

/// Shown to the player whose move completed a line.
pub const WIN_TEXT: &str = "You Win!!!";
/// Shown to the other player.
pub const LOSE_TEXT: &str = "You Lose!!!";
/// Shown to both players when the board fills up without a line.
pub const TIE_TEXT: &str = "It's a tie!";
/// Shown when the opponent leaves, temporarily or for good.
pub const OPPONENT_LEFT_TEXT: &str = "Other Player Left the game!!!";

/// Which room flow the player picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomChoice {
    Create,
    Join,
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No room; the player has not picked create or join.
    #[default]
    Idle,
    /// The player picked a flow and is waiting on the relay or typing a code.
    Choosing(RoomChoice),
    /// The relay assigned a room; nobody has joined it yet.
    WaitingForPeer,
    /// Both players are paired and moves are accepted.
    Playing,
    /// Won, tied or abandoned. The board is frozen until a restart.
    GameOver,
}

/// One player's view of a two-player room.
#[derive(Debug)]
pub struct GameSession<S: CommandSink> {
    sink: S,
    phase: Phase,
    room_id: Option<RoomId>,
    room_choice: Option<RoomChoice>,
    is_loading: bool,
    joining_room_code: String,
    main_board_active: bool,
    /// What the player sees, including optimistic local writes.
    display: Board,
    /// Only written by relayed moves; win/tie detection reads this one.
    authoritative: Board,
    current_player: Mark,
    turn_index: usize,
    users: Option<[ConnectionId; 2]>,
    current_user: Option<ConnectionId>,
    /// Latest id from the relay handshake.
    connection_id: Option<ConnectionId>,
    /// Our id as of the last `gameStart`.
    user_id: Option<ConnectionId>,
    outcome: Outcome,
    win_text: String,
    replay_disabled: bool,
}

impl<S: CommandSink> GameSession<S> {
    /// Build a session on top of `sink`.
    ///
    /// If an earlier session on the same sink stored a room id, it is picked
    /// back up so that [`navigate_home`](Self::navigate_home) can still notify
    /// the peer.
    pub fn new(sink: S) -> Self {
        let room_id = sink.storage().get(ROOM_ID_KEY);
        if let Some(room_id) = &room_id {
            debug!(room_id = %room_id, "restored room id from session storage");
        }
        Self {
            sink,
            phase: Phase::Idle,
            room_id,
            room_choice: None,
            is_loading: false,
            joining_room_code: String::new(),
            main_board_active: false,
            display: Board::new(),
            authoritative: Board::new(),
            current_player: Mark::X,
            turn_index: 0,
            users: None,
            current_user: None,
            connection_id: None,
            user_id: None,
            outcome: Outcome::InProgress,
            win_text: String::new(),
            replay_disabled: false,
        }
    }

    // ── UI actions ──────────────────────────────────────────────────

    /// Ask the relay for a new room. Ignored while disconnected or in a game.
    pub fn create_room(&mut self) -> bool {
        if !self.sink.is_connected() || self.main_board_active {
            debug!("create room ignored");
            return false;
        }
        if !self.send(ClientMessage::CreateRoom) {
            return false;
        }
        self.room_choice = Some(RoomChoice::Create);
        self.is_loading = true;
        self.phase = Phase::Choosing(RoomChoice::Create);
        true
    }

    /// Switch to the join flow. Nothing is sent until [`enter_room`](Self::enter_room).
    pub fn choose_join(&mut self) -> bool {
        if !self.sink.is_connected() || self.main_board_active {
            debug!("join room ignored");
            return false;
        }
        self.room_choice = Some(RoomChoice::Join);
        self.is_loading = false;
        self.phase = Phase::Choosing(RoomChoice::Join);
        true
    }

    /// Update the room code the player is typing.
    pub fn set_joining_code(&mut self, code: impl Into<String>) {
        self.joining_room_code = code.into();
    }

    /// Send the typed room code to the relay.
    pub fn enter_room(&mut self) -> bool {
        let code = self.joining_room_code.trim();
        if !self.sink.is_connected() || code.is_empty() {
            debug!("enter room ignored");
            return false;
        }
        let code = code.to_string();
        self.send(ClientMessage::JoinRoom(code))
    }

    /// Click on cell `number`. Returns `false` if the click was ignored.
    pub fn click_cell(&mut self, number: usize) -> bool {
        self.apply_local_move(number)
    }

    /// Optimistic half of a move: tell the relay, then write the display
    /// board and flip `current_player` without waiting for the echo.
    ///
    /// Ignored unless the session is in [`Phase::Playing`] with a free cell
    /// and a live channel. Never runs win/tie detection.
    pub fn apply_local_move(&mut self, number: usize) -> bool {
        if self.phase != Phase::Playing
            || self.is_game_over()
            || !self.main_board_active
            || !self.display.is_empty_at(number)
        {
            debug!(number, "click ignored");
            return false;
        }
        let (Some(room_id), Ok(cell)) = (self.room_id.clone(), u8::try_from(number)) else {
            return false;
        };
        if !self.sink.is_connected() {
            debug!(number, "click ignored while disconnected");
            return false;
        }
        let mark = self.current_player;
        let sent = self.send(ClientMessage::BoardClick(BoardClickPayload {
            room_id,
            current_player: mark,
            number: cell,
        }));
        if !sent {
            return false;
        }
        self.display.place(number, mark);
        self.current_player = mark.opponent();
        true
    }

    /// Ask the relay to restart the game for both players.
    ///
    /// The board is not cleared here; that happens when `restartGame` comes
    /// back. Ignored once the opponent has left for good.
    pub fn replay(&mut self) -> bool {
        if self.replay_disabled || !self.main_board_active || !self.sink.is_connected() {
            debug!("replay ignored");
            return false;
        }
        let Some(room_id) = self.room_id.clone() else {
            return false;
        };
        self.send(ClientMessage::Reset(RoomPayload { room_id }))
    }

    /// The room code to put on the clipboard, if there is one.
    pub fn copy_room_code(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    /// Leave the room and go back to the start screen.
    ///
    /// The peer is told on a best-effort basis; nothing is awaited.
    pub fn navigate_home(&mut self) {
        if let Some(room_id) = self.room_id.take() {
            if self.sink.is_connected() {
                self.send(ClientMessage::UserLeft(RoomPayload { room_id }));
            }
        }
        self.is_loading = false;
        self.room_choice = None;
        self.joining_room_code.clear();
        self.main_board_active = false;
        self.phase = Phase::Idle;
        self.sink.storage().clear();
        debug!("navigated home");
    }

    /// Close the channel and clear storage, whatever state the session is in.
    pub async fn teardown(&mut self) {
        self.sink.dispose().await;
        self.sink.storage().clear();
        self.main_board_active = false;
        self.phase = Phase::Idle;
        debug!("session torn down");
    }

    // ── Relay events ────────────────────────────────────────────────

    /// React to one event from the channel.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected { id } => {
                if let Some(user_id) = &self.user_id {
                    if self.main_board_active && *user_id != id {
                        warn!(old = %user_id, new = %id, "connection id changed mid-game");
                    }
                }
                self.connection_id = Some(id);
            }
            SessionEvent::Disconnected { reason } => {
                debug!(?reason, "channel disconnected");
            }
            SessionEvent::Reconnecting { attempt, delay } => {
                debug!(attempt, ?delay, "channel reconnecting");
            }
            SessionEvent::RoomCreated { room_id } => self.on_room_created(room_id),
            SessionEvent::GameStart(payload) => self.on_game_start(payload),
            SessionEvent::BoardData(payload) => self.apply_remote_move(payload),
            SessionEvent::RestartGame { room_id } => self.on_restart(&room_id),
            SessionEvent::OpponentSteppedAway => {
                self.win_text = OPPONENT_LEFT_TEXT.to_string();
            }
            SessionEvent::OpponentLeft => {
                self.outcome = Outcome::Abandoned;
                self.win_text = OPPONENT_LEFT_TEXT.to_string();
                self.replay_disabled = true;
                if self.main_board_active {
                    self.phase = Phase::GameOver;
                }
                debug!("opponent left for good");
            }
        }
    }

    fn on_room_created(&mut self, room_id: RoomId) {
        debug!(room_id = %room_id, "room created");
        self.is_loading = false;
        self.sink.storage().set(ROOM_ID_KEY, room_id.clone());
        self.room_id = Some(room_id);
        if !self.main_board_active {
            self.phase = Phase::WaitingForPeer;
        }
    }

    /// Both players receive the same `gameStart`, so the board is cleared
    /// locally and no `reset` goes back to the relay. A `reset` here would
    /// make the relay broadcast `restartGame` for a game that just began.
    fn on_game_start(&mut self, payload: GameStartPayload) {
        debug!(room_id = %payload.room_id, users = ?payload.users, "game start");
        self.users = Some(payload.users);
        self.reset_board();
        self.main_board_active = true;
        self.is_loading = false;
        self.replay_disabled = false;
        self.user_id = self.connection_id.clone();
        self.sink.storage().set(ROOM_ID_KEY, payload.room_id.clone());
        self.room_id = Some(payload.room_id);
        self.phase = Phase::Playing;
    }

    /// A restart after the opponent has left would reopen a board nobody
    /// is echoing moves for, so it is dropped.
    fn on_restart(&mut self, room_id: &str) {
        if self.room_id.as_deref().is_some_and(|ours| ours != room_id) {
            warn!(room_id, "restart for another room ignored");
            return;
        }
        if self.replay_disabled {
            debug!(room_id, "restart after opponent left ignored");
            return;
        }
        debug!(room_id, "restarting game");
        self.reset_board();
        if self.main_board_active {
            self.phase = Phase::Playing;
        }
    }

    /// Authoritative half of a move, driven by a relayed `boardData`.
    ///
    /// Writes both boards, then either ends the game or hands the turn to
    /// the other player. Duplicate, conflicting and out-of-range moves are
    /// logged and dropped.
    pub fn apply_remote_move(&mut self, payload: BoardDataPayload) {
        if self.phase != Phase::Playing {
            debug!(number = payload.number, phase = ?self.phase, "move outside a running game ignored");
            return;
        }
        let number = usize::from(payload.number);
        let mark = payload.current_player;
        match self.authoritative.place(number, mark) {
            Placement::Placed => {}
            Placement::Unchanged => {
                debug!(number, "duplicate move ignored");
                return;
            }
            Placement::Conflict(existing) => {
                warn!(number, %mark, %existing, "move on an occupied cell ignored");
                self.display.sync_cell(number, &self.authoritative);
                return;
            }
            Placement::OutOfRange => {
                warn!(number, "move outside the board ignored");
                return;
            }
        }
        self.display.sync_cell(number, &self.authoritative);

        self.outcome = self.authoritative.outcome();
        match self.outcome {
            Outcome::Win(_) => {
                let mine = self.user_id.is_some() && self.current_user == self.user_id;
                self.win_text = if mine { WIN_TEXT } else { LOSE_TEXT }.to_string();
                self.phase = Phase::GameOver;
                debug!(winner = ?self.current_user, "game won");
            }
            Outcome::Tie => {
                self.win_text = TIE_TEXT.to_string();
                self.phase = Phase::GameOver;
                debug!("game tied");
            }
            Outcome::InProgress | Outcome::Abandoned => {
                self.current_player = mark.opponent();
                self.turn_index ^= 1;
                self.current_user = self.user_at(self.turn_index);
            }
        }
    }

    /// Clear both boards and hand the first move back to X / `users[0]`.
    fn reset_board(&mut self) {
        self.display.clear();
        self.authoritative.clear();
        self.current_player = Mark::X;
        self.turn_index = 0;
        self.current_user = self.user_at(0);
        self.outcome = Outcome::InProgress;
        self.win_text.clear();
    }

    fn user_at(&self, index: usize) -> Option<ConnectionId> {
        self.users
            .as_ref()
            .and_then(|users| users.get(index))
            .cloned()
    }

    /// Emit and swallow the error; a dropped command is a silent no-op.
    fn send(&self, message: ClientMessage) -> bool {
        let event = message.event_name();
        match self.sink.emit(message) {
            Ok(()) => true,
            Err(e) => {
                debug!(event, "command not sent: {e}");
                false
            }
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    /// `true` between `create_room` and `roomCreated`.
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_creating_room(&self) -> bool {
        self.room_choice == Some(RoomChoice::Create)
    }

    pub fn is_joining_room(&self) -> bool {
        self.room_choice == Some(RoomChoice::Join)
    }

    pub fn joining_room_code(&self) -> &str {
        &self.joining_room_code
    }

    /// `true` from `gameStart` until the player navigates home.
    pub fn main_board_active(&self) -> bool {
        self.main_board_active
    }

    /// The board as the player should see it.
    pub fn board(&self) -> &Board {
        &self.display
    }

    /// The mark the next local click will place.
    pub fn current_player(&self) -> Mark {
        self.current_player
    }

    /// The participant expected to move next.
    pub fn current_user(&self) -> Option<&str> {
        self.current_user.as_deref()
    }

    /// Our connection id as of the last `gameStart`.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn users(&self) -> Option<&[ConnectionId; 2]> {
        self.users.as_ref()
    }

    /// Index into [`users`](Self::users) of the participant on turn.
    pub fn turn_index(&self) -> usize {
        self.turn_index
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// `true` once the game is won, tied or abandoned.
    pub fn is_game_over(&self) -> bool {
        self.outcome.is_terminal()
    }

    pub fn win_text(&self) -> &str {
        &self.win_text
    }

    pub fn replay_disabled(&self) -> bool {
        self.replay_disabled
    }

    /// `true` if a game is running and we are the participant on turn.
    pub fn is_my_turn(&self) -> bool {
        !self.is_game_over()
            && self.main_board_active
            && self.user_id.is_some()
            && self.current_user == self.user_id
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Give the sink back, e.g. to build a fresh session on the same
    /// channel. The room id stays in the sink's storage until
    /// [`navigate_home`](Self::navigate_home) or [`teardown`](Self::teardown)
    /// clears it, so the new session picks it up.
    pub fn into_sink(self) -> S {
        self.sink
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
    use crate::error::{Result, SessionError};
    use crate::storage::SessionStorage;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Records commands instead of sending them.
    #[derive(Debug, Default)]
    struct RecordingSink {
        connected: bool,
        sent: StdMutex<Vec<ClientMessage>>,
        storage: SessionStorage,
        disposals: usize,
    }

    impl RecordingSink {
        fn connected() -> Self {
            Self {
                connected: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl CommandSink for RecordingSink {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn emit(&self, message: ClientMessage) -> Result<()> {
            if !self.connected {
                return Err(SessionError::NotConnected);
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        fn storage(&self) -> &SessionStorage {
            &self.storage
        }

        async fn dispose(&mut self) {
            self.connected = false;
            self.disposals += 1;
            self.storage.clear();
        }
    }

    fn sent(session: &GameSession<RecordingSink>) -> Vec<ClientMessage> {
        session.sink().sent.lock().unwrap().clone()
    }

    fn move_event(number: u8, mark: Mark) -> SessionEvent {
        SessionEvent::BoardData(BoardDataPayload {
            number,
            current_player: mark,
        })
    }

    /// A connected session that is `me` in a started game between p1 and p2.
    fn playing_as(me: &str) -> GameSession<RecordingSink> {
        let mut session = GameSession::new(RecordingSink::connected());
        session.handle_event(SessionEvent::Connected { id: me.into() });
        session.handle_event(SessionEvent::GameStart(GameStartPayload {
            room_id: "R1".into(),
            users: ["p1".into(), "p2".into()],
        }));
        session
    }

    #[test]
    fn create_room_then_room_created() {
        let mut session = GameSession::new(RecordingSink::connected());
        assert!(session.create_room());
        assert!(session.is_loading());
        assert!(session.is_creating_room());
        assert_eq!(session.phase(), Phase::Choosing(RoomChoice::Create));
        assert_eq!(sent(&session), vec![ClientMessage::CreateRoom]);

        session.handle_event(SessionEvent::RoomCreated {
            room_id: "ABC123".into(),
        });
        assert_eq!(session.room_id(), Some("ABC123"));
        assert!(!session.is_loading());
        assert_eq!(session.phase(), Phase::WaitingForPeer);
        assert_eq!(session.copy_room_code(), Some("ABC123"));
    }

    #[test]
    fn actions_are_silent_when_disconnected() {
        let mut session = GameSession::new(RecordingSink::default());
        assert!(!session.create_room());
        assert!(!session.choose_join());
        session.set_joining_code("ABC123");
        assert!(!session.enter_room());
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.is_loading());
        assert!(sent(&session).is_empty());
    }

    #[test]
    fn join_flow_sends_trimmed_code() {
        let mut session = GameSession::new(RecordingSink::connected());
        assert!(session.choose_join());
        assert!(session.is_joining_room());
        assert!(sent(&session).is_empty());

        session.set_joining_code("   ");
        assert!(!session.enter_room());

        session.set_joining_code(" XYZ789 ");
        assert!(session.enter_room());
        assert_eq!(sent(&session), vec![ClientMessage::JoinRoom("XYZ789".into())]);
    }

    #[test]
    fn game_start_resets_everything() {
        let mut session = playing_as("p1");
        session.handle_event(move_event(0, Mark::X));
        session.handle_event(SessionEvent::OpponentSteppedAway);

        session.handle_event(SessionEvent::GameStart(GameStartPayload {
            room_id: "R2".into(),
            users: ["p2".into(), "p1".into()],
        }));
        assert_eq!(session.phase(), Phase::Playing);
        assert!(session.main_board_active());
        assert!(session.board().is_clear());
        assert_eq!(session.current_user(), Some("p2"));
        assert_eq!(session.current_player(), Mark::X);
        assert_eq!(session.turn_index(), 0);
        assert_eq!(session.win_text(), "");
        assert_eq!(session.room_id(), Some("R2"));
        assert_eq!(session.user_id(), Some("p1"));
        assert_eq!(
            session.sink().storage().get(ROOM_ID_KEY).as_deref(),
            Some("R2")
        );
        // The board reset is local; the peer gets its own gameStart.
        assert!(!sent(&session)
            .iter()
            .any(|m| matches!(m, ClientMessage::Reset(_))));
    }

    #[test]
    fn local_click_is_optimistic() {
        let mut session = playing_as("p1");
        assert!(session.click_cell(4));

        assert_eq!(session.board().get(4), Some(Mark::X));
        assert_eq!(session.current_player(), Mark::O);
        // Turn and outcome wait for the relay.
        assert_eq!(session.turn_index(), 0);
        assert_eq!(session.current_user(), Some("p1"));
        assert_eq!(session.outcome(), Outcome::InProgress);
        assert_eq!(
            sent(&session),
            vec![ClientMessage::BoardClick(BoardClickPayload {
                room_id: "R1".into(),
                current_player: Mark::X,
                number: 4,
            })]
        );
    }

    #[test]
    fn echo_of_own_move_flips_turn_once() {
        let mut session = playing_as("p1");
        assert!(session.click_cell(4));
        session.handle_event(move_event(4, Mark::X));

        assert_eq!(session.board().get(4), Some(Mark::X));
        assert_eq!(session.current_player(), Mark::O);
        assert_eq!(session.turn_index(), 1);
        assert_eq!(session.current_user(), Some("p2"));
        assert!(!session.is_my_turn());
    }

    #[test]
    fn occupied_cell_click_is_ignored() {
        let mut session = playing_as("p1");
        session.handle_event(move_event(4, Mark::X));
        assert!(!session.click_cell(4));
        assert!(!session.click_cell(9));
        assert!(sent(&session).is_empty());
        assert_eq!(session.current_player(), Mark::O);
    }

    #[test]
    fn click_before_game_start_is_ignored() {
        let mut session = GameSession::new(RecordingSink::connected());
        assert!(!session.click_cell(0));
        assert!(session.board().is_clear());
        assert!(sent(&session).is_empty());
    }

    #[test]
    fn moves_apply_in_order() {
        let mut session = playing_as("p2");
        let moves = [(4, Mark::X), (0, Mark::O), (8, Mark::X)];
        for (number, mark) in moves {
            session.handle_event(move_event(number, mark));
        }
        for (number, mark) in moves {
            assert_eq!(session.board().get(usize::from(number)), Some(mark));
        }
        assert_eq!(session.board().cells().flatten().count(), 3);
        // 0-4-8 holds O, X, X.
        assert_eq!(session.outcome(), Outcome::InProgress);
        assert_eq!(session.phase(), Phase::Playing);
        assert_eq!(session.current_player(), Mark::O);
        assert_eq!(session.current_user(), Some("p2"));
        assert!(session.is_my_turn());
    }

    #[test]
    fn top_row_wins_and_freezes_board() {
        let mut session = playing_as("p1");
        session.handle_event(move_event(0, Mark::X));
        session.handle_event(move_event(1, Mark::X));
        assert_eq!(session.outcome(), Outcome::InProgress);
        // Turn moved to p2 and back; p1 completes the line.
        session.handle_event(move_event(2, Mark::X));

        assert_eq!(session.outcome(), Outcome::Win(Mark::X));
        assert!(session.is_game_over());
        assert_eq!(session.phase(), Phase::GameOver);
        assert_eq!(session.win_text(), WIN_TEXT);

        assert!(!session.click_cell(5));
        session.handle_event(move_event(5, Mark::O));
        assert_eq!(session.board().get(5), None);
        assert!(sent(&session).is_empty());
    }

    #[test]
    fn loser_sees_lose_text() {
        let mut session = playing_as("p2");
        for (number, mark) in [(0, Mark::X), (3, Mark::O), (1, Mark::X), (4, Mark::O), (2, Mark::X)] {
            session.handle_event(move_event(number, mark));
        }
        assert_eq!(session.outcome(), Outcome::Win(Mark::X));
        assert_eq!(session.current_user(), Some("p1"));
        assert_eq!(session.win_text(), LOSE_TEXT);
    }

    #[test]
    fn full_board_without_line_is_tie() {
        let mut session = playing_as("p1");
        let moves = [
            (0, Mark::X),
            (1, Mark::O),
            (2, Mark::X),
            (4, Mark::O),
            (3, Mark::X),
            (5, Mark::O),
            (7, Mark::X),
            (6, Mark::O),
            (8, Mark::X),
        ];
        for (number, mark) in moves {
            session.handle_event(move_event(number, mark));
        }
        assert_eq!(session.outcome(), Outcome::Tie);
        assert_eq!(session.win_text(), TIE_TEXT);
        assert!(session.is_game_over());
    }

    #[test]
    fn duplicate_move_does_not_advance_turn() {
        let mut session = playing_as("p1");
        session.handle_event(move_event(4, Mark::X));
        session.handle_event(move_event(4, Mark::X));
        assert_eq!(session.turn_index(), 1);
        assert_eq!(session.current_player(), Mark::O);
    }

    #[test]
    fn conflicting_move_keeps_first_mark() {
        let mut session = playing_as("p1");
        session.handle_event(move_event(4, Mark::X));
        session.handle_event(move_event(4, Mark::O));
        assert_eq!(session.board().get(4), Some(Mark::X));
        assert_eq!(session.turn_index(), 1);
    }

    #[test]
    fn relay_overrides_losing_optimistic_write() {
        // Both players clicked cell 4; the relay ordered the peer's move first.
        let mut session = playing_as("p2");
        session.handle_event(move_event(0, Mark::X));
        assert!(session.click_cell(4));
        assert_eq!(session.board().get(4), Some(Mark::O));

        session.handle_event(move_event(4, Mark::X));
        assert_eq!(session.board().get(4), Some(Mark::X));
    }

    #[test]
    fn out_of_range_move_is_ignored() {
        let mut session = playing_as("p1");
        session.handle_event(move_event(9, Mark::X));
        assert!(session.board().is_clear());
        assert_eq!(session.turn_index(), 0);
    }

    #[test]
    fn replay_waits_for_restart_game() {
        let mut session = playing_as("p1");
        for (number, mark) in [(0, Mark::X), (1, Mark::X), (2, Mark::X)] {
            session.handle_event(move_event(number, mark));
        }
        assert!(session.replay());
        assert_eq!(
            sent(&session),
            vec![ClientMessage::Reset(RoomPayload {
                room_id: "R1".into()
            })]
        );
        // No optimistic reset.
        assert!(session.is_game_over());

        session.handle_event(SessionEvent::RestartGame {
            room_id: "R1".into(),
        });
        assert!(session.board().is_clear());
        assert_eq!(session.current_player(), Mark::X);
        assert_eq!(session.turn_index(), 0);
        assert_eq!(session.current_user(), Some("p1"));
        assert_eq!(session.win_text(), "");
        assert_eq!(session.outcome(), Outcome::InProgress);
        assert_eq!(session.phase(), Phase::Playing);
        // Restart never echoes a reset back.
        assert_eq!(sent(&session).len(), 1);
    }

    #[test]
    fn restart_for_other_room_is_ignored() {
        let mut session = playing_as("p1");
        session.handle_event(move_event(0, Mark::X));
        session.handle_event(SessionEvent::RestartGame {
            room_id: "elsewhere".into(),
        });
        assert_eq!(session.board().get(0), Some(Mark::X));
    }

    #[test]
    fn left_game_is_informational() {
        let mut session = playing_as("p1");
        session.handle_event(SessionEvent::OpponentSteppedAway);
        assert_eq!(session.win_text(), OPPONENT_LEFT_TEXT);
        assert!(!session.is_game_over());
        assert!(session.click_cell(0));
    }

    #[test]
    fn user_left_ends_game_and_disables_replay() {
        let mut session = playing_as("p1");
        session.handle_event(move_event(4, Mark::X));
        session.handle_event(SessionEvent::OpponentLeft);

        assert!(session.is_game_over());
        assert_eq!(session.outcome(), Outcome::Abandoned);
        assert_eq!(session.phase(), Phase::GameOver);
        assert_eq!(session.win_text(), OPPONENT_LEFT_TEXT);
        assert!(session.replay_disabled());
        assert!(!session.replay());
        assert!(!session.click_cell(0));
        assert!(sent(&session).is_empty());
    }

    #[test]
    fn restart_after_user_left_keeps_game_over() {
        let mut session = playing_as("p1");
        session.handle_event(move_event(4, Mark::X));
        session.handle_event(SessionEvent::OpponentLeft);
        session.handle_event(SessionEvent::RestartGame {
            room_id: "R1".into(),
        });

        assert_eq!(session.phase(), Phase::GameOver);
        assert_eq!(session.outcome(), Outcome::Abandoned);
        assert_eq!(session.win_text(), OPPONENT_LEFT_TEXT);
        assert_eq!(session.board().get(4), Some(Mark::X));
        assert!(!session.click_cell(0));
        assert!(session.board().get(0).is_none());
        assert!(sent(&session).is_empty());
    }

    #[test]
    fn clicks_outside_playing_phase_are_ignored() {
        let mut session = GameSession::new(RecordingSink::connected());
        session.create_room();
        session.handle_event(SessionEvent::RoomCreated {
            room_id: "R1".into(),
        });
        assert_eq!(session.phase(), Phase::WaitingForPeer);
        assert!(!session.click_cell(0));
        assert_eq!(sent(&session), vec![ClientMessage::CreateRoom]);
    }

    #[test]
    fn session_rebuilt_from_sink_keeps_room() {
        let mut session = GameSession::new(RecordingSink::connected());
        session.create_room();
        session.handle_event(SessionEvent::RoomCreated {
            room_id: "R1".into(),
        });

        let rebuilt = GameSession::new(session.into_sink());
        assert_eq!(rebuilt.room_id(), Some("R1"));
        assert_eq!(rebuilt.copy_room_code(), Some("R1"));
    }

    #[test]
    fn navigate_home_notifies_peer_and_clears_room() {
        let mut session = playing_as("p1");
        session.navigate_home();

        assert_eq!(
            sent(&session),
            vec![ClientMessage::UserLeft(RoomPayload {
                room_id: "R1".into()
            })]
        );
        assert_eq!(session.room_id(), None);
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.main_board_active());
        assert!(!session.is_creating_room());
        assert!(!session.is_joining_room());
        assert!(session.sink().storage().is_empty());
    }

    #[test]
    fn navigate_home_without_room_sends_nothing() {
        let mut session = GameSession::new(RecordingSink::connected());
        session.choose_join();
        session.set_joining_code("ABC");
        session.navigate_home();
        assert!(sent(&session).is_empty());
        assert_eq!(session.joining_room_code(), "");
    }

    #[test]
    fn new_session_restores_room_from_storage() {
        let sink = RecordingSink::connected();
        sink.storage().set(ROOM_ID_KEY, "R9");
        let session = GameSession::new(sink);
        assert_eq!(session.room_id(), Some("R9"));
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn teardown_disposes_sink_and_storage() {
        let mut session = playing_as("p1");
        session.teardown().await;
        assert_eq!(session.sink().disposals, 1);
        assert!(session.sink().storage().is_empty());
        assert!(!session.sink().is_connected());
        assert_eq!(session.phase(), Phase::Idle);

        // Teardown is safe to repeat.
        session.teardown().await;
        assert_eq!(session.sink().disposals, 2);
    }
}
