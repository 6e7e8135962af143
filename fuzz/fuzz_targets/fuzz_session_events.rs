#![no_main]

use async_trait::async_trait;
use libfuzzer_sys::fuzz_target;
use tictactoe_room_client::protocol::ServerMessage;
use tictactoe_room_client::{
    ClientMessage, CommandSink, GameSession, SessionError, SessionEvent, SessionStorage,
};

/// Accepts every command and drops it.
struct NullSink {
    storage: SessionStorage,
}

#[async_trait]
impl CommandSink for NullSink {
    fn is_connected(&self) -> bool {
        true
    }

    fn emit(&self, _message: ClientMessage) -> Result<(), SessionError> {
        Ok(())
    }

    fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    async fn dispose(&mut self) {}
}

// Each input line is one relay frame; a bare digit is a local click.
// No sequence may panic, and a finished game must stay finished.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut session = GameSession::new(NullSink {
        storage: SessionStorage::new(),
    });
    for line in text.lines() {
        if let Ok(number) = line.trim().parse::<usize>() {
            session.click_cell(number);
            continue;
        }
        let Ok(msg) = serde_json::from_str::<ServerMessage>(line) else {
            continue;
        };
        let was_over = session.is_game_over();
        let restarts = matches!(
            msg,
            ServerMessage::GameStart(_) | ServerMessage::RestartGame(_)
        );
        let before = *session.board();
        session.handle_event(SessionEvent::from(msg));
        if was_over && !restarts {
            assert_eq!(*session.board(), before);
        }
    }
});
