//! # Terminal Game
//!
//! Plays one side of a room from the terminal:
//!
//! 1. Connect to the relay over WebSocket
//! 2. Create a room, or join one by code
//! 3. Click cells by number and watch the opponent's moves arrive
//! 4. Replay, go home, or quit
//!
//! ## Running
//!
//! ```sh
//! # Start a relay on localhost:3000, then in two terminals:
//! cargo run --example terminal_game
//!
//! # Override the relay URL:
//! TICTACTOE_SERVER_URL=ws://my-relay:3000 cargo run --example terminal_game
//! ```
//!
//! Commands: `create`, `join <code>`, `<0-8>`, `replay`, `copy`, `home`, `quit`.

use tictactoe_room_client::{
    ChannelConfig, CommandSink, GameSession, Phase, SessionChannel, SessionEvent,
};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "commands: create | join <code> | 0-8 | replay | copy | home | quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Connect ─────────────────────────────────────────────────────
    let config = ChannelConfig::from_env();
    tracing::info!("Connecting to {}", config.server_url);
    let (channel, mut events) = SessionChannel::connect(config);
    let mut session = GameSession::new(channel);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::info!("Relay unreachable, giving up");
                    break;
                };
                match &event {
                    SessionEvent::Connected { id } => tracing::info!("Connected as {id}"),
                    SessionEvent::Disconnected { reason } => {
                        tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("closed"));
                    }
                    SessionEvent::Reconnecting { attempt, delay } => {
                        tracing::info!("Reconnecting (attempt {attempt}) in {delay:?}");
                    }
                    _ => {}
                }
                let redraw = matches!(
                    event,
                    SessionEvent::GameStart(_)
                        | SessionEvent::BoardData(_)
                        | SessionEvent::RestartGame { .. }
                        | SessionEvent::OpponentSteppedAway
                        | SessionEvent::OpponentLeft
                );
                let created = matches!(event, SessionEvent::RoomCreated { .. });
                session.handle_event(event);
                if created && session.phase() == Phase::WaitingForPeer {
                    if let Some(code) = session.copy_room_code() {
                        println!("room code: {code} (waiting for a second player)");
                    }
                }
                if redraw {
                    render(&session);
                }
            }

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let mut words = line.split_whitespace();
                match (words.next(), words.next()) {
                    (Some("create"), _) => {
                        if !session.create_room() {
                            println!("cannot create a room right now");
                        }
                    }
                    (Some("join"), Some(code)) => {
                        session.choose_join();
                        session.set_joining_code(code);
                        if !session.enter_room() {
                            println!("cannot join right now");
                        }
                    }
                    (Some("replay"), _) => {
                        if !session.replay() {
                            println!("replay unavailable");
                        }
                    }
                    (Some("copy"), _) => match session.copy_room_code() {
                        Some(code) => println!("{code}"),
                        None => println!("not in a room"),
                    },
                    (Some("home"), _) => {
                        session.navigate_home();
                        println!("{HELP}");
                    }
                    (Some("quit"), _) => break,
                    (Some(cell), _) => match cell.parse::<usize>() {
                        Ok(number) => {
                            if session.click_cell(number) {
                                render(&session);
                            } else {
                                println!("move refused");
                            }
                        }
                        Err(_) => println!("{HELP}"),
                    },
                    (None, _) => {}
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    session.teardown().await;
    Ok(())
}

fn render<S: CommandSink>(session: &GameSession<S>) {
    println!("\n{}", session.board());
    if !session.win_text().is_empty() {
        println!("{}", session.win_text());
    } else if session.is_my_turn() {
        println!("your move ({})", session.current_player());
    } else {
        println!("waiting for the other player");
    }
}
