//! # Tic-Tac-Toe Room Client
//!
//! Client-side session and move synchronization for two-player tic-tac-toe
//! played through a relay server.
//!
//! The relay pairs two connections into a room and fans every move out to
//! both of them. This crate holds one player's half of that conversation:
//!
//! - [`SessionChannel`]: one persistent relay connection with automatic
//!   reconnection, sending [`ClientMessage`]s and delivering
//!   [`SessionEvent`]s on a channel.
//! - [`GameSession`]: the room/turn state machine. It applies local clicks
//!   optimistically, reconciles them against the relay's authoritative
//!   moves, and detects wins and ties.
//! - [`Board`]: the 3×3 grid and its win/tie classification.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for
//!   any backend; [`FallbackConnector`] tries several in order.
//! - **WebSocket built-in**: the default `transport-websocket` feature
//!   provides `WebSocketTransport` and `WebSocketConnector`.
//! - **Long-polling fallback**: the default `transport-polling` feature
//!   provides `PollingTransport` and `PollingConnector`.
//!   [`SessionChannel::connect`] tries WebSocket first and falls back to
//!   polling when the upgrade fails.
//!
//! ## Quick Start
//!
//! ```no_run
//! # #[cfg(any(feature = "transport-websocket", feature = "transport-polling"))]
//! # async fn run() {
//! use tictactoe_room_client::{ChannelConfig, GameSession, SessionChannel};
//!
//! let (channel, mut events) = SessionChannel::connect(ChannelConfig::from_env());
//! let mut session = GameSession::new(channel);
//!
//! while let Some(event) = events.recv().await {
//!     session.handle_event(event);
//!     if session.is_my_turn() {
//!         session.click_cell(4);
//!     }
//! }
//! # }
//! ```

pub mod backoff;
pub mod board;
pub mod channel;
pub mod error;
pub mod event;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use board::{Board, Outcome};
pub use channel::{ChannelConfig, CommandSink, SessionChannel};
pub use error::SessionError;
pub use event::SessionEvent;
pub use protocol::{ClientMessage, Mark, ServerMessage};
pub use session::{GameSession, Phase, RoomChoice};
pub use storage::SessionStorage;
pub use transport::{Connector, FallbackConnector, Transport};

#[cfg(feature = "transport-polling")]
pub use transports::{PollingConnector, PollingTransport};
#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
