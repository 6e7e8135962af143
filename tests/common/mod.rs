#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the room client integration tests.
//!
//! Provides a channel-backed [`MockTransport`] that the test drives as if it
//! were the relay, a [`MockConnector`] handing those transports out one per
//! connection attempt, and helpers for building relay frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tictactoe_room_client::protocol::{
    BoardDataPayload, ClientMessage, GameStartPayload, HandshakePayload, Mark, ServerMessage,
};
use tictactoe_room_client::{Connector, SessionError, SessionEvent, Transport};
use tokio::sync::mpsc;

type Frame = Option<Result<String, SessionError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// A transport whose far end is a [`RelayEnd`] held by the test.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Frame>,
    outgoing: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

/// The relay's side of a [`MockTransport`].
pub struct RelayEnd {
    incoming: mpsc::UnboundedSender<Frame>,
    outgoing: mpsc::UnboundedReceiver<String>,
    /// Whether the client called `close()`.
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a connected transport/relay pair.
    pub fn pair() -> (Self, RelayEnd) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: in_rx,
            outgoing: out_tx,
            closed: Arc::clone(&closed),
        };
        let relay = RelayEnd {
            incoming: in_tx,
            outgoing: out_rx,
            closed,
        };
        (transport, relay)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        self.outgoing
            .send(message)
            .map_err(|_| SessionError::TransportClosed)
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        match self.incoming.recv().await {
            Some(frame) => frame,
            // Relay end dropped without closing: stay open until disposed.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

impl RelayEnd {
    /// Deliver a relay event to the client.
    pub fn push(&self, msg: &ServerMessage) {
        self.push_raw(serde_json::to_string(msg).expect("frame serialization"));
    }

    /// Deliver a raw text frame, valid or not.
    pub fn push_raw(&self, text: impl Into<String>) {
        let _ = self.incoming.send(Some(Ok(text.into())));
    }

    /// Close the connection from the relay side.
    pub fn hang_up(&self) {
        let _ = self.incoming.send(None);
    }

    /// Fail the connection with a transport error.
    pub fn fail(&self, reason: &str) {
        let _ = self
            .incoming
            .send(Some(Err(SessionError::TransportReceive(reason.into()))));
    }

    /// Wait for the next command the client sent.
    pub async fn next_command(&mut self) -> ClientMessage {
        let text = tokio::time::timeout(Duration::from_secs(2), self.outgoing.recv())
            .await
            .expect("timed out waiting for a client command")
            .expect("transport dropped");
        serde_json::from_str(&text).expect("client sent an unparseable frame")
    }

    /// Returns `true` if nothing has been sent since the last read.
    pub fn is_quiet(&mut self) -> bool {
        self.outgoing.try_recv().is_err()
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Hands out prepared transports in order; once they run out, every
/// attempt fails.
pub struct MockConnector {
    transports: StdMutex<VecDeque<MockTransport>>,
    /// Number of `connect` calls so far.
    pub attempts: Arc<AtomicUsize>,
}

impl MockConnector {
    /// A connector good for `connections` successful attempts, plus the
    /// relay end of each.
    pub fn new(connections: usize) -> (Self, Vec<RelayEnd>) {
        let (transports, relays): (VecDeque<_>, Vec<_>) =
            (0..connections).map(|_| MockTransport::pair()).unzip();
        let connector = Self {
            transports: StdMutex::new(transports),
            attempts: Arc::new(AtomicUsize::new(0)),
        };
        (connector, relays)
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> Result<Box<dyn Transport>, SessionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.transports.lock().unwrap().pop_front() {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(SessionError::ConnectFailed("no relay left".into())),
        }
    }
}

// ── Frame helpers ───────────────────────────────────────────────────

pub fn handshake(sid: &str) -> ServerMessage {
    ServerMessage::Connect(HandshakePayload { sid: sid.into() })
}

pub fn room_created(room_id: &str) -> ServerMessage {
    ServerMessage::RoomCreated(room_id.into())
}

pub fn game_start(room_id: &str, first: &str, second: &str) -> ServerMessage {
    ServerMessage::GameStart(GameStartPayload {
        room_id: room_id.into(),
        users: [first.into(), second.into()],
    })
}

pub fn board_data(number: u8, mark: Mark) -> ServerMessage {
    ServerMessage::BoardData(BoardDataPayload {
        number,
        current_player: mark,
    })
}

pub fn restart_game(room_id: &str) -> ServerMessage {
    ServerMessage::RestartGame(room_id.into())
}

// ── Event helpers ───────────────────────────────────────────────────

/// Wait for the next event, failing the test after two seconds.
pub async fn next_event(events: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
