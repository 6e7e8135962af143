//! The long-lived connection to the relay.
//!
//! [`SessionChannel`] is a thin handle to a background task that owns the
//! transport. Commands go to the task over an unbounded MPSC channel; relay
//! frames come back as [`SessionEvent`]s on a bounded channel returned from
//! [`SessionChannel::start`]. The task reconnects on its own with a bounded
//! exponential backoff until the handle is disposed or dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ChannelConfig::new("ws://localhost:3000/ws");
//! let (channel, mut events) = SessionChannel::connect(config);
//! let mut session = GameSession::new(channel);
//!
//! while let Some(event) = events.recv().await {
//!     session.handle_event(event);
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::error::{Result, SessionError};
use crate::event::SessionEvent;
use crate::protocol::{ClientMessage, ConnectionId, ServerMessage};
use crate::storage::SessionStorage;
use crate::transport::{Connector, Transport};

/// Environment variable read by [`ChannelConfig::from_env`].
pub const SERVER_URL_ENV: &str = "TICTACTOE_SERVER_URL";

/// Relay URL used when [`SERVER_URL_ENV`] is unset.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:3000";

const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_RECONNECTION_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_RECONNECTION_DELAY_MAX: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`SessionChannel`].
///
/// ```
/// use std::time::Duration;
/// use tictactoe_room_client::channel::ChannelConfig;
///
/// let config = ChannelConfig::new("ws://relay.example:3000")
///     .with_reconnection_delay_max(Duration::from_secs(5))
///     .with_reconnection_attempts(3);
/// assert_eq!(config.reconnection_attempts, Some(3));
/// ```
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Relay address, e.g. `ws://localhost:3000`.
    pub server_url: String,
    /// Whether to reconnect after a failed attempt or a dropped connection.
    pub reconnection: bool,
    /// Delay before the first reconnection attempt; doubles each attempt.
    pub reconnection_delay: Duration,
    /// Ceiling for the reconnection delay. Defaults to **10 seconds**.
    pub reconnection_delay_max: Duration,
    /// Give up after this many consecutive failed attempts. `None` retries forever.
    pub reconnection_attempts: Option<u32>,
    /// Per-attempt limit for opening a transport. `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
    /// Capacity of the bounded event channel. Values below 1 are clamped to 1.
    ///
    /// Relay events and `Disconnected` are never dropped: when the channel is
    /// full the connection stops reading until the owner catches up. Only
    /// `Reconnecting` notices are dropped (with a warning) on a full channel.
    pub event_channel_capacity: usize,
    /// How long [`SessionChannel::dispose`] waits for a graceful close
    /// before aborting the task.
    pub shutdown_timeout: Duration,
}

impl ChannelConfig {
    /// Configuration for `server_url` with default tuning.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            reconnection: true,
            reconnection_delay: DEFAULT_RECONNECTION_DELAY,
            reconnection_delay_max: DEFAULT_RECONNECTION_DELAY_MAX,
            reconnection_attempts: None,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Configuration whose URL comes from `TICTACTOE_SERVER_URL`, falling back
    /// to [`DEFAULT_SERVER_URL`].
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let url = lookup(SERVER_URL_ENV)
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        Self::new(url)
    }

    /// Enable or disable automatic reconnection.
    #[must_use]
    pub fn with_reconnection(mut self, enabled: bool) -> Self {
        self.reconnection = enabled;
        self
    }

    /// Set the initial reconnection delay.
    #[must_use]
    pub fn with_reconnection_delay(mut self, delay: Duration) -> Self {
        self.reconnection_delay = delay;
        self
    }

    /// Set the reconnection delay ceiling.
    #[must_use]
    pub fn with_reconnection_delay_max(mut self, delay: Duration) -> Self {
        self.reconnection_delay_max = delay;
        self
    }

    /// Limit the number of consecutive reconnection attempts.
    #[must_use]
    pub fn with_reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = Some(attempts);
        self
    }

    /// Set the per-attempt connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the capacity of the bounded event channel. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the graceful shutdown timeout. Zero aborts immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Command sink ────────────────────────────────────────────────────

/// The outbound side of a relay connection, as seen by a
/// [`GameSession`](crate::session::GameSession).
#[async_trait]
pub trait CommandSink: Send {
    /// Returns `true` once the relay handshake completed and the connection is up.
    fn is_connected(&self) -> bool;

    /// Queue a command for the relay. Fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the connection is down.
    fn emit(&self, message: ClientMessage) -> Result<()>;

    /// Ephemeral storage scoped to this connection.
    fn storage(&self) -> &SessionStorage;

    /// Close the connection and clear the storage. Safe to call repeatedly.
    async fn dispose(&mut self);
}

// ── Shared state ────────────────────────────────────────────────────

struct ChannelState {
    connected: AtomicBool,
    connection_id: Mutex<Option<ConnectionId>>,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            connection_id: Mutex::new(None),
        }
    }
}

#[derive(Debug, Clone)]
struct ReconnectPolicy {
    enabled: bool,
    delay: Duration,
    delay_max: Duration,
    attempts: Option<u32>,
}

impl From<&ChannelConfig> for ReconnectPolicy {
    fn from(config: &ChannelConfig) -> Self {
        Self {
            enabled: config.reconnection,
            delay: config.reconnection_delay,
            delay_max: config.reconnection_delay_max,
            attempts: config.reconnection_attempts,
        }
    }
}

// ── Channel handle ──────────────────────────────────────────────────

/// Handle to one persistent relay connection.
///
/// Created via [`SessionChannel::start`] (or [`SessionChannel::connect`] for
/// the built-in transports), which spawns the background task and returns immediately.
/// Connection success is only observable through the
/// [`Connected`](SessionEvent::Connected) event.
pub struct SessionChannel {
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    state: Arc<ChannelState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
    storage: SessionStorage,
}

impl SessionChannel {
    /// Spawn the connection task and return a handle plus the event receiver.
    ///
    /// `connector` is asked for a new transport on the first attempt and on
    /// every reconnection. The receiver yields `None` once the task exits,
    /// either after [`dispose`](Self::dispose) or when reconnection gives up.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        connector: impl Connector,
        config: ChannelConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(config.event_channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(ChannelState::new());
        let task = tokio::spawn(channel_loop(
            connector,
            ReconnectPolicy::from(&config),
            cmd_rx,
            event_tx,
            Arc::clone(&state),
            shutdown_rx,
        ));

        let channel = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
            storage: SessionStorage::new(),
        };
        (channel, event_rx)
    }

    /// Start a channel to `config.server_url` over WebSocket, falling back
    /// to HTTP long-polling when the upgrade fails. Each reconnection
    /// negotiates again, WebSocket first.
    #[cfg(any(feature = "transport-websocket", feature = "transport-polling"))]
    #[must_use = "the event receiver must be used to receive events"]
    pub fn connect(config: ChannelConfig) -> (Self, mpsc::Receiver<SessionEvent>) {
        let connector =
            crate::transports::relay_connector(&config.server_url, config.connect_timeout);
        Self::start(connector, config)
    }

    /// Returns `true` if the relay handshake completed and the connection is up.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// The id the relay assigned to this connection, if connected.
    pub async fn connection_id(&self) -> Option<ConnectionId> {
        self.state.connection_id.lock().await.clone()
    }

    /// Queue `message` for the relay.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the connection is down.
    pub fn emit(&self, message: ClientMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        debug!(event = message.event_name(), "queueing command");
        self.cmd_tx
            .send(message)
            .map_err(|_| SessionError::NotConnected)
    }

    /// Ephemeral storage that lives as long as this channel.
    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    /// Close the connection, stop the background task and clear storage.
    ///
    /// Idempotent; calling it on an already disposed channel only clears
    /// storage again.
    pub async fn dispose(&mut self) {
        debug!("SessionChannel: dispose requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("channel task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("channel task did not exit within timeout; aborting");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("channel task aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
        self.storage.clear();
    }
}

#[async_trait]
impl CommandSink for SessionChannel {
    fn is_connected(&self) -> bool {
        SessionChannel::is_connected(self)
    }

    fn emit(&self, message: ClientMessage) -> Result<()> {
        SessionChannel::emit(self, message)
    }

    fn storage(&self) -> &SessionStorage {
        SessionChannel::storage(self)
    }

    async fn dispose(&mut self) {
        SessionChannel::dispose(self).await;
    }
}

impl std::fmt::Debug for SessionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionChannel")
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        // No executor to drive a graceful close from here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Background task ─────────────────────────────────────────────────

/// Why a single established connection stopped.
enum ConnectionEnd {
    /// `dispose` was called.
    Shutdown,
    /// The handle was dropped.
    HandleDropped,
    /// The relay closed or the transport failed.
    Lost(Option<String>),
}

/// Connect, run, and reconnect until told to stop or out of attempts.
async fn channel_loop(
    connector: impl Connector,
    policy: ReconnectPolicy,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::Sender<SessionEvent>,
    state: Arc<ChannelState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!(transport = connector.name(), "channel task started");
    let mut backoff = Backoff::new(policy.delay, policy.delay_max);

    loop {
        let attempt = tokio::select! {
            result = connector.connect() => result,
            _ = &mut shutdown_rx => {
                emit_disconnected(&event_tx, &state, Some("channel disposed".into())).await;
                break;
            }
        };

        match attempt {
            Ok(mut transport) => {
                let end = run_connection(
                    transport.as_mut(),
                    &mut cmd_rx,
                    &event_tx,
                    &state,
                    &mut shutdown_rx,
                    &mut backoff,
                )
                .await;
                match end {
                    ConnectionEnd::Shutdown => {
                        let _ = transport.close().await;
                        emit_disconnected(&event_tx, &state, Some("channel disposed".into())).await;
                        break;
                    }
                    ConnectionEnd::HandleDropped => {
                        let _ = transport.close().await;
                        emit_disconnected(&event_tx, &state, Some("channel dropped".into())).await;
                        break;
                    }
                    ConnectionEnd::Lost(reason) => {
                        emit_disconnected(&event_tx, &state, reason).await;
                        discard_pending(&mut cmd_rx);
                    }
                }
            }
            Err(e) => {
                warn!("could not reach relay: {e}");
            }
        }

        if !policy.enabled {
            debug!("reconnection disabled, channel task exiting");
            break;
        }
        if policy
            .attempts
            .is_some_and(|limit| backoff.attempts() >= limit)
        {
            warn!(
                attempts = backoff.attempts(),
                "giving up reconnecting to relay"
            );
            break;
        }

        let delay = backoff.next_delay();
        emit_event(
            &event_tx,
            SessionEvent::Reconnecting {
                attempt: backoff.attempts(),
                delay,
            },
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown_rx => {
                emit_disconnected(&event_tx, &state, Some("channel disposed".into())).await;
                break;
            }
        }
    }

    debug!("channel task exited");
}

/// Multiplex one connection's send and receive paths until it ends.
async fn run_connection(
    transport: &mut dyn Transport,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: &mpsc::Sender<SessionEvent>,
    state: &ChannelState,
    shutdown_rx: &mut oneshot::Receiver<()>,
    backoff: &mut Backoff,
) -> ConnectionEnd {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(msg) = cmd else {
                    debug!("command channel closed");
                    return ConnectionEnd::HandleDropped;
                };
                match msg.to_frame() {
                    Ok(json) => {
                        if let Err(e) = transport.send(json).await {
                            error!("transport send error: {e}");
                            return ConnectionEnd::Lost(Some(format!("transport send error: {e}")));
                        }
                    }
                    Err(e) => {
                        error!(event = msg.event_name(), "failed to serialize command: {e}");
                    }
                }
            }

            _ = &mut *shutdown_rx => {
                debug!("dispose signal received");
                return ConnectionEnd::Shutdown;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match ServerMessage::from_frame(&text) {
                        Ok(msg) => {
                            if let ServerMessage::Connect(handshake) = &msg {
                                *state.connection_id.lock().await = Some(handshake.sid.clone());
                                state.connected.store(true, Ordering::Release);
                                backoff.reset();
                                info!(id = %handshake.sid, "relay handshake complete");
                            } else {
                                debug!(event = msg.event_name(), "relay event");
                            }
                            if !deliver(event_tx, shutdown_rx, SessionEvent::from(msg)).await {
                                debug!("dispose signal received while owner was behind");
                                return ConnectionEnd::Shutdown;
                            }
                        }
                        Err(e) => {
                            warn!("failed to decode relay frame: {e} (raw: {text})");
                        }
                    },
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return ConnectionEnd::Lost(Some(format!("transport receive error: {e}")));
                    }
                    None => {
                        debug!("relay closed the connection");
                        return ConnectionEnd::Lost(None);
                    }
                }
            }
        }
    }
}

/// Drop commands that were queued for a connection that no longer exists.
fn discard_pending(cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>) {
    while let Ok(msg) = cmd_rx.try_recv() {
        debug!(event = msg.event_name(), "discarding command queued before disconnect");
    }
}

/// Deliver a relay event in order, waiting while the owner is behind.
///
/// Waiting here stops `recv` from being polled, so a slow owner throttles the
/// transport instead of losing moves. Returns `false` if `dispose` fired first.
async fn deliver(
    event_tx: &mpsc::Sender<SessionEvent>,
    shutdown_rx: &mut oneshot::Receiver<()>,
    event: SessionEvent,
) -> bool {
    tokio::select! {
        sent = event_tx.send(event) => {
            if sent.is_err() {
                debug!("event channel closed, receiver dropped");
            }
            true
        }
        _ = &mut *shutdown_rx => false,
    }
}

/// Deliver a synthetic progress event without blocking; drop it with a
/// warning when the owner lags.
fn emit_event(event_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Mark the connection down and deliver `Disconnected`, waiting for room if needed.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<SessionEvent>,
    state: &ChannelState,
    reason: Option<String>,
) {
    state.connected.store(false, Ordering::Release);
    *state.connection_id.lock().await = None;
    if event_tx
        .send(SessionEvent::Disconnected { reason })
        .await
        .is_err()
    {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{BoardDataPayload, HandshakePayload, Mark, RoomPayload};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    type Script = Vec<Option<std::result::Result<String, SessionError>>>;

    /// Replays scripted relay frames and records what the client sends.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, SessionError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), SessionError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, SessionError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                // Out of script: stay open until disposed.
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), SessionError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Hands out one scripted transport per connection attempt; `None`
    /// entries fail the attempt.
    struct MockConnector {
        scripts: StdMutex<VecDeque<Option<Script>>>,
        attempts: Arc<AtomicUsize>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockConnector {
        fn new(scripts: Vec<Option<Script>>) -> Self {
            Self {
                scripts: StdMutex::new(scripts.into()),
                attempts: Arc::new(AtomicUsize::new(0)),
                sent: Arc::new(StdMutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        fn name(&self) -> &str {
            "mock"
        }

        async fn connect(&self) -> std::result::Result<Box<dyn Transport>, SessionError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let next = self.scripts.lock().unwrap().pop_front();
            match next {
                Some(Some(script)) => Ok(Box::new(MockTransport {
                    incoming: script.into(),
                    sent: Arc::clone(&self.sent),
                    closed: Arc::clone(&self.closed),
                })),
                Some(None) | None => Err(SessionError::ConnectFailed("scripted failure".into())),
            }
        }
    }

    fn handshake(sid: &str) -> Option<std::result::Result<String, SessionError>> {
        let msg = ServerMessage::Connect(HandshakePayload { sid: sid.into() });
        Some(Ok(serde_json::to_string(&msg).unwrap()))
    }

    fn frame(msg: &ServerMessage) -> Option<std::result::Result<String, SessionError>> {
        Some(Ok(serde_json::to_string(msg).unwrap()))
    }

    fn fast_config() -> ChannelConfig {
        ChannelConfig::new("mock://relay")
            .with_reconnection_delay(Duration::from_millis(5))
            .with_reconnection_delay_max(Duration::from_millis(20))
            .with_shutdown_timeout(Duration::from_millis(200))
    }

    async fn next(events: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn handshake_marks_connected() {
        let connector = MockConnector::new(vec![Some(vec![handshake("sock-1")])]);
        let (mut channel, mut events) = SessionChannel::start(connector, fast_config());

        assert_eq!(
            next(&mut events).await,
            SessionEvent::Connected {
                id: "sock-1".into()
            }
        );
        assert!(channel.is_connected());
        assert_eq!(channel.connection_id().await.as_deref(), Some("sock-1"));

        channel.dispose().await;
    }

    #[tokio::test]
    async fn emit_before_handshake_is_rejected() {
        let connector = MockConnector::new(vec![Some(vec![])]);
        let (mut channel, _events) = SessionChannel::start(connector, fast_config());

        let result = channel.emit(ClientMessage::CreateRoom);
        assert!(matches!(result, Err(SessionError::NotConnected)));

        channel.dispose().await;
    }

    #[tokio::test]
    async fn emit_writes_json_frame() {
        let connector = MockConnector::new(vec![Some(vec![handshake("s")])]);
        let sent = Arc::clone(&connector.sent);
        let (mut channel, mut events) = SessionChannel::start(connector, fast_config());
        next(&mut events).await;

        channel
            .emit(ClientMessage::Reset(RoomPayload {
                room_id: "R1".into(),
            }))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let frames = sent.lock().unwrap();
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0], r#"{"event":"reset","data":{"roomId":"R1"}}"#);
        }

        channel.dispose().await;
    }

    #[tokio::test]
    async fn relay_frames_arrive_in_order_and_garbage_is_skipped() {
        let connector = MockConnector::new(vec![Some(vec![
            handshake("s"),
            frame(&ServerMessage::RoomCreated("ABC123".into())),
            Some(Ok("not json".into())),
            frame(&ServerMessage::LeftGame),
        ])]);
        let (mut channel, mut events) = SessionChannel::start(connector, fast_config());

        next(&mut events).await;
        assert_eq!(
            next(&mut events).await,
            SessionEvent::RoomCreated {
                room_id: "ABC123".into()
            }
        );
        assert_eq!(next(&mut events).await, SessionEvent::OpponentSteppedAway);
        assert!(channel.is_connected());

        channel.dispose().await;
    }

    #[tokio::test]
    async fn slow_owner_still_receives_every_move() {
        let moves = [(0, Mark::X), (1, Mark::O), (2, Mark::X)];
        let mut script = vec![handshake("p1")];
        script.extend(moves.iter().map(|&(number, current_player)| {
            frame(&ServerMessage::BoardData(BoardDataPayload {
                number,
                current_player,
            }))
        }));
        let connector = MockConnector::new(vec![Some(script)]);
        let config = fast_config().with_event_channel_capacity(1);
        let (mut channel, mut events) = SessionChannel::start(connector, config);

        // Owner busy elsewhere while the relay bursts.
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(
            next(&mut events).await,
            SessionEvent::Connected { id: "p1".into() }
        );
        for (number, current_player) in moves {
            assert_eq!(
                next(&mut events).await,
                SessionEvent::BoardData(BoardDataPayload {
                    number,
                    current_player,
                })
            );
        }

        channel.dispose().await;
    }

    #[tokio::test]
    async fn dispose_while_owner_is_behind_still_closes_transport() {
        let connector = MockConnector::new(vec![Some(vec![
            handshake("p1"),
            frame(&ServerMessage::LeftGame),
            frame(&ServerMessage::UserLeft),
        ])]);
        let closed = Arc::clone(&connector.closed);
        let config = fast_config().with_event_channel_capacity(1);
        let (mut channel, _events) = SessionChannel::start(connector, config);
        tokio::time::sleep(Duration::from_millis(50)).await;

        channel.dispose().await;
        assert!(closed.load(Ordering::Relaxed));
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn reconnects_after_relay_closes() {
        let connector = MockConnector::new(vec![
            Some(vec![handshake("first"), None]),
            Some(vec![handshake("second")]),
        ]);
        let (mut channel, mut events) = SessionChannel::start(connector, fast_config());

        assert_eq!(
            next(&mut events).await,
            SessionEvent::Connected { id: "first".into() }
        );
        assert_eq!(
            next(&mut events).await,
            SessionEvent::Disconnected { reason: None }
        );
        assert!(matches!(
            next(&mut events).await,
            SessionEvent::Reconnecting { attempt: 1, .. }
        ));
        assert_eq!(
            next(&mut events).await,
            SessionEvent::Connected {
                id: "second".into()
            }
        );
        assert_eq!(channel.connection_id().await.as_deref(), Some("second"));

        channel.dispose().await;
    }

    #[tokio::test]
    async fn transport_error_reports_reason() {
        let connector = MockConnector::new(vec![Some(vec![
            handshake("s"),
            Some(Err(SessionError::TransportReceive("reset by peer".into()))),
        ])]);
        let config = fast_config().with_reconnection(false);
        let (_channel, mut events) = SessionChannel::start(connector, config);

        next(&mut events).await;
        let SessionEvent::Disconnected { reason: Some(reason) } = next(&mut events).await else {
            panic!("expected Disconnected with a reason");
        };
        assert!(reason.contains("reset by peer"));
        // Reconnection disabled: the task exits and the channel closes.
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn backoff_grows_then_gives_up() {
        let connector = MockConnector::new(vec![None, None, None]);
        let attempts = Arc::clone(&connector.attempts);
        let config = fast_config().with_reconnection_attempts(2);
        let (channel, mut events) = SessionChannel::start(connector, config);

        let mut delays = Vec::new();
        while let Some(event) = events.recv().await {
            if let SessionEvent::Reconnecting { delay, .. } = event {
                delays.push(delay);
            }
        }
        assert_eq!(
            delays,
            vec![Duration::from_millis(5), Duration::from_millis(10)]
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn dispose_closes_transport_and_clears_storage() {
        let connector = MockConnector::new(vec![Some(vec![handshake("s")])]);
        let closed = Arc::clone(&connector.closed);
        let (mut channel, mut events) = SessionChannel::start(connector, fast_config());
        next(&mut events).await;

        channel.storage().set("roomId", "R1");
        channel.dispose().await;

        assert!(closed.load(Ordering::Relaxed));
        assert!(channel.storage().is_empty());
        assert!(!channel.is_connected());
        assert!(matches!(
            next(&mut events).await,
            SessionEvent::Disconnected { .. }
        ));
        assert!(events.recv().await.is_none());

        // Second dispose is a no-op.
        channel.dispose().await;
        assert!(matches!(
            channel.emit(ClientMessage::CreateRoom),
            Err(SessionError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn dispose_while_waiting_to_reconnect() {
        let connector = MockConnector::new(vec![None]);
        let config = fast_config()
            .with_reconnection_delay(Duration::from_secs(30))
            .with_reconnection_delay_max(Duration::from_secs(30));
        let (mut channel, mut events) = SessionChannel::start(connector, config);

        assert!(matches!(
            next(&mut events).await,
            SessionEvent::Reconnecting { .. }
        ));
        channel.dispose().await;
        assert!(matches!(
            next(&mut events).await,
            SessionEvent::Disconnected { .. }
        ));
    }

    #[tokio::test]
    async fn drop_without_dispose_does_not_hang() {
        let connector = MockConnector::new(vec![Some(vec![handshake("s")])]);
        let (channel, mut events) = SessionChannel::start(connector, fast_config());
        next(&mut events).await;
        drop(channel);
        let end = tokio::time::timeout(Duration::from_secs(1), events.recv()).await;
        assert!(end.is_ok(), "event channel should close after drop");
    }

    #[test]
    fn config_defaults() {
        let config = ChannelConfig::new("ws://relay");
        assert_eq!(config.server_url, "ws://relay");
        assert!(config.reconnection);
        assert_eq!(config.reconnection_delay, Duration::from_secs(1));
        assert_eq!(config.reconnection_delay_max, Duration::from_secs(10));
        assert!(config.reconnection_attempts.is_none());
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn capacity_is_clamped() {
        let config = ChannelConfig::new("ws://relay").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn env_lookup_falls_back_to_default() {
        let config = ChannelConfig::from_lookup(|_| None);
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);

        let config = ChannelConfig::from_lookup(|_| Some("  ".into()));
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);

        let config = ChannelConfig::from_lookup(|key| {
            (key == SERVER_URL_ENV).then(|| "wss://games.example".to_string())
        });
        assert_eq!(config.server_url, "wss://games.example");
    }

    #[tokio::test]
    async fn debug_impl_reports_connection() {
        let (mut channel, _events) =
            SessionChannel::start(MockConnector::new(vec![]), fast_config());
        let rendered = format!("{channel:?}");
        assert!(rendered.contains("SessionChannel"));
        assert!(rendered.contains("connected: false"));
        channel.dispose().await;
    }
}
