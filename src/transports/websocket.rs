//! WebSocket leg of the relay connection.
//!
//! The relay speaks one JSON envelope per text message,
//! `{"event": <name>, "data": <payload>}`, and always opens with a
//! `connect` envelope carrying the sid. This transport passes those text
//! messages through untouched; decoding and the handshake gate live in
//! [`SessionChannel`](crate::channel::SessionChannel).
//!
//! Binary messages are not part of the relay protocol and are skipped.
//! Control frames never reach the channel. Leaving sends a `Normal` close
//! so the relay can tell the room the player is gone.
//!
//! Requires the `transport-websocket` feature (on by default).

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::error::SessionError;
use crate::transport::{Connector, Transport};

/// Socket type a [`WebSocketTransport`] runs over, plain or TLS.
pub type RelayStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Reason sent with the close frame when the player leaves.
const LEAVING_REASON: &str = "player left";

/// One open WebSocket to the relay.
///
/// [`recv`](Transport::recv) only completes on a text envelope, the end of
/// the stream or an error, and dropping it mid-wait loses nothing.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: RelayStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Dial the relay at `url` (`ws://` or `wss://`).
    ///
    /// # Errors
    ///
    /// [`SessionError::Io`] when the URL is bad, the socket cannot be opened,
    /// or the relay refuses the upgrade.
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        tracing::debug!(url = %url, "dialing relay");
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(upgrade_error)?;
        tracing::info!(url = %url, "relay socket open");
        Ok(Self::from_stream(stream))
    }

    /// [`connect`](Self::connect) bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// [`SessionError::Timeout`] when the relay does not answer in time.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, SessionError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| SessionError::Timeout)?
    }

    /// Use an already upgraded socket, e.g. one opened with custom headers.
    pub fn from_stream(stream: RelayStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

/// Keep the I/O kind for socket failures so callers can tell refused from
/// reset; protocol and HTTP upgrade failures become `Other`.
fn upgrade_error(e: WsError) -> SessionError {
    let kind = match &e {
        WsError::Io(io) => io.kind(),
        _ => std::io::ErrorKind::Other,
    };
    SessionError::Io(std::io::Error::new(kind, e))
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| SessionError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(SessionError::TransportReceive(e.to_string()))),
            };
            match message {
                Message::Text(envelope) => return Some(Ok(envelope.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "relay closed the socket");
                    return None;
                }
                Message::Binary(bytes) => {
                    tracing::warn!(len = bytes.len(), "binary message from relay skipped");
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: LEAVING_REASON.into(),
        };
        match self.stream.close(Some(frame)).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(SessionError::TransportSend(e.to_string())),
        }
    }
}

/// Dials a fixed relay URL for each connection attempt.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    timeout: Option<Duration>,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: None,
        }
    }

    /// Bound each dial by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn connect(&self) -> Result<Box<dyn Transport>, SessionError> {
        let transport = match self.timeout {
            Some(timeout) => WebSocketTransport::connect_with_timeout(&self.url, timeout).await?,
            None => WebSocketTransport::connect(&self.url).await?,
        };
        Ok(Box::new(transport))
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
    use tokio::net::TcpListener;

    /// Accept one WebSocket connection on a local port and hand it to `relay`.
    async fn local_relay<F, Fut>(relay: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            relay(ws).await;
        });
        format!("ws://{addr}")
    }

    #[test]
    fn transport_is_send_and_debug() {
        fn assert_bounds<T: Send + std::fmt::Debug>() {}
        assert_bounds::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn invalid_url_is_io_error() {
        let err = WebSocketTransport::connect("not a url").await.unwrap_err();
        assert!(matches!(err, SessionError::Io(_)));
    }

    #[tokio::test]
    async fn unreachable_relay_is_io_error() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Io(_)));
    }

    #[tokio::test]
    async fn connect_timeout_elapses() {
        // TEST-NET-1 is never routable.
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SessionError::Timeout));
    }

    #[tokio::test]
    async fn receives_handshake_then_room_created() {
        let url = local_relay(|mut ws| async move {
            ws.send(Message::Text(r#"{"event":"connect","data":{"sid":"s1"}}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"event":"roomCreated","data":"ABC123"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let first = transport.recv().await.unwrap().unwrap();
        assert!(first.contains("\"sid\":\"s1\""));
        let second = transport.recv().await.unwrap().unwrap();
        assert!(second.contains("roomCreated"));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn binary_frames_are_skipped() {
        let url = local_relay(|mut ws| async move {
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Text(r#"{"event":"leftGame"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, r#"{"event":"leftGame"}"#);
    }

    #[tokio::test]
    async fn relay_sees_outbound_command() {
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel::<String>();
        let url = local_relay(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = seen_tx.send(text.to_string());
            }
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport
            .send(r#"{"event":"createRoom"}"#.to_string())
            .await
            .unwrap();
        assert_eq!(seen_rx.await.unwrap(), r#"{"event":"createRoom"}"#);
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_send() {
        let url = local_relay(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
            .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, SessionError::TransportClosed));
    }

    #[tokio::test]
    async fn leaving_sends_normal_close_frame() {
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        let url = local_relay(|mut ws| async move {
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Close(frame) = message {
                    let _ = seen_tx.send(frame);
                    break;
                }
            }
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        let frame = seen_rx.await.unwrap().unwrap();
        assert_eq!(frame.code, CloseCode::Normal);
        assert_eq!(frame.reason.as_str(), LEAVING_REASON);
    }

    #[tokio::test]
    async fn connector_yields_working_transport() {
        let url = local_relay(|mut ws| async move {
            ws.send(Message::Text(r#"{"event":"userLeft"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let connector = WebSocketConnector::new(url.clone()).with_timeout(Duration::from_secs(5));
        assert_eq!(connector.url(), url);
        let mut transport = connector.connect().await.unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, r#"{"event":"userLeft"}"#);
    }
}
