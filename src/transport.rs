//! Transport abstraction for talking to the relay.
//!
//! The [`Transport`] trait is a bidirectional text message channel between
//! this client and the relay. Each message is one JSON frame, so
//! implementations handle framing themselves (WebSocket frames, long-poll
//! batches, length-prefixed TCP, ...).
//!
//! A [`Connector`] knows how to produce a fresh, connected [`Transport`]. The
//! [`SessionChannel`](crate::channel::SessionChannel) calls it again on every
//! reconnection attempt. [`FallbackConnector`] tries several connectors in
//! order, which is how a full-duplex transport is preferred over a polling
//! one.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use tictactoe_room_client::error::SessionError;
//! use tictactoe_room_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), SessionError> {
//!         // Send the JSON text frame
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, SessionError>> {
//!         // Return None when the connection is closed cleanly
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SessionError> {
//!         unimplemented!()
//!     }
//! }
//! ```

use async_trait::async_trait;
use tracing::debug;

use crate::error::SessionError;

/// A bidirectional text message transport to the relay.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the channel
/// task polls it inside `tokio::select!`. If `recv` is cancelled before
/// completion, calling it again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TransportSend`] if the frame could not be sent.
    async fn send(&mut self, message: String) -> Result<(), SessionError>;

    /// Receive the next JSON text frame.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the relay closed the connection cleanly
    async fn recv(&mut self) -> Option<Result<String, SessionError>>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Produces connected transports on demand.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Short name used in logs, e.g. `"websocket"`.
    fn name(&self) -> &str;

    /// Open a new connection to the relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    async fn connect(&self) -> Result<Box<dyn Transport>, SessionError>;
}

/// Tries each connector in order and returns the first transport that
/// connects.
///
/// ```rust,ignore
/// let connector = FallbackConnector::new()
///     .with(WebSocketConnector::new("ws://localhost:3000/ws"))
///     .with(MyPollingConnector::new("http://localhost:3000/poll"));
/// ```
#[derive(Default)]
pub struct FallbackConnector {
    connectors: Vec<Box<dyn Connector>>,
}

impl FallbackConnector {
    /// An empty chain. Connecting with no connectors always fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a connector to try after the ones already present.
    #[must_use]
    pub fn with(mut self, connector: impl Connector) -> Self {
        self.connectors.push(Box::new(connector));
        self
    }

    /// Number of connectors in the chain.
    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    /// Returns `true` if the chain has no connectors.
    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

impl std::fmt::Debug for FallbackConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.connectors.iter().map(|c| c.name()).collect();
        f.debug_struct("FallbackConnector")
            .field("connectors", &names)
            .finish()
    }
}

#[async_trait]
impl Connector for FallbackConnector {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn connect(&self) -> Result<Box<dyn Transport>, SessionError> {
        let mut failures = Vec::with_capacity(self.connectors.len());
        for connector in &self.connectors {
            match connector.connect().await {
                Ok(transport) => {
                    debug!(transport = connector.name(), "transport negotiated");
                    return Ok(transport);
                }
                Err(e) => {
                    debug!(transport = connector.name(), "transport failed: {e}");
                    failures.push(format!("{}: {e}", connector.name()));
                }
            }
        }
        if failures.is_empty() {
            return Err(SessionError::ConnectFailed("no transports configured".into()));
        }
        Err(SessionError::ConnectFailed(failures.join("; ")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&mut self, _message: String) -> Result<(), SessionError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, SessionError>> {
            None
        }

        async fn close(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    struct Fixed {
        name: &'static str,
        works: bool,
    }

    #[async_trait]
    impl Connector for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn connect(&self) -> Result<Box<dyn Transport>, SessionError> {
            if self.works {
                Ok(Box::new(NullTransport))
            } else {
                Err(SessionError::TransportClosed)
            }
        }
    }

    #[test]
    fn transport_trait_is_object_safe() {
        fn assert_object_safe(_: &dyn Transport) {}
        assert_object_safe(&NullTransport);
    }

    #[tokio::test]
    async fn falls_back_to_second_connector() {
        let connector = FallbackConnector::new()
            .with(Fixed {
                name: "websocket",
                works: false,
            })
            .with(Fixed {
                name: "polling",
                works: true,
            });
        assert_eq!(connector.len(), 2);
        assert!(connector.connect().await.is_ok());
    }

    #[tokio::test]
    async fn reports_every_failure() {
        let connector = FallbackConnector::new()
            .with(Fixed {
                name: "websocket",
                works: false,
            })
            .with(Fixed {
                name: "polling",
                works: false,
            });
        let Err(SessionError::ConnectFailed(reason)) = connector.connect().await else {
            panic!("expected ConnectFailed");
        };
        assert!(reason.contains("websocket"));
        assert!(reason.contains("polling"));
    }

    #[tokio::test]
    async fn empty_chain_fails() {
        let connector = FallbackConnector::new();
        assert!(connector.is_empty());
        assert!(matches!(
            connector.connect().await,
            Err(SessionError::ConnectFailed(_))
        ));
    }
}
