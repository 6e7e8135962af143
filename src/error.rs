//! Error types for the tic-tac-toe room client.

use thiserror::Error;

/// Errors that can occur while talking to the relay.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a relay frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An outbound command was attempted while the channel is not connected.
    #[error("not connected to relay")]
    NotConnected,

    /// Every configured connector failed to establish a transport.
    #[error("could not connect to relay: {0}")]
    ConnectFailed(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An HTTP request to the polling endpoint failed.
    #[cfg(feature = "transport-polling")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized [`Result`] type for room client operations.
pub type Result<T> = std::result::Result<T, SessionError>;
