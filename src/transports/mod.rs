//! Built-in [`Transport`](crate::Transport) implementations, each behind a
//! feature gate.
//!
//! | Feature                | Transport              | Connector              |
//! |------------------------|------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] | [`WebSocketConnector`] |
//! | `transport-polling`    | [`PollingTransport`]   | [`PollingConnector`]   |
//!
//! [`relay_connector`] chains whichever are enabled, WebSocket first.

use std::time::Duration;

use crate::transport::FallbackConnector;

#[cfg(feature = "transport-polling")]
pub mod polling;
#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-polling")]
pub use polling::{PollingConnector, PollingTransport};
#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};

/// The connector [`SessionChannel::connect`](crate::SessionChannel::connect)
/// uses: WebSocket to `server_url`, then long-polling against the same host
/// if the upgrade fails. `connect_timeout` bounds each attempt.
#[allow(unused_mut, unused_variables)]
pub fn relay_connector(server_url: &str, connect_timeout: Option<Duration>) -> FallbackConnector {
    let mut chain = FallbackConnector::new();
    #[cfg(feature = "transport-websocket")]
    {
        let mut ws = WebSocketConnector::new(server_url);
        if let Some(timeout) = connect_timeout {
            ws = ws.with_timeout(timeout);
        }
        chain = chain.with(ws);
    }
    #[cfg(feature = "transport-polling")]
    {
        let mut polling = PollingConnector::new(server_url);
        if let Some(timeout) = connect_timeout {
            polling = polling.with_timeout(timeout);
        }
        chain = chain.with(polling);
    }
    chain
}
