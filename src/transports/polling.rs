//! HTTP long-polling leg of the relay connection, for networks that block
//! WebSocket upgrades.
//!
//! The relay exposes one endpoint, `<server>/poll`, and carries the same
//! `{"event", "data"}` envelopes as the WebSocket leg, one per line:
//!
//! | Request                   | Meaning                                          |
//! |---------------------------|--------------------------------------------------|
//! | `GET /poll`               | open a session; body starts with `connect {sid}` |
//! | `GET /poll?sid=<sid>`     | wait for envelopes; an empty body means none yet |
//! | `POST /poll?sid=<sid>`    | one outbound envelope as the body                |
//! | `DELETE /poll?sid=<sid>`  | leave                                            |
//!
//! `404` or `410` on a poll means the relay dropped the session.
//!
//! Requires the `transport-polling` feature (on by default).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::SessionError;
use crate::protocol::ServerMessage;
use crate::transport::{Connector, Transport};

/// Upper bound on one long-poll request. The relay answers well before this
/// with an empty body when it has nothing to say.
const POLL_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Path of the polling endpoint under the server URL.
const POLL_PATH: &str = "/poll";

type Inbound = Result<String, SessionError>;

/// Map a relay URL to its polling endpoint: `ws` becomes `http`, `wss`
/// becomes `https`, and `/poll` is appended to the path.
///
/// ```
/// use tictactoe_room_client::transports::polling::polling_endpoint;
///
/// assert_eq!(polling_endpoint("ws://localhost:3000"), "http://localhost:3000/poll");
/// assert_eq!(polling_endpoint("wss://relay.example/"), "https://relay.example/poll");
/// ```
pub fn polling_endpoint(server_url: &str) -> String {
    let http = if let Some(rest) = server_url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else if let Some(rest) = server_url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else {
        server_url.to_string()
    };
    let base = http.trim_end_matches('/');
    if base.ends_with(POLL_PATH) {
        base.to_string()
    } else {
        format!("{base}{POLL_PATH}")
    }
}

/// Split a poll response body into envelopes, skipping blank lines.
fn envelopes(body: &str) -> impl Iterator<Item = String> + '_ {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}

/// One polling session with the relay.
///
/// A background task keeps a long-poll outstanding and queues what it gets,
/// so [`recv`](Transport::recv) is a plain queue read and cancel-safe.
#[derive(Debug)]
pub struct PollingTransport {
    http: reqwest::Client,
    endpoint: String,
    sid: String,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    poller: JoinHandle<()>,
    closed: bool,
}

impl PollingTransport {
    /// Open a polling session at `endpoint` (already ending in `/poll`).
    ///
    /// The opening response must start with the relay's `connect` envelope;
    /// it is queued so the channel sees the handshake as on any transport.
    ///
    /// # Errors
    ///
    /// [`SessionError::Http`] if the request fails or the relay answers with
    /// an error status, [`SessionError::ConnectFailed`] if no handshake came
    /// back.
    pub async fn connect(endpoint: &str, connect_timeout: Option<Duration>) -> Result<Self, SessionError> {
        let mut builder = reqwest::Client::builder().timeout(POLL_REQUEST_TIMEOUT);
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build()?;

        tracing::debug!(endpoint, "opening polling session");
        let opening = http.get(endpoint).send().await?.error_for_status()?.text().await?;
        let frames: Vec<String> = envelopes(&opening).collect();
        let sid = match frames.first().map(|f| ServerMessage::from_frame(f)) {
            Some(Ok(ServerMessage::Connect(handshake))) => handshake.sid,
            _ => {
                return Err(SessionError::ConnectFailed(
                    "polling session opened without a handshake".into(),
                ))
            }
        };

        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        for frame in frames {
            let _ = inbound_tx.send(Ok(frame));
        }
        let poller = tokio::spawn(poll_loop(
            http.clone(),
            endpoint.to_string(),
            sid.clone(),
            inbound_tx,
        ));

        tracing::info!(endpoint, sid = %sid, "polling session open");
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            sid,
            inbound,
            poller,
            closed: false,
        })
    }

    /// The session id the relay assigned.
    pub fn sid(&self) -> &str {
        &self.sid
    }
}

/// Keep one long-poll outstanding until the relay drops the session, a
/// request fails, or the transport goes away.
async fn poll_loop(
    http: reqwest::Client,
    endpoint: String,
    sid: String,
    inbound: mpsc::UnboundedSender<Inbound>,
) {
    loop {
        let response = match http.get(&endpoint).query(&[("sid", &sid)]).send().await {
            Ok(response) => response,
            Err(e) => {
                let _ = inbound.send(Err(SessionError::TransportReceive(e.to_string())));
                return;
            }
        };
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                tracing::debug!(sid = %sid, "relay ended polling session");
                return;
            }
            status if !status.is_success() => {
                let _ = inbound.send(Err(SessionError::TransportReceive(format!(
                    "poll returned {status}"
                ))));
                return;
            }
            _ => {}
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                let _ = inbound.send(Err(SessionError::TransportReceive(e.to_string())));
                return;
            }
        };
        for frame in envelopes(&body) {
            if inbound.send(Ok(frame)).is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl Transport for PollingTransport {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::TransportClosed);
        }
        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("sid", &self.sid)])
            .header(header::CONTENT_TYPE, "application/json")
            .body(message)
            .send()
            .await
            .map_err(|e| SessionError::TransportSend(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(SessionError::TransportClosed),
            status if !status.is_success() => {
                Err(SessionError::TransportSend(format!("relay answered {status}")))
            }
            _ => Ok(()),
        }
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.poller.abort();
        self.http
            .delete(&self.endpoint)
            .query(&[("sid", &self.sid)])
            .send()
            .await
            .map_err(|e| SessionError::TransportSend(e.to_string()))?;
        Ok(())
    }
}

impl Drop for PollingTransport {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

/// Opens [`PollingTransport`]s against a fixed polling endpoint.
#[derive(Debug, Clone)]
pub struct PollingConnector {
    endpoint: String,
    timeout: Option<Duration>,
}

impl PollingConnector {
    /// Connector for the relay at `server_url`; see [`polling_endpoint`].
    pub fn new(server_url: &str) -> Self {
        Self {
            endpoint: polling_endpoint(server_url),
            timeout: None,
        }
    }

    /// Bound the TCP connect of each request by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Connector for PollingConnector {
    fn name(&self) -> &str {
        "polling"
    }

    async fn connect(&self) -> Result<Box<dyn Transport>, SessionError> {
        let transport = PollingTransport::connect(&self.endpoint, self.timeout).await?;
        Ok(Box::new(transport))
    }
}
