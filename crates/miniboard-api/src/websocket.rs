//! The single shared WebSocket connection, with auto-reconnect.
//!
//! Connects to the host's `/websocket` endpoint and turns the socket into an
//! ordered stream of [`ConnectionEvent`]s: `Ready` when a connection opens,
//! `Message` for every parsed inbound frame, `Closed` whenever a connection
//! (or a connection attempt) ends. After every close the loop connects
//! again, forever, until the owning session cancels it.
//!
//! Outbound traffic arrives as already-tagged [`Envelope`]s on an unbounded
//! queue and is written as text frames while the connection is open.
//!
//! # Example
//!
//! ```rust,ignore
//! use miniboard_api::{ConnectionConfig, ConnectionEvent, ConnectionManager, endpoint_url};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ConnectionConfig::new(endpoint_url("localhost", 6666)?);
//! let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
//! let (event_tx, mut event_rx) = mpsc::channel(1024);
//!
//! let manager = ConnectionManager::spawn(config, outbound_rx, event_tx, CancellationToken::new());
//!
//! while let Some(event) = event_rx.recv().await {
//!     match event {
//!         ConnectionEvent::Ready => println!("open"),
//!         ConnectionEvent::Message(env) => println!("{}: {:?}", env.handler_key, env.payload),
//!         ConnectionEvent::Closed => println!("closed, reconnecting"),
//!     }
//! }
//! # drop(outbound_tx);
//! manager.shutdown();
//! ```

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::envelope::Envelope;
use crate::error::Error;

// ── Channel capacity ─────────────────────────────────────────────────

/// Recommended capacity for the event channel handed to [`ConnectionManager::spawn`].
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Path of the multiplexed endpoint on the host.
const ENDPOINT_PATH: &str = "/websocket";

// ── Endpoint ─────────────────────────────────────────────────────────

/// Build `ws://<host>:<port>/websocket`.
///
/// Bare IPv6 literals are bracketed.
pub fn endpoint_url(host: &str, port: u16) -> Result<Url, Error> {
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_owned()
    };
    Ok(Url::parse(&format!("ws://{host}:{port}{ENDPOINT_PATH}"))?)
}

// ── ConnectionState / ConnectionEvent ────────────────────────────────

/// Lifecycle of the shared connection.
///
/// `Connecting → Open → Closed → Connecting → …`; never terminal while the
/// manager runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// What the connection tells its owner. Delivered in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A connection just opened. No payload.
    Ready,
    /// A parsed inbound frame.
    Message(Envelope),
    /// A connection (or connection attempt) ended; a new attempt follows.
    Closed,
}

// ── ReconnectPolicy ──────────────────────────────────────────────────

/// How long to wait before the next connection attempt.
///
/// Both policies retry forever; only the delay differs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Reconnect right away after every close.
    #[default]
    Immediate,
    /// Exponential backoff with jitter, reset after a successful open.
    Backoff {
        initial_delay: Duration,
        max_delay: Duration,
    },
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (0 = first retry after a
    /// connection that had opened).
    ///
    /// `delay = min(initial * 2^attempt, max) * (1 ± 25% jitter)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Immediate => Duration::ZERO,
            Self::Backoff {
                initial_delay,
                max_delay,
            } => {
                let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
                let base = initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
                let capped = base.min(max_delay.as_secs_f64());

                // Deterministic jitter seeded from the attempt number.
                let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
                Duration::from_secs_f64((capped * jitter_factor).max(0.0))
            }
        }
    }
}

// ── ConnectionConfig ─────────────────────────────────────────────────

/// Where to connect and how to come back after a close.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: Url,
    pub reconnect: ReconnectPolicy,
}

impl ConnectionConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            reconnect: ReconnectPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

// ── ConnectionManager ────────────────────────────────────────────────

/// Handle to the background connection task.
///
/// The task is the only owner of the socket. Everyone else talks to it
/// through the outbound queue and the event channel passed to
/// [`spawn`](Self::spawn).
pub struct ConnectionManager {
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Spawn the connect/read/reconnect loop. Returns immediately; the
    /// first `Ready` arrives on `events` once the socket opens.
    pub fn spawn(
        config: ConnectionConfig,
        outbound: mpsc::UnboundedReceiver<Envelope>,
        events: mpsc::Sender<ConnectionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, state) = watch::channel(ConnectionState::Connecting);

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            ws_loop(config, outbound, events, state_tx, task_cancel).await;
        });

        Self {
            state,
            cancel,
            task,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Signal the background task to close the socket and stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for the background task to finish (after [`shutdown`](Self::shutdown)).
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "connection task ended abnormally");
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → run → `Closed` → (delay) → connect again.
async fn ws_loop(
    config: ConnectionConfig,
    mut outbound: mpsc::UnboundedReceiver<Envelope>,
    events: mpsc::Sender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        state.send_replace(ConnectionState::Connecting);

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_run(&config.url, &mut outbound, &events, &state, &cancel) => result,
        };

        state.send_replace(ConnectionState::Closed);

        match result {
            Ok(()) => {
                tracing::info!("WebSocket closed, reconnecting");
                attempt = 0;
            }
            // Never opened: this attempt counts against the backoff.
            Err(e @ Error::WebSocketConnect(_)) => {
                if attempt == 0 {
                    tracing::warn!(error = %e, "WebSocket connect failed");
                } else {
                    tracing::debug!(error = %e, attempt, "WebSocket connect failed");
                }
                attempt = attempt.saturating_add(1);
            }
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket dropped, reconnecting");
                attempt = 0;
            }
        }

        if cancel.is_cancelled() || events.send(ConnectionEvent::Closed).await.is_err() {
            break;
        }

        let delay = config.reconnect.delay_for(attempt.saturating_sub(1));
        if delay.is_zero() {
            // Give other tasks a turn between back-to-back attempts.
            tokio::task::yield_now().await;
        } else {
            tracing::debug!(delay_ms = delay.as_millis(), attempt, "waiting before reconnect");
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    state.send_replace(ConnectionState::Closed);
    tracing::debug!("WebSocket loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Open one connection and pump frames both ways until it ends.
///
/// `Err(WebSocketConnect)` means the socket never opened; every other
/// outcome means it was open at some point.
async fn connect_and_run(
    url: &Url,
    outbound: &mut mpsc::UnboundedReceiver<Envelope>,
    events: &mpsc::Sender<ConnectionEvent>,
    state: &watch::Sender<ConnectionState>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting to WebSocket");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    let (mut write, mut read) = ws_stream.split();

    // Anything queued while no socket was open is failed here, before the
    // handlers hear `Ready` and queue their fresh requests.
    let stale = discard_queued(outbound);
    if stale > 0 {
        tracing::debug!(dropped = stale, "discarded messages queued while disconnected");
    }

    state.send_replace(ConnectionState::Open);
    tracing::info!("WebSocket connected");
    if events.send(ConnectionEvent::Ready).await.is_err() {
        return Ok(());
    }

    let mut outbound_open = true;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return Ok(());
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if let Some(envelope) = parse_frame(&text) {
                            if events.send(ConnectionEvent::Message(envelope)).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite queues the pong itself
                        tracing::trace!("WebSocket ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "WebSocket close frame received"
                            );
                        } else {
                            tracing::info!("WebSocket close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketClosed {
                            code: 1006,
                            reason: e.to_string(),
                        });
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
            queued = outbound.recv(), if outbound_open => {
                match queued {
                    Some(envelope) => {
                        let text = match envelope.to_json() {
                            Ok(text) => text,
                            Err(e) => {
                                tracing::warn!(
                                    handler_key = %envelope.handler_key,
                                    error = %e,
                                    "dropping unserializable outbound envelope"
                                );
                                continue;
                            }
                        };
                        tracing::trace!(handler_key = %envelope.handler_key, "sending frame");
                        write
                            .send(tungstenite::Message::Text(text.into()))
                            .await
                            .map_err(|e| Error::WebSocketClosed {
                                code: 1006,
                                reason: e.to_string(),
                            })?;
                    }
                    None => {
                        tracing::debug!("outbound queue closed, read-only from now on");
                        outbound_open = false;
                    }
                }
            }
        }
    }
}

/// Drop everything currently waiting in the outbound queue.
fn discard_queued(outbound: &mut mpsc::UnboundedReceiver<Envelope>) -> usize {
    let mut dropped = 0;
    while let Ok(envelope) = outbound.try_recv() {
        tracing::trace!(handler_key = %envelope.handler_key, "discarding stale outbound frame");
        dropped += 1;
    }
    dropped
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Parse one text frame. A malformed frame is logged and dropped; the
/// connection carries on.
fn parse_frame(text: &str) -> Option<Envelope> {
    match Envelope::parse(text) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed frame");
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_immediate() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy, ReconnectPolicy::Immediate);
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(50), Duration::ZERO);
    }

    #[test]
    fn backoff_increases_exponentially() {
        let policy = ReconnectPolicy::Backoff {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        };

        let d0 = policy.delay_for(0);
        let d1 = policy.delay_for(1);
        let d2 = policy.delay_for(2);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let policy = ReconnectPolicy::Backoff {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };

        // With jitter up to 1.25, the effective ceiling is 12.5s
        let d10 = policy.delay_for(10);
        assert!(d10 <= Duration::from_secs(13), "delay {d10:?} not capped");
        assert!(policy.delay_for(u32::MAX) <= Duration::from_secs(13));
    }

    #[test]
    fn endpoint_url_uses_websocket_path() {
        let url = endpoint_url("192.168.1.20", 6666).unwrap();
        assert_eq!(url.as_str(), "ws://192.168.1.20:6666/websocket");
    }

    #[test]
    fn endpoint_url_brackets_ipv6() {
        let url = endpoint_url("::1", 8080).unwrap();
        assert_eq!(url.as_str(), "ws://[::1]:8080/websocket");
    }

    #[test]
    fn endpoint_url_rejects_garbage_host() {
        assert!(endpoint_url("bad host", 1).is_err());
    }

    #[test]
    fn parse_frame_drops_malformed() {
        assert!(parse_frame("{").is_none());
        assert!(parse_frame(r#"{"action":"load"}"#).is_none());
        let env = parse_frame(r#"{"handlerKey":"echo","content":"hi"}"#).unwrap();
        assert_eq!(env.handler_key, "echo");
    }

    #[test]
    fn discard_queued_empties_the_queue() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for key in ["a", "b", "c"] {
            tx.send(Envelope::tagged(key, &serde_json::json!({})).unwrap())
                .unwrap();
        }
        assert_eq!(discard_queued(&mut rx), 3);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_keeps_reporting_closed() {
        // Bind and release a port so nothing is listening on it; every
        // attempt fails fast and must surface as `Closed`.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = ConnectionConfig::new(endpoint_url("127.0.0.1", port).unwrap());
        let (_out_tx, out_rx) = mpsc::unbounded_channel();
        let (ev_tx, mut ev_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let manager = ConnectionManager::spawn(config, out_rx, ev_tx, cancel.clone());

        for _ in 0..3 {
            let event = ev_rx.recv().await.unwrap();
            assert_eq!(event, ConnectionEvent::Closed);
        }
        assert_ne!(manager.state(), ConnectionState::Open);

        manager.shutdown();
        manager.join().await;
    }
}
