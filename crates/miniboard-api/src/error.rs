use thiserror::Error;

/// Top-level error type for the `miniboard-api` crate.
///
/// Covers every failure mode of the shared connection: establishing the
/// socket, decoding inbound frames, and queueing outbound envelopes.
/// `miniboard-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Endpoint ────────────────────────────────────────────────────
    /// The endpoint URL could not be built or parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The connection task is gone; nothing will ever drain the queue.
    #[error("Connection manager is no longer running")]
    ConnectionGone,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw frame for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// An outbound payload was not a JSON object and cannot carry a key.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl Error {
    /// Returns `true` if reconnecting might resolve this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. }
        )
    }

    /// Returns `true` if this error came from a single bad frame.
    pub fn is_frame_error(&self) -> bool {
        matches!(self, Self::Deserialization { .. })
    }
}
