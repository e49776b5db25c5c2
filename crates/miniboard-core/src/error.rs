// ── Core error types ──
//
// User-facing errors from miniboard-core. Consumers never see raw socket or
// JSON failures directly; the `From<miniboard_api::Error>` impl translates
// transport-layer errors into domain-appropriate variants. `HandlerError` is
// what a single handler reports back to the registry, which logs it and
// keeps dispatching.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to host at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Session is no longer running")]
    SessionClosed,

    #[error("No reply from host after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Instance not found: {identifier}")]
    InstanceNotFound { identifier: String },

    #[error("Instance {identifier} is {state}")]
    InvalidState { identifier: String, state: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation rejected by host: {message}")]
    Rejected { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<miniboard_api::Error> for CoreError {
    fn from(err: miniboard_api::Error) -> Self {
        match err {
            miniboard_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            miniboard_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            miniboard_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            miniboard_api::Error::ConnectionGone => CoreError::SessionClosed,
            miniboard_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            miniboard_api::Error::InvalidPayload(message) => {
                CoreError::Internal(format!("Invalid payload: {message}"))
            }
        }
    }
}

// ── Handler errors ───────────────────────────────────────────────────

/// Failure inside one handler's `on_message` / `on_ready`.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The envelope did not match the handler's message shape.
    #[error("cannot decode message: {0}")]
    Decode(String),

    /// The bound sender could not queue a reply.
    #[error("cannot send: {0}")]
    Send(#[from] miniboard_api::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_gone_means_session_closed() {
        let err: CoreError = miniboard_api::Error::ConnectionGone.into();
        assert!(matches!(err, CoreError::SessionClosed));
    }

    #[test]
    fn connect_failure_keeps_reason() {
        let err: CoreError = miniboard_api::Error::WebSocketConnect("refused".into()).into();
        assert!(err.to_string().contains("refused"));
    }
}
