//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use miniboard_config::ConfigError;
use miniboard_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not talk to the host at {url}")]
    #[diagnostic(
        code(miniboard::connection_failed),
        help(
            "Check that the admin server is running and reachable.\n\
             Try: miniboard --host <host> --port <port> instances list"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(miniboard::not_found),
        help("Run: miniboard {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Instance '{identifier}' is {state}")]
    #[diagnostic(
        code(miniboard::invalid_state),
        help("Run: miniboard instances list to see what is running")
    )]
    InvalidState { identifier: String, state: String },

    // ── Host ─────────────────────────────────────────────────────────
    #[error("Host reported an error: {message}")]
    #[diagnostic(code(miniboard::rejected), help("See the host's log for details."))]
    Rejected { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(miniboard::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(miniboard::config),
        help("Inspect the effective settings with: miniboard config show")
    )]
    Config(#[from] ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(miniboard::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("No reply from {url} after {seconds}s")]
    #[diagnostic(
        code(miniboard::timeout),
        help(
            "The host may be down or unreachable; the client keeps reconnecting.\n\
             Check --host / --port, or increase --timeout."
        )
    )]
    Timeout { url: String, seconds: u64 },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Cannot serialize output: {0}")]
    #[diagnostic(code(miniboard::serialize))]
    Serialize(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::InvalidState { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } | Self::Config(_) => {
                exit_code::USAGE
            }
            Self::Rejected { .. } | Self::Io(_) | Self::Serialize(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },

            CoreError::SessionClosed => CliError::ConnectionFailed {
                url: "(closed)".into(),
                source: "the session stopped before the host answered".into(),
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                url: "the host".into(),
                seconds: timeout_secs,
            },

            CoreError::InstanceNotFound { identifier } => CliError::NotFound {
                resource_type: "instance".into(),
                identifier,
                list_command: "instances list".into(),
            },

            CoreError::InvalidState { identifier, state } => {
                CliError::InvalidState { identifier, state }
            }

            CoreError::Rejected { message } => CliError::Rejected { message },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Rejected { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_keep_their_exit_codes() {
        let not_found: CliError = CoreError::InstanceNotFound {
            identifier: "x".into(),
        }
        .into();
        assert_eq!(not_found.exit_code(), exit_code::NOT_FOUND);

        let busy: CliError = CoreError::InvalidState {
            identifier: "x".into(),
            state: "running".into(),
        }
        .into();
        assert_eq!(busy.exit_code(), exit_code::CONFLICT);

        let gone: CliError = CoreError::SessionClosed.into();
        assert_eq!(gone.exit_code(), exit_code::CONNECTION);
    }
}
