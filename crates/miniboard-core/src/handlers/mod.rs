// ── Built-in handlers ──
//
// The logical channels the host multiplexes over the shared connection.
// Each one is a `Handler` plus whatever channels it publishes to consumers.

pub mod echo;
pub mod errors;
pub mod manage;
pub mod usage;

use serde::de::DeserializeOwned;

use miniboard_api::Envelope;

use crate::error::HandlerError;

pub use echo::{ECHO_KEY, EchoHandler, GREETING};
pub use errors::{ERROR_KEY, ErrorHandler};
pub use manage::{
    BoardView, LOAD_ALL, MANAGE_KEY, ManageEvent, ManageHandle, ManageHandler, ManageOptions,
    ManageReply, ManageRequest,
};
pub use usage::{DEFAULT_POLL_INTERVAL, SYSTEM_USAGE_KEY, UsageHandler, UsageRequest};

/// Capacity of the notification broadcast shared by `error` and `echo`.
pub const NOTIFICATION_CHANNEL_SIZE: usize = 64;

/// Decode an envelope into a handler's message type.
fn decode<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, HandlerError> {
    envelope
        .decode()
        .map_err(|e| HandlerError::Decode(e.to_string()))
}
