// miniboard-api: the shared WebSocket connection and its envelope codec.
//
// One connection carries traffic for every logical handler. This crate owns
// the socket and speaks in `Envelope`s and `ConnectionEvent`s; routing to
// handlers lives in `miniboard-core`.

pub mod envelope;
pub mod error;
pub mod websocket;

pub use envelope::{Envelope, HANDLER_KEY_FIELD};
pub use error::Error;
pub use websocket::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState, ReconnectPolicy,
    endpoint_url,
};
