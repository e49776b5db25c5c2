use miniboard_api::Envelope;

use crate::error::HandlerError;

/// A logical subscriber to one slice of traffic on the shared connection.
///
/// Handlers are registered under a unique key with the
/// [`HandlerRegistry`](crate::HandlerRegistry). Both callbacks run
/// synchronously on the session's dispatch task, one at a time; a handler
/// that needs to wait (a poll timer, say) spawns its own task and talks back
/// through its [`BoundSender`](crate::BoundSender).
pub trait Handler: Send {
    /// Called with every inbound envelope whose `handlerKey` names this handler.
    fn on_message(&mut self, envelope: &Envelope) -> Result<(), HandlerError>;

    /// Called once each time the connection (re)opens.
    fn on_ready(&mut self) -> Result<(), HandlerError>;
}
