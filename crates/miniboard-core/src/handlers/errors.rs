//! `error` channel: failures the host reports while serving any handler.

use serde::Deserialize;
use tokio::sync::broadcast;

use miniboard_api::Envelope;

use crate::error::HandlerError;
use crate::handler::Handler;
use crate::model::{Notification, NotificationLevel};

pub const ERROR_KEY: &str = "error";

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    #[serde(default)]
    message: String,
}

/// Turns every `error` frame into an [`NotificationLevel::Error`] notification.
pub struct ErrorHandler {
    notifications: broadcast::Sender<Notification>,
}

impl ErrorHandler {
    pub fn new(notifications: broadcast::Sender<Notification>) -> Self {
        Self { notifications }
    }
}

impl Handler for ErrorHandler {
    fn on_message(&mut self, envelope: &Envelope) -> Result<(), HandlerError> {
        let ErrorMessage { message } = super::decode(envelope)?;
        tracing::warn!(%message, "host reported an error");
        // No subscriber is fine.
        let _ = self.notifications.send(Notification::new(
            NotificationLevel::Error,
            ERROR_KEY,
            message,
        ));
        Ok(())
    }

    fn on_ready(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_frame_becomes_error_notification() {
        let (tx, mut rx) = broadcast::channel(4);
        let mut handler = ErrorHandler::new(tx);

        let env = Envelope::tagged(
            ERROR_KEY,
            &json!({"message": "An error occurred, see logs for details."}),
        )
        .unwrap();
        handler.on_message(&env).unwrap();

        let note = rx.try_recv().unwrap();
        assert_eq!(note.level, NotificationLevel::Error);
        assert_eq!(note.source, "error");
        assert_eq!(note.message, "An error occurred, see logs for details.");
    }

    #[test]
    fn ready_is_silent() {
        let (tx, mut rx) = broadcast::channel(4);
        let mut handler = ErrorHandler::new(tx);
        handler.on_ready().unwrap();
        assert!(rx.try_recv().is_err());
    }
}
