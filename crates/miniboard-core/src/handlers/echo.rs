//! `echo` channel: the host sends back whatever `content` it receives.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use miniboard_api::Envelope;

use crate::error::HandlerError;
use crate::handler::Handler;
use crate::model::{Notification, NotificationLevel};
use crate::registry::BoundSender;

pub const ECHO_KEY: &str = "echo";

/// Payload sent on ready when greeting is enabled.
pub const GREETING: &str = "Hello, world!";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct EchoMessage {
    content: Value,
}

pub struct EchoHandler {
    sender: BoundSender,
    greet_on_ready: bool,
    notifications: broadcast::Sender<Notification>,
}

impl EchoHandler {
    pub fn new(
        sender: BoundSender,
        greet_on_ready: bool,
        notifications: broadcast::Sender<Notification>,
    ) -> Self {
        Self {
            sender,
            greet_on_ready,
            notifications,
        }
    }
}

impl Handler for EchoHandler {
    fn on_message(&mut self, envelope: &Envelope) -> Result<(), HandlerError> {
        let EchoMessage { content } = super::decode(envelope)?;
        let text = match content {
            Value::String(s) => s,
            other => other.to_string(),
        };
        tracing::debug!(content = %text, "echo reply");
        let _ = self.notifications.send(Notification::new(
            NotificationLevel::Info,
            ECHO_KEY,
            text,
        ));
        Ok(())
    }

    fn on_ready(&mut self) -> Result<(), HandlerError> {
        if self.greet_on_ready {
            self.sender.send(&EchoMessage {
                content: Value::from(GREETING),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::registry::HandlerRegistry;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[test]
    fn greets_on_ready_only_when_enabled() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let registry = HandlerRegistry::new(out_tx);
        let (notes, _) = broadcast::channel(4);

        let mut quiet = EchoHandler::new(registry.bind(ECHO_KEY), false, notes.clone());
        quiet.on_ready().unwrap();
        assert!(out_rx.try_recv().is_err());

        let mut chatty = EchoHandler::new(registry.bind(ECHO_KEY), true, notes);
        chatty.on_ready().unwrap();
        let env = out_rx.try_recv().unwrap();
        assert_eq!(env.handler_key, "echo");
        assert_eq!(env.get("content"), Some(&json!("Hello, world!")));
    }

    #[test]
    fn reply_becomes_info_notification() {
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let registry = HandlerRegistry::new(out_tx);
        let (notes, mut rx) = broadcast::channel(4);
        let mut handler = EchoHandler::new(registry.bind(ECHO_KEY), false, notes);

        let env = Envelope::tagged(ECHO_KEY, &json!({"content": "Hello, world!"})).unwrap();
        handler.on_message(&env).unwrap();

        let note = rx.try_recv().unwrap();
        assert_eq!(note.level, NotificationLevel::Info);
        assert_eq!(note.message, "Hello, world!");
    }

    #[test]
    fn reply_without_content_is_a_decode_error() {
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let registry = HandlerRegistry::new(out_tx);
        let (notes, _) = broadcast::channel(4);
        let mut handler = EchoHandler::new(registry.bind(ECHO_KEY), false, notes);

        let env = Envelope::tagged(ECHO_KEY, &json!({})).unwrap();
        assert!(matches!(
            handler.on_message(&env),
            Err(HandlerError::Decode(_))
        ));
    }
}
