//! `system-usage` channel: polls host CPU / memory load.
//!
//! The handler asks once on every ready, then asks again a fixed interval
//! after each reply. The timer is a spawned sleep whose [`AbortHandle`] the
//! handler keeps; at most one is pending at any time.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use miniboard_api::Envelope;

use crate::error::HandlerError;
use crate::handler::Handler;
use crate::model::SystemUsage;
use crate::registry::BoundSender;

pub const SYSTEM_USAGE_KEY: &str = "system-usage";

/// Delay between a usage reply and the next request.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Outbound poll. Only the summary form is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageRequest {
    pub detailed: bool,
}

pub struct UsageHandler {
    sender: BoundSender,
    interval: Duration,
    usage: watch::Sender<Option<SystemUsage>>,
    pending: Option<AbortHandle>,
}

impl UsageHandler {
    /// `usage` receives every reply; subscribe to it before registering.
    pub fn new(
        sender: BoundSender,
        interval: Duration,
        usage: watch::Sender<Option<SystemUsage>>,
    ) -> Self {
        Self {
            sender,
            interval,
            usage,
            pending: None,
        }
    }

    /// A poll is scheduled and has not fired yet.
    pub fn has_pending_poll(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    fn schedule_next(&mut self) {
        self.cancel_pending();

        let sender = self.sender.clone();
        let interval = self.interval;
        let task = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            if let Err(e) = sender.send(&UsageRequest::default()) {
                tracing::debug!(error = %e, "usage poll not sent");
            }
        });
        self.pending = Some(task.abort_handle());
    }
}

impl Handler for UsageHandler {
    fn on_message(&mut self, envelope: &Envelope) -> Result<(), HandlerError> {
        let usage: SystemUsage = super::decode(envelope)?;
        tracing::trace!(cpu = usage.cpu, mem = usage.mem, "system usage");
        self.usage.send_replace(Some(usage));
        self.schedule_next();
        Ok(())
    }

    fn on_ready(&mut self) -> Result<(), HandlerError> {
        self.cancel_pending();
        self.sender.send(&UsageRequest::default())?;
        Ok(())
    }
}

impl Drop for UsageHandler {
    fn drop(&mut self) {
        self.cancel_pending();
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

    struct Rig {
        handler: UsageHandler,
        outbound: mpsc::UnboundedReceiver<Envelope>,
        usage: watch::Receiver<Option<SystemUsage>>,
    }

    fn rig() -> Rig {
        let (out_tx, outbound) = mpsc::unbounded_channel();
        let registry = HandlerRegistry::new(out_tx);
        let (usage_tx, usage) = watch::channel(None);
        Rig {
            handler: UsageHandler::new(
                registry.bind(SYSTEM_USAGE_KEY),
                DEFAULT_POLL_INTERVAL,
                usage_tx,
            ),
            outbound,
            usage,
        }
    }

    fn reply(cpu: f64, mem: f64) -> Envelope {
        Envelope::tagged(SYSTEM_USAGE_KEY, &json!({"CPU": cpu, "MEM": mem})).unwrap()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> usize {
        let mut n = 0;
        while let Ok(env) = rx.try_recv() {
            assert_eq!(env.handler_key, SYSTEM_USAGE_KEY);
            assert_eq!(env.get("detailed"), Some(&json!(false)));
            n += 1;
        }
        n
    }

    #[tokio::test(start_paused = true)]
    async fn ready_asks_immediately() {
        let mut r = rig();
        r.handler.on_ready().unwrap();
        assert_eq!(drain(&mut r.outbound), 1);
        assert!(!r.handler.has_pending_poll());
    }

    #[tokio::test(start_paused = true)]
    async fn reply_is_published_and_next_poll_follows_the_interval() {
        let mut r = rig();
        r.handler.on_message(&reply(12.5, 40.0)).unwrap();

        let usage = (*r.usage.borrow()).unwrap();
        assert!((usage.cpu - 12.5).abs() < f64::EPSILON);
        assert!(r.handler.has_pending_poll());

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(drain(&mut r.outbound), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(drain(&mut r.outbound), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_cancels_the_pending_poll() {
        let mut r = rig();
        r.handler.on_message(&reply(1.0, 2.0)).unwrap();
        r.handler.on_ready().unwrap();
        assert_eq!(drain(&mut r.outbound), 1);

        // The timer scheduled before the reconnect never fires.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(drain(&mut r.outbound), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_replies_keep_a_single_timer() {
        let mut r = rig();
        r.handler.on_message(&reply(1.0, 2.0)).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        r.handler.on_message(&reply(3.0, 4.0)).unwrap();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(drain(&mut r.outbound), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handler_stops_polling() {
        let mut r = rig();
        r.handler.on_message(&reply(1.0, 2.0)).unwrap();
        drop(r.handler);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(drain(&mut r.outbound), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_reply_schedules_nothing() {
        let mut r = rig();
        let env = Envelope::tagged(SYSTEM_USAGE_KEY, &json!({"CPU": "high"})).unwrap();
        assert!(r.handler.on_message(&env).is_err());
        assert!(!r.handler.has_pending_poll());
        assert!(r.usage.borrow().is_none());
    }
}
