// ── Handler registry and message router ──
//
// Maps handler keys to handlers in registration order, hands out senders
// bound to a key, and turns connection events into handler callbacks.
// A failing or panicking handler is logged and skipped; it never stops
// dispatch to the others.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::mpsc;

use miniboard_api::{ConnectionEvent, Envelope};

use crate::error::HandlerError;
use crate::handler::Handler;

// ── BoundSender ──────────────────────────────────────────────────────

/// Send function bound to one handler key.
///
/// Every payload is tagged with the key before it is queued for the
/// connection. If no connection is open the message still goes on the
/// queue; the connection layer decides its fate. Nothing is retried.
#[derive(Debug, Clone)]
pub struct BoundSender {
    key: Arc<str>,
    outbound: mpsc::UnboundedSender<Envelope>,
}

impl BoundSender {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Tag `payload` with this sender's key and queue it.
    ///
    /// `payload` must serialize to a JSON object.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), miniboard_api::Error> {
        let envelope = Envelope::tagged(&self.key, payload)?;
        self.outbound
            .send(envelope)
            .map_err(|_| miniboard_api::Error::ConnectionGone)
    }
}

// ── Routing outcome ──────────────────────────────────────────────────

/// What happened to one inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered,
    UnknownKey,
    HandlerFailed,
}

// ── HandlerRegistry ──────────────────────────────────────────────────

/// Key → handler association, owned by the session.
pub struct HandlerRegistry {
    handlers: IndexMap<String, Box<dyn Handler>>,
    outbound: mpsc::UnboundedSender<Envelope>,
}

impl HandlerRegistry {
    /// An empty registry whose senders feed `outbound`.
    pub fn new(outbound: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            handlers: IndexMap::new(),
            outbound,
        }
    }

    /// A sender tagged with `key`, whether or not a handler is registered
    /// under it yet.
    pub fn bind(&self, key: &str) -> BoundSender {
        BoundSender {
            key: Arc::from(key),
            outbound: self.outbound.clone(),
        }
    }

    /// Register `handler` under `key` and return the sender bound to it.
    ///
    /// Registering an existing key replaces the handler in place; it keeps
    /// the original position in the ready order.
    pub fn register<H: Handler + 'static>(&mut self, key: &str, handler: H) -> BoundSender {
        if self.handlers.insert(key.to_owned(), Box::new(handler)).is_some() {
            tracing::debug!(handler_key = key, "replaced existing handler registration");
        } else {
            tracing::debug!(handler_key = key, "registered handler");
        }
        self.bind(key)
    }

    /// Like [`register`](Self::register), for handlers that keep their own
    /// sender: `build` receives the bound sender and returns the handler.
    pub fn register_with<H, F>(&mut self, key: &str, build: F) -> BoundSender
    where
        H: Handler + 'static,
        F: FnOnce(BoundSender) -> H,
    {
        let sender = self.bind(key);
        self.register(key, build(sender.clone()));
        sender
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Apply one connection event.
    pub fn dispatch(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Ready => {
                let failed = self.notify_ready();
                tracing::info!(
                    handlers = self.handlers.len(),
                    failed,
                    "connection ready, handlers notified"
                );
            }
            ConnectionEvent::Message(envelope) => {
                self.route(&envelope);
            }
            ConnectionEvent::Closed => {
                tracing::debug!("connection closed, waiting for the next ready");
            }
        }
    }

    /// Call `on_ready` once on every handler, in registration order.
    /// Returns how many failed.
    pub fn notify_ready(&mut self) -> usize {
        let mut failed = 0;
        for (key, handler) in &mut self.handlers {
            if !guarded(key, "on_ready", || handler.on_ready()) {
                failed += 1;
            }
        }
        failed
    }

    /// Deliver `envelope` to the handler its key names, and only that one.
    pub fn route(&mut self, envelope: &Envelope) -> RouteOutcome {
        let Some(handler) = self.handlers.get_mut(&envelope.handler_key) else {
            tracing::warn!(
                handler_key = %envelope.handler_key,
                "dropping frame for unknown handler"
            );
            return RouteOutcome::UnknownKey;
        };

        tracing::debug!(
            handler_key = %envelope.handler_key,
            action = envelope.action().unwrap_or("-"),
            "routing frame"
        );

        if guarded(&envelope.handler_key, "on_message", || {
            handler.on_message(envelope)
        }) {
            RouteOutcome::Delivered
        } else {
            RouteOutcome::HandlerFailed
        }
    }
}

/// Run one handler callback, containing both error returns and panics.
fn guarded(key: &str, phase: &'static str, call: impl FnOnce() -> Result<(), HandlerError>) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(handler_key = key, phase, error = %e, "handler failed");
            false
        }
        Err(payload) => {
            tracing::error!(
                handler_key = key,
                phase,
                panic = panic_message(payload.as_ref()),
                "handler panicked"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
