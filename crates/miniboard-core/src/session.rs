// ── Session: owner of the connection and the handler registry ──
//
// A `Session` is built, populated with handlers, then started. Starting
// spawns the connection task and a single dispatch task that feeds every
// connection event to the registry in order. Nothing here is global: two
// sessions in one process are fully independent.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use miniboard_api::websocket::EVENT_CHANNEL_CAPACITY;
use miniboard_api::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState, Envelope,
};

use crate::handler::Handler;
use crate::handlers::{
    DEFAULT_POLL_INTERVAL, ECHO_KEY, ERROR_KEY, EchoHandler, ErrorHandler, MANAGE_KEY,
    ManageHandle, ManageHandler, ManageOptions, NOTIFICATION_CHANNEL_SIZE, SYSTEM_USAGE_KEY,
    UsageHandler,
};
use crate::model::{Notification, SystemUsage};
use crate::registry::{BoundSender, HandlerRegistry};

// ── SessionConfig ────────────────────────────────────────────────────

/// Everything a session needs to know up front.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connection: ConnectionConfig,
    /// Delay between a usage reply and the next poll.
    pub usage_poll_interval: Duration,
    /// Send the echo greeting on every ready.
    pub echo_on_ready: bool,
    pub log_capacity: usize,
    /// Ports offered for new instances.
    pub game_ports: Vec<u16>,
    /// How long callers should wait for a reply before giving up.
    pub request_timeout: Duration,
}

impl SessionConfig {
    pub fn new(url: Url) -> Self {
        let manage = ManageOptions::default();
        Self {
            connection: ConnectionConfig::new(url),
            usage_poll_interval: DEFAULT_POLL_INTERVAL,
            echo_on_ready: false,
            log_capacity: manage.log_capacity,
            game_ports: manage.game_ports,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Consumer ends of the built-in handlers.
pub struct Handles {
    pub manage: ManageHandle,
    pub usage: watch::Receiver<Option<SystemUsage>>,
    pub notifications: broadcast::Receiver<Notification>,
}

// ── Session ──────────────────────────────────────────────────────────

/// A not-yet-started session. Register handlers, then [`start`](Self::start).
pub struct Session {
    config: SessionConfig,
    registry: HandlerRegistry,
    outbound: mpsc::UnboundedReceiver<Envelope>,
    notifications: broadcast::Sender<Notification>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(NOTIFICATION_CHANNEL_SIZE);
        Self {
            config,
            registry: HandlerRegistry::new(outbound_tx),
            outbound,
            notifications,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Register a handler under `key`. See [`HandlerRegistry::register`].
    pub fn register<H: Handler + 'static>(&mut self, key: &str, handler: H) -> BoundSender {
        self.registry.register(key, handler)
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    /// Subscribe to operator notifications from `error` and `echo`.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Register `manage`, `error`, `echo` and `system-usage`, in that order.
    pub fn install_default_handlers(&mut self) -> Handles {
        let manage = ManageHandler::new(
            self.registry.bind(MANAGE_KEY),
            ManageOptions {
                game_ports: self.config.game_ports.clone(),
                log_capacity: self.config.log_capacity,
            },
        );
        let manage_handle = manage.handle();
        self.registry.register(MANAGE_KEY, manage);

        self.registry
            .register(ERROR_KEY, ErrorHandler::new(self.notifications.clone()));

        let greet = self.config.echo_on_ready;
        let notifications = self.notifications.clone();
        self.registry.register_with(ECHO_KEY, |sender| {
            EchoHandler::new(sender, greet, notifications)
        });

        let (usage_tx, usage) = watch::channel(None);
        let interval = self.config.usage_poll_interval;
        self.registry.register_with(SYSTEM_USAGE_KEY, |sender| {
            UsageHandler::new(sender, interval, usage_tx)
        });

        Handles {
            manage: manage_handle,
            usage,
            notifications: self.notifications.subscribe(),
        }
    }

    /// Spawn the connection and dispatch tasks.
    pub fn start(self) -> RunningSession {
        let cancel = CancellationToken::new();
        let (event_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        tracing::info!(
            url = %self.config.connection.url,
            handlers = self.registry.len(),
            "starting session"
        );

        let connection = ConnectionManager::spawn(
            self.config.connection,
            self.outbound,
            event_tx,
            cancel.child_token(),
        );
        let dispatch = tokio::spawn(dispatch_loop(self.registry, events, cancel.clone()));

        RunningSession {
            connection,
            dispatch,
            cancel,
        }
    }
}

// ── RunningSession ───────────────────────────────────────────────────

/// Handle to a started session.
pub struct RunningSession {
    connection: ConnectionManager,
    dispatch: JoinHandle<()>,
    cancel: CancellationToken,
}

impl RunningSession {
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe_state()
    }

    /// Close the connection and stop dispatching.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for both tasks to finish (after [`shutdown`](Self::shutdown)).
    pub async fn join(self) {
        self.connection.join().await;
        if let Err(e) = self.dispatch.await {
            tracing::warn!(error = %e, "dispatch task ended abnormally");
        }
    }
}

/// Feed connection events to the registry, one at a time.
async fn dispatch_loop(
    mut registry: HandlerRegistry,
    mut events: mpsc::Receiver<ConnectionEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => registry.dispatch(event),
                None => break,
            },
        }
    }
    tracing::debug!("dispatch loop stopped");
}
