// miniboard-core: handler registry, message routing, and instance reconciliation.
//
// Sits between the shared connection (`miniboard-api`) and consumers such as
// the CLI. A `Session` owns the `HandlerRegistry` and the connection task;
// the built-in handlers publish their state through watch / broadcast
// channels; `InstanceBoard` merges authoritative instance snapshots into
// locally held objects.

pub mod board;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod model;
pub mod registry;
pub mod session;

// ── Primary re-exports ──────────────────────────────────────────────
pub use board::{BoundInstance, InstanceBoard, Mode, Reconcile, ReconcileOutcome};
pub use error::{CoreError, HandlerError};
pub use handler::Handler;
pub use handlers::{BoardView, ManageEvent, ManageHandle};
pub use registry::{BoundSender, HandlerRegistry, RouteOutcome};
pub use session::{Handles, RunningSession, Session, SessionConfig};

// ── Model re-exports ────────────────────────────────────────────────
pub use model::{
    Instance, InstanceDraft, InstanceStatus, LogLine, Notification, NotificationLevel, SaveFile,
    SystemUsage,
};

// ── Transport re-exports ────────────────────────────────────────────
pub use miniboard_api::{
    ConnectionConfig, ConnectionEvent, ConnectionState, Envelope, ReconnectPolicy, endpoint_url,
};
