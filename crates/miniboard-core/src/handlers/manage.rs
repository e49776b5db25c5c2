// ── `manage` channel: instance administration ──
//
// Keeps the instance board in sync with the host and turns operator actions
// into `manage` requests. The handler half lives in the registry and applies
// replies; the cloneable `ManageHandle` half is what consumers hold. Both
// share one state behind a mutex that is only held for synchronous work.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use miniboard_api::Envelope;

use crate::board::{BoundInstance, InstanceBoard, Mode, Reconcile, ReconcileOutcome};
use crate::error::{CoreError, HandlerError};
use crate::handler::Handler;
use crate::model::{Instance, InstanceDraft, LogLine, SaveFile};
use crate::registry::BoundSender;

pub const MANAGE_KEY: &str = "manage";

/// `_id` value that asks `load` for every instance.
pub const LOAD_ALL: &str = "*";

const EVENT_CHANNEL_SIZE: usize = 256;

// ── Wire messages ────────────────────────────────────────────────────

/// Requests the client sends on the `manage` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ManageRequest {
    Load {
        #[serde(rename = "_id")]
        id: String,
    },
    #[serde(rename = "listsaves")]
    ListSaves,
    /// Create (no `_id` in `data`) or update an instance.
    Save { data: InstanceDraft },
    Delete {
        #[serde(rename = "_id")]
        id: String,
    },
    Start {
        #[serde(rename = "_id")]
        id: String,
    },
    Kill {
        #[serde(rename = "_id")]
        id: String,
    },
}

/// Replies and pushes the host sends on the `manage` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ManageReply {
    Load {
        #[serde(default)]
        instances: Vec<Instance>,
    },
    #[serde(rename = "listsaves")]
    ListSaves {
        #[serde(default)]
        saves: Vec<SaveFile>,
    },
    Save {
        #[serde(default)]
        instances: Vec<Instance>,
    },
    Delete {
        #[serde(rename = "_id")]
        id: String,
    },
    Start {
        #[serde(default)]
        instances: Vec<Instance>,
    },
    Kill {
        #[serde(default)]
        instances: Vec<Instance>,
    },
    /// One line of output from the running instance.
    Log {
        #[serde(default)]
        message: String,
    },
}

// ── Published state ──────────────────────────────────────────────────

/// Immutable snapshot of the board, republished after every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoardView {
    pub instances: Vec<BoundInstance>,
    pub saves: Vec<SaveFile>,
    pub start_available: bool,
    /// A full listing has arrived since the connection last became ready.
    pub loaded: bool,
}

impl BoardView {
    pub fn get(&self, id: &str) -> Option<&BoundInstance> {
        self.instances.iter().find(|obj| obj.id() == id)
    }

    /// Look up by id, then by exact name.
    pub fn find(&self, identifier: &str) -> Option<&BoundInstance> {
        self.get(identifier)
            .or_else(|| self.instances.iter().find(|obj| obj.instance.name == identifier))
    }
}

/// What a `manage` reply did, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManageEvent {
    /// Number of saves listed.
    SavesListed(usize),
    Loaded(ReconcileOutcome),
    /// Ids of the instances the host saved.
    Saved(Vec<String>),
    Deleted(String),
    /// The id this acknowledges, if an operator start was pending.
    Started(Option<String>),
    Killed(Option<String>),
    Log(LogLine),
}

/// Tunables for the manage channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManageOptions {
    /// Ports offered for new instances.
    pub game_ports: Vec<u16>,
    /// Instance log lines kept in memory.
    pub log_capacity: usize,
}

impl Default for ManageOptions {
    fn default() -> Self {
        Self {
            game_ports: vec![34197, 34198, 34199],
            log_capacity: 500,
        }
    }
}

// ── Shared state ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Start,
    Kill,
}

#[derive(Debug, Default)]
struct ManageState {
    board: InstanceBoard,
    logs: VecDeque<LogLine>,
    /// Operator start/kill awaiting its acknowledgement.
    pending: Option<(PendingKind, String)>,
    loaded: bool,
}

impl ManageState {
    fn view(&self) -> BoardView {
        BoardView {
            instances: self.board.iter().cloned().collect(),
            saves: self.board.saves().cloned().collect(),
            start_available: self.board.start_available(),
            loaded: self.loaded,
        }
    }

    /// The pending id if `kind` is what is pending; consumes it.
    fn take_pending(&mut self, kind: PendingKind) -> Option<String> {
        match self.pending.take() {
            Some((pending_kind, id)) if pending_kind == kind => Some(id),
            other => {
                self.pending = other;
                None
            }
        }
    }

    fn push_log(&mut self, line: LogLine, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.logs.len() >= capacity {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }
}

struct Shared {
    state: Mutex<ManageState>,
    view: watch::Sender<Arc<BoardView>>,
    events: broadcast::Sender<ManageEvent>,
    sender: BoundSender,
    options: ManageOptions,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ManageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &ManageState) {
        self.view.send_replace(Arc::new(state.view()));
    }

    fn send(&self, request: &ManageRequest) -> Result<(), miniboard_api::Error> {
        self.sender.send(request)
    }
}

// ── ManageHandler ────────────────────────────────────────────────────

/// Registry-side half: applies host replies to the board.
pub struct ManageHandler {
    shared: Arc<Shared>,
}

impl ManageHandler {
    pub fn new(sender: BoundSender, options: ManageOptions) -> Self {
        let state = ManageState::default();
        let (view, _) = watch::channel(Arc::new(state.view()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                view,
                events,
                sender,
                options,
            }),
        }
    }

    /// A consumer handle sharing this handler's state.
    pub fn handle(&self) -> ManageHandle {
        ManageHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn apply(&self, reply: ManageReply) -> ManageEvent {
        let mut state = self.shared.lock();
        let event = match reply {
            ManageReply::ListSaves { saves } => {
                let count = saves.len();
                state.board.set_saves(saves);
                ManageEvent::SavesListed(count)
            }
            ManageReply::Load { instances } => {
                let outcome = state.board.apply(Reconcile::Snapshot(instances));
                state.loaded = true;
                tracing::debug!(
                    created = outcome.created.len(),
                    updated = outcome.updated.len(),
                    suppressed = outcome.suppressed.len(),
                    removed = outcome.removed.len(),
                    "instance listing reconciled"
                );
                ManageEvent::Loaded(outcome)
            }
            ManageReply::Save { instances } => {
                let ids = instances.iter().map(|i| i.id.clone()).collect();
                state.board.apply(Reconcile::Upsert(instances));
                ManageEvent::Saved(ids)
            }
            ManageReply::Delete { id } => {
                if state.board.remove(&id).is_none() {
                    tracing::debug!(instance_id = %id, "delete acknowledged for unknown instance");
                }
                ManageEvent::Deleted(id)
            }
            ManageReply::Start { instances } => {
                let acked = state.take_pending(PendingKind::Start);
                state.board.apply(acknowledgement(acked.clone(), instances));
                ManageEvent::Started(acked)
            }
            ManageReply::Kill { instances } => {
                let acked = state.take_pending(PendingKind::Kill);
                state.board.apply(acknowledgement(acked.clone(), instances));
                ManageEvent::Killed(acked)
            }
            ManageReply::Log { message } => {
                let line = LogLine::new(message);
                if line.is_error {
                    tracing::warn!(line = %line.text, "instance error output");
                }
                state.push_log(line.clone(), self.shared.options.log_capacity);
                ManageEvent::Log(line)
            }
        };
        self.shared.publish(&state);
        event
    }
}

/// A start/kill listing overrides edit mode for the instance the operator
/// acted on. An unsolicited one (the host reporting a crashed instance)
/// may list only that instance, so it never prunes.
fn acknowledgement(acked: Option<String>, instances: Vec<Instance>) -> Reconcile {
    match acked {
        Some(id) => Reconcile::ForcedUpdate { id, instances },
        None => Reconcile::Upsert(instances),
    }
}

impl Handler for ManageHandler {
    fn on_message(&mut self, envelope: &Envelope) -> Result<(), HandlerError> {
        let reply: ManageReply = super::decode(envelope)?;
        let event = self.apply(reply);

        // Instances are listed once the saves they reference are known.
        if matches!(event, ManageEvent::SavesListed(_)) {
            self.shared.send(&ManageRequest::Load {
                id: LOAD_ALL.into(),
            })?;
        }

        let _ = self.shared.events.send(event);
        Ok(())
    }

    fn on_ready(&mut self) -> Result<(), HandlerError> {
        {
            let mut state = self.shared.lock();
            state.board.clear();
            state.pending = None;
            state.loaded = false;
            self.shared.publish(&state);
        }
        self.shared.send(&ManageRequest::ListSaves)?;
        Ok(())
    }
}

// ── ManageHandle ─────────────────────────────────────────────────────

/// Consumer-side half: observes the board and issues operator actions.
///
/// Actions validate against the local board, update it optimistically
/// (busy flag, edit mode), and queue the request. The host's reply arrives
/// later as a [`ManageEvent`].
#[derive(Clone)]
pub struct ManageHandle {
    shared: Arc<Shared>,
}

impl ManageHandle {
    // ── Observation ──────────────────────────────────────────────────

    /// Current board snapshot.
    pub fn view(&self) -> Arc<BoardView> {
        Arc::clone(&self.shared.view.borrow())
    }

    /// Watch board snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Arc<BoardView>> {
        self.shared.view.subscribe()
    }

    /// Subscribe to reply events.
    pub fn events(&self) -> broadcast::Receiver<ManageEvent> {
        self.shared.events.subscribe()
    }

    /// Buffered output of the current instance run, oldest first.
    pub fn logs(&self) -> Vec<LogLine> {
        self.shared.lock().logs.iter().cloned().collect()
    }

    /// Configured game ports not claimed by any known instance.
    pub fn available_ports(&self) -> Vec<u16> {
        self.shared
            .lock()
            .board
            .available_ports(&self.shared.options.game_ports)
    }

    /// Resolve once the first full listing after a ready has been applied.
    pub async fn wait_loaded(&self) -> Result<Arc<BoardView>, CoreError> {
        let mut rx = self.subscribe();
        let view = rx
            .wait_for(|view| view.loaded)
            .await
            .map_err(|_| CoreError::SessionClosed)?;
        Ok(Arc::clone(&view))
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Re-list every instance.
    pub fn refresh(&self) -> Result<(), CoreError> {
        self.shared.send(&ManageRequest::Load {
            id: LOAD_ALL.into(),
        })?;
        Ok(())
    }

    /// Re-list save files (a full instance listing follows).
    pub fn list_saves(&self) -> Result<(), CoreError> {
        self.shared.send(&ManageRequest::ListSaves)?;
        Ok(())
    }

    /// Start an instance. Only offered while nothing else runs.
    pub fn start(&self, id: &str) -> Result<(), CoreError> {
        {
            let mut state = self.shared.lock();
            let obj = actionable(&state.board, id)?;
            if obj.instance.status.is_running() {
                return Err(invalid_state(id, "already running"));
            }
            if !state.board.start_available() {
                return Err(invalid_state(id, "blocked while another instance runs"));
            }
            state.logs.clear();
            state.pending = Some((PendingKind::Start, id.to_owned()));
            state.board.mark_busy(id);
            self.shared.publish(&state);
        }
        tracing::info!(instance_id = id, "starting instance");
        self.shared.send(&ManageRequest::Start { id: id.to_owned() })?;
        Ok(())
    }

    /// Stop a running instance.
    pub fn kill(&self, id: &str) -> Result<(), CoreError> {
        {
            let mut state = self.shared.lock();
            let obj = actionable(&state.board, id)?;
            if !obj.instance.status.is_running() {
                return Err(invalid_state(id, &obj.instance.status.to_string()));
            }
            state.pending = Some((PendingKind::Kill, id.to_owned()));
            state.board.mark_busy(id);
            self.shared.publish(&state);
        }
        tracing::info!(instance_id = id, "killing instance");
        self.shared.send(&ManageRequest::Kill { id: id.to_owned() })?;
        Ok(())
    }

    /// Delete a stopped instance.
    pub fn delete(&self, id: &str) -> Result<(), CoreError> {
        {
            let mut state = self.shared.lock();
            let obj = actionable(&state.board, id)?;
            if obj.instance.status.is_running() {
                return Err(invalid_state(id, "running"));
            }
            state.board.mark_busy(id);
            self.shared.publish(&state);
        }
        self.shared.send(&ManageRequest::Delete { id: id.to_owned() })?;
        Ok(())
    }

    /// Create or update an instance from a draft.
    pub fn save(&self, draft: InstanceDraft) -> Result<(), CoreError> {
        draft.validate()?;
        if let Some(id) = draft.id.as_deref() {
            let mut state = self.shared.lock();
            known(&state.board, id)?;
            state.board.mark_busy(id);
            self.shared.publish(&state);
        }
        self.shared.send(&ManageRequest::Save { data: draft })?;
        Ok(())
    }

    // ── Edit workflow ────────────────────────────────────────────────

    /// Put an instance in edit mode; snapshots stop overwriting it.
    pub fn begin_edit(&self, id: &str) -> Result<InstanceDraft, CoreError> {
        let mut state = self.shared.lock();
        let draft = state.board.begin_edit(id)?;
        self.shared.publish(&state);
        Ok(draft)
    }

    pub fn cancel_edit(&self, id: &str) -> Result<(), CoreError> {
        let mut state = self.shared.lock();
        state.board.cancel_edit(id)?;
        self.shared.publish(&state);
        Ok(())
    }

    /// Leave edit mode and send the changes to the host.
    pub fn submit_edit(&self, id: &str, draft: InstanceDraft) -> Result<(), CoreError> {
        let data = {
            let mut state = self.shared.lock();
            let data = state.board.submit_edit(id, draft)?;
            self.shared.publish(&state);
            data
        };
        self.shared.send(&ManageRequest::Save { data })?;
        Ok(())
    }
}

fn known<'a>(board: &'a InstanceBoard, id: &str) -> Result<&'a BoundInstance, CoreError> {
    board.get(id).ok_or_else(|| CoreError::InstanceNotFound {
        identifier: id.to_owned(),
    })
}

/// Start, kill and delete are only offered on displayed objects.
fn actionable<'a>(board: &'a InstanceBoard, id: &str) -> Result<&'a BoundInstance, CoreError> {
    let obj = known(board, id)?;
    if obj.mode == Mode::Edit {
        return Err(invalid_state(id, "being edited"));
    }
    Ok(obj)
}

fn invalid_state(id: &str, state: &str) -> CoreError {
    CoreError::InvalidState {
        identifier: id.to_owned(),
        state: state.to_owned(),
    }
}
