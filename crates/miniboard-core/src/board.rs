// ── Instance board: snapshot reconciliation ──
//
// Holds one UI-bound object per known instance and merges incoming
// snapshots into it with the smallest set of changes. Objects in edit mode
// are protected from server-pushed overwrites unless the update is the
// acknowledgement of the operator's own action on that instance.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::CoreError;
use crate::model::{Instance, InstanceDraft, SaveFile};

// ── Bound objects ────────────────────────────────────────────────────

/// Whether reconciliation may overwrite an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Display,
    Edit,
}

/// One instance as presented to the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundInstance {
    pub instance: Instance,
    /// The save file `instance.save` names, if the host listed it.
    pub save: Option<SaveFile>,
    pub mode: Mode,
    /// Whether the cluster-wide start action is offered on this object.
    pub start_available: bool,
    /// A request for this instance is in flight.
    pub busy: bool,
    /// Bumped every time the object is re-rendered with new data.
    pub revision: u64,
}

impl BoundInstance {
    pub fn id(&self) -> &str {
        &self.instance.id
    }

    /// Objects being edited never count as running.
    pub fn counts_as_running(&self) -> bool {
        self.mode == Mode::Display && self.instance.status.is_running()
    }
}

// ── Requests / outcome ───────────────────────────────────────────────

/// A reconciliation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconcile {
    /// Full authoritative listing; ids not in it are removed.
    Snapshot(Vec<Instance>),
    /// Partial listing (e.g. the reply to a `save`); nothing is removed.
    Upsert(Vec<Instance>),
    /// Full listing that acknowledges the operator's own action on `id`:
    /// that object is overwritten even while it is being edited.
    ForcedUpdate { id: String, instances: Vec<Instance> },
}

/// Which ids each step touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    pub suppressed: Vec<String>,
    pub removed: Vec<String>,
}

impl ReconcileOutcome {
    /// Nothing was created, updated or removed.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

// ── InstanceBoard ────────────────────────────────────────────────────

/// Local collection of bound instances, in first-sighting order.
#[derive(Debug)]
pub struct InstanceBoard {
    objects: IndexMap<String, BoundInstance>,
    saves: IndexMap<String, SaveFile>,
    start_available: bool,
}

impl Default for InstanceBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceBoard {
    pub fn new() -> Self {
        Self {
            objects: IndexMap::new(),
            saves: IndexMap::new(),
            start_available: true,
        }
    }

    /// Merge a snapshot into the board.
    pub fn apply(&mut self, request: Reconcile) -> ReconcileOutcome {
        let (instances, forced, prune) = match request {
            Reconcile::Snapshot(instances) => (instances, None, true),
            Reconcile::Upsert(instances) => (instances, None, false),
            Reconcile::ForcedUpdate { id, instances } => (instances, Some(id), true),
        };

        let mut outcome = ReconcileOutcome::default();
        let incoming: HashSet<String> = instances.iter().map(|i| i.id.clone()).collect();

        for instance in instances {
            let id = instance.id.clone();
            let save = self.resolve_save(&instance);

            if !self.objects.contains_key(&id) {
                self.objects.insert(
                    id.clone(),
                    BoundInstance {
                        instance,
                        save,
                        mode: Mode::Display,
                        start_available: false,
                        busy: false,
                        revision: 0,
                    },
                );
                outcome.created.push(id);
                continue;
            }

            let existing = &mut self.objects[&id];

            let overwrite = existing.mode == Mode::Display || forced.as_deref() == Some(id.as_str());
            if !overwrite {
                outcome.suppressed.push(id);
                continue;
            }

            existing.busy = false;
            if existing.instance == instance && existing.save == save {
                outcome.unchanged.push(id);
                continue;
            }

            existing.instance = instance;
            existing.save = save;
            existing.revision += 1;
            outcome.updated.push(id);
        }

        if prune {
            let stale: Vec<String> = self
                .objects
                .keys()
                .filter(|id| !incoming.contains(*id))
                .cloned()
                .collect();
            for id in stale {
                self.objects.shift_remove(&id);
                outcome.removed.push(id);
            }
        }

        self.recompute_start_available();
        outcome
    }

    /// Remove one object. Absent ids are a no-op.
    pub fn remove(&mut self, id: &str) -> Option<BoundInstance> {
        self.objects.shift_remove(id)
    }

    /// Drop every object (the saves index is kept).
    pub fn clear(&mut self) {
        self.objects.clear();
        self.start_available = true;
    }

    pub fn get(&self, id: &str) -> Option<&BoundInstance> {
        self.objects.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundInstance> {
        self.objects.values()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Cluster-wide start flag as of the last snapshot.
    pub fn start_available(&self) -> bool {
        self.start_available
    }

    // ── Saves ────────────────────────────────────────────────────────

    /// Replace the saves index; existing objects are re-resolved.
    pub fn set_saves(&mut self, saves: Vec<SaveFile>) {
        self.saves = saves.into_iter().map(|s| (s.name.clone(), s)).collect();
        let resolved: Vec<(String, Option<SaveFile>)> = self
            .objects
            .values()
            .map(|obj| (obj.instance.id.clone(), self.resolve_save(&obj.instance)))
            .collect();
        for (id, save) in resolved {
            if let Some(obj) = self.objects.get_mut(&id) {
                obj.save = save;
            }
        }
    }

    pub fn saves(&self) -> impl Iterator<Item = &SaveFile> {
        self.saves.values()
    }

    fn resolve_save(&self, instance: &Instance) -> Option<SaveFile> {
        instance
            .save
            .as_deref()
            .and_then(|name| self.saves.get(name))
            .cloned()
    }

    // ── Edit workflow ────────────────────────────────────────────────

    /// Switch an object to edit mode and return a draft of its data.
    pub fn begin_edit(&mut self, id: &str) -> Result<InstanceDraft, CoreError> {
        let obj = self.get_mut_or_err(id)?;
        if obj.instance.status.is_running() {
            return Err(CoreError::InvalidState {
                identifier: id.into(),
                state: "running".into(),
            });
        }
        obj.mode = Mode::Edit;
        Ok(InstanceDraft::from_instance(&obj.instance))
    }

    /// Leave edit mode without changes.
    pub fn cancel_edit(&mut self, id: &str) -> Result<(), CoreError> {
        let start_available = self.start_available;
        let obj = self.get_mut_or_err(id)?;
        obj.mode = Mode::Display;
        obj.start_available = start_available;
        Ok(())
    }

    /// Leave edit mode with the operator's changes applied locally.
    /// Returns the draft to send to the host, keyed to `id`.
    pub fn submit_edit(&mut self, id: &str, draft: InstanceDraft) -> Result<InstanceDraft, CoreError> {
        draft.validate()?;
        let start_available = self.start_available;
        let save = draft
            .save
            .as_deref()
            .and_then(|name| self.saves.get(name))
            .cloned();
        let obj = self.get_mut_or_err(id)?;
        if obj.mode != Mode::Edit {
            return Err(CoreError::InvalidState {
                identifier: id.into(),
                state: "not being edited".into(),
            });
        }

        obj.instance.name.clone_from(&draft.name);
        obj.instance.port.clone_from(&draft.port);
        obj.instance.save.clone_from(&draft.save);
        obj.mode = Mode::Display;
        obj.start_available = start_available;
        obj.save = save;
        obj.busy = true;
        obj.revision += 1;

        Ok(InstanceDraft {
            id: Some(id.to_owned()),
            ..draft
        })
    }

    /// Flag an object as waiting for a reply. Returns `false` if unknown.
    pub fn mark_busy(&mut self, id: &str) -> bool {
        if let Some(obj) = self.objects.get_mut(id) {
            obj.busy = true;
            return true;
        }
        false
    }

    // ── Ports ────────────────────────────────────────────────────────

    /// Ports claimed by known instances.
    pub fn used_ports(&self) -> Vec<String> {
        self.objects
            .values()
            .filter_map(|obj| obj.instance.port.clone())
            .collect()
    }

    /// `all` minus the ports in use, order preserved.
    pub fn available_ports(&self, all: &[u16]) -> Vec<u16> {
        let used: HashSet<String> = self.used_ports().into_iter().collect();
        all.iter()
            .copied()
            .filter(|port| !used.contains(&port.to_string()))
            .collect()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn get_mut_or_err(&mut self, id: &str) -> Result<&mut BoundInstance, CoreError> {
        self.objects
            .get_mut(id)
            .ok_or_else(|| CoreError::InstanceNotFound {
                identifier: id.into(),
            })
    }

    /// At most one instance may run at a time: start is offered only while
    /// no display-mode object is running.
    fn recompute_start_available(&mut self) {
        let available = !self.objects.values().any(BoundInstance::counts_as_running);
        self.start_available = available;
        for obj in self.objects.values_mut().filter(|o| o.mode == Mode::Display) {
            obj.start_available = available;
        }
    }
}
