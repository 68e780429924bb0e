//! Canvas store: the committed label selection with its per-item caches, connection
//! lines, legacy assignment map and the current notice.
//!
//! Readers take an `Arc<CanvasSnapshot>` and never observe a half-applied mutation;
//! every write clones the current snapshot, edits the clone and swaps it in, then
//! announces the new epoch on a watch channel.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use canvas_core::policy::{BindingPolicyInfo, UpdateStrategy};
use canvas_core::{EntityKind, LabelToken, Labels};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

pub mod assign;
pub mod dnd;
mod inventory;
mod notice;

pub use assign::{AssignOutcome, Assignment, AssignmentMap};
pub use dnd::{
    DragController, DragItem, DropOutcome, GestureError, LegacyKind, CANVAS_TARGET, CLUSTER_PANEL, WORKLOAD_PANEL,
};
pub use inventory::{Inventory, InventoryHandle};
pub use notice::{Notice, NoticeKind};

/// Label tokens placed on the canvas, one ordered set per entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CanvasSelection {
    pub clusters: Vec<LabelToken>,
    pub workloads: Vec<LabelToken>,
}

impl CanvasSelection {
    pub fn tokens(&self, kind: EntityKind) -> &[LabelToken] {
        match kind {
            EntityKind::Cluster => &self.clusters,
            EntityKind::Workload => &self.workloads,
        }
    }

    fn tokens_mut(&mut self, kind: EntityKind) -> &mut Vec<LabelToken> {
        match kind {
            EntityKind::Cluster => &mut self.clusters,
            EntityKind::Workload => &mut self.workloads,
        }
    }

    pub fn contains(&self, kind: EntityKind, token: &str) -> bool {
        self.tokens(kind).iter().any(|t| t.as_str() == token)
    }

    pub fn first(&self, kind: EntityKind) -> Option<&LabelToken> { self.tokens(kind).first() }

    pub fn len(&self) -> usize { self.clusters.len() + self.workloads.len() }

    pub fn is_empty(&self) -> bool { self.clusters.is_empty() && self.workloads.is_empty() }
}

/// A drawn line from a workload chip to a cluster chip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub workload: LabelToken,
    pub cluster: LabelToken,
    pub strategy: UpdateStrategy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemLabels {
    pub clusters: BTreeMap<LabelToken, Labels>,
    pub workloads: BTreeMap<LabelToken, Labels>,
}

impl ItemLabels {
    pub fn get(&self, kind: EntityKind, token: &str) -> Option<&Labels> { self.side(kind).get(token) }

    fn side(&self, kind: EntityKind) -> &BTreeMap<LabelToken, Labels> {
        match kind {
            EntityKind::Cluster => &self.clusters,
            EntityKind::Workload => &self.workloads,
        }
    }

    fn side_mut(&mut self, kind: EntityKind) -> &mut BTreeMap<LabelToken, Labels> {
        match kind {
            EntityKind::Cluster => &mut self.clusters,
            EntityKind::Workload => &mut self.workloads,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CanvasSnapshot {
    pub epoch: u64,
    pub selection: CanvasSelection,
    pub item_labels: ItemLabels,
    /// Gesture in progress; never part of the committed selection.
    pub active_drag: Option<DragItem>,
    pub connections: Vec<Connection>,
    pub assignments: AssignmentMap,
    pub notice: Option<Notice>,
}

impl CanvasSnapshot {
    /// Workload/cluster pairs ready for staging: the drawn connections, or the first
    /// token of each kind when nothing is connected.
    pub fn prepared_pairs(&self) -> Vec<Connection> {
        if !self.connections.is_empty() {
            return self.connections.clone();
        }
        match (self.selection.first(EntityKind::Workload), self.selection.first(EntityKind::Cluster)) {
            (Some(w), Some(c)) => {
                vec![Connection { workload: w.clone(), cluster: c.clone(), strategy: UpdateStrategy::default() }]
            }
            _ => Vec::new(),
        }
    }
}

/// Cloneable handle to one canvas. Construct one per session; nothing here is global.
#[derive(Clone)]
pub struct CanvasStore {
    snap: Arc<ArcSwap<CanvasSnapshot>>,
    epoch_tx: Arc<watch::Sender<u64>>,
    epoch_rx: watch::Receiver<u64>,
    writer: Arc<Mutex<()>>,
}

impl Default for CanvasStore {
    fn default() -> Self { Self::new() }
}

impl CanvasStore {
    pub fn new() -> Self {
        let (epoch_tx, epoch_rx) = watch::channel(0u64);
        Self {
            snap: Arc::new(ArcSwap::from_pointee(CanvasSnapshot::default())),
            epoch_tx: Arc::new(epoch_tx),
            epoch_rx,
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn current(&self) -> Arc<CanvasSnapshot> { self.snap.load_full() }

    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_rx.clone() }

    pub fn selection(&self) -> CanvasSelection { self.snap.load().selection.clone() }

    fn update<R>(&self, f: impl FnOnce(&mut CanvasSnapshot) -> R) -> R {
        let _w = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let mut next = CanvasSnapshot::clone(&self.snap.load());
        let out = f(&mut next);
        next.epoch = next.epoch.saturating_add(1);
        let epoch = next.epoch;
        self.snap.store(Arc::new(next));
        let _ = self.epoch_tx.send(epoch);
        out
    }

    /// Set-insert; returns false when the token was already placed.
    pub fn add_to_canvas(&self, kind: EntityKind, token: LabelToken) -> bool {
        self.update(|s| {
            let side = s.selection.tokens_mut(kind);
            if side.contains(&token) {
                return false;
            }
            debug!(%kind, token = %token, "placed on canvas");
            side.push(token);
            true
        })
    }

    /// Removes the token together with its cached labels and any connection touching it.
    pub fn remove_from_canvas(&self, kind: EntityKind, token: &str) -> bool {
        self.update(|s| {
            let side = s.selection.tokens_mut(kind);
            let before = side.len();
            side.retain(|t| t.as_str() != token);
            let removed = side.len() != before;
            s.item_labels.side_mut(kind).remove(token);
            s.connections.retain(|c| match kind {
                EntityKind::Cluster => c.cluster.as_str() != token,
                EntityKind::Workload => c.workload.as_str() != token,
            });
            if removed {
                debug!(%kind, token, "removed from canvas");
            }
            removed
        })
    }

    pub fn clear_canvas(&self) {
        self.update(|s| {
            s.selection = CanvasSelection::default();
            s.item_labels = ItemLabels::default();
            s.connections.clear();
        });
        info!("canvas cleared");
    }

    pub fn set_active_drag_item(&self, item: Option<DragItem>) { self.update(|s| s.active_drag = item); }

    pub fn assign_labels_to_item(&self, kind: EntityKind, token: LabelToken, labels: Labels) {
        self.update(|s| {
            s.item_labels.side_mut(kind).insert(token, labels);
        });
    }

    /// Cached labels of a placed item; empty when none were recorded.
    pub fn item_labels(&self, kind: EntityKind, token: &str) -> Labels {
        self.snap.load().item_labels.get(kind, token).cloned().unwrap_or_default()
    }

    /// Connect two placed chips. Returns false when either end is not on the canvas or
    /// the pair is already connected.
    pub fn connect(&self, workload: &str, cluster: &str, strategy: UpdateStrategy) -> bool {
        self.update(|s| {
            if !s.selection.contains(EntityKind::Workload, workload)
                || !s.selection.contains(EntityKind::Cluster, cluster)
            {
                debug!(workload, cluster, "connect ignored; endpoint not on canvas");
                return false;
            }
            if s.connections.iter().any(|c| c.workload.as_str() == workload && c.cluster.as_str() == cluster) {
                return false;
            }
            s.connections.push(Connection { workload: workload.into(), cluster: cluster.into(), strategy });
            true
        })
    }

    pub fn disconnect(&self, workload: &str, cluster: &str) -> bool {
        self.update(|s| {
            let before = s.connections.len();
            s.connections.retain(|c| !(c.workload.as_str() == workload && c.cluster.as_str() == cluster));
            s.connections.len() != before
        })
    }

    /// Rebuild the assignment map, one entry per listed policy.
    pub fn initialize_assignments(&self, policies: &[BindingPolicyInfo]) {
        let map = assign::build_map(policies);
        debug!(policies = map.len(), "assignment map rebuilt");
        self.update(|s| s.assignments = map);
    }

    /// Record a whole-entity assignment and raise a success notice either way.
    pub fn assign_policy(&self, policy: &str, target_kind: EntityKind, target: &str) -> AssignOutcome {
        let now = Utc::now();
        self.update(|s| {
            let outcome = assign::assign(&mut s.assignments, policy, target_kind, target);
            s.notice = Some(Notice::new(NoticeKind::Success, outcome.message(policy, target_kind, target), now));
            outcome
        })
    }

    pub fn raise_notice(&self, kind: NoticeKind, text: impl Into<String>) {
        self.raise_notice_at(kind, text, Utc::now());
    }

    pub fn raise_notice_at(&self, kind: NoticeKind, text: impl Into<String>, at: DateTime<Utc>) {
        let notice = Notice::new(kind, text, at);
        self.update(|s| s.notice = Some(notice));
    }

    /// Drop the current notice once its lifetime has passed. Returns true if one was dropped.
    pub fn expire_notice(&self, now: DateTime<Utc>) -> bool {
        if !self.snap.load().notice.as_ref().map_or(false, |n| n.is_expired(now)) {
            return false;
        }
        self.update(|s| match &s.notice {
            Some(n) if n.is_expired(now) => {
                s.notice = None;
                true
            }
            _ => false,
        })
    }
}
