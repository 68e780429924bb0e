//! Drag-and-drop controller.
//!
//! One gesture at a time: `drag_start` classifies the dragged identifier into a
//! [`DragItem`], `drag_end` interprets the drop and mutates the canvas. Nothing is
//! remembered between gestures.

use canvas_core::{EntityKind, LabelPair, LabelToken};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::{AssignOutcome, CanvasStore, InventoryHandle};

pub const CLUSTER_PANEL: &str = "cluster-panel";
pub const WORKLOAD_PANEL: &str = "workload-panel";
pub const CANVAS_TARGET: &str = "canvas";

static LEGACY_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(policy|cluster|workload)-(.+)$").unwrap());

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GestureError {
    #[error("unknown source panel `{panel}` for label `{id}`")]
    UnknownPanel { id: String, panel: String },
    #[error("malformed drag id `{0}`")]
    MalformedId(String),
}

/// Entity kinds of the whole-entity panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LegacyKind {
    Policy,
    Cluster,
    Workload,
}

impl LegacyKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "policy" => Some(LegacyKind::Policy),
            "cluster" => Some(LegacyKind::Cluster),
            "workload" => Some(LegacyKind::Workload),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LegacyKind::Policy => "policy",
            LegacyKind::Cluster => "cluster",
            LegacyKind::Workload => "workload",
        }
    }

    fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            LegacyKind::Policy => None,
            LegacyKind::Cluster => Some(EntityKind::Cluster),
            LegacyKind::Workload => Some(EntityKind::Workload),
        }
    }
}

/// What is being dragged. The string id only exists at the UI boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum DragItem {
    /// A label chip; its kind is the panel it left, never guessed from the token.
    Label { kind: EntityKind, token: LabelToken },
    Entity { kind: LegacyKind, name: String },
}

impl DragItem {
    pub fn classify(id: &str, source_panel: &str) -> Result<Self, GestureError> {
        let token = LabelToken::new(id);
        if token.is_label() {
            let kind = match source_panel {
                CLUSTER_PANEL => EntityKind::Cluster,
                WORKLOAD_PANEL => EntityKind::Workload,
                other => return Err(GestureError::UnknownPanel { id: id.to_string(), panel: other.to_string() }),
            };
            return Ok(DragItem::Label { kind, token });
        }
        parse_legacy(id).ok_or_else(|| GestureError::MalformedId(id.to_string()))
    }

    /// String payload as handed to the UI framework.
    pub fn id(&self) -> String {
        match self {
            DragItem::Label { token, .. } => token.to_string(),
            DragItem::Entity { kind, name } => format!("{}-{}", kind.as_str(), name),
        }
    }
}

fn parse_legacy(id: &str) -> Option<DragItem> {
    let caps = LEGACY_ID.captures(id)?;
    let kind = LegacyKind::parse(&caps[1])?;
    Some(DragItem::Entity { kind, name: caps[2].to_string() })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DropOutcome {
    Added { kind: EntityKind, label: LabelPair, matches: usize },
    AlreadyPresent { kind: EntityKind, label: LabelPair },
    /// Label no longer matches anything in the inventory.
    NoMatches { kind: EntityKind, label: LabelPair },
    Unparseable { token: LabelToken },
    Assigned { policy: String, target_kind: EntityKind, target: String },
    AlreadyAssigned { policy: String, target_kind: EntityKind, target: String },
    /// Dropped somewhere that does not accept this item.
    NotAccepted,
    Cancelled,
    NoGesture,
}

impl DropOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropOutcome::Added { .. } => "added",
            DropOutcome::AlreadyPresent { .. } => "already_present",
            DropOutcome::NoMatches { .. } => "no_matches",
            DropOutcome::Unparseable { .. } => "unparseable",
            DropOutcome::Assigned { .. } => "assigned",
            DropOutcome::AlreadyAssigned { .. } => "already_assigned",
            DropOutcome::NotAccepted => "not_accepted",
            DropOutcome::Cancelled => "cancelled",
            DropOutcome::NoGesture => "no_gesture",
        }
    }

    /// Whether the drop changed the committed canvas or assignment state.
    pub fn mutated(&self) -> bool { matches!(self, DropOutcome::Added { .. } | DropOutcome::Assigned { .. }) }
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Dragging(DragItem),
}

pub struct DragController {
    store: CanvasStore,
    inventory: InventoryHandle,
    state: State,
}

impl DragController {
    pub fn new(store: CanvasStore, inventory: InventoryHandle) -> Self {
        Self { store, inventory, state: State::Idle }
    }

    pub fn dragging(&self) -> Option<&DragItem> {
        match &self.state {
            State::Dragging(item) => Some(item),
            State::Idle => None,
        }
    }

    /// Begin a gesture. On error nothing changes; the error is for developers only.
    pub fn drag_start(&mut self, id: &str, source_panel: &str) -> Result<(), GestureError> {
        let item = DragItem::classify(id, source_panel).map_err(|e| {
            error!(error = %e, "drag aborted");
            e
        })?;
        debug!(id, source_panel, "drag started");
        self.store.set_active_drag_item(Some(item.clone()));
        self.state = State::Dragging(item);
        Ok(())
    }

    /// Finish the gesture. `None` means the user cancelled it.
    pub fn drag_end(&mut self, destination: Option<&str>) -> DropOutcome {
        let item = match std::mem::take(&mut self.state) {
            State::Dragging(item) => item,
            State::Idle => return DropOutcome::NoGesture,
        };
        self.store.set_active_drag_item(None);
        let outcome = match (item, destination) {
            (_, None) => DropOutcome::Cancelled,
            (DragItem::Label { kind, token }, Some(CANVAS_TARGET)) => self.drop_label(kind, token),
            (DragItem::Entity { kind: LegacyKind::Policy, name }, Some(dest)) => self.drop_policy(name, dest),
            _ => DropOutcome::NotAccepted,
        };
        debug!(outcome = outcome.as_str(), destination, "drag ended");
        metrics::counter!("canvas_drop_total", 1, "outcome" => outcome.as_str());
        outcome
    }

    fn drop_label(&self, kind: EntityKind, token: LabelToken) -> DropOutcome {
        let Some(label) = token.decode() else {
            debug!(token = %token, "dropped label token is unparseable");
            return DropOutcome::Unparseable { token };
        };
        let matches = self.inventory.current().match_count(kind, &label);
        if matches == 0 {
            debug!(%kind, key = %label.key, value = %label.value, "dropped label matches nothing");
            return DropOutcome::NoMatches { kind, label };
        }
        if !self.store.add_to_canvas(kind, token.clone()) {
            return DropOutcome::AlreadyPresent { kind, label };
        }
        self.store.assign_labels_to_item(kind, token, label.to_labels());
        DropOutcome::Added { kind, label, matches }
    }

    fn drop_policy(&self, policy: String, destination: &str) -> DropOutcome {
        let Some(DragItem::Entity { kind, name }) = parse_legacy(destination) else {
            return DropOutcome::NotAccepted;
        };
        let Some(target_kind) = kind.entity_kind() else {
            return DropOutcome::NotAccepted;
        };
        match self.store.assign_policy(&policy, target_kind, &name) {
            AssignOutcome::Assigned => DropOutcome::Assigned { policy, target_kind, target: name },
            AssignOutcome::AlreadyAssigned => DropOutcome::AlreadyAssigned { policy, target_kind, target: name },
        }
    }
}
