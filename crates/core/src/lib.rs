//! Canvas core types: label-carrying entities and the label pair they are selected by.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod policy;
pub mod resources;
pub mod token;

pub use resources::{infer_resources, infer_resources_for_kind, ResourceList, ResourceSpec};
pub use token::{decode, encode, LabelToken, TOKEN_PREFIX};

/// Kubernetes labels. Ordered so that grouping and serialisation stay deterministic.
pub type Labels = BTreeMap<String, String>;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Key used when a stored display identifier is not in `key:value` shape.
pub const FALLBACK_SELECTOR_KEY: &str = "name";

pub mod prelude {
    pub use super::{Cluster, EntityKind, EntityRef, LabelPair, LabelToken, Labeled, Labels, Workload};
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Cluster,
    Workload,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Cluster => "cluster",
            EntityKind::Workload => "workload",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            EntityKind::Cluster => "clusters",
            EntityKind::Workload => "workloads",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// One `(key, value)` label: the unit of selection on the canvas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabelPair {
    pub key: String,
    pub value: String,
}

impl LabelPair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    /// Human-facing identifier, `key:value`.
    pub fn display_id(&self) -> String { format!("{}:{}", self.key, self.value) }

    /// Parse a stored display identifier. Identifiers that are not `key:value`
    /// are treated as a bare value under `fallback_key`.
    pub fn from_display_id(id: &str, fallback_key: &str) -> Self {
        match id.split_once(':') {
            Some((k, v)) if !k.is_empty() => Self::new(k, v),
            _ => Self::new(fallback_key, id),
        }
    }

    pub fn token(&self) -> LabelToken { encode(&self.key, &self.value) }

    /// Single-entry label map, the selector body of a policy side.
    pub fn to_labels(&self) -> Labels {
        let mut m = Labels::new();
        m.insert(self.key.clone(), self.value.clone());
        m
    }
}

impl fmt::Display for LabelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}: {}", self.key, self.value) }
}

/// Reference to an entity inside a label group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Cluster {
    pub fn new(name: impl Into<String>, labels: Labels) -> Self {
        Self { name: name.into(), labels, status: None }
    }

    /// Prefers the `name` label over the object name.
    pub fn display_name(&self) -> &str {
        self.labels.get("name").map(String::as_str).unwrap_or(&self.name)
    }
}

fn default_namespace() -> String { DEFAULT_NAMESPACE.to_string() }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Kubernetes kind, e.g. `Deployment`. Absent for label-only workloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub labels: Labels,
}

impl Workload {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, kind: Option<&str>, labels: Labels) -> Self {
        Self { name: name.into(), namespace: namespace.into(), kind: kind.map(str::to_string), labels }
    }
}

/// Entities that carry a label map and can be grouped or matched by label.
pub trait Labeled {
    const KIND: EntityKind;

    fn name(&self) -> &str;
    fn labels(&self) -> &Labels;
    fn entity_ref(&self) -> EntityRef;

    fn has_label(&self, key: &str, value: &str) -> bool {
        self.labels().get(key).map_or(false, |v| v == value)
    }
}

impl Labeled for Cluster {
    const KIND: EntityKind = EntityKind::Cluster;

    fn name(&self) -> &str { &self.name }
    fn labels(&self) -> &Labels { &self.labels }
    fn entity_ref(&self) -> EntityRef { EntityRef { name: self.name.clone(), namespace: None } }
}

impl Labeled for Workload {
    const KIND: EntityKind = EntityKind::Workload;

    fn name(&self) -> &str { &self.name }
    fn labels(&self) -> &Labels { &self.labels }
    fn entity_ref(&self) -> EntityRef {
        EntityRef { name: self.name.clone(), namespace: Some(self.namespace.clone()) }
    }
}

/// Build a label map from literal pairs.
pub fn labels<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Labels {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}
