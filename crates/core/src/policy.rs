//! Binding policy vocabulary: configuration knobs and the listing record of existing policies.

use serde::{Deserialize, Serialize};

use crate::Labels;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PropagationMode {
    #[default]
    DownsyncOnly,
    UpsyncOnly,
    BidirectionalSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UpdateStrategy {
    #[default]
    ServerSideApply,
    ForceApply,
    RollingUpdate,
    BlueGreenDeployment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeploymentType {
    AllClusters,
    #[default]
    SelectedClusters,
}

/// Operator-facing settings carried by a staged policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfiguration {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub propagation_mode: PropagationMode,
    #[serde(default)]
    pub update_strategy: UpdateStrategy,
    #[serde(default)]
    pub deployment_type: DeploymentType,
    #[serde(default)]
    pub custom_labels: Labels,
    #[serde(default)]
    pub tolerations: Vec<String>,
}

impl PolicyConfiguration {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: namespace.into(), ..Default::default() }
    }

    pub fn with_strategy(mut self, strategy: UpdateStrategy) -> Self {
        self.update_strategy = strategy;
        self
    }
}

/// An existing binding policy as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingPolicyInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub cluster_list: Vec<String>,
    #[serde(default)]
    pub workload_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}
