//! Local BindingPolicy rendering, for staging records and offline use.

use canvas_core::policy::{DeploymentType, PolicyConfiguration, PropagationMode, UpdateStrategy};
use canvas_core::Labels;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ApplyResponse, BackendError, BackendResult, PolicyBackend, PolicyRequest, RenderResponse};

pub const BINDING_POLICY_API_VERSION: &str = "control.kubestellar.io/v1alpha1";
pub const BINDING_POLICY_KIND: &str = "BindingPolicy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingPolicyDoc {
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    pub spec: BindingPolicySpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingPolicySpec {
    pub cluster_selectors: Vec<LabelSelector>,
    pub downsync: Vec<DownsyncClause>,
    pub propagation_mode: PropagationMode,
    pub update_strategy: UpdateStrategy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    pub match_labels: Labels,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownsyncClause {
    pub resources: Vec<String>,
    pub namespaces: Vec<String>,
    pub object_selectors: Vec<LabelSelector>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub create_only: bool,
}

/// Build the document for a request. Create-only resources get their own clause.
pub fn build_document(request: &PolicyRequest, config: Option<&PolicyConfiguration>) -> BindingPolicyDoc {
    let defaults = PolicyConfiguration::default();
    let config = config.unwrap_or(&defaults);

    let cluster_labels = match config.deployment_type {
        // an empty selector matches every cluster
        DeploymentType::AllClusters => Labels::new(),
        DeploymentType::SelectedClusters => request.cluster_labels.clone(),
    };

    let mut downsync = Vec::with_capacity(2);
    for create_only in [true, false] {
        let resources: Vec<String> = request
            .resources
            .iter()
            .filter(|r| r.create_only == create_only)
            .map(|r| r.resource_type.clone())
            .collect();
        if resources.is_empty() {
            continue;
        }
        downsync.push(DownsyncClause {
            resources,
            namespaces: request.namespaces_to_sync.clone(),
            object_selectors: vec![LabelSelector { match_labels: request.workload_labels.clone() }],
            create_only,
        });
    }

    BindingPolicyDoc {
        api_version: BINDING_POLICY_API_VERSION.to_string(),
        kind: BINDING_POLICY_KIND.to_string(),
        metadata: Metadata {
            name: request.policy_name.clone(),
            namespace: request.namespace.clone(),
            labels: config.custom_labels.clone(),
        },
        spec: BindingPolicySpec {
            cluster_selectors: vec![LabelSelector { match_labels: cluster_labels }],
            downsync,
            propagation_mode: config.propagation_mode,
            update_strategy: config.update_strategy,
            tolerations: config.tolerations.clone(),
        },
    }
}

pub fn render_policy(request: &PolicyRequest, config: Option<&PolicyConfiguration>) -> Result<String, serde_yaml::Error> {
    let yaml = serde_yaml::to_string(&build_document(request, config))?;
    debug!(policy = %request.policy_name, bytes = yaml.len(), "policy rendered locally");
    Ok(yaml)
}

/// Backend with no remote side: renders locally, refuses to apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineBackend;

#[async_trait::async_trait]
impl PolicyBackend for OfflineBackend {
    async fn render_policy_yaml(&self, request: &PolicyRequest) -> BackendResult<RenderResponse> {
        let yaml = render_policy(request, None).map_err(|e| BackendError::Internal(e.to_string()))?;
        Ok(RenderResponse { yaml })
    }

    async fn apply_policy(&self, request: &PolicyRequest) -> BackendResult<ApplyResponse> {
        info!(policy = %request.policy_name, "api(offline): apply refused");
        Err(BackendError::Unavailable("no policy backend configured".into()))
    }
}
