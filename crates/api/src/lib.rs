//! Canvas policy API: the request payload and the two remote operations behind it.
//!
//! Frontends and the assembly pipeline depend on [`PolicyBackend`] only. Transports
//! (HTTP, WebSocket) implement it elsewhere; [`MockBackend`] and [`OfflineBackend`]
//! live here.

#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use canvas_core::{Labels, ResourceList};
use serde::{Deserialize, Serialize};
use tracing::info;

pub mod render;

pub use render::{render_policy, BindingPolicyDoc, OfflineBackend, BINDING_POLICY_API_VERSION, BINDING_POLICY_KIND};

/// Payload for both remote operations. Built fresh for every call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRequest {
    pub workload_labels: Labels,
    pub cluster_labels: Labels,
    pub resources: ResourceList,
    pub namespaces_to_sync: Vec<String>,
    pub namespace: String,
    pub policy_name: String,
    /// Operator-edited document to apply instead of a server-side render.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaml: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderResponse {
    pub yaml: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ApplyResponse {
    pub fn ok() -> Self { Self { success: true, detail: None } }

    pub fn rejected(detail: impl Into<String>) -> Self { Self { success: false, detail: Some(detail.into()) } }
}

/// Backend errors suitable for transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum BackendError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// The two remote operations the canvas relies on.
#[async_trait::async_trait]
pub trait PolicyBackend: Send + Sync {
    /// Render the request as policy YAML. Safe to retry with an identical request.
    async fn render_policy_yaml(&self, request: &PolicyRequest) -> BackendResult<RenderResponse>;

    /// Create the policy. Not idempotent: the backend may reject a repeated name.
    async fn apply_policy(&self, request: &PolicyRequest) -> BackendResult<ApplyResponse>;
}

// ----------------- Mock implementation -----------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Render(PolicyRequest),
    Apply(PolicyRequest),
}

/// In-memory backend for tests. Records every request; scripted results are
/// consumed in order, after which render falls back to the local renderer and
/// apply succeeds.
#[derive(Default)]
pub struct MockBackend {
    render_script: Mutex<VecDeque<BackendResult<RenderResponse>>>,
    apply_script: Mutex<VecDeque<BackendResult<ApplyResponse>>>,
    calls: Mutex<Vec<MockCall>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(|p| p.into_inner()) }

impl MockBackend {
    pub fn new() -> Self { Self::default() }

    pub fn push_render(&self, result: BackendResult<RenderResponse>) -> &Self {
        lock(&self.render_script).push_back(result);
        self
    }

    pub fn push_apply(&self, result: BackendResult<ApplyResponse>) -> &Self {
        lock(&self.apply_script).push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> { lock(&self.calls).clone() }

    pub fn render_count(&self) -> usize {
        lock(&self.calls).iter().filter(|c| matches!(c, MockCall::Render(_))).count()
    }

    pub fn apply_count(&self) -> usize {
        lock(&self.calls).iter().filter(|c| matches!(c, MockCall::Apply(_))).count()
    }

    pub fn applied(&self) -> Vec<PolicyRequest> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                MockCall::Apply(r) => Some(r.clone()),
                MockCall::Render(_) => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl PolicyBackend for MockBackend {
    async fn render_policy_yaml(&self, request: &PolicyRequest) -> BackendResult<RenderResponse> {
        lock(&self.calls).push(MockCall::Render(request.clone()));
        if let Some(scripted) = lock(&self.render_script).pop_front() {
            return scripted;
        }
        let yaml = render_policy(request, None).map_err(|e| BackendError::Internal(e.to_string()))?;
        Ok(RenderResponse { yaml })
    }

    async fn apply_policy(&self, request: &PolicyRequest) -> BackendResult<ApplyResponse> {
        lock(&self.calls).push(MockCall::Apply(request.clone()));
        info!(policy = %request.policy_name, "api(mock): apply");
        lock(&self.apply_script).pop_front().unwrap_or_else(|| Ok(ApplyResponse::ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_core::{infer_resources_for_kind, labels};

    fn request() -> PolicyRequest {
        PolicyRequest {
            workload_labels: labels([("app", "x")]),
            cluster_labels: labels([("region", "us")]),
            resources: infer_resources_for_kind(Some("Deployment")),
            namespaces_to_sync: vec!["ns1".into()],
            namespace: "ns1".into(),
            policy_name: "w1-to-c1".into(),
            yaml: None,
        }
    }

    #[test]
    fn request_wire_names() {
        let v = serde_json::to_value(request()).unwrap();
        assert_eq!(v["workloadLabels"]["app"], "x");
        assert_eq!(v["clusterLabels"]["region"], "us");
        assert_eq!(v["namespacesToSync"][0], "ns1");
        assert_eq!(v["policyName"], "w1-to-c1");
        assert_eq!(v["resources"][0], serde_json::json!({ "type": "namespaces", "createOnly": true }));
        assert!(v.get("yaml").is_none());

        let mut edited = request();
        edited.yaml = Some("kind: BindingPolicy".into());
        assert_eq!(serde_json::to_value(edited).unwrap()["yaml"], "kind: BindingPolicy");
    }

    #[test]
    fn error_round_trips_for_transport() {
        let e = BackendError::Rejected("name already in use".into());
        assert_eq!(e.to_string(), "rejected: name already in use");
        let back: BackendError = serde_json::from_str(&serde_json::to_string(&e).unwrap()).unwrap();
        assert_eq!(back, e);
    }

    #[tokio::test]
    async fn mock_plays_script_then_defaults() {
        let mock = MockBackend::new();
        mock.push_apply(Err(BackendError::Transport("connection reset".into())))
            .push_render(Ok(RenderResponse { yaml: "scripted".into() }));

        let r = mock.render_policy_yaml(&request()).await.unwrap();
        assert_eq!(r.yaml, "scripted");
        let r = mock.render_policy_yaml(&request()).await.unwrap();
        assert!(r.yaml.contains("kind: BindingPolicy"));

        assert!(mock.apply_policy(&request()).await.is_err());
        assert_eq!(mock.apply_policy(&request()).await.unwrap(), ApplyResponse::ok());
        assert_eq!(mock.render_count(), 2);
        assert_eq!(mock.apply_count(), 2);
        assert_eq!(mock.applied()[0].policy_name, "w1-to-c1");
    }
}
