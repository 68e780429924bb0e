//! Canvas apply: turns the canvas selection into a policy and sends it.
//!
//! Three flows share [`PolicyPipeline`]:
//! - quick connect: first cluster token + first workload token, applied directly;
//! - preview: render remotely, let the operator edit the YAML, apply on confirm;
//! - staging: build [`DeploymentPolicy`] records locally, deploy them on confirm.
//!
//! Every step runs in order (resolve, infer resources, remote call, apply result).
//! Failures come back as [`PipelineError`] and raise an error notice; the canvas,
//! drafts and staged records are left as they were.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use canvas_api::{ApplyResponse, BackendError, PolicyBackend, PolicyRequest};
use canvas_core::{EntityKind, LabelToken};
use canvas_store::{CanvasStore, InventoryHandle, NoticeKind};
use metrics::{counter, histogram};
use tracing::{info, warn};

pub mod assemble;
pub mod preview;
pub mod staging;
pub mod yaml;

pub use assemble::{resolve, Resolution};
pub use preview::{Draft, DraftKey};
pub use staging::{DeploymentPolicy, DisplayNames, StagedReport};
pub use yaml::validate_policy_yaml;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("Place a cluster label and a workload label on the canvas first")]
    MissingSelection,
    #[error("Could not read label `{0}`")]
    Unparseable(String),
    #[error("No {plural} match the label {key}={value}", plural = .kind.plural())]
    NoMatch { kind: EntityKind, key: String, value: String },
    #[error("Failed to render policy: {0}")]
    Render(BackendError),
    #[error("Failed to deploy policy: {0}")]
    Apply(BackendError),
    #[error("Backend rejected the policy: {0}")]
    Rejected(String),
    #[error("Invalid policy YAML: {0}")]
    InvalidYaml(String),
    #[error("A deployment is already in progress")]
    Busy,
    #[error("No preview for {0}")]
    UnknownDraft(String),
    #[error("Nothing is staged for deployment")]
    NothingStaged,
}

impl PipelineError {
    /// Message for the operator.
    pub fn user_message(&self) -> String { self.to_string() }
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(|p| p.into_inner()) }

/// Held while an apply-bearing call runs; released on every exit path.
pub(crate) struct ApplyGuard<'a>(&'a AtomicBool);

impl<'a> ApplyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, PipelineError> {
        if flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            counter!("policy_apply_busy", 1u64);
            return Err(PipelineError::Busy);
        }
        Ok(Self(flag))
    }
}

impl Drop for ApplyGuard<'_> {
    fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

/// Outcome of a successful quick connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployed {
    pub request: PolicyRequest,
    pub response: ApplyResponse,
}

pub struct PolicyPipeline<B> {
    backend: Arc<B>,
    canvas: CanvasStore,
    inventory: InventoryHandle,
    drafts: Mutex<BTreeMap<DraftKey, Draft>>,
    staged: Mutex<Vec<DeploymentPolicy>>,
    applying: AtomicBool,
}

impl<B: PolicyBackend> PolicyPipeline<B> {
    pub fn new(backend: Arc<B>, canvas: CanvasStore, inventory: InventoryHandle) -> Self {
        Self {
            backend,
            canvas,
            inventory,
            drafts: Mutex::new(BTreeMap::new()),
            staged: Mutex::new(Vec::new()),
            applying: AtomicBool::new(false),
        }
    }

    pub fn canvas(&self) -> &CanvasStore { &self.canvas }

    pub fn inventory(&self) -> &InventoryHandle { &self.inventory }

    /// True while a deployment is in flight; confirmation UIs disable re-submission on it.
    pub fn is_applying(&self) -> bool { self.applying.load(Ordering::Acquire) }

    fn first_tokens(&self) -> Result<(LabelToken, LabelToken), PipelineError> {
        let sel = self.canvas.selection();
        match (sel.first(EntityKind::Workload), sel.first(EntityKind::Cluster)) {
            (Some(w), Some(c)) => Ok((w.clone(), c.clone())),
            _ => Err(PipelineError::MissingSelection),
        }
    }

    /// Request for the quick flow, built from the first token of each kind.
    pub fn build_quick_request(&self) -> Result<PolicyRequest, PipelineError> {
        let (workload, cluster) = self.first_tokens()?;
        self.request_for_tokens(&workload, &cluster)
    }

    pub(crate) fn request_for_tokens(&self, workload: &LabelToken, cluster: &LabelToken) -> Result<PolicyRequest, PipelineError> {
        let workload_label = assemble::decode_token(workload)?;
        let cluster_label = assemble::decode_token(cluster)?;
        let inventory = self.inventory.current();
        let resolved = resolve(&inventory, workload_label, cluster_label)?;
        Ok(resolved.request())
    }

    /// Assemble from the canvas and apply without a preview.
    pub async fn quick_connect(&self) -> Result<Deployed, PipelineError> {
        let _guard = ApplyGuard::acquire(&self.applying)?;
        let request = self.build_quick_request().map_err(|e| self.report(e))?;
        let response = self.apply(&request).await.map_err(|e| self.report(e))?;
        self.deployed(&request.policy_name);
        Ok(Deployed { request, response })
    }

    pub(crate) async fn apply(&self, request: &PolicyRequest) -> Result<ApplyResponse, PipelineError> {
        let t0 = Instant::now();
        info!(policy = %request.policy_name, namespace = %request.namespace, edited = request.yaml.is_some(), "pipeline: apply start");
        let res = self.backend.apply_policy(request).await;
        histogram!("policy_apply_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match res {
            Ok(r) if r.success => {
                counter!("policy_apply_ok", 1u64);
                info!(policy = %request.policy_name, took_ms = %t0.elapsed().as_millis(), "pipeline: apply ok");
                Ok(r)
            }
            Ok(r) => {
                counter!("policy_apply_err", 1u64);
                let detail = r.detail.unwrap_or_else(|| "no detail given".to_string());
                warn!(policy = %request.policy_name, detail = %detail, "pipeline: apply rejected");
                Err(PipelineError::Rejected(detail))
            }
            Err(e) => {
                counter!("policy_apply_err", 1u64);
                warn!(policy = %request.policy_name, error = %e, "pipeline: apply failed");
                Err(PipelineError::Apply(e))
            }
        }
    }

    pub(crate) fn deployed(&self, policy: &str) {
        self.canvas.clear_canvas();
        self.canvas.raise_notice(NoticeKind::Success, format!("Binding policy \"{policy}\" created successfully"));
    }

    /// Surface an error to the operator and hand it back.
    pub(crate) fn report(&self, err: PipelineError) -> PipelineError {
        self.canvas.raise_notice(NoticeKind::Error, err.user_message());
        err
    }
}
