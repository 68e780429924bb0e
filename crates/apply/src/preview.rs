//! Preview and edit: render remotely, keep the YAML as an editable draft, apply on confirm.
//!
//! Drafts are keyed by the workload and cluster display identifiers so edits to
//! different pairs never overwrite each other.

use std::fmt;

use canvas_api::{ApplyResponse, PolicyBackend, PolicyRequest};
use canvas_core::{LabelPair, LabelToken};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{assemble, lock, resolve, validate_policy_yaml, ApplyGuard, PipelineError, PolicyPipeline};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DraftKey {
    /// `key:value` of the workload label shown in the dialog.
    pub workload: String,
    pub cluster: String,
}

impl DraftKey {
    pub fn new(workload: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self { workload: workload.into(), cluster: cluster.into() }
    }

    fn for_labels(workload: &LabelPair, cluster: &LabelPair) -> Self {
        Self::new(workload.display_id(), cluster.display_id())
    }
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} -> {}", self.workload, self.cluster) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Draft {
    pub key: DraftKey,
    /// Labels the draft was rendered for; confirm re-matches these.
    pub workload_label: LabelPair,
    pub cluster_label: LabelPair,
    pub request: PolicyRequest,
    /// YAML as last returned by the renderer.
    pub rendered: String,
    /// Editable text; equals `rendered` until the operator edits it.
    pub yaml: String,
    pub edited: bool,
}

fn decode_pair(workload: &LabelToken, cluster: &LabelToken) -> Result<(LabelPair, LabelPair), PipelineError> {
    Ok((assemble::decode_token(workload)?, assemble::decode_token(cluster)?))
}

impl<B: PolicyBackend> PolicyPipeline<B> {
    /// Preview the first cluster and workload tokens on the canvas.
    pub async fn preview(&self) -> Result<Draft, PipelineError> {
        let (workload, cluster) = self.first_tokens().map_err(|e| self.report(e))?;
        self.preview_pair(&workload, &cluster).await
    }

    /// Render one pair. A re-preview refreshes `rendered` but keeps an operator edit.
    pub async fn preview_pair(&self, workload: &LabelToken, cluster: &LabelToken) -> Result<Draft, PipelineError> {
        let (workload_label, cluster_label) = decode_pair(workload, cluster).map_err(|e| self.report(e))?;
        let key = DraftKey::for_labels(&workload_label, &cluster_label);
        let request = {
            let inventory = self.inventory.current();
            resolve(&inventory, workload_label.clone(), cluster_label.clone()).map_err(|e| self.report(e))?.request()
        };
        counter!("policy_render_total", 1u64);
        let rendered = match self.backend.render_policy_yaml(&request).await {
            Ok(r) => r.yaml,
            Err(e) => {
                warn!(draft = %key, error = %e, "pipeline: render failed");
                return Err(self.report(PipelineError::Render(e)));
            }
        };
        debug!(draft = %key, bytes = rendered.len(), "pipeline: render ok");

        let mut drafts = lock(&self.drafts);
        let (yaml, edited) = match drafts.remove(&key) {
            Some(prev) if prev.edited => (prev.yaml, true),
            _ => (rendered.clone(), false),
        };
        let draft = Draft { key: key.clone(), workload_label, cluster_label, request, rendered, yaml, edited };
        drafts.insert(key, draft.clone());
        Ok(draft)
    }

    pub fn draft(&self, key: &DraftKey) -> Option<Draft> { lock(&self.drafts).get(key).cloned() }

    pub fn drafts(&self) -> Vec<Draft> { lock(&self.drafts).values().cloned().collect() }

    pub fn edit_draft(&self, key: &DraftKey, yaml: impl Into<String>) -> Result<(), PipelineError> {
        let mut drafts = lock(&self.drafts);
        let draft = drafts.get_mut(key).ok_or_else(|| PipelineError::UnknownDraft(key.to_string()))?;
        draft.yaml = yaml.into();
        draft.edited = draft.yaml != draft.rendered;
        Ok(())
    }

    pub fn discard_draft(&self, key: &DraftKey) -> bool { lock(&self.drafts).remove(key).is_some() }

    /// Re-match the draft's labels against the current inventory and apply.
    /// On success the draft is dropped and the canvas cleared; on failure both stay.
    pub async fn confirm_draft(&self, key: &DraftKey) -> Result<ApplyResponse, PipelineError> {
        let _guard = ApplyGuard::acquire(&self.applying)?;
        let request = self.confirm_request(key).map_err(|e| self.report(e))?;
        let response = self.apply(&request).await.map_err(|e| self.report(e))?;
        lock(&self.drafts).remove(key);
        info!(draft = %key, policy = %request.policy_name, "pipeline: draft deployed");
        self.deployed(&request.policy_name);
        Ok(response)
    }

    fn confirm_request(&self, key: &DraftKey) -> Result<PolicyRequest, PipelineError> {
        let draft = self.draft(key).ok_or_else(|| PipelineError::UnknownDraft(key.to_string()))?;
        let inventory = self.inventory.current();
        let mut request = resolve(&inventory, draft.workload_label, draft.cluster_label)?.request();
        if draft.edited {
            validate_policy_yaml(&draft.yaml)?;
            request.yaml = Some(draft.yaml);
        }
        Ok(request)
    }
}
