//! Confirm-and-deploy staging: one local record per prepared pair, no remote call until confirm.

use canvas_api::{render_policy, BackendError, PolicyBackend};
use canvas_core::policy::PolicyConfiguration;
use canvas_core::{LabelPair, FALLBACK_SELECTOR_KEY};
use canvas_store::NoticeKind;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{assemble, lock, resolve, ApplyGuard, PipelineError, PolicyPipeline};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisplayNames {
    pub workloads: Vec<String>,
    pub clusters: Vec<String>,
}

/// A policy waiting for explicit confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPolicy {
    pub id: Uuid,
    pub name: String,
    /// `key:value` display identifiers of the workload labels.
    pub workload_ids: Vec<String>,
    pub cluster_ids: Vec<String>,
    /// Decoded labels behind the ids; confirm re-matches these.
    pub workload_labels: Vec<LabelPair>,
    pub cluster_labels: Vec<LabelPair>,
    pub display_names: DisplayNames,
    pub config: PolicyConfiguration,
    pub yaml: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StagedReport {
    pub deployed: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl StagedReport {
    pub fn is_complete(&self) -> bool { self.failed.is_empty() }

    /// All failures as one line, `name: reason; ...`.
    pub fn error_message(&self) -> Option<String> {
        if self.failed.is_empty() {
            return None;
        }
        Some(self.failed.iter().map(|(n, e)| format!("{n}: {e}")).collect::<Vec<_>>().join("; "))
    }
}

/// First decoded label, else the first display id read back with the fallback key.
fn first_label(labels: &[LabelPair], ids: &[String]) -> LabelPair {
    if let Some(label) = labels.first() {
        return label.clone();
    }
    ids.first()
        .map(|id| LabelPair::from_display_id(id, FALLBACK_SELECTOR_KEY))
        .unwrap_or_else(|| LabelPair::new(FALLBACK_SELECTOR_KEY, ""))
}

impl<B: PolicyBackend> PolicyPipeline<B> {
    /// Replace the staged list with one record per prepared pair on the canvas.
    pub fn stage(&self) -> Result<Vec<DeploymentPolicy>, PipelineError> {
        let snapshot = self.canvas.current();
        let pairs = snapshot.prepared_pairs();
        if pairs.is_empty() {
            return Err(self.report(PipelineError::MissingSelection));
        }
        let inventory = self.inventory.current();
        let mut records = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            let workload_label = assemble::decode_token(&pair.workload).map_err(|e| self.report(e))?;
            let cluster_label = assemble::decode_token(&pair.cluster).map_err(|e| self.report(e))?;
            let workload_ids = vec![workload_label.display_id()];
            let cluster_ids = vec![cluster_label.display_id()];
            let workload_labels = vec![workload_label.clone()];
            let cluster_labels = vec![cluster_label.clone()];
            let resolved = resolve(&inventory, workload_label, cluster_label).map_err(|e| self.report(e))?;
            let request = resolved.request();
            let config = PolicyConfiguration::new(&request.policy_name, &request.namespace).with_strategy(pair.strategy);
            let yaml = render_policy(&request, Some(&config))
                .map_err(|e| self.report(PipelineError::Render(BackendError::Internal(e.to_string()))))?;
            records.push(DeploymentPolicy {
                id: Uuid::new_v4(),
                name: request.policy_name.clone(),
                workload_ids,
                cluster_ids,
                workload_labels,
                cluster_labels,
                display_names: DisplayNames { workloads: resolved.workload_names(), clusters: resolved.cluster_names() },
                config,
                yaml,
                last_error: None,
            });
        }
        info!(count = records.len(), "pipeline: policies staged");
        *lock(&self.staged) = records.clone();
        Ok(records)
    }

    pub fn staged(&self) -> Vec<DeploymentPolicy> { lock(&self.staged).clone() }

    /// Drop every staged record. Returns how many there were.
    pub fn cancel_staged(&self) -> usize { std::mem::take(&mut *lock(&self.staged)).len() }

    /// Deploy staged records one after another. Deployed records leave the list; failed
    /// ones stay with their error. The canvas clears only when all of them deploy.
    pub async fn confirm_staged(&self) -> Result<StagedReport, PipelineError> {
        let _guard = ApplyGuard::acquire(&self.applying)?;
        let records = self.staged();
        if records.is_empty() {
            return Err(self.report(PipelineError::NothingStaged));
        }

        let mut report = StagedReport::default();
        let mut remaining = Vec::new();
        for mut record in records {
            match self.deploy_record(&record).await {
                Ok(()) => report.deployed.push(record.name.clone()),
                Err(e) => {
                    let msg = e.user_message();
                    warn!(policy = %record.name, error = %msg, "pipeline: staged deploy failed");
                    report.failed.push((record.name.clone(), msg.clone()));
                    record.last_error = Some(msg);
                    remaining.push(record);
                }
            }
        }
        *lock(&self.staged) = remaining;

        match report.error_message() {
            None => {
                self.canvas.clear_canvas();
                self.canvas.raise_notice(
                    NoticeKind::Success,
                    format!("Successfully deployed {} binding policies", report.deployed.len()),
                );
            }
            Some(msg) => self.canvas.raise_notice(NoticeKind::Error, format!("Failed to deploy: {msg}")),
        }
        Ok(report)
    }

    async fn deploy_record(&self, record: &DeploymentPolicy) -> Result<(), PipelineError> {
        let workload_label = first_label(&record.workload_labels, &record.workload_ids);
        let cluster_label = first_label(&record.cluster_labels, &record.cluster_ids);
        let mut request = {
            let inventory = self.inventory.current();
            resolve(&inventory, workload_label, cluster_label)?.request()
        };
        request.policy_name = record.name.clone();
        request.yaml = Some(record.yaml.clone());
        self.apply(&request).await.map(|_| ())
    }
}
