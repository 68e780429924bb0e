//! Label resolution and request assembly shared by every flow.

use canvas_core::{infer_resources, Cluster, EntityKind, LabelPair, LabelToken, Workload, DEFAULT_NAMESPACE};
use canvas_api::PolicyRequest;
use canvas_search::find_by_label;
use canvas_store::Inventory;
use metrics::counter;
use tracing::{debug, warn};

use crate::PipelineError;

pub(crate) fn decode_token(token: &LabelToken) -> Result<LabelPair, PipelineError> {
    token.decode().ok_or_else(|| {
        debug!(token = %token, "selection token is unparseable");
        PipelineError::Unparseable(token.to_string())
    })
}

/// Both dragged labels together with the entities they currently match.
/// Only [`resolve`] builds one, so neither side is ever empty.
#[derive(Debug)]
pub struct Resolution<'a> {
    workload_label: LabelPair,
    cluster_label: LabelPair,
    workloads: Vec<&'a Workload>,
    clusters: Vec<&'a Cluster>,
}

fn no_match(kind: EntityKind, label: &LabelPair) -> PipelineError {
    counter!("policy_assembly_no_match", 1u64);
    warn!(%kind, key = %label.key, value = %label.value, "label matches nothing");
    PipelineError::NoMatch { kind, key: label.key.clone(), value: label.value.clone() }
}

/// Match both labels against the inventory. Either side matching nothing is an error.
pub fn resolve(inventory: &Inventory, workload_label: LabelPair, cluster_label: LabelPair) -> Result<Resolution<'_>, PipelineError> {
    let clusters = find_by_label(&inventory.clusters, &cluster_label);
    if clusters.is_empty() {
        return Err(no_match(EntityKind::Cluster, &cluster_label));
    }
    let workloads = find_by_label(&inventory.workloads, &workload_label);
    if workloads.is_empty() {
        return Err(no_match(EntityKind::Workload, &workload_label));
    }
    debug!(clusters = clusters.len(), workloads = workloads.len(), "selection resolved");
    Ok(Resolution { workload_label, cluster_label, workloads, clusters })
}

impl Resolution<'_> {
    fn first_workload(&self) -> &Workload { self.workloads[0] }

    fn first_cluster(&self) -> &Cluster { self.clusters[0] }

    pub fn namespace(&self) -> &str {
        let ns = self.first_workload().namespace.as_str();
        if ns.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            ns
        }
    }

    /// `<workload>-to-<cluster display name>`.
    pub fn policy_name(&self) -> String {
        format!("{}-to-{}", self.first_workload().name, self.first_cluster().display_name())
    }

    /// Selectors carry only the dragged pair per side, never the matched entity's full label set.
    pub fn request(&self) -> PolicyRequest {
        let namespace = self.namespace().to_string();
        PolicyRequest {
            workload_labels: self.workload_label.to_labels(),
            cluster_labels: self.cluster_label.to_labels(),
            resources: infer_resources(self.first_workload()),
            namespaces_to_sync: vec![namespace.clone()],
            namespace,
            policy_name: self.policy_name(),
            yaml: None,
        }
    }

    pub fn workload_names(&self) -> Vec<String> { self.workloads.iter().map(|w| w.name.clone()).collect() }

    pub fn cluster_names(&self) -> Vec<String> {
        self.clusters.iter().map(|c| c.display_name().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_core::labels;

    fn inventory() -> Inventory {
        Inventory::new(
            vec![
                Cluster::new("c1", labels([("region", "us"), ("tier", "edge")])),
                Cluster::new("c2", labels([("region", "us"), ("name", "west")])),
            ],
            vec![
                Workload::new("w1", "ns1", Some("Deployment"), labels([("app", "x"), ("team", "a")])),
                Workload::new("w2", "", None, labels([("app", "y")])),
            ],
        )
    }

    #[test]
    fn request_uses_only_dragged_pairs() {
        let inv = inventory();
        let r = resolve(&inv, LabelPair::new("app", "x"), LabelPair::new("region", "us")).unwrap();
        assert_eq!(r.clusters.len(), 2);
        let req = r.request();
        assert_eq!(req.workload_labels, labels([("app", "x")]));
        assert_eq!(req.cluster_labels, labels([("region", "us")]));
        assert_eq!(req.policy_name, "w1-to-c1");
        assert_eq!(req.namespaces_to_sync, vec!["ns1"]);
        assert_eq!(r.cluster_names(), vec!["c1", "west"]);
    }

    #[test]
    fn cluster_display_name_and_default_namespace() {
        let inv = inventory();
        let r = resolve(&inv, LabelPair::new("app", "y"), LabelPair::new("name", "west")).unwrap();
        assert_eq!(r.policy_name(), "w2-to-west");
        assert_eq!(r.namespace(), "default");
        let types: Vec<_> = r.request().resources.iter().map(|s| s.resource_type.clone()).collect();
        assert_eq!(types, vec!["namespaces", "deployments", "replicasets", "services"]);
    }

    #[test]
    fn zero_matches_name_the_side() {
        let inv = inventory();
        let err = resolve(&inv, LabelPair::new("app", "x"), LabelPair::new("region", "eu")).unwrap_err();
        assert!(matches!(err, PipelineError::NoMatch { kind: EntityKind::Cluster, .. }));
        let err = resolve(&inv, LabelPair::new("app", "z"), LabelPair::new("region", "us")).unwrap_err();
        assert!(matches!(err, PipelineError::NoMatch { kind: EntityKind::Workload, .. }));
        assert_eq!(err.to_string(), "No workloads match the label app=z");
    }

    #[test]
    fn unparseable_token_is_reported() {
        assert_eq!(
            decode_token(&LabelToken::new("label-region")),
            Err(PipelineError::Unparseable("label-region".into()))
        );
    }
}
