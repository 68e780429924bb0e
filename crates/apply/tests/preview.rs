#![forbid(unsafe_code)]

use std::sync::Arc;

use canvas_api::{BackendError, MockBackend};
use canvas_apply::{DraftKey, PipelineError, PolicyPipeline};
use canvas_core::policy::UpdateStrategy;
use canvas_core::{labels, Cluster, EntityKind, LabelToken};
use canvas_store::{CanvasStore, Inventory, InventoryHandle};

fn setup() -> (Arc<MockBackend>, PolicyPipeline<MockBackend>) {
    let inv: Inventory = serde_json::from_value(serde_json::json!({
        "clusters": [
            { "name": "c1", "labels": { "region": "us" } },
            { "name": "c2", "labels": { "region": "eu", "name": "edge-eu" } }
        ],
        "workloads": [
            { "name": "w1", "kind": "Deployment", "namespace": "ns1", "labels": { "app": "x" } },
            { "name": "db", "kind": "StatefulSet", "namespace": "data", "labels": { "app": "db" } }
        ]
    }))
    .unwrap();
    let mock = Arc::new(MockBackend::new());
    let p = PolicyPipeline::new(mock.clone(), CanvasStore::new(), InventoryHandle::new(inv));
    for t in ["label-region-us", "label-region-eu"] {
        p.canvas().add_to_canvas(EntityKind::Cluster, LabelToken::new(t));
    }
    for t in ["label-app-x", "label-app-db"] {
        p.canvas().add_to_canvas(EntityKind::Workload, LabelToken::new(t));
    }
    (mock, p)
}

const EDITED: &str = "apiVersion: control.kubestellar.io/v1alpha1\nkind: BindingPolicy\nmetadata:\n  name: hand-tuned\n";

#[tokio::test]
async fn preview_edit_confirm() {
    let (mock, p) = setup();
    let draft = p.preview().await.unwrap();
    assert_eq!(draft.key, DraftKey::new("app:x", "region:us"));
    assert!(draft.yaml.contains("kind: BindingPolicy"));
    assert!(!draft.edited);
    assert_eq!(mock.apply_count(), 0);

    p.edit_draft(&draft.key, EDITED).unwrap();
    assert!(p.draft(&draft.key).unwrap().edited);

    p.confirm_draft(&draft.key).await.unwrap();
    let applied = mock.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].yaml.as_deref(), Some(EDITED));
    assert_eq!(applied[0].policy_name, "w1-to-c1");
    assert!(p.draft(&draft.key).is_none());
    assert!(p.canvas().selection().is_empty());
}

#[tokio::test]
async fn drafts_are_kept_per_pair() {
    let (_mock, p) = setup();
    let a = p.preview_pair(&"label-app-x".into(), &"label-region-us".into()).await.unwrap();
    let b = p.preview_pair(&"label-app-db".into(), &"label-region-eu".into()).await.unwrap();
    assert_ne!(a.key, b.key);
    assert_eq!(b.request.policy_name, "db-to-edge-eu");
    assert_eq!(b.request.namespace, "data");

    p.edit_draft(&a.key, EDITED).unwrap();
    assert_eq!(p.draft(&b.key).unwrap().yaml, b.rendered);

    // re-rendering keeps the operator's text
    let again = p.preview_pair(&"label-app-x".into(), &"label-region-us".into()).await.unwrap();
    assert_eq!(again.yaml, EDITED);
    assert!(again.edited);
    assert_eq!(p.drafts().len(), 2);
    assert!(p.discard_draft(&b.key));
    assert_eq!(p.drafts().len(), 1);
}

#[tokio::test]
async fn failures_preserve_work() {
    let (mock, p) = setup();
    mock.push_render(Err(BackendError::Unavailable("renderer down".into())));
    assert!(matches!(p.preview().await, Err(PipelineError::Render(_))));
    assert!(p.drafts().is_empty());

    let draft = p.preview().await.unwrap();
    p.edit_draft(&draft.key, "kind: BindingPolicy\n").unwrap();
    assert!(matches!(p.confirm_draft(&draft.key).await, Err(PipelineError::InvalidYaml(m)) if m == "missing apiVersion"));
    assert_eq!(mock.apply_count(), 0);

    p.edit_draft(&draft.key, EDITED).unwrap();
    mock.push_apply(Err(BackendError::Rejected("quota exceeded".into())));
    assert!(p.confirm_draft(&draft.key).await.is_err());
    assert_eq!(p.draft(&draft.key).unwrap().yaml, EDITED);
    assert_eq!(p.canvas().selection().len(), 4);

    let missing = DraftKey::new("app:nope", "region:us");
    assert_eq!(p.edit_draft(&missing, "x"), Err(PipelineError::UnknownDraft("app:nope -> region:us".into())));
    assert!(matches!(p.confirm_draft(&missing).await, Err(PipelineError::UnknownDraft(_))));
}

#[tokio::test]
async fn unedited_draft_applies_without_yaml() {
    let (mock, p) = setup();
    let draft = p.preview().await.unwrap();
    // editing back to the rendered text is not an edit
    p.edit_draft(&draft.key, draft.rendered.clone()).unwrap();
    p.confirm_draft(&draft.key).await.unwrap();
    assert_eq!(mock.applied()[0].yaml, None);
}

#[tokio::test]
async fn staging_deploys_each_connection() {
    let (mock, p) = setup();
    assert!(p.canvas().connect("label-app-x", "label-region-us", UpdateStrategy::RollingUpdate));
    assert!(p.canvas().connect("label-app-db", "label-region-eu", UpdateStrategy::ForceApply));

    let staged = p.stage().unwrap();
    assert_eq!(staged.len(), 2);
    assert_ne!(staged[0].id, staged[1].id);
    assert_eq!(staged[0].workload_ids, vec!["app:x"]);
    assert_eq!(staged[1].display_names.clusters, vec!["edge-eu"]);
    assert_eq!(staged[1].config.update_strategy, UpdateStrategy::ForceApply);
    assert!(staged[1].yaml.contains("ForceApply"));
    assert!(mock.calls().is_empty());

    mock.push_apply(Ok(canvas_api::ApplyResponse::ok()))
        .push_apply(Err(BackendError::Transport("timeout".into())));
    let report = p.confirm_staged().await.unwrap();
    assert_eq!(report.deployed, vec!["w1-to-c1"]);
    assert!(!report.is_complete());
    let left = p.staged();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].name, "db-to-edge-eu");
    assert!(left[0].last_error.as_deref().unwrap_or_default().contains("timeout"));
    assert_eq!(p.canvas().selection().len(), 4);

    let report = p.confirm_staged().await.unwrap();
    assert!(report.is_complete());
    assert!(p.staged().is_empty());
    assert!(p.canvas().selection().is_empty());
    // staged records carry their reviewed document
    assert!(mock.applied().iter().all(|r| r.yaml.is_some()));
    assert_eq!(p.confirm_staged().await.unwrap_err(), PipelineError::NothingStaged);
}

#[tokio::test]
async fn staging_without_connections_uses_first_pair() {
    let (_mock, p) = setup();
    let staged = p.stage().unwrap();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].name, "w1-to-c1");
    assert_eq!(p.cancel_staged(), 1);
    assert!(p.staged().is_empty());
    p.canvas().clear_canvas();
    assert_eq!(p.stage().unwrap_err(), PipelineError::MissingSelection);
}

/// Inventory without the `region=us` cluster; workloads unchanged.
fn drop_us_cluster(p: &PolicyPipeline<MockBackend>) {
    let workloads = p.inventory().current().workloads.clone();
    p.inventory().replace(vec![Cluster::new("c2", labels([("region", "eu"), ("name", "edge-eu")]))], workloads);
}

#[tokio::test]
async fn confirm_matches_current_inventory() {
    let (mock, p) = setup();
    let draft = p.preview().await.unwrap();
    drop_us_cluster(&p);

    let err = p.confirm_draft(&draft.key).await.unwrap_err();
    assert_eq!(err, PipelineError::NoMatch { kind: EntityKind::Cluster, key: "region".into(), value: "us".into() });
    assert_eq!(mock.apply_count(), 0);
    assert!(p.draft(&draft.key).is_some());
    assert_eq!(p.canvas().selection().len(), 4);
}

#[tokio::test]
async fn staged_confirm_matches_current_inventory() {
    let (mock, p) = setup();
    assert_eq!(p.stage().unwrap().len(), 1);
    drop_us_cluster(&p);

    let report = p.confirm_staged().await.unwrap();
    assert!(report.deployed.is_empty());
    assert_eq!(mock.apply_count(), 0);
    let left = p.staged();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].last_error.as_deref(), Some("No clusters match the label region=us"));
    assert_eq!(p.canvas().selection().len(), 4);
}

#[tokio::test]
async fn keys_with_colons_survive_confirm() {
    let inv: Inventory = serde_json::from_value(serde_json::json!({
        "clusters": [{ "name": "c1", "labels": { "zone:a": "b" } }],
        "workloads": [{ "name": "w1", "kind": "Deployment", "namespace": "ns1", "labels": { "app": "x" } }]
    }))
    .unwrap();
    let mock = Arc::new(MockBackend::new());
    let p = PolicyPipeline::new(mock.clone(), CanvasStore::new(), InventoryHandle::new(inv));
    let cluster = canvas_core::encode("zone:a", "b");
    assert_eq!(cluster.as_str(), "label-zone:a=b");
    p.canvas().add_to_canvas(EntityKind::Cluster, cluster);
    p.canvas().add_to_canvas(EntityKind::Workload, LabelToken::new("label-app-x"));

    let staged = p.stage().unwrap();
    let draft = p.preview().await.unwrap();
    p.confirm_draft(&draft.key).await.unwrap();
    assert_eq!(mock.applied()[0].cluster_labels, labels([("zone:a", "b")]));

    assert_eq!(staged[0].cluster_labels[0].key, "zone:a");
    let report = p.confirm_staged().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(mock.applied()[1].cluster_labels, labels([("zone:a", "b")]));
}
