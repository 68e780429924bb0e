#![forbid(unsafe_code)]

use std::time::Duration;

use canvas_core::policy::UpdateStrategy;
use canvas_core::{EntityKind, LabelToken};
use canvas_store::{CanvasStore, NoticeKind};
use chrono::Utc;

#[test]
fn clear_empties_selection_caches_and_connections() {
    let store = CanvasStore::new();
    store.add_to_canvas(EntityKind::Cluster, LabelToken::new("label-region-us"));
    store.add_to_canvas(EntityKind::Workload, LabelToken::new("label-app-x"));
    store.assign_labels_to_item(EntityKind::Workload, "label-app-x".into(), canvas_core::labels([("app", "x")]));
    store.connect("label-app-x", "label-region-us", UpdateStrategy::BlueGreenDeployment);
    store.raise_notice(NoticeKind::Info, "kept");

    store.clear_canvas();
    let snap = store.current();
    assert!(snap.selection.is_empty());
    assert!(snap.connections.is_empty());
    assert!(snap.item_labels.workloads.is_empty());
    assert!(snap.prepared_pairs().is_empty());
    // notices are not part of the canvas
    assert!(snap.notice.is_some());
}

#[test]
fn notice_expiry() {
    let store = CanvasStore::new();
    let t0 = Utc::now();
    store.raise_notice_at(NoticeKind::Error, "apply failed", t0);
    let later = |s: u64| t0 + chrono::Duration::from_std(Duration::from_secs(s)).unwrap();
    assert!(!store.expire_notice(later(4)));
    assert!(store.current().notice.is_some());
    assert!(store.expire_notice(later(5)));
    assert!(store.current().notice.is_none());
    assert!(!store.expire_notice(later(6)));
}

#[tokio::test]
async fn readers_see_epoch_changes() {
    let store = CanvasStore::new();
    let mut rx = store.subscribe_epoch();
    let writer = store.clone();
    let task = tokio::spawn(async move {
        writer.add_to_canvas(EntityKind::Cluster, LabelToken::new("label-zone-a"));
    });
    rx.changed().await.unwrap();
    task.await.unwrap();
    let epoch = *rx.borrow();
    assert!(epoch >= 1);
    assert!(store.current().selection.contains(EntityKind::Cluster, "label-zone-a"));
}
