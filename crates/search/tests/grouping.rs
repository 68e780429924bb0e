#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use canvas_core::{Cluster, Workload};
use canvas_search::{find_by_label, group_by_label, LabelGroup, LabelIndex, DEFAULT_EXCLUDED_KEY_PATTERNS};

fn clusters() -> Vec<Cluster> {
    serde_json::from_value(serde_json::json!([
        { "name": "c1", "labels": { "region": "us", "tier": "edge", "kubernetes.io/hostname": "n1" } },
        { "name": "c2", "labels": { "region": "eu", "tier": "edge" } },
        { "name": "c3", "labels": { "region": "us", "k8s.io/role": "worker" } },
        { "name": "c4", "labels": {} }
    ]))
    .unwrap()
}

fn membership(groups: &[LabelGroup]) -> BTreeSet<(String, String, BTreeSet<String>)> {
    groups
        .iter()
        .map(|g| (g.key.clone(), g.value.clone(), g.members.iter().map(|m| m.name.clone()).collect()))
        .collect()
}

#[test]
fn grouping_is_deterministic_across_input_order() {
    let forward = clusters();
    let mut reversed = clusters();
    reversed.reverse();

    let a = group_by_label(&forward, DEFAULT_EXCLUDED_KEY_PATTERNS);
    let b = group_by_label(&forward, DEFAULT_EXCLUDED_KEY_PATTERNS);
    let c = group_by_label(&reversed, DEFAULT_EXCLUDED_KEY_PATTERNS);
    assert_eq!(a, b);
    assert_eq!(membership(&a), membership(&c));
    assert_eq!(a.len(), 3);
    assert!(a.iter().all(|g| !g.members.is_empty()));
}

#[test]
fn groups_agree_with_matching() {
    let cs = clusters();
    for g in group_by_label(&cs, DEFAULT_EXCLUDED_KEY_PATTERNS) {
        let hits: Vec<_> = find_by_label(&cs, &g.label()).into_iter().map(|c| c.name.clone()).collect();
        let members: Vec<_> = g.members.iter().map(|m| m.name.clone()).collect();
        assert_eq!(hits, members, "group {}={}", g.key, g.value);
    }
}

#[test]
fn workload_groups_carry_namespaces() {
    let ws: Vec<Workload> = serde_json::from_value(serde_json::json!([
        { "name": "web", "namespace": "shop", "labels": { "app": "web" } },
        { "name": "web", "labels": { "app": "web" } }
    ]))
    .unwrap();
    let idx = LabelIndex::build(&ws, DEFAULT_EXCLUDED_KEY_PATTERNS);
    let g = idx.get("app", "web").unwrap();
    let ns: Vec<_> = g.members.iter().map(|m| m.namespace.as_deref()).collect();
    assert_eq!(ns, vec![Some("shop"), Some("default")]);
}
