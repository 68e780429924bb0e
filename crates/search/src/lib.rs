//! Canvas search: label grouping index over an inventory of clusters or workloads.
//! One group per distinct `(key, value)`; member order follows the inventory.

#![forbid(unsafe_code)]

use canvas_core::{EntityKind, EntityRef, LabelPair, LabelToken, Labeled};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::debug;

mod matching;

pub use matching::{find_by_label, match_summary};

/// Key substrings hidden from the label panels unless overridden.
pub const DEFAULT_EXCLUDED_KEY_PATTERNS: &[&str] = &["open-cluster-management", "kubernetes.io", "k8s.io"];

/// Exclusion patterns from `CANVAS_EXCLUDED_LABEL_KEYS` (comma separated), else the defaults.
/// An empty variable disables exclusion.
pub fn excluded_patterns_from_env() -> Vec<String> {
    match std::env::var("CANVAS_EXCLUDED_LABEL_KEYS") {
        Ok(s) => s.split(',').map(str::trim).filter(|p| !p.is_empty()).map(str::to_string).collect(),
        Err(_) => default_excluded_patterns(),
    }
}

pub fn default_excluded_patterns() -> Vec<String> {
    DEFAULT_EXCLUDED_KEY_PATTERNS.iter().map(|s| s.to_string()).collect()
}

fn is_excluded<P: AsRef<str>>(key: &str, patterns: &[P]) -> bool {
    patterns.iter().map(AsRef::as_ref).any(|p| !p.is_empty() && key.contains(p))
}

/// Entities sharing one label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelGroup {
    pub key: String,
    pub value: String,
    pub members: Vec<EntityRef>,
}

impl LabelGroup {
    pub fn label(&self) -> LabelPair { LabelPair::new(&self.key, &self.value) }

    /// Drag payload for this group's chip.
    pub fn token(&self) -> LabelToken { canvas_core::encode(&self.key, &self.value) }

    // `query_lower` is already lowercased
    fn matches_lower(&self, query_lower: &str) -> bool {
        query_lower.is_empty()
            || self.key.to_lowercase().contains(query_lower)
            || self.value.to_lowercase().contains(query_lower)
    }
}

/// Group entities by each non-excluded label pair.
pub fn group_by_label<T: Labeled, P: AsRef<str>>(entities: &[T], excluded: &[P]) -> Vec<LabelGroup> {
    let mut groups: Vec<LabelGroup> = Vec::new();
    let mut slots: FxHashMap<(&str, &str), usize> = FxHashMap::default();
    let mut skipped = 0usize;
    for e in entities {
        for (k, v) in e.labels() {
            if is_excluded(k, excluded) {
                skipped += 1;
                continue;
            }
            let slot = *slots.entry((k.as_str(), v.as_str())).or_insert_with(|| {
                groups.push(LabelGroup { key: k.clone(), value: v.clone(), members: Vec::new() });
                groups.len() - 1
            });
            groups[slot].members.push(e.entity_ref());
        }
    }
    debug!(kind = %T::KIND, entities = entities.len(), groups = groups.len(), skipped, "label groups built");
    groups
}

/// Case-insensitive substring filter over already-built groups (key or value).
pub fn filter_groups<'a>(groups: &'a [LabelGroup], query: &str) -> Vec<&'a LabelGroup> {
    let q = query.trim().to_lowercase();
    groups.iter().filter(|g| g.matches_lower(&q)).collect()
}

/// Label groups for one entity kind, with lookup and search helpers.
pub struct LabelIndex {
    kind: EntityKind,
    groups: Vec<LabelGroup>,
    by_pair: FxHashMap<(String, String), usize>,
}

impl LabelIndex {
    pub fn build<T: Labeled, P: AsRef<str>>(entities: &[T], excluded: &[P]) -> Self {
        let groups = group_by_label(entities, excluded);
        let by_pair = groups
            .iter()
            .enumerate()
            .map(|(i, g)| ((g.key.clone(), g.value.clone()), i))
            .collect();
        metrics::gauge!("label_groups", groups.len() as f64, "kind" => T::KIND.as_str());
        Self { kind: T::KIND, groups, by_pair }
    }

    pub fn kind(&self) -> EntityKind { self.kind }

    pub fn groups(&self) -> &[LabelGroup] { &self.groups }

    pub fn len(&self) -> usize { self.groups.len() }

    pub fn is_empty(&self) -> bool { self.groups.is_empty() }

    pub fn get(&self, key: &str, value: &str) -> Option<&LabelGroup> {
        self.by_pair.get(&(key.to_string(), value.to_string())).map(|&i| &self.groups[i])
    }

    pub fn filter(&self, query: &str) -> Vec<&LabelGroup> { filter_groups(&self.groups, query) }

    /// Fuzzy-ranked groups for palette-style lookup; ties keep index order.
    pub fn rank(&self, query: &str, limit: usize) -> Vec<(&LabelGroup, i64)> {
        let q = query.trim();
        if q.is_empty() {
            return self.groups.iter().take(limit).map(|g| (g, 0)).collect();
        }
        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(usize, i64)> = self
            .groups
            .iter()
            .enumerate()
            .filter_map(|(i, g)| {
                let text = format!("{}={}", g.key, g.value);
                matcher.fuzzy_match(&text, q).map(|s| (i, s))
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.into_iter().take(limit).map(|(i, s)| (&self.groups[i], s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_core::{labels, Cluster};

    fn clusters() -> Vec<Cluster> {
        vec![
            Cluster::new("c1", labels([("region", "us"), ("kubernetes.io/arch", "amd64")])),
            Cluster::new("c2", labels([("region", "us"), ("tier", "edge")])),
            Cluster::new("c3", labels([("region", "eu"), ("cluster.open-cluster-management.io/clusterset", "default")])),
        ]
    }

    #[test]
    fn groups_share_members_and_skip_excluded_keys() {
        let groups = group_by_label(&clusters(), DEFAULT_EXCLUDED_KEY_PATTERNS);
        let keys: Vec<_> = groups.iter().map(|g| (g.key.as_str(), g.value.as_str())).collect();
        assert_eq!(keys, vec![("region", "us"), ("tier", "edge"), ("region", "eu")]);
        let names: Vec<_> = groups[0].members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["c1", "c2"]);
    }

    #[test]
    fn empty_pattern_list_keeps_every_key() {
        let none: &[&str] = &[];
        assert_eq!(group_by_label(&clusters(), none).len(), 5);
    }

    #[test]
    fn filter_is_case_insensitive_on_key_or_value() {
        let groups = group_by_label(&clusters(), DEFAULT_EXCLUDED_KEY_PATTERNS);
        let hits: Vec<_> = filter_groups(&groups, "EDG").into_iter().map(|g| g.key.as_str()).collect();
        assert_eq!(hits, vec!["tier"]);
        assert_eq!(filter_groups(&groups, "region").len(), 2);
        assert_eq!(filter_groups(&groups, "  ").len(), 3);
    }

    #[test]
    fn index_lookup_and_rank() {
        let idx = LabelIndex::build(&clusters(), DEFAULT_EXCLUDED_KEY_PATTERNS);
        assert_eq!(idx.kind(), EntityKind::Cluster);
        assert_eq!(idx.get("region", "eu").map(|g| g.members.len()), Some(1));
        assert!(idx.get("region", "apac").is_none());
        let ranked = idx.rank("tieredge", 10);
        assert_eq!(ranked.first().map(|(g, _)| g.key.as_str()), Some("tier"));
        assert!(idx.rank("zzzz", 10).is_empty());
    }

    #[test]
    fn group_token_round_trips() {
        for g in &group_by_label(&clusters(), DEFAULT_EXCLUDED_KEY_PATTERNS) {
            assert_eq!(g.token().decode(), Some(g.label()));
        }
    }
}
