//! Whole-entity policy assignment, the legacy drag path that predates label chips.

use std::collections::BTreeMap;

use canvas_core::policy::BindingPolicyInfo;
use canvas_core::EntityKind;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub clusters: Vec<String>,
    pub workloads: Vec<String>,
}

/// Policy name to the entities it is assigned to.
pub type AssignmentMap = BTreeMap<String, Assignment>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignOutcome {
    Assigned,
    AlreadyAssigned,
}

impl AssignOutcome {
    pub fn message(&self, policy: &str, target_kind: EntityKind, target: &str) -> String {
        match self {
            AssignOutcome::Assigned => format!("Successfully assigned {policy} to {target_kind} {target}"),
            AssignOutcome::AlreadyAssigned => match target_kind {
                EntityKind::Cluster => format!("Cluster {target} is already assigned to policy {policy}"),
                EntityKind::Workload => format!("Workload {target} is already assigned to policy {policy}"),
            },
        }
    }
}

pub(crate) fn build_map(policies: &[BindingPolicyInfo]) -> AssignmentMap {
    policies
        .iter()
        .map(|p| {
            let a = Assignment { clusters: p.cluster_list.clone(), workloads: p.workload_list.clone() };
            (p.name.clone(), a)
        })
        .collect()
}

pub(crate) fn assign(map: &mut AssignmentMap, policy: &str, target_kind: EntityKind, target: &str) -> AssignOutcome {
    let entry = map.entry(policy.to_string()).or_default();
    let (list, present) = match target_kind {
        EntityKind::Cluster => {
            let present = entry.clusters.iter().any(|c| c == target);
            (&mut entry.clusters, present)
        }
        // workload ids may carry a namespace, so look for the name inside them
        EntityKind::Workload => {
            let present = entry.workloads.iter().any(|w| w.contains(target));
            (&mut entry.workloads, present)
        }
    };
    if present {
        return AssignOutcome::AlreadyAssigned;
    }
    list.push(target.to_string());
    AssignOutcome::Assigned
}
