//! Resource-type inference: which API resources a policy must declare for a workload.

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::Workload;

/// One entry of a policy's resource list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub create_only: bool,
}

impl ResourceSpec {
    pub fn managed(resource_type: impl Into<String>) -> Self {
        Self { resource_type: resource_type.into(), create_only: false }
    }

    pub fn create_only(resource_type: impl Into<String>) -> Self {
        Self { resource_type: resource_type.into(), create_only: true }
    }
}

pub type ResourceList = SmallVec<[ResourceSpec; 4]>;

pub fn infer_resources(workload: &Workload) -> ResourceList {
    infer_resources_for_kind(workload.kind.as_deref())
}

/// Namespaces come first and are create-only. A known kind contributes its plural
/// plus companions; an unknown kind falls back to the Deployment set.
pub fn infer_resources_for_kind(kind: Option<&str>) -> ResourceList {
    let mut out: ResourceList = smallvec![ResourceSpec::create_only("namespaces")];
    let kind = kind.map(str::trim).filter(|k| !k.is_empty());
    match kind {
        Some(kind) => {
            let lower = kind.to_ascii_lowercase();
            out.push(ResourceSpec::managed(pluralize(&lower)));
            match lower.as_str() {
                "deployment" => {
                    out.push(ResourceSpec::managed("replicasets"));
                    out.push(ResourceSpec::managed("services"));
                }
                "statefulset" => out.push(ResourceSpec::managed("services")),
                _ => {}
            }
        }
        None => {
            for r in ["deployments", "replicasets", "services"] {
                out.push(ResourceSpec::managed(r));
            }
        }
    }
    out
}

fn pluralize(lower_kind: &str) -> String {
    if lower_kind.ends_with('s') { lower_kind.to_string() } else { format!("{}s", lower_kind) }
}
