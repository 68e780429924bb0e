//! Checks on operator-edited policy YAML before it is sent for apply.

use serde_json::Value as Json;

use crate::PipelineError;

fn max_yaml_bytes() -> usize {
    std::env::var("CANVAS_MAX_YAML_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1_000_000)
}

fn max_yaml_nodes() -> usize {
    std::env::var("CANVAS_MAX_YAML_NODES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(100_000)
}

fn node_budget_exceeded(v: &Json, max: usize) -> bool {
    fn walk(v: &Json, cur: &mut usize, max: usize) {
        if *cur >= max {
            return;
        }
        *cur += 1;
        match v {
            Json::Object(map) => map.values().for_each(|vv| walk(vv, cur, max)),
            Json::Array(arr) => arr.iter().for_each(|vv| walk(vv, cur, max)),
            _ => {}
        }
    }
    let mut count = 0usize;
    walk(v, &mut count, max);
    count >= max
}

fn invalid(msg: impl Into<String>) -> PipelineError { PipelineError::InvalidYaml(msg.into()) }

fn non_empty_str<'a>(v: &'a Json, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(v, |cur, key| cur.get(*key))
        .and_then(Json::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Accepts a single policy document carrying `apiVersion`, `kind` and `metadata.name`.
pub fn validate_policy_yaml(text: &str) -> Result<(), PipelineError> {
    validate_with_limits(text, max_yaml_bytes(), max_yaml_nodes())
}

pub(crate) fn validate_with_limits(text: &str, max_bytes: usize, max_nodes: usize) -> Result<(), PipelineError> {
    if text.trim().is_empty() {
        return Err(invalid("the policy document is empty"));
    }
    if text.len() > max_bytes {
        return Err(invalid(format!("the policy document exceeds {max_bytes} bytes")));
    }
    let doc: Json = serde_yaml::from_str(text).map_err(|e| invalid(format!("not valid YAML: {e}")))?;
    if node_budget_exceeded(&doc, max_nodes) {
        return Err(invalid(format!("the policy document exceeds {max_nodes} nodes")));
    }
    if !doc.is_object() {
        return Err(invalid("the policy document must be a mapping"));
    }
    if non_empty_str(&doc, &["apiVersion"]).is_none() {
        return Err(invalid("missing apiVersion"));
    }
    if non_empty_str(&doc, &["kind"]).is_none() {
        return Err(invalid("missing kind"));
    }
    if non_empty_str(&doc, &["metadata", "name"]).is_none() {
        return Err(invalid("missing metadata.name"));
    }
    Ok(())
}
