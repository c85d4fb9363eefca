//! Shared helpers used by every concrete agent: JSON-field extraction and
//! markdown artifact construction. Prompt content and artifact *rendering*
//! are out of this crate's scope per spec.md §1 — these helpers exist only
//! to prove the [`coordination::agent::Agent`] contract is implementable.

use coordination::types::{AgentRequest, Artifact};
use serde_json::Value;
use std::collections::HashMap;

pub fn string_field(value: &Value, field: &str) -> Result<String, String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| format!("missing or non-string field `{field}`"))
}

pub fn string_array_field(value: &Value, field: &str) -> Vec<String> {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Build a markdown artifact under `agent_id/<slug>.md`, tagged with the
/// request's tenant for downstream traceability.
pub fn markdown_artifact(
    request: &AgentRequest,
    agent_id: &str,
    slug: &str,
    title: &str,
    body: &str,
    next_artifact_id: &mut dyn FnMut() -> String,
) -> Artifact {
    let mut metadata = HashMap::new();
    metadata.insert("tenant_id".to_string(), serde_json::json!(request.auth.tenant_id));
    Artifact::new(
        next_artifact_id(),
        "document",
        &format!("{agent_id}/{slug}.md"),
        format!("# {title}\n\n{body}\n"),
        metadata,
    )
}

pub fn design_phase_hint(request: &AgentRequest) -> Option<String> {
    request
        .constraints
        .get("design_phase")
        .and_then(Value::as_str)
        .map(|s| s.trim_matches('"').to_string())
}
