//! Synthesiser (spec §4.5): folds `AgentOutput[]` into a `SynthesisResult`.
//!
//! Grounded in the teacher's `ensemble::voting::VotingProtocol` (aggregating
//! independent worker results into one verdict) and `debate::consensus`
//! (conflict detection across participant outputs), generalised from
//! vote-tallying to artifact/routing conflict detection and completion
//! scoring.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::types::{AgentOutput, Artifact};

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("cannot synthesise an empty output set")]
    EmptyOutputs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: String,
    pub severity: ConflictSeverity,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedArtifact {
    pub artifact: Artifact,
    pub overwritten: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub summaries: Vec<String>,
    pub conflicts: Vec<Conflict>,
    pub next_steps: Vec<String>,
    pub completion_pct: u32,
    pub merged_artifacts: Vec<MergedArtifact>,
}

/// Human summary for a single output: `"Completed in Nms, K artifacts, T
/// tokens"` on success, `"Failed: <msg>"` otherwise (spec §4.5).
pub fn summarise(output: &AgentOutput) -> String {
    if output.success {
        format!(
            "Completed in {}ms, {} artifacts, {} tokens",
            output.metrics.duration_ms,
            output.artifacts.len(),
            output.metrics.tokens_used
        )
    } else {
        let msg = output.errors.first().cloned().unwrap_or_else(|| "unknown error".to_string());
        format!("Failed: {msg}")
    }
}

/// Any sanitised artifact path written by >=2 distinct agents (spec §4.5).
pub fn detect_file_conflicts(outputs: &[AgentOutput]) -> Vec<Conflict> {
    let mut writers: HashMap<String, HashSet<String>> = HashMap::new();
    for output in outputs {
        for artifact in &output.artifacts {
            writers
                .entry(artifact.path.clone())
                .or_default()
                .insert(output.agent_id.clone());
        }
    }
    writers
        .into_iter()
        .filter(|(_, agents)| agents.len() >= 2)
        .map(|(path, agents)| {
            let mut agents: Vec<_> = agents.into_iter().collect();
            agents.sort();
            Conflict {
                kind: "file_conflict".to_string(),
                severity: ConflictSeverity::Medium,
                detail: format!("`{path}` written by {}", agents.join(", ")),
            }
        })
        .collect()
}

/// If `suggestNext` intersects `skipAgents` across outputs, emit a
/// `routing_conflict` (spec §4.5).
pub fn detect_routing_conflicts(outputs: &[AgentOutput]) -> Vec<Conflict> {
    let suggest: HashSet<&str> = outputs
        .iter()
        .flat_map(|o| o.routing_hints.suggest_next.iter().map(String::as_str))
        .collect();
    let skip: HashSet<&str> = outputs
        .iter()
        .flat_map(|o| o.routing_hints.skip_agents.iter().map(String::as_str))
        .collect();

    let overlap: Vec<&str> = suggest.intersection(&skip).copied().collect();
    if overlap.is_empty() {
        return Vec::new();
    }
    let mut overlap = overlap;
    overlap.sort();
    vec![Conflict {
        kind: "routing_conflict".to_string(),
        severity: ConflictSeverity::Low,
        detail: format!("agent(s) both suggested and skipped: {}", overlap.join(", ")),
    }]
}

/// Union of `suggestNext`, plus approval/failure/finalize steps (spec §4.5).
pub fn determine_next_steps(outputs: &[AgentOutput]) -> Vec<String> {
    let mut steps = Vec::new();
    let mut seen = HashSet::new();
    for output in outputs {
        for next in &output.routing_hints.suggest_next {
            if seen.insert(next.clone()) {
                steps.push(next.clone());
            }
        }
    }

    if outputs.iter().any(|o| o.routing_hints.needs_approval) {
        steps.push("Obtain user approval".to_string());
    }

    let failed = outputs.iter().filter(|o| !o.success).count();
    if failed > 0 {
        steps.push(format!("Fix {failed} failed agent(s)"));
    }

    if !outputs.is_empty() && outputs.iter().all(|o| o.routing_hints.is_complete) {
        steps.push("finalize".to_string());
    }

    steps
}

/// `round(100 * completed / total)`, weighting each output +1.0 if
/// successful and complete, +0.5 if successful but not complete, 0 on
/// failure (spec §4.5).
pub fn calculate_completion(outputs: &[AgentOutput]) -> u32 {
    if outputs.is_empty() {
        return 0;
    }
    let total = outputs.len() as f32;
    let completed: f32 = outputs
        .iter()
        .map(|o| {
            if !o.success {
                0.0
            } else if o.routing_hints.is_complete {
                1.0
            } else {
                0.5
            }
        })
        .sum();
    (100.0 * completed / total).round() as u32
}

/// Merge artifacts keyed by sanitised path; last write wins. Logs a warning
/// on overwrite (spec §4.5).
pub fn merge_artifacts(outputs: &[AgentOutput]) -> Vec<MergedArtifact> {
    let mut merged: HashMap<String, MergedArtifact> = HashMap::new();
    for output in outputs {
        for artifact in &output.artifacts {
            if let Some(existing) = merged.get(&artifact.path) {
                warn!(
                    path = %artifact.path,
                    previous_artifact_id = %existing.artifact.id,
                    new_artifact_id = %artifact.id,
                    "artifact overwritten during synthesis"
                );
            }
            merged.insert(
                artifact.path.clone(),
                MergedArtifact {
                    artifact: artifact.clone(),
                    overwritten: merged.contains_key(&artifact.path),
                },
            );
        }
    }
    let mut out: Vec<MergedArtifact> = merged.into_values().collect();
    out.sort_by(|a, b| a.artifact.path.cmp(&b.artifact.path));
    out
}

pub fn has_blocking_failures(outputs: &[AgentOutput]) -> bool {
    outputs.iter().any(|o| !o.success && !o.errors.is_empty())
}

pub fn is_complete(outputs: &[AgentOutput]) -> bool {
    !outputs.is_empty() && outputs.iter().all(|o| o.routing_hints.is_complete)
}

pub fn get_total_tokens(outputs: &[AgentOutput]) -> u32 {
    outputs.iter().map(|o| o.metrics.tokens_used).sum()
}

pub fn get_total_duration(outputs: &[AgentOutput]) -> u64 {
    outputs.iter().map(|o| o.metrics.duration_ms).sum()
}

/// Fold `outputs` into a [`SynthesisResult`].
pub fn synthesise(outputs: &[AgentOutput]) -> Result<SynthesisResult, SynthesisError> {
    if outputs.is_empty() {
        return Err(SynthesisError::EmptyOutputs);
    }

    let mut conflicts = detect_file_conflicts(outputs);
    conflicts.extend(detect_routing_conflicts(outputs));

    Ok(SynthesisResult {
        summaries: outputs.iter().map(summarise).collect(),
        conflicts,
        next_steps: determine_next_steps(outputs),
        completion_pct: calculate_completion(outputs),
        merged_artifacts: merge_artifacts(outputs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metrics, RoutingHints};
    use std::collections::HashMap as StdHashMap;

    fn output(agent_id: &str, success: bool, is_complete: bool) -> AgentOutput {
        AgentOutput {
            agent_id: agent_id.to_string(),
            execution_id: "exec-1".to_string(),
            timestamp: chrono::Utc::now(),
            success,
            result: serde_json::json!({}),
            artifacts: Vec::new(),
            routing_hints: RoutingHints {
                is_complete,
                ..Default::default()
            },
            metrics: Metrics::default(),
            errors: if success { Vec::new() } else { vec!["boom".to_string()] },
        }
    }

    fn artifact(id: &str, path: &str) -> Artifact {
        Artifact::new(id.to_string(), "file", path, "content", StdHashMap::new())
    }

    #[test]
    fn summarise_success_and_failure() {
        let mut ok = output("a", true, true);
        ok.metrics = Metrics {
            duration_ms: 10,
            tokens_used: 5,
            retries: 0,
        };
        assert_eq!(summarise(&ok), "Completed in 10ms, 0 artifacts, 5 tokens");

        let failed = output("b", false, false);
        assert_eq!(summarise(&failed), "Failed: boom");
    }

    #[test]
    fn detects_file_conflict_across_two_agents() {
        let mut a = output("a", true, true);
        a.artifacts.push(artifact("1", "src/app.rs"));
        let mut b = output("b", true, true);
        b.artifacts.push(artifact("2", "src/app.rs"));

        let conflicts = detect_file_conflicts(&[a, b]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, "file_conflict");
        assert_eq!(conflicts[0].severity, ConflictSeverity::Medium);
    }

    #[test]
    fn detects_routing_conflict_on_suggest_skip_overlap() {
        let mut a = output("a", true, true);
        a.routing_hints.suggest_next.push("architect".to_string());
        let mut b = output("b", true, true);
        b.routing_hints.skip_agents.push("architect".to_string());

        let conflicts = detect_routing_conflicts(&[a, b]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, "routing_conflict");
    }

    #[test]
    fn next_steps_includes_approval_and_fix_and_finalize() {
        let mut a = output("a", true, true);
        a.routing_hints.needs_approval = true;
        let b = output("b", false, false);
        let steps = determine_next_steps(&[a, b]);
        assert!(steps.iter().any(|s| s == "Obtain user approval"));
        assert!(steps.iter().any(|s| s == "Fix 1 failed agent(s)"));
        assert!(!steps.contains(&"finalize".to_string()));
    }

    #[test]
    fn completion_weights_success_and_completeness() {
        let complete = output("a", true, true);
        let partial = output("b", true, false);
        let failed = output("c", false, false);
        let pct = calculate_completion(&[complete, partial, failed]);
        // (1.0 + 0.5 + 0.0) / 3 = 0.5 -> 50
        assert_eq!(pct, 50);
    }

    #[test]
    fn merge_artifacts_last_write_wins_and_marks_overwrite() {
        let mut a = output("a", true, true);
        a.artifacts.push(artifact("1", "src/app.rs"));
        let mut b = output("b", true, true);
        b.artifacts.push(artifact("2", "src/app.rs"));

        let merged = merge_artifacts(&[a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].artifact.id, "2");
        assert!(merged[0].overwritten);
    }

    #[test]
    fn synthesise_rejects_empty_outputs() {
        assert!(matches!(synthesise(&[]), Err(SynthesisError::EmptyOutputs)));
    }
}
