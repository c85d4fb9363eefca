//! Agent-type normalisation (spec §4.1).
//!
//! Maps human-friendly synonyms an LLM tends to use for agent names onto the
//! canonical identifiers the kernel routes on, and drops anything
//! unrecognised. Used for every routing-hint array parsed out of LLM output
//! (`suggestNext`, `skipAgents`, decision targets).

use crate::validation::lenient::lenient_id;

/// Canonical agent type identifiers the kernel knows how to route.
pub const KNOWN_AGENT_TYPES: &[&str] =
    &["analyst", "architect", "ui_designer", "project_manager", "orchestrator"];

/// Resolve `raw` to a canonical agent type, applying known synonyms.
/// Returns `None` for anything that isn't a recognised agent after
/// normalisation (the caller drops it, per spec §4.1).
pub fn normalise_agent_type(raw: &str) -> Option<&'static str> {
    let key = lenient_id(raw);
    let canonical = match key.as_str() {
        "analyst" | "research-analyst" | "business-analyst" => "analyst",
        "architect" | "solution-architect" | "system-architect" => "architect",
        "ui-designer" | "designer" | "frontend-designer" | "ui" => "ui_designer",
        "project-manager" | "pm" | "manager" | "proj-manager" => "project_manager",
        "orchestrator" | "kernel" | "coordinator" => "orchestrator",
        other => {
            if KNOWN_AGENT_TYPES.contains(&other) {
                other
            } else {
                return None;
            }
        }
    };
    KNOWN_AGENT_TYPES.iter().find(|&&k| k == canonical).copied()
}

/// Normalise a whole list, dropping unrecognised entries and de-duplicating
/// while preserving first-seen order.
pub fn normalise_agent_list(raw: &[String]) -> Vec<&'static str> {
    let mut out = Vec::new();
    for item in raw {
        if let Some(canonical) = normalise_agent_type(item) {
            if !out.contains(&canonical) {
                out.push(canonical);
            }
        }
    }
    out
}
