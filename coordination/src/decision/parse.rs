//! Lenient parsing of the LLM-authored `Decision` JSON (spec §4.6 step 2).

use serde_json::Value;

use crate::validation::{lenient_enum, normalise_agent_type};
use crate::types::{ApprovalConfig, Decision, DecisionAction, DispatchTarget};

use super::DecisionError;

const ACTIONS: &[&str] = &["dispatch", "parallel_dispatch", "approval", "wait", "complete", "fail"];

fn parse_action(raw: &str) -> DecisionAction {
    match lenient_enum(raw, ACTIONS, "wait") {
        "dispatch" => DecisionAction::Dispatch,
        "parallel_dispatch" => DecisionAction::ParallelDispatch,
        "approval" => DecisionAction::Approval,
        "complete" => DecisionAction::Complete,
        "fail" => DecisionAction::Fail,
        _ => DecisionAction::Wait,
    }
}

fn parse_target(raw: &Value) -> Option<DispatchTarget> {
    let obj = raw.as_object()?;
    let raw_agent = obj.get("agentId").and_then(Value::as_str)?;
    let agent_id = normalise_agent_type(raw_agent)?;
    let priority = obj.get("priority").and_then(Value::as_u64).unwrap_or(0) as u32;
    let execution_id = obj.get("executionId").and_then(Value::as_str).map(str::to_string);
    let style_hint = obj.get("styleHint").and_then(Value::as_str).map(str::to_string);
    Some(DispatchTarget {
        agent_id: agent_id.to_string(),
        priority,
        execution_id,
        style_hint,
    })
}

/// Parse the raw JSON text an LLM returned for the next `Decision`, applying
/// lenient enum parsing for `action` and agent-name normalisation for every
/// target. Unparseable/absent `targets` entries are dropped rather than
/// failing the whole decision, matching the "never throw on repairable
/// input" contract in §4.1.
pub fn parse_decision(raw: &str) -> Result<Decision, DecisionError> {
    let stripped = strip_code_fences(raw);
    let value: Value =
        serde_json::from_str(&stripped).map_err(|e| DecisionError::Parse(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| DecisionError::Parse("decision is not a JSON object".to_string()))?;

    let reasoning = obj
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let action = obj
        .get("action")
        .and_then(Value::as_str)
        .map(parse_action)
        .unwrap_or(DecisionAction::Wait);

    let targets = obj
        .get("targets")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(parse_target).collect())
        .unwrap_or_default();

    let approval_config = obj.get("approvalConfig").and_then(|v| v.as_object()).map(|cfg| {
        let prompt = cfg.get("prompt").and_then(Value::as_str).unwrap_or_default().to_string();
        let options = cfg
            .get("options")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        ApprovalConfig { prompt, options }
    });

    let error = obj.get("error").and_then(Value::as_str).map(str::to_string);
    let summary = obj.get("summary").and_then(Value::as_str).map(str::to_string);

    Ok(Decision {
        reasoning,
        action,
        targets,
        approval_config,
        error,
        summary,
    })
}

fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
    }
    trimmed.to_string()
}

/// Special orchestrator directives encoded in `reasoning` when the proposed
/// next agent is `orchestrator` (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialAction {
    Complete,
    Pause,
    Escalate,
    Abort,
}

/// Parse a [`SpecialAction`] out of a decision's `reasoning` text.
pub fn parse_special_action(reasoning: &str) -> Option<SpecialAction> {
    let upper = reasoning.to_ascii_uppercase();
    if upper.contains("ABORT") {
        Some(SpecialAction::Abort)
    } else if upper.contains("ESCALATE") {
        Some(SpecialAction::Escalate)
    } else if upper.contains("PAUSE") {
        Some(SpecialAction::Pause)
    } else if upper.contains("COMPLETE") {
        Some(SpecialAction::Complete)
    } else {
        None
    }
}
