//! Decision Engine + Phase-Gate Enforcer (spec §4.6).
//!
//! Asks the LLM for the next routing decision, then **guarantees** it
//! conforms to the phase state machine regardless of what the LLM proposed.
//! Grounded in the teacher's `escalation::engine` (tier-state machine with a
//! calibrated fallback policy) and `router::classifier` (self-contained
//! work-packet/risk types), generalised to the design phase-gate rules.

mod parse;
mod phase_gate;

pub use parse::{parse_decision, parse_special_action, SpecialAction};
pub use phase_gate::enforce_gates;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collaborators::CompletionProvider;
use crate::types::{AgentOutput, DesignPhase, Phase, SessionState};

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("failed to parse decision JSON: {0}")]
    Parse(String),
    #[error("completion provider error: {0}")]
    Provider(String),
}

/// Everything the decision engine needs to ask "what next" (spec §4.6 step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingContext {
    pub prompt: String,
    pub task_classification: serde_json::Value,
    pub completed_agents: Vec<String>,
    pub last_outputs: Vec<AgentOutput>,
    pub style_packages: Vec<String>,
    pub rejected_styles: Vec<String>,
    pub selected_style_id: Option<String>,
    pub approval_response: Option<String>,
    pub error: Option<String>,
    pub design_phase: DesignPhase,
    pub stylesheet_approved: bool,
    pub screens_approved: bool,
}

impl ThinkingContext {
    pub fn from_state(prompt: String, classification: serde_json::Value, state: &SessionState) -> Self {
        Self {
            prompt,
            task_classification: classification,
            completed_agents: state.completed_agents.clone(),
            last_outputs: Vec::new(),
            style_packages: state.style_packages.clone(),
            rejected_styles: state.rejected_styles.clone(),
            selected_style_id: state.selected_style_id.clone(),
            approval_response: None,
            error: None,
            design_phase: state.design_phase,
            stylesheet_approved: state.stylesheet_approved,
            screens_approved: state.screens_approved,
        }
    }
}

/// Ordered mandatory agents for the deterministic fallback policy (spec
/// §4.6 step 4): analyst -> architect -> [gate] -> ui_designer -> [gate] ->
/// project_manager -> complete.
const MANDATORY_AGENTS: &[&str] = &["analyst", "architect", "ui_designer", "project_manager"];

/// Deterministic fallback policy used on decision-parse failure: dispatch
/// the next uncompleted mandatory agent, respecting the same phase gates the
/// enforcer applies to LLM-proposed decisions.
pub fn fallback_decision(state: &SessionState) -> crate::types::Decision {
    use crate::types::{Decision, DecisionAction, DispatchTarget};

    let next_agent = MANDATORY_AGENTS
        .iter()
        .find(|agent| !state.completed_agents.iter().any(|c| c == *agent));

    let Some(next_agent) = next_agent else {
        return Decision {
            reasoning: "all mandatory agents completed".to_string(),
            action: DecisionAction::Complete,
            targets: Vec::new(),
            approval_config: None,
            error: None,
            summary: Some("fallback: nothing left to dispatch".to_string()),
        };
    };

    let proposed = Decision {
        reasoning: "deterministic fallback after decision parse failure".to_string(),
        action: DecisionAction::Dispatch,
        targets: vec![DispatchTarget {
            agent_id: next_agent.to_string(),
            priority: 0,
            execution_id: None,
            style_hint: None,
        }],
        approval_config: None,
        error: None,
        summary: None,
    };

    enforce_gates(proposed, state)
}

/// Ask `provider` for the next decision and run it through lenient parsing
/// and gate enforcement (spec §4.6 steps 2-3). On parse failure, returns the
/// deterministic fallback (step 4) rather than propagating the parse error.
pub async fn decide(
    provider: &dyn CompletionProvider,
    system_prompt: &str,
    context: &ThinkingContext,
    state: &SessionState,
) -> Result<crate::types::Decision, DecisionError> {
    let messages = [crate::collaborators::Message::user(
        serde_json::to_string(context).map_err(|e| DecisionError::Parse(e.to_string()))?,
    )];
    let metadata = crate::collaborators::CompletionMetadata::new();
    let (raw, _usage) = provider
        .complete(system_prompt, &messages, &metadata)
        .await
        .map_err(|e| DecisionError::Provider(e.to_string()))?;

    let decision = match parse_decision(&raw) {
        Ok(decision) => decision,
        Err(_) => return Ok(fallback_decision(state)),
    };

    Ok(enforce_gates(decision, state))
}

/// Special orchestrator-directed action encoded in a decision's `reasoning`
/// when the proposed next agent is `orchestrator` (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTransition {
    Advance(Phase),
    Paused,
    Failed,
}
