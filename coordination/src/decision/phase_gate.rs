//! Phase-gate enforcement (spec §4.6 step 3): the safety kernel. Whatever
//! the LLM proposed, these rules are re-checked and silently corrected
//! before a decision is allowed to dispatch.

use tracing::warn;

use crate::types::{ApprovalConfig, Decision, DecisionAction, DispatchTarget, SessionState};

const STYLE_SELECTION_MAX_ITERATIONS: u32 = 5;
const DESIGN_REVIEW_MAX_ITERATIONS: u32 = 3;

/// Every target a proposed decision would dispatch, whether a single
/// `Dispatch` or a `ParallelDispatch` naming several agents at once. A
/// `parallel_dispatch` is just as capable of naming a gated agent (spec §4.6
/// step 3, I3) as a single `Dispatch` is, so every target must be checked,
/// not only the first.
fn dispatch_targets(decision: &Decision) -> &[DispatchTarget] {
    match decision.action {
        DecisionAction::Dispatch | DecisionAction::ParallelDispatch => &decision.targets,
        _ => &[],
    }
}

fn approval_decision(
    prompt: &str,
    options: Vec<String>,
) -> Decision {
    Decision {
        reasoning: format!("phase gate requires approval: {prompt}"),
        action: DecisionAction::Approval,
        targets: Vec::new(),
        approval_config: Some(ApprovalConfig {
            prompt: prompt.to_string(),
            options,
        }),
        error: None,
        summary: None,
    }
}

fn dispatch_decision(agent_id: &str, reasoning: &str) -> Decision {
    Decision {
        reasoning: reasoning.to_string(),
        action: DecisionAction::Dispatch,
        targets: vec![DispatchTarget {
            agent_id: agent_id.to_string(),
            priority: 0,
            execution_id: None,
            style_hint: None,
        }],
        approval_config: None,
        error: None,
        summary: None,
    }
}

/// Re-check a proposed [`Decision`] against the design phase gates (I3) and
/// rewrite it if any target — whether from a single `Dispatch` or a
/// `ParallelDispatch` naming several agents — violates one, logging the
/// correction. Decisions that don't dispatch `ui_designer`/`project_manager`
/// at all pass through unchanged.
pub fn enforce_gates(decision: Decision, state: &SessionState) -> Decision {
    let original_action = decision.action;

    for target in dispatch_targets(&decision) {
        let agent = target.agent_id.as_str();

        if agent == "ui_designer" && state.style_packages.is_empty() {
            let corrected = dispatch_decision(
                "analyst",
                "phase gate: no style packages exist yet, routing to analyst for style research",
            );
            warn!(
                original_action = ?original_action,
                original_agent = agent,
                corrected_agent = "analyst",
                reason = "ui_designer requires style packages before it can run",
                "phase gate corrected decision"
            );
            return corrected;
        }

        if agent == "ui_designer" && !state.style_packages.is_empty() && !state.stylesheet_approved {
            let corrected = approval_decision("style_selection", state.style_packages.clone());
            warn!(
                original_action = ?original_action,
                original_agent = agent,
                corrected_action = "approval(style_selection)",
                reason = "stylesheet not yet approved",
                iteration_count = state.style_iteration,
                max_iterations = STYLE_SELECTION_MAX_ITERATIONS,
                "phase gate corrected decision"
            );
            return corrected;
        }

        if agent == "project_manager" && !state.screens_approved {
            let corrected = approval_decision("design_review", Vec::new());
            warn!(
                original_action = ?original_action,
                original_agent = agent,
                corrected_action = "approval(design_review)",
                reason = "screens not yet approved",
                max_iterations = DESIGN_REVIEW_MAX_ITERATIONS,
                "phase gate corrected decision"
            );
            return corrected;
        }
    }

    decision
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::default()
    }

    fn dispatch(agent_id: &str) -> Decision {
        Decision {
            reasoning: "test".to_string(),
            action: DecisionAction::Dispatch,
            targets: vec![DispatchTarget {
                agent_id: agent_id.to_string(),
                priority: 0,
                execution_id: None,
                style_hint: None,
            }],
            approval_config: None,
            error: None,
            summary: None,
        }
    }

    #[test]
    fn ui_designer_without_style_packages_reroutes_to_analyst() {
        let decision = enforce_gates(dispatch("ui_designer"), &state());
        assert_eq!(decision.targets[0].agent_id, "analyst");
    }

    #[test]
    fn ui_designer_with_unapproved_stylesheet_requires_approval() {
        let mut s = state();
        s.style_packages.push("pkg-1".to_string());
        let decision = enforce_gates(dispatch("ui_designer"), &s);
        assert_eq!(decision.action, DecisionAction::Approval);
        assert_eq!(decision.approval_config.unwrap().prompt, "style_selection");
    }

    #[test]
    fn ui_designer_with_approved_stylesheet_passes_through() {
        let mut s = state();
        s.style_packages.push("pkg-1".to_string());
        s.stylesheet_approved = true;
        let decision = enforce_gates(dispatch("ui_designer"), &s);
        assert_eq!(decision.action, DecisionAction::Dispatch);
        assert_eq!(decision.targets[0].agent_id, "ui_designer");
    }

    #[test]
    fn project_manager_without_screens_approval_requires_approval() {
        let decision = enforce_gates(dispatch("project_manager"), &state());
        assert_eq!(decision.action, DecisionAction::Approval);
        assert_eq!(decision.approval_config.unwrap().prompt, "design_review");
    }

    #[test]
    fn project_manager_with_screens_approved_passes_through() {
        let mut s = state();
        s.screens_approved = true;
        let decision = enforce_gates(dispatch("project_manager"), &s);
        assert_eq!(decision.action, DecisionAction::Dispatch);
    }

    fn parallel_dispatch(agent_ids: &[&str]) -> Decision {
        Decision {
            reasoning: "test".to_string(),
            action: DecisionAction::ParallelDispatch,
            targets: agent_ids
                .iter()
                .map(|id| DispatchTarget {
                    agent_id: id.to_string(),
                    priority: 0,
                    execution_id: None,
                    style_hint: None,
                })
                .collect(),
            approval_config: None,
            error: None,
            summary: None,
        }
    }

    #[test]
    fn parallel_dispatch_of_ui_designer_without_stylesheet_approval_requires_approval() {
        let mut s = state();
        s.style_packages.push("pkg-1".to_string());
        s.style_packages.push("pkg-2".to_string());
        let decision = enforce_gates(parallel_dispatch(&["ui_designer", "ui_designer"]), &s);
        assert_eq!(decision.action, DecisionAction::Approval);
        assert_eq!(decision.approval_config.unwrap().prompt, "style_selection");
    }

    #[test]
    fn parallel_dispatch_of_project_manager_without_screens_approval_requires_approval() {
        let decision = enforce_gates(parallel_dispatch(&["analyst", "project_manager"]), &state());
        assert_eq!(decision.action, DecisionAction::Approval);
        assert_eq!(decision.approval_config.unwrap().prompt, "design_review");
    }

    #[test]
    fn parallel_dispatch_of_approved_ui_designers_passes_through() {
        let mut s = state();
        s.style_packages.push("pkg-1".to_string());
        s.stylesheet_approved = true;
        let decision = enforce_gates(parallel_dispatch(&["ui_designer", "ui_designer", "ui_designer"]), &s);
        assert_eq!(decision.action, DecisionAction::ParallelDispatch);
        assert_eq!(decision.targets.len(), 3);
    }

    #[test]
    fn non_dispatch_decisions_pass_through_unchanged() {
        let decision = Decision {
            reasoning: "waiting".to_string(),
            action: DecisionAction::Wait,
            targets: Vec::new(),
            approval_config: None,
            error: None,
            summary: None,
        };
        let out = enforce_gates(decision, &state());
        assert_eq!(out.action, DecisionAction::Wait);
    }
}
