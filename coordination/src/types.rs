//! Core data-model entities shared across the kernel's components (spec
//! §3): sessions, agent requests/outputs, decisions, and artifacts.
//! `ContextItem`/`Skill`/`GuardrailResult` live in their owning modules
//! ([`crate::context`], [`crate::skills`], [`crate::guardrails`]).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::sanitise_path;

/// Tenant/user/session authorization context threaded through every call
/// that touches tenant-scoped data (I1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auth {
    pub tenant_id: String,
    pub user_id: String,
    pub session_id: String,
}

/// High-level orchestration phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Analysis,
    Design,
    Implementation,
    Review,
    Complete,
    Failed,
    Paused,
}

/// Design sub-phase state machine (I2): advances only research -> stylesheet
/// -> screens -> complete, with same-phase re-iteration allowed on explicit
/// rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignPhase {
    Research,
    Stylesheet,
    Screens,
    Complete,
}

/// Progress snapshot for one session (spec §3 `SessionState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: Phase,
    pub completed_agents: Vec<String>,
    pub pending_agents: Vec<String>,
    pub failure_count: u32,
    pub iteration_count: u32,
    pub design_phase: DesignPhase,
    pub stylesheet_approved: bool,
    pub screens_approved: bool,
    pub selected_style_id: Option<String>,
    pub style_iteration: u32,
    pub rejected_styles: Vec<String>,
    pub style_packages: Vec<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: Phase::Analysis,
            completed_agents: Vec::new(),
            pending_agents: Vec::new(),
            failure_count: 0,
            iteration_count: 0,
            design_phase: DesignPhase::Research,
            stylesheet_approved: false,
            screens_approved: false,
            selected_style_id: None,
            style_iteration: 0,
            rejected_styles: Vec::new(),
            style_packages: Vec::new(),
        }
    }
}

/// One orchestration run (spec §3 `Session`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_id: String,
    pub auth: Auth,
    pub state: SessionState,
    pub tokens_used: u32,
    pub started_at: DateTime<Utc>,
}

/// Inter-agent routing signals carried inside every output (spec §3
/// `RoutingHints`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingHints {
    pub suggest_next: Vec<String>,
    pub skip_agents: Vec<String>,
    pub needs_approval: bool,
    pub has_failures: bool,
    pub is_complete: bool,
    pub blocked_by: Option<String>,
    pub notes: Option<String>,
}

/// A generated file (spec §3 `Artifact`). `path` is sanitised on
/// construction (I6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub content: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Artifact {
    pub fn new(
        id: String,
        kind: impl Into<String>,
        raw_path: &str,
        content: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id,
            kind: kind.into(),
            path: sanitise_path(raw_path),
            content: content.into(),
            metadata,
        }
    }
}

/// Per-call metrics reported alongside an output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub duration_ms: u64,
    pub tokens_used: u32,
    pub retries: u32,
}

/// Result envelope produced by one agent execution (spec §3 `AgentOutput`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub agent_id: String,
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub result: serde_json::Value,
    pub artifacts: Vec<Artifact>,
    pub routing_hints: RoutingHints,
    pub metrics: Metrics,
    pub errors: Vec<String>,
}

/// A dispatch target inside a [`Decision`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchTarget {
    pub agent_id: String,
    pub priority: u32,
    pub execution_id: Option<String>,
    pub style_hint: Option<String>,
}

/// Configuration describing what's needed to resume a paused session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    pub prompt: String,
    pub options: Vec<String>,
}

/// Proposed next step for the orchestration loop (spec §3 `Decision`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub reasoning: String,
    pub action: DecisionAction,
    pub targets: Vec<DispatchTarget>,
    pub approval_config: Option<ApprovalConfig>,
    pub error: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Dispatch,
    ParallelDispatch,
    Approval,
    Wait,
    Complete,
    Fail,
}

/// Work unit handed to one agent (spec §3 `AgentRequest`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub task_analysis: serde_json::Value,
    pub context_items: Vec<crate::context::ContextItem>,
    pub previous_outputs: Vec<AgentOutput>,
    pub constraints: HashMap<String, serde_json::Value>,
    pub auth: Auth,
}
