//! Orchestration Kernel (spec §4.7): the outer loop. Owns session state,
//! iterations, token budget, timeouts, cancellation, parallel dispatch, and
//! approval suspension/resumption.
//!
//! Grounded in the teacher's `escalation::engine` (owns a tier/session state
//! machine, the outer decide-dispatch-update loop) and `debate::orchestrator`
//! (round loop with a hard iteration cap and circuit breaker), generalised to
//! the decision/dispatch/synthesis cycle and design phase gates spec.md
//! calls for.

mod dispatcher;

pub use dispatcher::{dispatch_parallel, dispatch_single, parallel_batch_made_progress};

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{Agent, BaseWorker};
use crate::clock::{Clock, IdGenerator};
use crate::collaborators::CompletionProvider;
use crate::config::Config;
use crate::context::ContextManager;
use crate::decision::{self, parse_special_action, SpecialAction, ThinkingContext};
use crate::synthesis::{self, SynthesisResult};
use crate::types::{Auth, DecisionAction, DispatchTarget, Phase, Session, SessionState};

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("auth is missing tenant_id, user_id, or session_id")]
    InvalidAuth,
    #[error("user input must be non-empty and under the length bound")]
    InvalidInput,
    #[error("no session found with id `{0}`")]
    UnknownSession(String),
    #[error("session `{0}` is not paused, cannot resume")]
    NotPaused(String),
}

const MAX_INPUT_LEN: usize = 32_000;

/// Request to resume a paused session, supplied out-of-band by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub approved: bool,
    pub selected_option: Option<String>,
}

/// Emitted when the kernel suspends for approval (spec §6 `Orchestrate`
/// return shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub session_id: String,
    pub prompt: String,
    pub options: Vec<String>,
}

/// Terminal or suspended outcome of one `orchestrate`/`resume` call.
#[derive(Debug)]
pub enum OrchestrateOutcome {
    Completed(SynthesisResult),
    Paused(ApprovalRequest),
    Failed(String),
}

struct SessionEntry {
    session: Session,
    cancel: CancellationToken,
    prompt: String,
    classification: serde_json::Value,
    outputs: Vec<crate::types::AgentOutput>,
}

/// Outer orchestration loop. One kernel instance serves many independent
/// sessions; per-session state lives in an in-memory map guarded by a mutex
/// (spec §5: "per-session state is not shared across sessions").
pub struct Kernel<'a> {
    config: Config,
    context_manager: ContextManager,
    provider: &'a dyn CompletionProvider,
    clock: &'a dyn Clock,
    ids: &'a dyn IdGenerator,
    agents: HashMap<String, Box<dyn Agent>>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    provider_registry: crate::registry::ProviderRegistry,
}

impl<'a> Kernel<'a> {
    pub fn new(
        config: Config,
        context_manager: ContextManager,
        provider: &'a dyn CompletionProvider,
        clock: &'a dyn Clock,
        ids: &'a dyn IdGenerator,
        agents: HashMap<String, Box<dyn Agent>>,
    ) -> Self {
        Self {
            config,
            context_manager,
            provider,
            clock,
            ids,
            agents,
            sessions: Mutex::new(HashMap::new()),
            provider_registry: crate::registry::ProviderRegistry::new(),
        }
    }

    /// Rolling health for the wrapped completion provider, keyed by
    /// [`crate::collaborators::CompletionProvider::provider_id`].
    pub fn provider_health(&self) -> Option<crate::registry::ProviderHealth> {
        self.provider_registry.snapshot(self.provider.provider_id())
    }

    pub fn get_current_state(&self, session_id: &str) -> Result<SessionState, OrchestrationError> {
        self.sessions
            .lock()
            .expect("session map lock poisoned")
            .get(session_id)
            .map(|e| e.session.state.clone())
            .ok_or_else(|| OrchestrationError::UnknownSession(session_id.to_string()))
    }

    pub fn get_current_token_usage(&self, session_id: &str) -> Result<u32, OrchestrationError> {
        self.sessions
            .lock()
            .expect("session map lock poisoned")
            .get(session_id)
            .map(|e| e.session.tokens_used)
            .ok_or_else(|| OrchestrationError::UnknownSession(session_id.to_string()))
    }

    /// Cooperative, idempotent cancellation (spec §5).
    pub fn cancel(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.cancel.cancel();
            entry.session.state.phase = Phase::Failed;
        }
    }

    /// `Orchestrate(projectId, userInput, auth, config)` (spec §4.7).
    pub async fn orchestrate(
        &self,
        project_id: &str,
        user_input: &str,
        auth: Auth,
    ) -> Result<OrchestrateOutcome, OrchestrationError> {
        if auth.tenant_id.trim().is_empty() || auth.user_id.trim().is_empty() || auth.session_id.trim().is_empty() {
            return Err(OrchestrationError::InvalidAuth);
        }
        if user_input.trim().is_empty() || user_input.len() > MAX_INPUT_LEN {
            return Err(OrchestrationError::InvalidInput);
        }

        let classification = self.classify_task(user_input).await;

        let session = Session {
            id: auth.session_id.clone(),
            project_id: project_id.to_string(),
            auth: auth.clone(),
            state: SessionState::default(),
            tokens_used: 0,
            started_at: self.clock.now_utc(),
        };
        let cancel = CancellationToken::new();
        let session_id = session.id.clone();
        self.sessions.lock().expect("session map lock poisoned").insert(
            session_id.clone(),
            SessionEntry {
                session,
                cancel: cancel.clone(),
                prompt: user_input.to_string(),
                classification,
                outputs: Vec::new(),
            },
        );

        self.run_loop(&session_id, None, cancel).await
    }

    /// `ResumeOrchestration(sessionId, approvalResponse)` (spec §4.7, §6).
    pub async fn resume(
        &self,
        session_id: &str,
        response: ApprovalResponse,
    ) -> Result<OrchestrateOutcome, OrchestrationError> {
        let cancel = {
            let sessions = self.sessions.lock().expect("session map lock poisoned");
            let entry = sessions
                .get(session_id)
                .ok_or_else(|| OrchestrationError::UnknownSession(session_id.to_string()))?;
            if entry.session.state.phase != Phase::Paused {
                return Err(OrchestrationError::NotPaused(session_id.to_string()));
            }
            entry.cancel.clone()
        };

        let approval_note = self.apply_approval_response(session_id, response)?;
        self.run_loop(session_id, Some(approval_note), cancel).await
    }

    /// Apply an approval/rejection to session state (spec §4.7 "Approval
    /// suspension"); returns a human-readable note fed into the next
    /// decision's `ThinkingContext.approvalResponse`.
    fn apply_approval_response(
        &self,
        session_id: &str,
        response: ApprovalResponse,
    ) -> Result<String, OrchestrationError> {
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| OrchestrationError::UnknownSession(session_id.to_string()))?;
        let state = &mut entry.session.state;

        let note = if response.approved {
            if !state.stylesheet_approved {
                state.stylesheet_approved = true;
                state.design_phase = crate::types::DesignPhase::Screens;
                if let Some(option) = response.selected_option {
                    state.selected_style_id = Some(option);
                }
                "stylesheet approved".to_string()
            } else {
                state.screens_approved = true;
                state.design_phase = crate::types::DesignPhase::Complete;
                "screens approved".to_string()
            }
        } else {
            state.style_iteration += 1;
            if let Some(option) = response.selected_option {
                state.rejected_styles.push(option);
            }
            "approval rejected, re-entering same sub-phase".to_string()
        };
        Ok(note)
    }

    async fn classify_task(&self, user_input: &str) -> serde_json::Value {
        let system = "Classify the following user request for a multi-agent design pipeline. \
                      Respond with JSON {\"summary\": string, \"complexity\": string}.";
        let messages = [crate::collaborators::Message::user(user_input)];
        let metadata = crate::collaborators::CompletionMetadata::new();
        match self.provider.complete(system, &messages, &metadata).await {
            Ok((text, _usage)) => crate::agent::extract_json(&text)
                .unwrap_or_else(|_| serde_json::json!({"summary": user_input, "complexity": "unknown"})),
            Err(_) => serde_json::json!({"summary": user_input, "complexity": "unknown"}),
        }
    }

    async fn run_loop(
        &self,
        session_id: &str,
        approval_response: Option<String>,
        cancel: CancellationToken,
    ) -> Result<OrchestrateOutcome, OrchestrationError> {
        let worker = BaseWorker::new(self.provider, self.clock, self.ids, self.config.max_retries)
            .with_registry(&self.provider_registry);
        let started = self.clock.now_monotonic();

        for _iter in 1..=self.config.max_iterations {
            if cancel.is_cancelled() {
                self.set_phase(session_id, Phase::Failed);
                return Ok(OrchestrateOutcome::Failed("session cancelled".to_string()));
            }

            let elapsed = self.clock.now_monotonic().saturating_duration_since(started);
            if elapsed.as_millis() as u64 > self.config.timeout_ms {
                break;
            }

            let (tokens_used, state_snapshot, auth, prompt, classification, prior_outputs) = {
                let sessions = self.sessions.lock().expect("session map lock poisoned");
                let entry = sessions.get(session_id).expect("session exists");
                (
                    entry.session.tokens_used,
                    entry.session.state.clone(),
                    entry.session.auth.clone(),
                    entry.prompt.clone(),
                    entry.classification.clone(),
                    entry.outputs.clone(),
                )
            };
            if tokens_used >= self.config.max_token_budget {
                break;
            }

            let mut thinking = ThinkingContext::from_state(prompt, classification, &state_snapshot);
            thinking.approval_response = approval_response.clone();
            thinking.last_outputs = prior_outputs.clone();

            let system_prompt = "You are the orchestration kernel's decision engine. \
                Respond with JSON {reasoning, action, targets?, approvalConfig?, error?, summary?}.";
            let decision_result = decision::decide(self.provider, system_prompt, &thinking, &state_snapshot).await;

            let decision = match decision_result {
                Ok(d) => d,
                Err(err) => {
                    warn!(%session_id, error = %err, "decision engine failed, using deterministic fallback");
                    decision::fallback_decision(&state_snapshot)
                }
            };

            if let Some(target) = decision.targets.first() {
                if target.agent_id == "orchestrator" {
                    match parse_special_action(&decision.reasoning) {
                        Some(SpecialAction::Complete) => break,
                        Some(SpecialAction::Pause) => {
                            self.set_phase(session_id, Phase::Paused);
                            return Ok(OrchestrateOutcome::Paused(ApprovalRequest {
                                session_id: session_id.to_string(),
                                prompt: decision.reasoning.clone(),
                                options: Vec::new(),
                            }));
                        }
                        Some(SpecialAction::Escalate) | Some(SpecialAction::Abort) => {
                            self.set_phase(session_id, Phase::Failed);
                            return Ok(OrchestrateOutcome::Failed(decision.reasoning.clone()));
                        }
                        None => {}
                    }
                }
            }

            match decision.action {
                DecisionAction::Complete => break,
                DecisionAction::Fail => {
                    self.set_phase(session_id, Phase::Failed);
                    return Ok(OrchestrateOutcome::Failed(
                        decision.error.unwrap_or_else(|| "decision engine reported failure".to_string()),
                    ));
                }
                DecisionAction::Approval => {
                    self.set_phase(session_id, Phase::Paused);
                    let cfg = decision.approval_config.unwrap_or(crate::types::ApprovalConfig {
                        prompt: decision.reasoning.clone(),
                        options: Vec::new(),
                    });
                    return Ok(OrchestrateOutcome::Paused(ApprovalRequest {
                        session_id: session_id.to_string(),
                        prompt: cfg.prompt,
                        options: cfg.options,
                    }));
                }
                DecisionAction::Wait => continue,
                DecisionAction::Dispatch => {
                    if let Some(target) = decision.targets.first() {
                        let request = self
                            .build_request(&state_snapshot, &auth, target, &prior_outputs)
                            .await;
                        let output = dispatch_single(&worker, &self.agents, target, request).await;
                        self.record_output(session_id, output);
                    }
                }
                DecisionAction::ParallelDispatch => {
                    let mut requests = Vec::new();
                    for target in &decision.targets {
                        requests.push(
                            self.build_request(&state_snapshot, &auth, target, &prior_outputs)
                                .await,
                        );
                    }
                    let batch = dispatch_parallel(&worker, &self.agents, &decision.targets, requests, &cancel).await;
                    for output in batch {
                        self.record_output(session_id, output);
                    }
                }
            }

            self.update_phase(session_id);

            if let Some(health) = self.provider_health() {
                if !health.available {
                    warn!(
                        %session_id,
                        provider_id = self.provider.provider_id(),
                        success_rate = health.success_rate(),
                        "completion provider is degraded"
                    );
                }
            }

            let failure_count = self
                .sessions
                .lock()
                .expect("session map lock poisoned")
                .get(session_id)
                .map(|e| e.session.state.failure_count)
                .unwrap_or(0);
            if failure_count >= self.config.max_failures_per_agent {
                break;
            }
        }

        let outputs = self
            .sessions
            .lock()
            .expect("session map lock poisoned")
            .get(session_id)
            .map(|e| e.outputs.clone())
            .unwrap_or_default();

        if outputs.is_empty() {
            return Ok(OrchestrateOutcome::Failed("no agent produced output".to_string()));
        }

        match synthesis::synthesise(&outputs) {
            Ok(result) => {
                self.set_phase(session_id, Phase::Complete);
                info!(%session_id, completion_pct = result.completion_pct, "orchestration complete");
                Ok(OrchestrateOutcome::Completed(result))
            }
            Err(err) => Ok(OrchestrateOutcome::Failed(err.to_string())),
        }
    }

    async fn build_request(
        &self,
        state: &SessionState,
        auth: &Auth,
        target: &DispatchTarget,
        previous_outputs: &[crate::types::AgentOutput],
    ) -> crate::types::AgentRequest {
        let budget = self.config.budget_for(&target.agent_id);
        let query = crate::context::ContextQuery {
            query: target.agent_id.clone(),
            task_id: None,
            project_id: None,
            agent_type: target.agent_id.clone(),
            tenant_id: auth.tenant_id.clone(),
            token_budget: Some(budget.total_tokens),
            include: crate::context::IncludeSources {
                lessons: budget.sources.lessons,
                code: budget.sources.code,
                history: budget.sources.history,
            },
            filters: crate::context::RetrievalFilters::default(),
        };
        let context_items = match self.context_manager.retrieve(query, &budget).await {
            Ok(bundle) => bundle.items,
            Err(err) => {
                warn!(error = %err, "context retrieval failed, continuing without context");
                Vec::new()
            }
        };

        let mut constraints = HashMap::new();
        constraints.insert(
            "design_phase".to_string(),
            serde_json::json!(format!("{:?}", state.design_phase)),
        );
        if let Some(style_hint) = &target.style_hint {
            constraints.insert("style_hint".to_string(), serde_json::json!(style_hint));
        }

        crate::types::AgentRequest {
            task_analysis: serde_json::Value::Null,
            context_items,
            previous_outputs: previous_outputs.to_vec(),
            constraints,
            auth: auth.clone(),
        }
    }

    fn record_output(&self, session_id: &str, output: crate::types::AgentOutput) {
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.session.tokens_used += output.metrics.tokens_used;
            if output.success {
                if !entry.session.state.completed_agents.contains(&output.agent_id) {
                    entry.session.state.completed_agents.push(output.agent_id.clone());
                }
                entry.session.state.failure_count = 0;
                if output.agent_id == "analyst" {
                    if let Some(packages) = output
                        .result
                        .get("style_packages")
                        .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
                    {
                        if !packages.is_empty() {
                            entry.session.state.style_packages = packages;
                        }
                    }
                }
            } else {
                entry.session.state.failure_count += 1;
            }
            entry.outputs.push(output);
        }
    }

    fn update_phase(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");
        if let Some(entry) = sessions.get_mut(session_id) {
            let state = &mut entry.session.state;
            state.iteration_count += 1;
            state.phase = match (state.phase, state.completed_agents.len()) {
                (Phase::Analysis, n) if n >= 1 => Phase::Design,
                (Phase::Design, n) if n >= 2 => Phase::Implementation,
                (Phase::Implementation, n) if n >= 3 => Phase::Review,
                (other, _) => other,
            };
        }
    }

    fn set_phase(&self, session_id: &str, phase: Phase) {
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.session.state.phase = phase;
        }
    }
}
