//! Agent Runtime Contract (spec §4.8): the shared shape every agent obeys.
//!
//! Grounded in the teacher's `crates/swarm-agents/src/agents/mod.rs`
//! (`AgentFactory` pattern: a thin per-agent-type trait wrapped by shared
//! execution plumbing) and `orchestrator::query_kb_with_failsafe`
//! (retry-with-graceful-degradation shape), generalised to the full
//! timing/retry/logging/JSON-extraction/artifact-ID contract spec.md calls
//! for.

mod json_extract;

pub use json_extract::extract_json;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::clock::{Clock, IdGenerator};
use crate::collaborators::{CompletionMetadata, CompletionProvider, Message};
use crate::registry::ProviderRegistry;
use crate::types::{AgentOutput, AgentRequest, Artifact, Metrics, RoutingHints};

/// Capabilities every agent is expected to cover (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ClassifyInput,
    BuildPrompt,
    ParseOutput,
    ProduceArtifacts,
    GenerateRoutingHints,
}

pub const ALL_CAPABILITIES: [Capability; 5] = [
    Capability::ClassifyInput,
    Capability::BuildPrompt,
    Capability::ParseOutput,
    Capability::GenerateRoutingHints,
    Capability::ProduceArtifacts,
];

/// Per-agent logic: the part specific to `analyst`/`architect`/etc. The
/// surrounding timing/retry/JSON-repair/error-normalisation machinery lives
/// in [`BaseWorker`], shared by every concrete agent.
#[async_trait]
pub trait Agent: Send + Sync {
    fn agent_id(&self) -> &str;

    fn capabilities(&self) -> &'static [Capability] {
        &ALL_CAPABILITIES
    }

    /// System prompt framing this agent's task (spec §4.8 `BuildPrompt`).
    fn system_prompt(&self, request: &AgentRequest) -> String;

    /// Chat messages built from the request (spec §4.8 `BuildPrompt`).
    fn build_messages(&self, request: &AgentRequest) -> Vec<Message>;

    /// Parse the extracted JSON result into `(result, artifacts, routing
    /// hints)` (spec §4.8 `ParseOutput`/`ProduceArtifacts`/
    /// `GenerateRoutingHints`). `next_artifact_id` mints a fresh artifact ID
    /// per call.
    fn parse_result(
        &self,
        request: &AgentRequest,
        parsed: Value,
        next_artifact_id: &mut dyn FnMut() -> String,
    ) -> Result<(Value, Vec<Artifact>, RoutingHints), String>;
}

/// Shared execution plumbing wrapping any [`Agent`] (spec §4.8): timing,
/// bounded retry, structured logging with tenant context, JSON extraction
/// from LLM text, artifact ID generation, and error normalisation into a
/// failed [`AgentOutput`] rather than a propagated error.
pub struct BaseWorker<'a> {
    pub provider: &'a dyn CompletionProvider,
    pub clock: &'a dyn Clock,
    pub ids: &'a dyn IdGenerator,
    pub max_retries: u32,
    pub registry: Option<&'a ProviderRegistry>,
}

impl<'a> BaseWorker<'a> {
    pub fn new(
        provider: &'a dyn CompletionProvider,
        clock: &'a dyn Clock,
        ids: &'a dyn IdGenerator,
        max_retries: u32,
    ) -> Self {
        Self {
            provider,
            clock,
            ids,
            max_retries,
            registry: None,
        }
    }

    /// Attach a [`ProviderRegistry`] to record this provider's rolling
    /// success/failure health.
    pub fn with_registry(mut self, registry: &'a ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Execute `agent` against `request`, producing an [`AgentOutput`] that
    /// is never an `Err` — transport/parse failures are normalised into
    /// `success: false` with `errors` populated, per spec §4.8/§7.
    pub async fn execute(&self, agent: &dyn Agent, request: &AgentRequest) -> AgentOutput {
        let started = self.clock.now_monotonic();
        let execution_id = self.ids.new_id();
        let tenant_id = request.auth.tenant_id.clone();

        info!(
            agent_id = agent.agent_id(),
            %execution_id,
            %tenant_id,
            "dispatching agent"
        );

        let system = agent.system_prompt(request);
        let messages = agent.build_messages(request);
        let metadata = CompletionMetadata::new();

        let mut attempt = 0;
        let mut last_error = String::new();
        let (raw_text, tokens_used) = loop {
            attempt += 1;
            let call_started = self.clock.now_monotonic();
            match self.provider.complete(&system, &messages, &metadata).await {
                Ok((text, usage)) => {
                    if let Some(registry) = self.registry {
                        let latency_ms = self.clock.now_monotonic().saturating_duration_since(call_started).as_millis() as u64;
                        registry.record_success(self.provider.provider_id(), latency_ms);
                    }
                    break (Some(text), usage.total());
                }
                Err(err) => {
                    last_error = err.to_string();
                    if let Some(registry) = self.registry {
                        registry.record_failure(self.provider.provider_id(), &last_error);
                    }
                    warn!(
                        agent_id = agent.agent_id(),
                        %execution_id,
                        attempt,
                        error = %last_error,
                        "agent completion attempt failed"
                    );
                    if attempt > self.max_retries {
                        break (None, 0);
                    }
                }
            }
        };

        let duration_ms = self.clock.now_monotonic().saturating_duration_since(started).as_millis() as u64;
        let timestamp = self.clock.now_utc();

        let Some(raw_text) = raw_text else {
            return AgentOutput {
                agent_id: agent.agent_id().to_string(),
                execution_id,
                timestamp,
                success: false,
                result: Value::Null,
                artifacts: Vec::new(),
                routing_hints: RoutingHints {
                    has_failures: true,
                    ..Default::default()
                },
                metrics: Metrics {
                    duration_ms,
                    tokens_used,
                    retries: attempt.saturating_sub(1),
                },
                errors: vec![format!("completion failed after {attempt} attempt(s): {last_error}")],
            };
        };

        let parsed = match extract_json(&raw_text) {
            Ok(value) => value,
            Err(err) => {
                return AgentOutput {
                    agent_id: agent.agent_id().to_string(),
                    execution_id,
                    timestamp,
                    success: false,
                    result: Value::Null,
                    artifacts: Vec::new(),
                    routing_hints: RoutingHints {
                        has_failures: true,
                        ..Default::default()
                    },
                    metrics: Metrics {
                        duration_ms,
                        tokens_used,
                        retries: attempt.saturating_sub(1),
                    },
                    errors: vec![format!("could not extract JSON from agent output: {err}")],
                };
            }
        };

        let mut next_id = {
            let ids = self.ids;
            let agent_id = agent.agent_id().to_string();
            let mut counter = 0u32;
            move || {
                counter += 1;
                format!("{agent_id}-artifact-{counter}-{}", ids.new_id())
            }
        };

        match agent.parse_result(request, parsed, &mut next_id) {
            Ok((result, artifacts, routing_hints)) => AgentOutput {
                agent_id: agent.agent_id().to_string(),
                execution_id,
                timestamp,
                success: true,
                result,
                artifacts,
                routing_hints,
                metrics: Metrics {
                    duration_ms,
                    tokens_used,
                    retries: attempt.saturating_sub(1),
                },
                errors: Vec::new(),
            },
            Err(message) => AgentOutput {
                agent_id: agent.agent_id().to_string(),
                execution_id,
                timestamp,
                success: false,
                result: Value::Null,
                artifacts: Vec::new(),
                routing_hints: RoutingHints {
                    has_failures: true,
                    ..Default::default()
                },
                metrics: Metrics {
                    duration_ms,
                    tokens_used,
                    retries: attempt.saturating_sub(1),
                },
                errors: vec![message],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SequentialIdGenerator};
    use crate::collaborators::Usage;
    use crate::error::CoreResult;
    use crate::types::Auth;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubProvider {
        responses: std::sync::Mutex<Vec<CoreResult<(String, Usage)>>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl CompletionProvider for StubProvider {
        async fn complete(
            &self,
            _system: &str,
            _messages: &[Message],
            _metadata: &CompletionMetadata,
        ) -> CoreResult<(String, Usage)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().pop().unwrap()
        }
    }

    struct EchoAgent;

    #[async_trait]
    impl Agent for EchoAgent {
        fn agent_id(&self) -> &str {
            "echo"
        }

        fn system_prompt(&self, _request: &AgentRequest) -> String {
            "you are echo".to_string()
        }

        fn build_messages(&self, _request: &AgentRequest) -> Vec<Message> {
            vec![Message::user("go")]
        }

        fn parse_result(
            &self,
            _request: &AgentRequest,
            parsed: Value,
            next_artifact_id: &mut dyn FnMut() -> String,
        ) -> Result<(Value, Vec<Artifact>, RoutingHints), String> {
            let _ = next_artifact_id();
            Ok((parsed, Vec::new(), RoutingHints::default()))
        }
    }

    fn request() -> AgentRequest {
        AgentRequest {
            task_analysis: Value::Null,
            context_items: Vec::new(),
            previous_outputs: Vec::new(),
            constraints: HashMap::new(),
            auth: Auth {
                tenant_id: "tenant-1".to_string(),
                user_id: "user-1".to_string(),
                session_id: "session-1".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn successful_completion_produces_success_output() {
        let provider = StubProvider {
            responses: std::sync::Mutex::new(vec![Ok((r#"{"ok": true}"#.to_string(), Usage::default()))]),
            calls: AtomicU32::new(0),
        };
        let clock = FixedClock::new(chrono::Utc::now());
        let ids = SequentialIdGenerator::default();
        let worker = BaseWorker::new(&provider, &clock, &ids, 3);
        let output = worker.execute(&EchoAgent, &request()).await;
        assert!(output.success);
        assert_eq!(output.result, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn retries_on_transient_failure_then_succeeds() {
        let provider = StubProvider {
            responses: std::sync::Mutex::new(vec![
                Ok((r#"{"ok": true}"#.to_string(), Usage::default())),
                Err(crate::error::CoreError::Security("transient".to_string())),
            ]),
            calls: AtomicU32::new(0),
        };
        let clock = FixedClock::new(chrono::Utc::now());
        let ids = SequentialIdGenerator::default();
        let worker = BaseWorker::new(&provider, &clock, &ids, 2);
        let output = worker.execute(&EchoAgent, &request()).await;
        assert!(output.success);
        assert_eq!(output.metrics.retries, 1);
    }

    #[tokio::test]
    async fn exhausting_retries_produces_failed_output_not_panic() {
        let provider = StubProvider {
            responses: std::sync::Mutex::new(vec![
                Err(crate::error::CoreError::Security("down".to_string())),
                Err(crate::error::CoreError::Security("down".to_string())),
            ]),
            calls: AtomicU32::new(0),
        };
        let clock = FixedClock::new(chrono::Utc::now());
        let ids = SequentialIdGenerator::default();
        let worker = BaseWorker::new(&provider, &clock, &ids, 1);
        let output = worker.execute(&EchoAgent, &request()).await;
        assert!(!output.success);
        assert!(!output.errors.is_empty());
    }

    #[tokio::test]
    async fn malformed_json_is_normalised_not_panicking() {
        let provider = StubProvider {
            responses: std::sync::Mutex::new(vec![Ok(("not json".to_string(), Usage::default()))]),
            calls: AtomicU32::new(0),
        };
        let clock = FixedClock::new(chrono::Utc::now());
        let ids = SequentialIdGenerator::default();
        let worker = BaseWorker::new(&provider, &clock, &ids, 0);
        let output = worker.execute(&EchoAgent, &request()).await;
        assert!(!output.success);
    }
}
