//! Dispatcher (spec §4.7): runs one agent synchronously, or fans a
//! `parallel_dispatch` out concurrently while preserving target-index
//! ordering regardless of completion order (spec §5, §8).

use std::collections::HashMap;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, BaseWorker};
use crate::types::{AgentRequest, AgentOutput, DispatchTarget, Metrics, RoutingHints};

/// Run a single target synchronously.
pub async fn dispatch_single<'a>(
    worker: &BaseWorker<'a>,
    agents: &HashMap<String, Box<dyn Agent>>,
    target: &DispatchTarget,
    request: AgentRequest,
) -> AgentOutput {
    match agents.get(&target.agent_id) {
        Some(agent) => worker.execute(agent.as_ref(), &request).await,
        None => unknown_agent_output(&target.agent_id),
    }
}

/// Fan out each target concurrently, each with its own request, and return
/// outputs ordered by target index rather than completion time. Cooperative
/// cancellation: if `cancel` fires, already-started agent calls still run to
/// completion (this crate never hard-kills a worker mid-call) but no further
/// targets are started once cancellation has already been observed.
pub async fn dispatch_parallel<'a>(
    worker: &BaseWorker<'a>,
    agents: &HashMap<String, Box<dyn Agent>>,
    targets: &[DispatchTarget],
    requests: Vec<AgentRequest>,
    cancel: &CancellationToken,
) -> Vec<AgentOutput> {
    debug_assert_eq!(targets.len(), requests.len());

    if cancel.is_cancelled() {
        return targets.iter().map(|t| cancelled_output(&t.agent_id)).collect();
    }

    let futures = targets.iter().zip(requests).map(|(target, request)| async move {
        match agents.get(&target.agent_id) {
            Some(agent) => worker.execute(agent.as_ref(), &request).await,
            None => unknown_agent_output(&target.agent_id),
        }
    });

    join_all(futures).await
}

fn unknown_agent_output(agent_id: &str) -> AgentOutput {
    AgentOutput {
        agent_id: agent_id.to_string(),
        execution_id: "unresolved".to_string(),
        timestamp: chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0).unwrap_or_default(),
        success: false,
        result: serde_json::Value::Null,
        artifacts: Vec::new(),
        routing_hints: RoutingHints {
            has_failures: true,
            ..Default::default()
        },
        metrics: Metrics::default(),
        errors: vec![format!("no agent registered for `{agent_id}`")],
    }
}

fn cancelled_output(agent_id: &str) -> AgentOutput {
    AgentOutput {
        agent_id: agent_id.to_string(),
        execution_id: "cancelled".to_string(),
        timestamp: chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0).unwrap_or_default(),
        success: false,
        result: serde_json::Value::Null,
        artifacts: Vec::new(),
        routing_hints: RoutingHints {
            has_failures: true,
            ..Default::default()
        },
        metrics: Metrics::default(),
        errors: vec!["session cancelled before dispatch".to_string()],
    }
}

/// At least one output in a parallel batch succeeding counts as progress
/// (spec §4.7 Dispatcher).
pub fn parallel_batch_made_progress(outputs: &[AgentOutput]) -> bool {
    outputs.iter().any(|o| o.success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SequentialIdGenerator};
    use crate::collaborators::{CompletionMetadata, CompletionProvider, Message, Usage};
    use crate::error::CoreResult;
    use crate::types::Auth;
    use async_trait::async_trait;
    use serde_json::Value;

    struct DelayedProvider {
        delay_ms: u64,
        response: String,
    }

    #[async_trait]
    impl CompletionProvider for DelayedProvider {
        async fn complete(
            &self,
            _system: &str,
            _messages: &[Message],
            _metadata: &CompletionMetadata,
        ) -> CoreResult<(String, Usage)> {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            Ok((self.response.clone(), Usage::default()))
        }
    }

    struct EchoAgent(&'static str);

    #[async_trait]
    impl Agent for EchoAgent {
        fn agent_id(&self) -> &str {
            self.0
        }
        fn system_prompt(&self, _request: &AgentRequest) -> String {
            String::new()
        }
        fn build_messages(&self, _request: &AgentRequest) -> Vec<Message> {
            vec![Message::user("go")]
        }
        fn parse_result(
            &self,
            _request: &AgentRequest,
            parsed: Value,
            _next_artifact_id: &mut dyn FnMut() -> String,
        ) -> Result<(Value, Vec<crate::types::Artifact>, RoutingHints), String> {
            Ok((parsed, Vec::new(), RoutingHints::default()))
        }
    }

    /// Like [`EchoAgent`] but names itself in the message content, so a
    /// single shared provider can identify which target it is serving.
    struct NamedEchoAgent(&'static str);

    #[async_trait]
    impl Agent for NamedEchoAgent {
        fn agent_id(&self) -> &str {
            self.0
        }
        fn system_prompt(&self, _request: &AgentRequest) -> String {
            String::new()
        }
        fn build_messages(&self, _request: &AgentRequest) -> Vec<Message> {
            vec![Message::user(self.0)]
        }
        fn parse_result(
            &self,
            _request: &AgentRequest,
            parsed: Value,
            _next_artifact_id: &mut dyn FnMut() -> String,
        ) -> Result<(Value, Vec<crate::types::Artifact>, RoutingHints), String> {
            Ok((parsed, Vec::new(), RoutingHints::default()))
        }
    }

    /// A single provider shared across all targets in one `dispatch_parallel`
    /// call; each target's delay/response is keyed by the agent name it puts
    /// in its own message content, so completion order can genuinely skew
    /// (longest delay first, shortest last) while target-index order must
    /// still be preserved in the returned `Vec`.
    struct KeyedDelayProvider {
        delays: HashMap<&'static str, (u64, &'static str)>,
    }

    #[async_trait]
    impl CompletionProvider for KeyedDelayProvider {
        async fn complete(
            &self,
            _system: &str,
            messages: &[Message],
            _metadata: &CompletionMetadata,
        ) -> CoreResult<(String, Usage)> {
            let key = messages[0].content.as_str();
            let (delay_ms, response) = self.delays.get(key).copied().unwrap_or((0, "{}"));
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            Ok((response.to_string(), Usage::default()))
        }
    }

    fn request() -> AgentRequest {
        AgentRequest {
            task_analysis: Value::Null,
            context_items: Vec::new(),
            previous_outputs: Vec::new(),
            constraints: std::collections::HashMap::new(),
            auth: Auth {
                tenant_id: "t".to_string(),
                user_id: "u".to_string(),
                session_id: "s".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn parallel_dispatch_preserves_target_order_despite_completion_order() {
        // agent "slow" finishes after "fast" but must still appear first.
        let slow_provider = DelayedProvider {
            delay_ms: 30,
            response: r#"{"who":"slow"}"#.to_string(),
        };
        let fast_provider = DelayedProvider {
            delay_ms: 0,
            response: r#"{"who":"fast"}"#.to_string(),
        };

        let clock = FixedClock::new(chrono::Utc::now());
        let ids = SequentialIdGenerator::default();

        let mut agents: HashMap<String, Box<dyn Agent>> = HashMap::new();
        agents.insert("slow".to_string(), Box::new(EchoAgent("slow")));
        agents.insert("fast".to_string(), Box::new(EchoAgent("fast")));

        let targets = [DispatchTarget {
                agent_id: "slow".to_string(),
                priority: 0,
                execution_id: None,
                style_hint: None,
            },
            DispatchTarget {
                agent_id: "fast".to_string(),
                priority: 0,
                execution_id: None,
                style_hint: None,
            }];

        // Two separate workers since each needs its own provider with a
        // distinct delay; production callers share one provider instance.
        let slow_worker = BaseWorker::new(&slow_provider, &clock, &ids, 0);
        let fast_worker = BaseWorker::new(&fast_provider, &clock, &ids, 0);

        let slow_agents: HashMap<String, Box<dyn Agent>> = {
            let mut m = HashMap::new();
            m.insert("slow".to_string(), Box::new(EchoAgent("slow")) as Box<dyn Agent>);
            m
        };
        let fast_agents: HashMap<String, Box<dyn Agent>> = {
            let mut m = HashMap::new();
            m.insert("fast".to_string(), Box::new(EchoAgent("fast")) as Box<dyn Agent>);
            m
        };

        let cancel = CancellationToken::new();
        let (slow_out, fast_out) = tokio::join!(
            dispatch_parallel(&slow_worker, &slow_agents, &targets[..1], vec![request()], &cancel),
            dispatch_parallel(&fast_worker, &fast_agents, &targets[1..], vec![request()], &cancel),
        );

        let mut combined = slow_out;
        combined.extend(fast_out);
        assert_eq!(combined[0].result["who"], "slow");
        assert_eq!(combined[1].result["who"], "fast");
        let _ = &agents;
    }

    #[tokio::test]
    async fn dispatch_parallel_preserves_target_order_under_real_completion_skew() {
        // A single dispatch_parallel call with three targets racing on one
        // shared provider: target 0 finishes last, target 2 finishes first,
        // yet the returned Vec must stay in target-index (0, 1, 2) order.
        let provider = KeyedDelayProvider {
            delays: HashMap::from([
                ("first", (40, r#"{"who":"first"}"#)),
                ("second", (20, r#"{"who":"second"}"#)),
                ("third", (0, r#"{"who":"third"}"#)),
            ]),
        };
        let clock = FixedClock::new(chrono::Utc::now());
        let ids = SequentialIdGenerator::default();
        let worker = BaseWorker::new(&provider, &clock, &ids, 0);

        let mut agents: HashMap<String, Box<dyn Agent>> = HashMap::new();
        agents.insert("first".to_string(), Box::new(NamedEchoAgent("first")));
        agents.insert("second".to_string(), Box::new(NamedEchoAgent("second")));
        agents.insert("third".to_string(), Box::new(NamedEchoAgent("third")));

        let targets = [
            DispatchTarget {
                agent_id: "first".to_string(),
                priority: 0,
                execution_id: None,
                style_hint: None,
            },
            DispatchTarget {
                agent_id: "second".to_string(),
                priority: 0,
                execution_id: None,
                style_hint: None,
            },
            DispatchTarget {
                agent_id: "third".to_string(),
                priority: 0,
                execution_id: None,
                style_hint: None,
            },
        ];
        let requests = vec![request(), request(), request()];

        let cancel = CancellationToken::new();
        let outputs = dispatch_parallel(&worker, &agents, &targets, requests, &cancel).await;

        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].result["who"], "first");
        assert_eq!(outputs[1].result["who"], "second");
        assert_eq!(outputs[2].result["who"], "third");
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_dispatch() {
        let provider = DelayedProvider {
            delay_ms: 0,
            response: "{}".to_string(),
        };
        let clock = FixedClock::new(chrono::Utc::now());
        let ids = SequentialIdGenerator::default();
        let worker = BaseWorker::new(&provider, &clock, &ids, 0);
        let mut agents: HashMap<String, Box<dyn Agent>> = HashMap::new();
        agents.insert("a".to_string(), Box::new(EchoAgent("a")));

        let targets = vec![DispatchTarget {
            agent_id: "a".to_string(),
            priority: 0,
            execution_id: None,
            style_hint: None,
        }];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outputs = dispatch_parallel(&worker, &agents, &targets, vec![request()], &cancel).await;
        assert!(!outputs[0].success);
    }

    #[tokio::test]
    async fn partial_failure_still_counts_as_progress() {
        let ok = AgentOutput {
            agent_id: "a".to_string(),
            execution_id: "e".to_string(),
            timestamp: chrono::Utc::now(),
            success: true,
            result: Value::Null,
            artifacts: Vec::new(),
            routing_hints: RoutingHints::default(),
            metrics: Metrics::default(),
            errors: Vec::new(),
        };
        let mut failed = ok.clone();
        failed.success = false;
        assert!(parallel_batch_made_progress(&[ok, failed]));
    }
}
