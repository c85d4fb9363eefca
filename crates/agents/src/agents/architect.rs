//! Architect: proposes the structural decisions downstream agents build on.

use async_trait::async_trait;
use serde_json::Value;

use coordination::agent::Agent;
use coordination::collaborators::Message;
use coordination::types::{AgentRequest, Artifact, RoutingHints};

use super::common::{markdown_artifact, string_array_field, string_field};

pub struct ArchitectAgent;

#[async_trait]
impl Agent for ArchitectAgent {
    fn agent_id(&self) -> &str {
        "architect"
    }

    fn system_prompt(&self, _request: &AgentRequest) -> String {
        "You are the architect. Given the analyst's summary, propose a short \
         architecture description and a list of key decisions. Respond with \
         JSON: {\"architecture\": string, \"decisions\": [string]}."
            .to_string()
    }

    fn build_messages(&self, request: &AgentRequest) -> Vec<Message> {
        let prior = request
            .previous_outputs
            .iter()
            .map(|o| o.result.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        vec![Message::user(format!("Prior outputs:\n{prior}"))]
    }

    fn parse_result(
        &self,
        request: &AgentRequest,
        parsed: Value,
        next_artifact_id: &mut dyn FnMut() -> String,
    ) -> Result<(Value, Vec<Artifact>, RoutingHints), String> {
        let architecture = string_field(&parsed, "architecture")?;
        let decisions = string_array_field(&parsed, "decisions");

        let body = if decisions.is_empty() {
            architecture.clone()
        } else {
            format!(
                "{architecture}\n\n## Decisions\n{}",
                decisions.iter().map(|d| format!("- {d}")).collect::<Vec<_>>().join("\n")
            )
        };

        let artifact = markdown_artifact(
            request,
            self.agent_id(),
            "design",
            "Architecture",
            &body,
            next_artifact_id,
        );

        let routing = RoutingHints {
            suggest_next: vec!["ui_designer".to_string()],
            ..Default::default()
        };

        Ok((
            serde_json::json!({"architecture": architecture, "decisions": decisions}),
            vec![artifact],
            routing,
        ))
    }
}
