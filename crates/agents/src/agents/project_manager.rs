//! Project Manager: the terminal agent in the fallback chain (spec.md §4.6).
//! Turns the accumulated artifacts into a delivery plan and marks the
//! session complete.

use async_trait::async_trait;
use serde_json::Value;

use coordination::agent::Agent;
use coordination::collaborators::Message;
use coordination::types::{AgentRequest, Artifact, RoutingHints};

use super::common::{markdown_artifact, string_array_field, string_field};

pub struct ProjectManagerAgent;

#[async_trait]
impl Agent for ProjectManagerAgent {
    fn agent_id(&self) -> &str {
        "project_manager"
    }

    fn system_prompt(&self, _request: &AgentRequest) -> String {
        "You are the project manager, closing out the session. Given the prior \
         artifacts, produce a short delivery plan and a task breakdown. Respond \
         with JSON: {\"plan\": string, \"tasks\": [string]}."
            .to_string()
    }

    fn build_messages(&self, request: &AgentRequest) -> Vec<Message> {
        let prior = request
            .previous_outputs
            .iter()
            .flat_map(|o| o.artifacts.iter().map(|a| a.path.clone()))
            .collect::<Vec<_>>()
            .join(", ");
        vec![Message::user(format!("Artifacts so far: {prior}"))]
    }

    fn parse_result(
        &self,
        request: &AgentRequest,
        parsed: Value,
        next_artifact_id: &mut dyn FnMut() -> String,
    ) -> Result<(Value, Vec<Artifact>, RoutingHints), String> {
        let plan = string_field(&parsed, "plan")?;
        let tasks = string_array_field(&parsed, "tasks");

        let body = if tasks.is_empty() {
            plan.clone()
        } else {
            format!(
                "{plan}\n\n## Tasks\n{}",
                tasks.iter().map(|t| format!("- {t}")).collect::<Vec<_>>().join("\n")
            )
        };

        let artifact = markdown_artifact(
            request,
            self.agent_id(),
            "plan",
            "Delivery Plan",
            &body,
            next_artifact_id,
        );

        let routing = RoutingHints {
            is_complete: true,
            ..Default::default()
        };

        Ok((
            serde_json::json!({"plan": plan, "tasks": tasks}),
            vec![artifact],
            routing,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::types::Auth;
    use std::collections::HashMap;

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

    #[test]
    fn parses_plan_and_marks_complete() {
        let agent = ProjectManagerAgent;
        let parsed = serde_json::json!({"plan": "ship it", "tasks": ["deploy", "monitor"]});
        let mut next_id = || "a-1".to_string();
        let (result, artifacts, routing) = agent.parse_result(&request(), parsed, &mut next_id).unwrap();
        assert_eq!(result["plan"], "ship it");
        assert_eq!(artifacts[0].path, "project_manager/plan.md");
        assert!(routing.is_complete);
    }

    #[test]
    fn missing_plan_is_rejected() {
        let agent = ProjectManagerAgent;
        let parsed = serde_json::json!({});
        let mut next_id = || "a".to_string();
        assert!(agent.parse_result(&request(), parsed, &mut next_id).is_err());
    }
}
