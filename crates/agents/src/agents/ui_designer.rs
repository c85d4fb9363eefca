//! UI Designer: runs the style-competition and screens sub-phases of the
//! design state machine (spec.md §4.6 style-selection and screen-approval
//! gates). Which sub-phase it answers for is read from the request's
//! `design_phase` constraint, set by the kernel from `SessionState`.

use async_trait::async_trait;
use serde_json::Value;

use coordination::agent::Agent;
use coordination::collaborators::Message;
use coordination::types::{AgentRequest, Artifact, RoutingHints};

use super::common::{design_phase_hint, markdown_artifact, string_field};

pub struct UiDesignerAgent;

#[async_trait]
impl Agent for UiDesignerAgent {
    fn agent_id(&self) -> &str {
        "ui_designer"
    }

    fn system_prompt(&self, request: &AgentRequest) -> String {
        match design_phase_hint(request).as_deref() {
            Some("Screens") => "You are the UI designer, now producing full screens for the \
                 approved stylesheet. Respond with JSON: \
                 {\"screens\": string} (a short description of the screen set)."
                .to_string(),
            _ => "You are the UI designer, proposing one candidate stylesheet. Respond \
                 with JSON: {\"stylesheet\": string} describing the visual direction."
                .to_string(),
        }
    }

    fn build_messages(&self, request: &AgentRequest) -> Vec<Message> {
        vec![Message::user(format!(
            "style_hint: {:?}",
            request.constraints.get("style_hint")
        ))]
    }

    fn parse_result(
        &self,
        request: &AgentRequest,
        parsed: Value,
        next_artifact_id: &mut dyn FnMut() -> String,
    ) -> Result<(Value, Vec<Artifact>, RoutingHints), String> {
        if design_phase_hint(request).as_deref() == Some("Screens") {
            let screens = string_field(&parsed, "screens")?;
            let artifact = markdown_artifact(
                request,
                self.agent_id(),
                "screens",
                "Screens",
                &screens,
                next_artifact_id,
            );
            let routing = RoutingHints {
                suggest_next: vec!["project_manager".to_string()],
                needs_approval: true,
                ..Default::default()
            };
            return Ok((serde_json::json!({"screens": screens}), vec![artifact], routing));
        }

        let stylesheet = string_field(&parsed, "stylesheet")?;
        let artifact = markdown_artifact(
            request,
            self.agent_id(),
            "stylesheet",
            "Stylesheet",
            &stylesheet,
            next_artifact_id,
        );
        let routing = RoutingHints {
            needs_approval: true,
            ..Default::default()
        };
        Ok((serde_json::json!({"stylesheet": stylesheet}), vec![artifact], routing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::types::Auth;
    use std::collections::HashMap;

    fn request(design_phase: Option<&str>) -> AgentRequest {
        let mut constraints = HashMap::new();
        if let Some(phase) = design_phase {
            constraints.insert("design_phase".to_string(), serde_json::json!(phase));
        }
        AgentRequest {
            task_analysis: Value::Null,
            context_items: Vec::new(),
            previous_outputs: Vec::new(),
            constraints,
            auth: Auth {
                tenant_id: "tenant-1".to_string(),
                user_id: "user-1".to_string(),
                session_id: "session-1".to_string(),
            },
        }
    }

    #[test]
    fn stylesheet_phase_needs_approval_and_no_next_suggestion() {
        let agent = UiDesignerAgent;
        let parsed = serde_json::json!({"stylesheet": "minimal, high contrast"});
        let mut next_id = || "a-1".to_string();
        let (_, artifacts, routing) = agent.parse_result(&request(Some("Stylesheet")), parsed, &mut next_id).unwrap();
        assert!(routing.needs_approval);
        assert_eq!(artifacts[0].path, "ui_designer/stylesheet.md");
    }

    #[test]
    fn screens_phase_suggests_project_manager() {
        let agent = UiDesignerAgent;
        let parsed = serde_json::json!({"screens": "home, pricing, signup"});
        let mut next_id = || "a-1".to_string();
        let (_, _, routing) = agent.parse_result(&request(Some("Screens")), parsed, &mut next_id).unwrap();
        assert_eq!(routing.suggest_next, vec!["project_manager".to_string()]);
        assert!(routing.needs_approval);
    }
}
