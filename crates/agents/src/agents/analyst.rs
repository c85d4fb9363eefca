//! Analyst: the mandatory first agent (spec.md §4.6 fallback policy).
//! Breaks the request down and, for design-flavoured requests, proposes the
//! competing style packages the phase-gate enforcer requires before a
//! `ui_designer` dispatch is allowed to proceed (spec.md §4.6 edge case:
//! "UI-Designer dispatch proposed while no style packages exist").

use async_trait::async_trait;
use serde_json::Value;

use coordination::agent::Agent;
use coordination::collaborators::Message;
use coordination::types::{AgentRequest, Artifact, RoutingHints};

use super::common::{markdown_artifact, string_array_field, string_field};

pub struct AnalystAgent;

#[async_trait]
impl Agent for AnalystAgent {
    fn agent_id(&self) -> &str {
        "analyst"
    }

    fn system_prompt(&self, _request: &AgentRequest) -> String {
        "You are the analyst. Break the user's request into a short summary. \
         If the request calls for visual design, propose 2-3 candidate style \
         package ids under `style_packages`. Respond with JSON: \
         {\"summary\": string, \"style_packages\": [string]?}."
            .to_string()
    }

    fn build_messages(&self, request: &AgentRequest) -> Vec<Message> {
        let context = request
            .context_items
            .iter()
            .map(|item| item.content.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");
        vec![Message::user(format!(
            "Task: {}\n\nContext:\n{}",
            request.task_analysis, context
        ))]
    }

    fn parse_result(
        &self,
        request: &AgentRequest,
        parsed: Value,
        next_artifact_id: &mut dyn FnMut() -> String,
    ) -> Result<(Value, Vec<Artifact>, RoutingHints), String> {
        let summary = string_field(&parsed, "summary")?;
        let style_packages = string_array_field(&parsed, "style_packages");

        let artifact = markdown_artifact(
            request,
            self.agent_id(),
            "summary",
            "Analysis Summary",
            &summary,
            next_artifact_id,
        );

        let routing = RoutingHints {
            suggest_next: vec!["architect".to_string()],
            notes: Some(if style_packages.is_empty() {
                "no style packages proposed".to_string()
            } else {
                format!("{} style package(s) proposed", style_packages.len())
            }),
            ..Default::default()
        };

        Ok((
            serde_json::json!({"summary": summary, "style_packages": style_packages}),
            vec![artifact],
            routing,
        ))
    }
}
