//! CLI demo: wires the orchestration kernel to the four reference agents
//! and in-memory fake collaborators, runs one prompt to completion or the
//! first approval gate, and prints the outcome.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use clap::Parser;
use coordination::agent::Agent;
use coordination::clock::{IdGenerator, SystemClock, UuidGenerator};
use coordination::collaborators::{CompletionMetadata, CompletionProvider, Message, Usage};
use coordination::config::Config;
use coordination::context::ContextManager;
use coordination::error::CoreResult;
use coordination::orchestration::{ApprovalResponse, Kernel, OrchestrateOutcome};
use coordination::types::Auth;

use agents::agents::{AnalystAgent, ArchitectAgent, ProjectManagerAgent, UiDesignerAgent};

/// Run one request through the orchestration kernel using scripted agent
/// responses in place of a real model.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// User prompt to orchestrate.
    #[arg(long, default_value = "build a landing page for a coffee shop")]
    prompt: String,

    /// Tenant performing the request.
    #[arg(long, default_value = "tenant-demo")]
    tenant_id: String,
}

fn build_agents() -> HashMap<String, Box<dyn Agent>> {
    let mut agents: HashMap<String, Box<dyn Agent>> = HashMap::new();
    agents.insert("analyst".to_string(), Box::new(AnalystAgent));
    agents.insert("architect".to_string(), Box::new(ArchitectAgent));
    agents.insert("ui_designer".to_string(), Box::new(UiDesignerAgent));
    agents.insert("project_manager".to_string(), Box::new(ProjectManagerAgent));
    agents
}

const MANDATORY_AGENTS: &[&str] = &["analyst", "architect", "ui_designer", "project_manager"];

/// Stands in for a real model in the CLI demo. One [`CompletionProvider`]
/// backs both the kernel's decision engine and every agent's completion
/// call, so it branches on the system prompt to tell which seat it is
/// filling: the decision engine always names itself in its system prompt
/// (see `Kernel::run_loop`), every agent's `system_prompt` names its role.
struct ScenarioProvider;

impl ScenarioProvider {
    fn decide(&self, messages: &[Message]) -> String {
        let completed: Vec<String> = messages
            .first()
            .and_then(|m| serde_json::from_str::<serde_json::Value>(&m.content).ok())
            .and_then(|v| v.get("completed_agents").cloned())
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        match MANDATORY_AGENTS.iter().find(|a| !completed.contains(&a.to_string())) {
            Some(next) => format!(
                r#"{{"reasoning": "dispatching {next}", "action": "dispatch", "targets": [{{"agentId": "{next}"}}]}}"#
            ),
            None => r#"{"reasoning": "all agents done", "action": "complete"}"#.to_string(),
        }
    }
}

#[async_trait]
impl CompletionProvider for ScenarioProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        _metadata: &CompletionMetadata,
    ) -> CoreResult<(String, Usage)> {
        let text = if system.contains("decision engine") {
            self.decide(messages)
        } else if system.contains("You are the analyst") {
            r#"{"summary": "coffee shop landing page", "style_packages": ["warm", "minimal"]}"#.to_string()
        } else if system.contains("You are the architect") {
            r#"{"architecture": "static site with a contact form backend", "decisions": ["use a static site generator"]}"#
                .to_string()
        } else if system.contains("producing full screens") {
            r#"{"screens": "home, menu, contact"}"#.to_string()
        } else if system.contains("You are the UI designer") {
            r#"{"stylesheet": "warm earth tones"}"#.to_string()
        } else if system.contains("You are the project manager") {
            r#"{"plan": "ship the landing page", "tasks": ["draft copy", "build pages"]}"#.to_string()
        } else {
            r#"{"summary": "coffee shop landing page", "complexity": "low"}"#.to_string()
        };
        let output_tokens = (text.len() / 4) as u32;
        Ok((text, Usage { input_tokens: 50, output_tokens }))
    }

    fn provider_id(&self) -> &str {
        "scenario-provider"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("agents=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let provider = ScenarioProvider;

    let clock = SystemClock;
    let ids = UuidGenerator;
    let context_manager = ContextManager::new(None, None, None, 300, 500);
    let kernel = Kernel::new(Config::default(), context_manager, &provider, &clock, &ids, build_agents());

    let auth = Auth {
        tenant_id: args.tenant_id,
        user_id: "cli-user".to_string(),
        session_id: ids.new_id(),
    };

    let mut outcome = kernel.orchestrate("project-demo", &args.prompt, auth).await?;
    loop {
        match outcome {
            OrchestrateOutcome::Completed(result) => {
                println!("{}", serde_json::to_string_pretty(&result)?);
                break;
            }
            OrchestrateOutcome::Failed(reason) => bail!("orchestration failed: {reason}"),
            OrchestrateOutcome::Paused(request) => {
                println!(
                    "paused for approval: session={} prompt={}",
                    request.session_id, request.prompt
                );
                let response = ApprovalResponse {
                    approved: true,
                    selected_option: request.options.first().cloned(),
                };
                outcome = kernel.resume(&request.session_id, response).await?;
            }
        }
    }

    Ok(())
}
