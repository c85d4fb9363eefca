//! Kernel configuration (spec §6 "Configuration").
//!
//! Mirrors the teacher's `SwarmConfig` shape: a plain struct with a
//! `Default` impl that reads environment-variable overrides, grounded in
//! `context_packer::packer::max_context_tokens`'s `from_env` helper.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn from_env<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Per-source allocation shares for one agent type's context budget.
/// Shares need not sum to 1.0 — the context manager renormalises over the
/// set of *active* sources each call (spec §4.4 step 3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SourceAllocation {
    pub lessons: f32,
    pub code: f32,
    pub history: f32,
}

impl Default for SourceAllocation {
    fn default() -> Self {
        Self {
            lessons: 0.4,
            code: 0.4,
            history: 0.2,
        }
    }
}

/// Which sources an agent type is configured to use at all.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SourceToggles {
    pub lessons: bool,
    pub code: bool,
    pub history: bool,
}

/// Per-agent-type context budget configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContextBudget {
    pub total_tokens: u32,
    pub sources: SourceToggles,
    pub allocation: SourceAllocation,
}

impl Default for AgentContextBudget {
    fn default() -> Self {
        Self {
            total_tokens: 8_000,
            sources: SourceToggles {
                lessons: true,
                code: true,
                history: false,
            },
            allocation: SourceAllocation::default(),
        }
    }
}

/// Guardrail-related configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GuardrailConfig {
    pub enabled: bool,
    pub strict_mode: bool,
    pub log_violations: bool,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict_mode: true,
            log_violations: true,
        }
    }
}

/// Top-level kernel configuration (spec §6 recognised options).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub max_iterations: u32,
    pub max_token_budget: u32,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub max_failures_per_agent: u32,
    pub guardrails: GuardrailConfig,
    pub context_budgets: HashMap<String, AgentContextBudget>,
    /// Reserved system-prompt tokens subtracted from every agent's context
    /// budget before allocation (spec §4.4).
    pub reserved_system_tokens: u32,
    /// TTL for context-cache entries, in seconds (spec §4.4 step 7).
    pub context_cache_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iterations: from_env("ORCH_MAX_ITERATIONS", 20),
            max_token_budget: from_env("ORCH_MAX_TOKEN_BUDGET", 200_000),
            timeout_ms: from_env("ORCH_TIMEOUT_MS", 600_000),
            max_retries: from_env("ORCH_MAX_RETRIES", 3),
            max_failures_per_agent: from_env("ORCH_MAX_FAILURES_PER_AGENT", 3),
            guardrails: GuardrailConfig::default(),
            context_budgets: HashMap::new(),
            reserved_system_tokens: from_env("ORCH_RESERVED_SYSTEM_TOKENS", 500),
            context_cache_ttl_secs: from_env("ORCH_CONTEXT_CACHE_TTL_SECS", 300),
        }
    }
}

impl Config {
    /// Budget configured for `agent_type`, falling back to the crate default
    /// when the caller hasn't registered one explicitly.
    pub fn budget_for(&self, agent_type: &str) -> AgentContextBudget {
        self.context_budgets
            .get(agent_type)
            .cloned()
            .unwrap_or_default()
    }
}
