//! Guardrail Engine (spec §4.3).
//!
//! Two ordered collections — input guardrails and output guardrails — each
//! checked before dispatch / before surfacing an output. Grounded in the
//! teacher's `verifier::safety_scan` (`SafetyWarning`/`WarningCategory`/const
//! pattern table shape) and `debate::guardrails`, generalised from Rust-unsafe
//! patterns to secret/PII/prompt-injection/OWASP pattern catalogues.

mod builtins;
mod patterns;

pub use builtins::{
    malicious_content_guardrail, owasp_detection_guardrail, pii_guardrail,
    prompt_injection_guardrail, secret_detection_guardrail,
};
pub use patterns::{Confidence, OwaspMatch, SecretMatch};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// IDs that can never be disabled or removed (spec §4.3).
pub const CRITICAL_GUARDRAIL_IDS: &[&str] = &[
    "builtin:secret-detection",
    "builtin:owasp-detection",
    "builtin:prompt-injection",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// Output kinds a guardrail can restrict itself to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Code,
    Text,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub guardrail_id: String,
    pub message: String,
    pub severity: Severity,
}

/// Validation outcome (spec §3 `GuardrailResult`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub valid: bool,
    pub violations: Vec<Violation>,
    pub warnings: Vec<Violation>,
}

impl GuardrailResult {
    fn ok() -> Self {
        Self {
            valid: true,
            violations: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GuardrailError {
    #[error("guardrail `{0}` is critical and cannot be disabled or removed")]
    CannotDisableCritical(String),
}

/// A single pass/fail or warn judgement from one guardrail invocation.
pub struct CheckOutcome {
    pub valid: bool,
    pub message: Option<String>,
}

impl CheckOutcome {
    pub fn pass() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
        }
    }
}

/// Additional context a guardrail may use (tenant scoping, declared output
/// kind for output-only guardrails).
#[derive(Debug, Clone, Default)]
pub struct GuardrailContext {
    pub tenant_id: Option<String>,
    pub output_kind: Option<OutputKind>,
}

#[async_trait]
pub trait Guardrail: Send + Sync {
    fn id(&self) -> &str;
    fn enabled(&self) -> bool;
    fn severity(&self) -> Severity;
    /// `None` means "applies to every output kind" (always true for input
    /// guardrails).
    fn applies_to(&self) -> Option<&[OutputKind]> {
        None
    }
    async fn validate(&self, content: &str, context: &GuardrailContext) -> CheckOutcome;
}

/// Ordered, mutable collection of guardrails with the strict/non-strict
/// execution contract from spec §4.3.
pub struct GuardrailChain {
    guardrails: Vec<Box<dyn Guardrail>>,
    strict_mode: bool,
}

impl GuardrailChain {
    pub fn new(strict_mode: bool) -> Self {
        Self {
            guardrails: Vec::new(),
            strict_mode,
        }
    }

    pub fn push(&mut self, guardrail: Box<dyn Guardrail>) {
        self.guardrails.push(guardrail);
    }

    /// Remove a guardrail by id. Rejects removal of a critical built-in.
    pub fn remove(&mut self, id: &str) -> Result<(), GuardrailError> {
        if CRITICAL_GUARDRAIL_IDS.contains(&id) {
            return Err(GuardrailError::CannotDisableCritical(id.to_string()));
        }
        self.guardrails.retain(|g| g.id() != id);
        Ok(())
    }

    /// Run the chain against `content`, honouring registration order,
    /// `enabled`, and output-kind restriction. In strict mode, the first
    /// `severity=error` violation short-circuits with `valid=false`. In
    /// non-strict mode every guardrail runs and violations/warnings
    /// accumulate.
    pub async fn run(&self, content: &str, context: &GuardrailContext) -> GuardrailResult {
        let mut result = GuardrailResult::ok();

        for guardrail in &self.guardrails {
            if !guardrail.enabled() {
                continue;
            }
            if let Some(kinds) = guardrail.applies_to() {
                match context.output_kind {
                    Some(kind) if kinds.contains(&kind) => {}
                    _ => continue,
                }
            }

            let outcome = guardrail.validate(content, context).await;
            if outcome.valid {
                continue;
            }

            let violation = Violation {
                guardrail_id: guardrail.id().to_string(),
                message: outcome.message.unwrap_or_else(|| "guardrail failed".to_string()),
                severity: guardrail.severity(),
            };

            match guardrail.severity() {
                Severity::Error => {
                    result.valid = false;
                    result.violations.push(violation);
                    if self.strict_mode {
                        return result;
                    }
                }
                Severity::Warning => {
                    result.warnings.push(violation);
                }
            }
        }

        result
    }
}
