//! Top-level error taxonomy for the orchestration kernel.
//!
//! Each component defines its own typed error; they all fold into
//! [`CoreError`] via `#[from]` so callers at the crate boundary can match on
//! a single enum or propagate with `?`. Mirrors the error taxonomy in
//! `spec.md` §7: validation failures are not retried, security violations are
//! terminal, transient transport failures are retried by the caller, and
//! phase-gate violations never surface as errors at all (they're corrected
//! and logged, see `decision::phase_gate`).

use thiserror::Error;

use crate::context::ContextError;
use crate::decision::DecisionError;
use crate::guardrails::GuardrailError;
use crate::orchestration::OrchestrationError;
use crate::skills::SkillRegistryError;
use crate::synthesis::SynthesisError;
use crate::validation::ValidationError;

/// Result type alias used throughout the kernel.
pub type CoreResult<T> = Result<T, CoreError>;

/// Top-level error type for the orchestration kernel.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    SkillRegistry(#[from] SkillRegistryError),

    #[error(transparent)]
    Guardrail(#[from] GuardrailError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    /// Authorization/tenancy is missing or malformed (I1).
    #[error("security violation: {0}")]
    Security(String),
}
