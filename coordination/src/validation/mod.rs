//! Validation & Sanitisation (spec §4.1).
//!
//! Repairs LLM JSON before schema validation and normalises externally
//! supplied strings. Nothing in this module throws; coercion always
//! produces a best-effort value, and callers re-validate with a strict
//! schema afterward — see [`StrictSchema`].

pub mod agent_alias;
pub mod coerce;
pub mod lenient;
pub mod path;

pub use agent_alias::{normalise_agent_list, normalise_agent_type, KNOWN_AGENT_TYPES};
pub use coerce::{coerce_tree, CoercionRules};
pub use lenient::{lenient_array, lenient_enum, lenient_id};
pub use path::sanitise_path;

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced once coercion has run and strict validation still fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("field `{field}` has wrong type: expected {expected}")]
    WrongType { field: String, expected: String },

    #[error("value failed schema validation: {0}")]
    SchemaViolation(String),
}

/// Minimal strict-schema check run after coercion: verifies that a set of
/// required string fields are present and non-empty. Real per-agent output
/// schemas (artifact shape, routing hints, etc.) are defined by the
/// downstream agent/artifact layer, which is out of this crate's scope
/// (spec §1); this is the shared "did coercion actually fix it" gate the
/// kernel itself depends on.
pub fn require_string_fields(value: &Value, fields: &[&str]) -> Result<(), ValidationError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ValidationError::SchemaViolation("expected a JSON object".to_string()))?;
    for field in fields {
        match obj.get(*field) {
            None => return Err(ValidationError::MissingField(field.to_string())),
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            Some(Value::String(_)) => {
                return Err(ValidationError::SchemaViolation(format!(
                    "field `{field}` must not be empty"
                )))
            }
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: field.to_string(),
                    expected: "string".to_string(),
                })
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn require_string_fields_passes_when_present() {
        let v = json!({"id": "x", "name": "y"});
        assert!(require_string_fields(&v, &["id", "name"]).is_ok());
    }

    #[test]
    fn require_string_fields_flags_missing() {
        let v = json!({"id": "x"});
        assert_eq!(
            require_string_fields(&v, &["id", "name"]),
            Err(ValidationError::MissingField("name".to_string()))
        );
    }

    #[test]
    fn require_string_fields_flags_empty() {
        let v = json!({"id": "  "});
        assert!(matches!(
            require_string_fields(&v, &["id"]),
            Err(ValidationError::SchemaViolation(_))
        ));
    }
}
