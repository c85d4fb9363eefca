//! Lenient parsers for LLM-authored scalars (spec §4.1).
//!
//! These accept the fuzzy variants an LLM tends to produce — mixed case,
//! stray whitespace, underscores instead of hyphens — and fall back to a
//! caller-supplied default rather than failing, matching the "never throw,
//! re-validate with the strict schema after" contract in §4.1.

use serde_json::Value;

/// Normalise `raw` for case/whitespace/underscore-insensitive comparison
/// against enum variant names.
fn normalise_enum_token(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .replace([' ', '_'], "-")
}

/// Parse a lenient enum: case/whitespace/underscore variants of `variants`
/// are accepted; anything else falls back to `default`.
pub fn lenient_enum<'a>(raw: &str, variants: &[&'a str], default: &'a str) -> &'a str {
    let needle = normalise_enum_token(raw);
    variants
        .iter()
        .find(|v| normalise_enum_token(v) == needle)
        .copied()
        .unwrap_or(default)
}

/// Wrap singletons into a one-element array; replace `null` with `[]`;
/// pass arrays through unchanged.
pub fn lenient_array(raw: Value) -> Vec<Value> {
    match raw {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Lower-case, kebab-normalise an identifier (`"My Skill_ID"` -> `"my-skill-id"`).
pub fn lenient_id(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_sep = false;
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('-');
            last_was_sep = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}
