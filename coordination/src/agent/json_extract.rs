//! JSON extraction from raw LLM completion text (spec §4.8): strip
//! Markdown code fences, repair trailing commas, then hand off to
//! `serde_json`.

use serde_json::Value;

/// Strip a leading/trailing ``` fence (optionally tagged `json`) around
/// `raw`, if present.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    match rest.rfind("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

/// Remove a trailing comma that precedes a closing `}` or `]`, scanning
/// outside of string literals so commas inside quoted values are untouched.
fn repair_trailing_commas(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            i += 1;
            continue;
        }
        if c == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Extract the first well-formed JSON value out of raw LLM output: strip
/// code fences, repair trailing commas, then parse.
pub fn extract_json(raw: &str) -> Result<Value, serde_json::Error> {
    let stripped = strip_fences(raw);
    let repaired = repair_trailing_commas(stripped);
    serde_json::from_str(&repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_json_code_fence() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn strips_bare_code_fence() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn repairs_trailing_comma_in_object() {
        let raw = r#"{"a": 1, "b": 2,}"#;
        assert_eq!(extract_json(raw).unwrap(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn repairs_trailing_comma_in_array() {
        let raw = r#"{"a": [1, 2,]}"#;
        assert_eq!(extract_json(raw).unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn leaves_commas_inside_strings_untouched() {
        let raw = r#"{"a": "x, y,"}"#;
        assert_eq!(extract_json(raw).unwrap(), json!({"a": "x, y,"}));
    }

    #[test]
    fn parses_clean_json_unchanged() {
        let raw = r#"{"a": 1}"#;
        assert_eq!(extract_json(raw).unwrap(), json!({"a": 1}));
    }
}
