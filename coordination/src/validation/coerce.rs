//! Field-directed structural coercion for LLM JSON output (spec §4.1).
//!
//! LLMs asked to emit a boolean as `"true"`, a font stack as
//! `{heading: "Inter", body: "Inter"}`, or a CSS length as the bare number
//! `16` all produce JSON that is *semantically* fine but fails a strict
//! schema. `coerce_tree` repairs these shapes before strict validation runs.
//! It never fails — worst case it leaves a value untouched and the caller's
//! strict schema surfaces the problem (spec §4.1 "Failure semantics").

use serde_json::{Map, Value};

/// Recursion depth past which coercion stops touching a subtree, to bound
/// pathological or cyclic-looking LLM output.
const MAX_COERCE_DEPTH: usize = 50;

/// Declares which named fields get which coercion when walking a JSON object.
#[derive(Debug, Clone, Default)]
pub struct CoercionRules<'a> {
    /// Fields that accept `"true"/"yes"/"1"/true/1` (and false counterparts).
    pub boolean_fields: &'a [&'a str],
    /// Fields that unwrap `{ primary: "#xxx" }` -> `"#xxx"`.
    pub colour_fields: &'a [&'a str],
    /// Fields that accept array, map-of-objects, or a bare scalar (wrapped).
    pub array_fields: &'a [&'a str],
    /// Font-family fields: string, array, or `{heading, body, ...}`.
    pub font_family_fields: &'a [&'a str],
    /// CSS-value fields: bare numbers become `"Npx"` (`"0"` for zero).
    pub css_value_fields: &'a [&'a str],
    /// Subset of `css_value_fields` that stay unit-less (`lineHeight`,
    /// `zIndex`, `opacity`, `fontWeight`, ...).
    pub unitless_css_fields: &'a [&'a str],
}

/// Apply `rules` recursively to every object in `value`, depth-bounded at
/// [`MAX_COERCE_DEPTH`].
pub fn coerce_tree(value: Value, rules: &CoercionRules) -> Value {
    coerce_at_depth(value, rules, 0)
}

fn coerce_at_depth(value: Value, rules: &CoercionRules, depth: usize) -> Value {
    if depth >= MAX_COERCE_DEPTH {
        return value;
    }
    match value {
        Value::Object(map) => Value::Object(coerce_object(map, rules, depth)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| coerce_at_depth(v, rules, depth + 1))
                .collect(),
        ),
        other => other,
    }
}

fn coerce_object(map: Map<String, Value>, rules: &CoercionRules, depth: usize) -> Map<String, Value> {
    let mut out = Map::with_capacity(map.len());
    for (key, val) in map {
        let coerced = if rules.boolean_fields.contains(&key.as_str()) {
            coerce_boolean(val)
        } else if rules.colour_fields.contains(&key.as_str()) {
            coerce_colour(val)
        } else if rules.array_fields.contains(&key.as_str()) {
            coerce_array(val)
        } else if rules.font_family_fields.contains(&key.as_str()) {
            coerce_font_family(val)
        } else if rules.css_value_fields.contains(&key.as_str()) {
            let unitless = rules.unitless_css_fields.contains(&key.as_str());
            coerce_css_value(val, unitless)
        } else {
            coerce_at_depth(val, rules, depth + 1)
        };
        out.insert(key, coerced);
    }
    out
}

/// `"true"/"yes"/"1"/true/1` -> `true`; symmetric falsy forms -> `false`.
/// Anything else is recursed into unchanged (it may be a nested object that
/// itself contains boolean-named fields).
fn coerce_boolean(val: Value) -> Value {
    match &val {
        Value::Bool(_) => val,
        Value::String(s) => {
            let normalised = s.trim().to_ascii_lowercase();
            match normalised.as_str() {
                "true" | "yes" | "1" => Value::Bool(true),
                "false" | "no" | "0" => Value::Bool(false),
                _ => val,
            }
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Bool(i != 0)
            } else {
                val
            }
        }
        _ => val,
    }
}

/// `{ primary: "#xxx", ... }` -> `"#xxx"`. Plain strings pass through.
fn coerce_colour(val: Value) -> Value {
    match val {
        Value::Object(ref map) => map
            .get("primary")
            .cloned()
            .unwrap_or(val),
        other => other,
    }
}

/// Array, map-of-objects (`{name: {...}}` -> `[{name, ...}]`), or scalar
/// (wrapped in a single-element array).
fn coerce_array(val: Value) -> Value {
    match val {
        Value::Array(_) => val,
        Value::Null => Value::Array(vec![]),
        Value::Object(map) => {
            let items = map
                .into_iter()
                .map(|(name, mut entry)| {
                    if let Value::Object(ref mut obj) = entry {
                        obj.insert("name".to_string(), Value::String(name));
                        entry
                    } else {
                        let mut obj = Map::new();
                        obj.insert("name".to_string(), Value::String(name));
                        obj.insert("value".to_string(), entry);
                        Value::Object(obj)
                    }
                })
                .collect();
            Value::Array(items)
        }
        other => Value::Array(vec![other]),
    }
}

/// String, array, or `{heading, body, ...}` -> comma-joined font stack with
/// a generic fallback (`sans-serif` unless any family name contains "mono",
/// in which case `monospace`).
fn coerce_font_family(val: Value) -> Value {
    let families: Vec<String> = match val {
        Value::String(s) => vec![s],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::Object(map) => {
            let mut names = Vec::new();
            for key in ["heading", "body", "mono", "primary", "secondary"] {
                if let Some(v) = map.get(key).and_then(Value::as_str) {
                    names.push(v.to_string());
                }
            }
            if names.is_empty() {
                map.values()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            } else {
                names
            }
        }
        other => return other,
    };

    if families.is_empty() {
        return Value::Null;
    }

    let is_mono = families
        .iter()
        .any(|f| f.to_ascii_lowercase().contains("mono"));
    let fallback = if is_mono { "monospace" } else { "sans-serif" };

    let mut stack = families;
    stack.push(fallback.to_string());
    Value::String(stack.join(", "))
}

/// Bare numbers become `"Npx"` (`"0"` for zero) unless the field is
/// `unitless` (line-height, z-index, opacity, font-weight, ...), in which
/// case the bare numeric string is kept as-is.
fn coerce_css_value(val: Value, unitless: bool) -> Value {
    match val {
        Value::Number(n) => {
            if unitless {
                Value::String(n.to_string())
            } else if n.as_f64() == Some(0.0) {
                Value::String("0".to_string())
            } else {
                Value::String(format!("{n}px"))
            }
        }
        other => other,
    }
}
