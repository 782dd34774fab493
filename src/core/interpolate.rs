//! `${...}` template interpolation over JSON value trees
//!
//! Any string anywhere in a params tree may carry placeholders. A string
//! that is exactly one placeholder yields the expression's typed value, so
//! numbers, booleans, and structures pass through unchanged; placeholders
//! embedded in larger strings are rendered: null becomes empty, scalars use
//! their display form, structures compact JSON.

use crate::core::context::RunContext;
use crate::core::error::EngineError;
use crate::expr;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // The expression grammar has no `}`, so a non-greedy scan to the first
    // closing brace is exact.
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").unwrap())
}

/// True when the string is exactly one `${...}` placeholder, the form
/// whose interpolation yields a typed value instead of a rendered string.
pub fn is_single_placeholder(input: &str) -> bool {
    placeholder_re()
        .captures(input)
        .and_then(|c| c.get(0))
        .map(|m| m.as_str() == input)
        .unwrap_or(false)
}

/// Interpolate every template string in `value`, recursively. Non-template
/// values are returned unchanged.
pub fn interpolate(value: &Value, ctx: &RunContext) -> Result<Value, EngineError> {
    match value {
        Value::String(s) => interpolate_str(s, ctx),
        Value::Array(items) => items
            .iter()
            .map(|item| interpolate(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), interpolate(item, ctx)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Interpolate a params map in place of the raw step params.
pub fn interpolate_params(
    params: &Map<String, Value>,
    ctx: &RunContext,
) -> Result<Map<String, Value>, EngineError> {
    let mut out = Map::with_capacity(params.len());
    for (key, value) in params {
        out.insert(key.clone(), interpolate(value, ctx)?);
    }
    Ok(out)
}

fn interpolate_str(input: &str, ctx: &RunContext) -> Result<Value, EngineError> {
    let re = placeholder_re();

    // Whole-string single placeholder: typed passthrough.
    if let Some(captures) = re.captures(input) {
        let whole = captures.get(0).map(|m| m.as_str()).unwrap_or_default();
        if whole == input {
            let inner = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            return expr::evaluate(inner.trim(), ctx);
        }
    } else {
        return Ok(Value::String(input.to_string()));
    }

    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for captures in re.captures_iter(input) {
        let whole = captures.get(0).ok_or_else(|| {
            EngineError::expression(input, "malformed placeholder")
        })?;
        let inner = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        out.push_str(&input[last..whole.start()]);
        let value = expr::evaluate(inner.trim(), ctx)?;
        out.push_str(&render(&value));
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(Value::String(out))
}

/// Render a value for embedding inside a larger string.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        structured => serde_json::to_string(structured).unwrap_or_default(),
    }
}
