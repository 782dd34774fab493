//! AST evaluation against a run context
//!
//! Paths rooted in a scope (`results.greet.text`) keep track of where they
//! came from, so a missing segment reports a `Resolution` error naming the
//! scope and path rather than a generic expression failure. Everything else
//! (arithmetic, comparisons, type mismatches, division by zero) reports an
//! `Expression` error carrying the original expression text.

use crate::core::context::{RunContext, Scope};
use crate::core::error::EngineError;
use crate::expr::parse::{BinaryOp, Expr, UnaryOp};
use serde_json::{Number, Value};
use std::str::FromStr;

/// Evaluate a parsed expression. `source` is the original expression text,
/// used verbatim in error reports.
pub fn eval(expr: &Expr, source: &str, ctx: &RunContext) -> Result<Value, EngineError> {
    Ok(eval_resolved(expr, source, ctx)?.value)
}

/// Truthiness: null, false, zero, empty string, and empty containers are
/// false; everything else is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// A value plus, when it was reached by descending from a scope root, the
/// scope and path that produced it.
struct Resolved {
    value: Value,
    origin: Option<(Scope, String)>,
}

impl Resolved {
    fn plain(value: Value) -> Self {
        Self {
            value,
            origin: None,
        }
    }
}

fn eval_resolved(expr: &Expr, source: &str, ctx: &RunContext) -> Result<Resolved, EngineError> {
    match expr {
        Expr::Int(n) => Ok(Resolved::plain(Value::from(*n))),
        Expr::Float(n) => Ok(Resolved::plain(json_f64(*n, source)?)),
        Expr::Str(s) => Ok(Resolved::plain(Value::String(s.clone()))),
        Expr::Bool(b) => Ok(Resolved::plain(Value::Bool(*b))),
        Expr::Null => Ok(Resolved::plain(Value::Null)),

        Expr::Ident(name) => match Scope::from_str(name) {
            Ok(scope) => Ok(Resolved {
                value: Value::Object(ctx.scope_object(scope)),
                origin: Some((scope, String::new())),
            }),
            Err(()) => Err(EngineError::expression(
                source,
                format!(
                    "unknown identifier `{}` (paths start with variables, results, state, or loop)",
                    name
                ),
            )),
        },

        Expr::Field(base, name) => {
            let base = eval_resolved(base, source, ctx)?;
            descend_key(base, name, source)
        }

        Expr::Index(base, index) => {
            let base = eval_resolved(base, source, ctx)?;
            let index = eval_resolved(index, source, ctx)?.value;
            match index {
                Value::String(key) => descend_key(base, &key, source),
                Value::Number(n) => {
                    let i = n.as_i64().ok_or_else(|| {
                        EngineError::expression(source, format!("invalid index `{}`", n))
                    })?;
                    descend_index(base, i, source)
                }
                other => Err(EngineError::expression(
                    source,
                    format!("cannot index with a {}", type_name(&other)),
                )),
            }
        }

        Expr::Slice(base, start, end) => {
            let base = eval_resolved(base, source, ctx)?.value;
            let start = start
                .as_ref()
                .map(|e| eval_int(e, source, ctx))
                .transpose()?;
            let end = end.as_ref().map(|e| eval_int(e, source, ctx)).transpose()?;
            match base {
                Value::Array(items) => {
                    let (from, to) = slice_bounds(items.len(), start, end);
                    Ok(Resolved::plain(Value::Array(items[from..to].to_vec())))
                }
                Value::String(s) => {
                    let chars: Vec<char> = s.chars().collect();
                    let (from, to) = slice_bounds(chars.len(), start, end);
                    Ok(Resolved::plain(Value::String(
                        chars[from..to].iter().collect(),
                    )))
                }
                other => Err(EngineError::expression(
                    source,
                    format!("cannot slice a {}", type_name(&other)),
                )),
            }
        }

        Expr::Method(base, name, args) => {
            let base = eval_resolved(base, source, ctx)?.value;
            match (name.as_str(), base) {
                ("lower", Value::String(s)) => {
                    if !args.is_empty() {
                        return Err(EngineError::expression(source, "lower() takes no arguments"));
                    }
                    Ok(Resolved::plain(Value::String(s.to_lowercase())))
                }
                ("lower", other) => Err(EngineError::expression(
                    source,
                    format!("lower() is not defined on a {}", type_name(&other)),
                )),
                (other, _) => Err(EngineError::expression(
                    source,
                    format!("unknown method `{}()`", other),
                )),
            }
        }

        Expr::Unary(UnaryOp::Not, inner) => {
            let value = eval_resolved(inner, source, ctx)?.value;
            Ok(Resolved::plain(Value::Bool(!is_truthy(&value))))
        }

        Expr::Unary(UnaryOp::Neg, inner) => {
            let value = eval_resolved(inner, source, ctx)?.value;
            match value {
                Value::Number(n) if n.is_i64() => {
                    let negated = n
                        .as_i64()
                        .and_then(i64::checked_neg)
                        .ok_or_else(|| EngineError::expression(source, "integer overflow"))?;
                    Ok(Resolved::plain(Value::from(negated)))
                }
                Value::Number(n) => {
                    let f = n
                        .as_f64()
                        .ok_or_else(|| EngineError::expression(source, "invalid number"))?;
                    Ok(Resolved::plain(json_f64(-f, source)?))
                }
                other => Err(EngineError::expression(
                    source,
                    format!("cannot negate a {}", type_name(&other)),
                )),
            }
        }

        Expr::Binary(BinaryOp::And, left, right) => {
            let left = eval_resolved(left, source, ctx)?.value;
            if !is_truthy(&left) {
                return Ok(Resolved::plain(Value::Bool(false)));
            }
            let right = eval_resolved(right, source, ctx)?.value;
            Ok(Resolved::plain(Value::Bool(is_truthy(&right))))
        }

        Expr::Binary(BinaryOp::Or, left, right) => {
            let left = eval_resolved(left, source, ctx)?.value;
            if is_truthy(&left) {
                return Ok(Resolved::plain(Value::Bool(true)));
            }
            let right = eval_resolved(right, source, ctx)?.value;
            Ok(Resolved::plain(Value::Bool(is_truthy(&right))))
        }

        Expr::Binary(op, left, right) => {
            let left = eval_resolved(left, source, ctx)?.value;
            let right = eval_resolved(right, source, ctx)?.value;
            binary(*op, left, right, source).map(Resolved::plain)
        }
    }
}

fn descend_key(base: Resolved, key: &str, source: &str) -> Result<Resolved, EngineError> {
    let origin = base
        .origin
        .map(|(scope, path)| (scope, extend_path(&path, key)));
    match base.value {
        Value::Object(mut map) => match map.remove(key) {
            Some(value) => Ok(Resolved { value, origin }),
            None => Err(missing(origin, source, key, "not set")),
        },
        other => Err(missing(
            origin,
            source,
            key,
            &format!("cannot descend into a {}", type_name(&other)),
        )),
    }
}

fn descend_index(base: Resolved, index: i64, source: &str) -> Result<Resolved, EngineError> {
    let origin = base
        .origin
        .map(|(scope, path)| (scope, format!("{}[{}]", path, index)));
    match base.value {
        Value::Array(mut items) => {
            let len = items.len();
            let i = if index < 0 {
                len.checked_sub(index.unsigned_abs() as usize)
            } else {
                Some(index as usize)
            };
            match i.filter(|i| *i < len) {
                Some(i) => Ok(Resolved {
                    value: items.swap_remove(i),
                    origin,
                }),
                None => Err(missing(
                    origin,
                    source,
                    &format!("[{}]", index),
                    &format!("index out of range (length {})", len),
                )),
            }
        }
        other => Err(missing(
            origin,
            source,
            &format!("[{}]", index),
            &format!("cannot index a {}", type_name(&other)),
        )),
    }
}

fn missing(origin: Option<(Scope, String)>, source: &str, segment: &str, reason: &str) -> EngineError {
    match origin {
        Some((scope, path)) => EngineError::Resolution {
            scope,
            path,
            reason: reason.to_string(),
        },
        None => EngineError::expression(source, format!("`{}`: {}", segment, reason)),
    }
}

fn extend_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn binary(op: BinaryOp, left: Value, right: Value, source: &str) -> Result<Value, EngineError> {
    match op {
        BinaryOp::Add => match (&left, &right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            _ => arithmetic(op, left, right, source),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => arithmetic(op, left, right, source),
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&left, &right).ok_or_else(|| {
                EngineError::expression(
                    source,
                    format!(
                        "cannot compare a {} with a {}",
                        type_name(&left),
                        type_name(&right)
                    ),
                )
            })?;
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::In => membership(left, right, source),
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit ops handled by the caller"),
    }
}

fn arithmetic(op: BinaryOp, left: Value, right: Value, source: &str) -> Result<Value, EngineError> {
    let (a_int, b_int) = (left.as_i64(), right.as_i64());
    if op != BinaryOp::Div {
        // Integer in, integer out; overflow is an evaluation error.
        if let (Some(a), Some(b)) = (a_int, b_int) {
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                _ => a.checked_mul(b),
            };
            return result
                .map(Value::from)
                .ok_or_else(|| EngineError::expression(source, "integer overflow"));
        }
    }

    let a = as_number(&left).ok_or_else(|| numeric_mismatch(op, &left, &right, source))?;
    let b = as_number(&right).ok_or_else(|| numeric_mismatch(op, &left, &right, source))?;
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(EngineError::expression(source, "division by zero"));
            }
            a / b
        }
        _ => unreachable!(),
    };
    json_f64(result, source)
}

fn numeric_mismatch(op: BinaryOp, left: &Value, right: &Value, source: &str) -> EngineError {
    let symbol = match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        _ => "/",
    };
    EngineError::expression(
        source,
        format!(
            "`{}` needs numbers, got a {} and a {}",
            symbol,
            type_name(left),
            type_name(right)
        ),
    )
}

fn membership(needle: Value, haystack: Value, source: &str) -> Result<Value, EngineError> {
    match haystack {
        Value::String(hay) => match needle {
            Value::String(n) => Ok(Value::Bool(
                hay.to_lowercase().contains(&n.to_lowercase()),
            )),
            other => Err(EngineError::expression(
                source,
                format!(
                    "`in` on a string needs a string needle, got a {}",
                    type_name(&other)
                ),
            )),
        },
        Value::Array(items) => Ok(Value::Bool(
            items.iter().any(|item| values_equal(item, &needle)),
        )),
        Value::Object(map) => match needle {
            Value::String(key) => Ok(Value::Bool(map.contains_key(&key))),
            other => Err(EngineError::expression(
                source,
                format!(
                    "`in` on an object needs a string key, got a {}",
                    type_name(&other)
                ),
            )),
        },
        other => Err(EngineError::expression(
            source,
            format!("`in` needs a string, array, or object, got a {}", type_name(&other)),
        )),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn json_f64(f: f64, source: &str) -> Result<Value, EngineError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| EngineError::expression(source, "result is not a finite number"))
}

fn eval_int(expr: &Expr, source: &str, ctx: &RunContext) -> Result<i64, EngineError> {
    let value = eval_resolved(expr, source, ctx)?.value;
    value
        .as_i64()
        .ok_or_else(|| EngineError::expression(source, "slice bounds must be integers"))
}

fn slice_bounds(len: usize, start: Option<i64>, end: Option<i64>) -> (usize, usize) {
    let clamp = |bound: i64| -> usize {
        let adjusted = if bound < 0 { bound + len as i64 } else { bound };
        adjusted.clamp(0, len as i64) as usize
    };
    let from = start.map(clamp).unwrap_or(0);
    let to = end.map(clamp).unwrap_or(len);
    (from, from.max(to))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse::parse;
    use serde_json::json;

    fn eval_str(input: &str, ctx: &RunContext) -> Result<Value, EngineError> {
        let ast = parse(input).map_err(|reason| EngineError::expression(input, reason))?;
        eval(&ast, input, ctx)
    }

    fn ctx_with(vars: Value) -> RunContext {
        RunContext::new(vars.as_object().unwrap().clone())
    }

    #[test]
    fn test_comparison_against_state() {
        let mut ctx = ctx_with(json!({}));
        ctx.set(Scope::State, "n", json!(2)).unwrap();
        assert_eq!(eval_str("state.n < 3", &ctx).unwrap(), json!(true));
        assert_eq!(eval_str("state.n >= 3", &ctx).unwrap(), json!(false));
    }

    #[test]
    fn test_arithmetic_stays_integer() {
        let ctx = ctx_with(json!({"x": 4}));
        assert_eq!(eval_str("variables.x + 1", &ctx).unwrap(), json!(5));
        assert_eq!(eval_str("variables.x * 2 - 3", &ctx).unwrap(), json!(5));
    }

    #[test]
    fn test_division_is_float() {
        let ctx = ctx_with(json!({}));
        assert_eq!(eval_str("7 / 2", &ctx).unwrap(), json!(3.5));
        assert_eq!(eval_str("4 / 2", &ctx).unwrap(), json!(2.0));
    }

    #[test]
    fn test_division_by_zero_fails() {
        let ctx = ctx_with(json!({}));
        let err = eval_str("1 / 0", &ctx).unwrap_err();
        assert!(matches!(err, EngineError::Expression { .. }));
    }

    #[test]
    fn test_membership_is_case_insensitive_on_strings() {
        let ctx = ctx_with(json!({"answer": "YES please"}));
        assert_eq!(eval_str("'yes' in variables.answer", &ctx).unwrap(), json!(true));
        assert_eq!(eval_str("'no' in variables.answer", &ctx).unwrap(), json!(false));
    }

    #[test]
    fn test_membership_in_array_and_object() {
        let ctx = ctx_with(json!({"xs": [1, 2, 3], "m": {"k": 1}}));
        assert_eq!(eval_str("2 in variables.xs", &ctx).unwrap(), json!(true));
        assert_eq!(eval_str("5 in variables.xs", &ctx).unwrap(), json!(false));
        assert_eq!(eval_str("'k' in variables.m", &ctx).unwrap(), json!(true));
    }

    #[test]
    fn test_lower_method() {
        let ctx = ctx_with(json!({"name": "Ala"}));
        assert_eq!(eval_str("variables.name.lower()", &ctx).unwrap(), json!("ala"));
        assert_eq!(
            eval_str("variables.name.lower() == 'ala'", &ctx).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_indexing_and_slicing() {
        let ctx = ctx_with(json!({"xs": [10, 20, 30]}));
        assert_eq!(eval_str("variables.xs[0]", &ctx).unwrap(), json!(10));
        assert_eq!(eval_str("variables.xs[-1]", &ctx).unwrap(), json!(30));
        assert_eq!(eval_str("variables.xs[1:3]", &ctx).unwrap(), json!([20, 30]));
        assert_eq!(eval_str("variables.xs[:2]", &ctx).unwrap(), json!([10, 20]));
        assert_eq!(eval_str("variables.xs[5:]", &ctx).unwrap(), json!([]));
    }

    #[test]
    fn test_bracket_key_access() {
        let ctx = ctx_with(json!({"some key": 7}));
        assert_eq!(eval_str("variables['some key']", &ctx).unwrap(), json!(7));
    }

    #[test]
    fn test_missing_result_is_resolution_error() {
        let ctx = ctx_with(json!({}));
        let err = eval_str("results.missing", &ctx).unwrap_err();
        match err {
            EngineError::Resolution { scope, path, .. } => {
                assert_eq!(scope, Scope::Results);
                assert_eq!(path, "missing");
            }
            other => panic!("expected Resolution, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_identifier_is_expression_error() {
        let ctx = ctx_with(json!({}));
        let err = eval_str("bogus.x", &ctx).unwrap_err();
        assert!(matches!(err, EngineError::Expression { .. }));
    }

    #[test]
    fn test_boolean_connectives_short_circuit() {
        let ctx = ctx_with(json!({"flag": true}));
        // Right side would fail if evaluated.
        assert_eq!(
            eval_str("variables.flag or results.missing", &ctx).unwrap(),
            json!(true)
        );
        assert_eq!(
            eval_str("not variables.flag and results.missing", &ctx).unwrap(),
            json!(false)
        );
    }

    #[test]
    fn test_comparing_mismatched_types_fails() {
        let ctx = ctx_with(json!({}));
        assert!(eval_str("'a' < 1", &ctx).is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!("no")));
        assert!(is_truthy(&json!(-1)));
    }
}
