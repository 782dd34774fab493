//! Restricted condition/arithmetic expression language
//!
//! Pipelines are authored data, not code, so the surface is small and total:
//! scope-qualified paths, arithmetic, comparisons, boolean connectives,
//! membership, `lower()`, indexing and slicing. No user-defined functions,
//! no assignment. Raw shell/python steps are the explicit escape hatch for
//! anything beyond this.

pub mod eval;
pub mod parse;
pub mod token;

pub use eval::is_truthy;

use crate::core::context::RunContext;
use crate::core::error::EngineError;
use serde_json::Value;

/// Parse and evaluate an expression against the context.
pub fn evaluate(input: &str, ctx: &RunContext) -> Result<Value, EngineError> {
    let ast = parse::parse(input).map_err(|reason| EngineError::expression(input, reason))?;
    eval::eval(&ast, input, ctx)
}

/// Evaluate an expression and collapse the result to a boolean.
pub fn evaluate_condition(input: &str, ctx: &RunContext) -> Result<bool, EngineError> {
    Ok(is_truthy(&evaluate(input, ctx)?))
}
