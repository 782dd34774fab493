//! Run context - the layered store shared across one pipeline run
//!
//! One `RunContext` exists per run. `variables` is read-only for the run's
//! duration, `results` and `state` are single flat maps shared by every
//! nested sequence (last write wins), and loop locals are an ephemeral
//! stack valid only while a loop body executes.

use crate::core::error::EngineError;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// The four context partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Initial bindings from the pipeline definition, read-only.
    Variables,
    /// Step name -> last produced result.
    Results,
    /// Explicit mutable store surviving loop iterations.
    State,
    /// Ephemeral per-iteration bindings (e.g. `loop.index`).
    Loop,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scope::Variables => "variables",
            Scope::Results => "results",
            Scope::State => "state",
            Scope::Loop => "loop",
        };
        f.write_str(name)
    }
}

impl FromStr for Scope {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "variables" => Ok(Scope::Variables),
            "results" => Ok(Scope::Results),
            "state" => Ok(Scope::State),
            "loop" => Ok(Scope::Loop),
            _ => Err(()),
        }
    }
}

/// Execution context for a single pipeline run.
#[derive(Debug, Clone)]
pub struct RunContext {
    variables: Map<String, Value>,
    results: Map<String, Value>,
    state: Map<String, Value>,
    // Innermost binding last; lookups scan back-to-front so inner loops
    // shadow outer ones.
    loop_locals: Vec<(String, Value)>,
}

impl RunContext {
    /// Create a context holding the run's initial variables.
    pub fn new(variables: Map<String, Value>) -> Self {
        Self {
            variables,
            results: Map::new(),
            state: Map::new(),
            loop_locals: Vec::new(),
        }
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    pub fn results(&self) -> &Map<String, Value> {
        &self.results
    }

    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    /// Resolve a dotted/indexed path (`a.b`, `a[0].c`) within one scope.
    pub fn get(&self, scope: Scope, path: &str) -> Result<Value, EngineError> {
        let segments = parse_path(path).map_err(|reason| EngineError::Resolution {
            scope,
            path: path.to_string(),
            reason,
        })?;

        let (first, rest) = segments.split_first().ok_or_else(|| EngineError::Resolution {
            scope,
            path: path.to_string(),
            reason: "empty path".to_string(),
        })?;

        let root = match first {
            PathSegment::Key(name) => self.root_value(scope, name),
            PathSegment::Index(_) => None,
        };
        let mut current = root.ok_or_else(|| EngineError::Resolution {
            scope,
            path: path.to_string(),
            reason: format!("`{}` is not set", first),
        })?;

        for segment in rest {
            current = descend(current, segment).ok_or_else(|| EngineError::Resolution {
                scope,
                path: path.to_string(),
                reason: format!("no `{}` under this path", segment),
            })?;
        }

        Ok(current.clone())
    }

    /// Write a top-level binding. Only `results` and `state` accept writes.
    pub fn set(&mut self, scope: Scope, name: &str, value: Value) -> Result<(), EngineError> {
        let map = match scope {
            Scope::Results => &mut self.results,
            Scope::State => &mut self.state,
            Scope::Variables | Scope::Loop => return Err(EngineError::ScopeViolation(scope)),
        };
        map.insert(name.to_string(), value);
        Ok(())
    }

    /// Record a step's result under its name. Collisions across nested
    /// branches silently overwrite the prior result.
    pub fn record_result(&mut self, step_name: &str, value: Value) {
        self.results.insert(step_name.to_string(), value);
    }

    /// Run `f` with a loop-local binding in place; the binding is removed on
    /// every exit path (normal return, error, break signal).
    pub fn with_loop_local<T>(
        &mut self,
        name: &str,
        value: Value,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        self.push_loop_local(name, value);
        let out = f(self);
        self.pop_loop_local();
        out
    }

    /// Manual counterpart of [`Self::with_loop_local`] for async callers;
    /// every push must be paired with a pop before the enclosing loop returns.
    pub fn push_loop_local(&mut self, name: &str, value: Value) {
        self.loop_locals.push((name.to_string(), value));
    }

    pub fn pop_loop_local(&mut self) {
        self.loop_locals.pop();
    }

    /// Materialize one scope as a JSON object. The expression layer descends
    /// into this with computed keys the path syntax of [`Self::get`] cannot
    /// express.
    pub fn scope_object(&self, scope: Scope) -> Map<String, Value> {
        match scope {
            Scope::Variables => self.variables.clone(),
            Scope::Results => self.results.clone(),
            Scope::State => self.state.clone(),
            Scope::Loop => {
                let mut map = Map::new();
                // Insertion order makes inner bindings overwrite outer ones.
                for (name, value) in &self.loop_locals {
                    map.insert(name.clone(), value.clone());
                }
                map
            }
        }
    }

    fn root_value(&self, scope: Scope, name: &str) -> Option<&Value> {
        match scope {
            Scope::Variables => self.variables.get(name),
            Scope::Results => self.results.get(name),
            Scope::State => self.state.get(name),
            Scope::Loop => self
                .loop_locals
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v),
        }
    }

    /// Take the accumulated results and state out of the context when the
    /// run ends (including failed runs, for diagnosis).
    pub fn into_final_state(self) -> (Map<String, Value>, Map<String, Value>) {
        (self.results, self.state)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PathSegment {
    Key(String),
    Index(i64),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => f.write_str(k),
            PathSegment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

fn parse_path(path: &str) -> Result<Vec<PathSegment>, String> {
    let mut segments = Vec::new();
    let mut chars = path.chars().peekable();
    let mut key = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            '.' => {
                if key.is_empty() && segments.is_empty() {
                    return Err("path starts with `.`".to_string());
                }
                if !key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut key)));
                }
            }
            '[' => {
                if !key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut key)));
                }
                let mut digits = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    digits.push(c);
                }
                let index: i64 = digits
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid index `[{}]`", digits))?;
                segments.push(PathSegment::Index(index));
            }
            _ => key.push(ch),
        }
    }
    if !key.is_empty() {
        segments.push(PathSegment::Key(key));
    }
    if segments.is_empty() {
        return Err("empty path".to_string());
    }
    Ok(segments)
}

fn descend<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match segment {
        PathSegment::Key(key) => value.as_object()?.get(key),
        PathSegment::Index(index) => {
            let array = value.as_array()?;
            let i = if *index < 0 {
                array.len().checked_sub(index.unsigned_abs() as usize)?
            } else {
                *index as usize
            };
            array.get(i)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context_with(vars: Value) -> RunContext {
        RunContext::new(vars.as_object().unwrap().clone())
    }

    #[test]
    fn test_get_simple_variable() {
        let ctx = context_with(json!({"x": 5}));
        assert_eq!(ctx.get(Scope::Variables, "x").unwrap(), json!(5));
    }

    #[test]
    fn test_get_nested_path() {
        let ctx = context_with(json!({"user": {"name": "ala", "tags": ["a", "b"]}}));
        assert_eq!(ctx.get(Scope::Variables, "user.name").unwrap(), json!("ala"));
        assert_eq!(ctx.get(Scope::Variables, "user.tags[1]").unwrap(), json!("b"));
        assert_eq!(
            ctx.get(Scope::Variables, "user.tags[-1]").unwrap(),
            json!("b")
        );
    }

    #[test]
    fn test_missing_path_is_resolution_error() {
        let ctx = context_with(json!({}));
        let err = ctx.get(Scope::Results, "missing").unwrap_err();
        assert!(matches!(err, EngineError::Resolution { .. }));
    }

    #[test]
    fn test_indexing_non_container_fails() {
        let ctx = context_with(json!({"x": 5}));
        assert!(ctx.get(Scope::Variables, "x.y").is_err());
        assert!(ctx.get(Scope::Variables, "x[0]").is_err());
    }

    #[test]
    fn test_write_to_variables_is_scope_violation() {
        let mut ctx = context_with(json!({}));
        let err = ctx.set(Scope::Variables, "x", json!(1)).unwrap_err();
        assert!(matches!(err, EngineError::ScopeViolation(Scope::Variables)));
    }

    #[test]
    fn test_state_write_and_read() {
        let mut ctx = context_with(json!({}));
        ctx.set(Scope::State, "n", json!(3)).unwrap();
        assert_eq!(ctx.get(Scope::State, "n").unwrap(), json!(3));
    }

    #[test]
    fn test_loop_local_shadowing_and_restore() {
        let mut ctx = context_with(json!({}));
        ctx.with_loop_local("index", json!(0), |ctx| {
            assert_eq!(ctx.get(Scope::Loop, "index").unwrap(), json!(0));
            ctx.with_loop_local("index", json!(7), |ctx| {
                assert_eq!(ctx.get(Scope::Loop, "index").unwrap(), json!(7));
            });
            assert_eq!(ctx.get(Scope::Loop, "index").unwrap(), json!(0));
        });
        assert!(ctx.get(Scope::Loop, "index").is_err());
    }

    #[test]
    fn test_loop_local_removed_on_error_path() {
        let mut ctx = context_with(json!({}));
        let result: Result<(), EngineError> = ctx.with_loop_local("index", json!(0), |ctx| {
            ctx.get(Scope::State, "missing").map(|_| ())
        });
        assert!(result.is_err());
        assert!(ctx.get(Scope::Loop, "index").is_err());
    }
}
