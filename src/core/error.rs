//! Engine error taxonomy

use crate::core::context::Scope;
use thiserror::Error;

/// Errors raised by the loader, resolver, registry, and executor.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The pipeline document is malformed or missing required fields.
    #[error("parse error: {0}")]
    Parse(String),

    /// A context path could not be resolved.
    #[error("cannot resolve `{path}` in `{scope}`: {reason}")]
    Resolution {
        scope: Scope,
        path: String,
        reason: String,
    },

    /// A condition or arithmetic expression failed to parse or evaluate.
    #[error("expression error in `{expr}`: {reason}")]
    Expression { expr: String, reason: String },

    /// A step referenced a component that is not registered.
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// A write was attempted against a read-only scope.
    #[error("scope `{0}` is read-only")]
    ScopeViolation(Scope),

    /// A component handler reported a failure.
    #[error("component `{component}` failed: {message}")]
    Component { component: String, message: String },

    /// The run was cancelled cooperatively.
    #[error("run cancelled")]
    Cancelled,

    /// Wrapper attaching the failing step's name. Applied exactly once,
    /// at the step where the error was first raised.
    #[error("step `{step}`: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    pub fn expression(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Expression {
            expr: expr.into(),
            reason: reason.into(),
        }
    }

    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Attach a step name, unless the error already carries one or is a
    /// cancellation (which is reported as a run outcome, not a step failure).
    pub fn at_step(self, step: &str) -> Self {
        match self {
            EngineError::Step { .. } | EngineError::Cancelled => self,
            other => EngineError::Step {
                step: step.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Short machine-readable kind for outcome reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Parse(_) => "parse",
            EngineError::Resolution { .. } => "resolution",
            EngineError::Expression { .. } => "expression",
            EngineError::UnknownComponent(_) => "unknown_component",
            EngineError::ScopeViolation(_) => "scope_violation",
            EngineError::Component { .. } => "component",
            EngineError::Cancelled => "cancelled",
            EngineError::Step { source, .. } => source.kind(),
        }
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::Parse(err.to_string())
    }
}
