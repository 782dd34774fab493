//! stepflow - a declarative step-pipeline execution engine
//!
//! Loads a YAML document describing a tree of named steps, resolves `${...}`
//! references against a layered run context, dispatches steps to registered
//! components, and recursively executes nested sequences under safety
//! bounds: iteration caps, per-step error policy, break signals, and
//! cooperative cancellation.

pub mod cli;
pub mod components;
pub mod core;
pub mod execution;
pub mod expr;

pub use components::{Component, ComponentRegistry};
pub use core::{EngineError, PipelineDefinition, RunContext, Scope, StepDefinition, StepKind};
pub use execution::{
    CancelFlag, ErrorDetail, EventHandler, ExecutionEngine, ExecutionEvent, RunOutcome, RunStatus,
};
