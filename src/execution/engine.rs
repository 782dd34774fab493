//! Engine surface: run lifecycle, events, cancellation, outcome
//!
//! The engine owns the read-only registry and the subprocess runner and
//! hands both to a fresh executor per run, so independent runs can execute
//! concurrently sharing nothing mutable.

use crate::components::process::CommandRunner;
use crate::components::ComponentRegistry;
use crate::core::context::RunContext;
use crate::core::error::EngineError;
use crate::core::pipeline::PipelineDefinition;
use crate::execution::executor::StepExecutor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Cooperative cancellation flag shared between a run and its controller.
/// Checked between steps and at loop-iteration boundaries; in-flight
/// handlers are not forcibly interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress notifications emitted during a run.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted { pipeline: String },
    StepStarted { step: String },
    StepCompleted { step: String },
    StepFailed { step: String, error: String, ignored: bool },
    PipelineCompleted { pipeline: String, status: RunStatus },
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: ExecutionEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

/// The first unrecovered error of a failed run, located for the author.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub step: Option<String>,
    pub kind: String,
    pub message: String,
}

impl ErrorDetail {
    fn from_error(error: &EngineError) -> Self {
        let step = match error {
            EngineError::Step { step, .. } => Some(step.clone()),
            _ => None,
        };
        Self {
            step,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Everything a run leaves behind: status, partial results and state
/// (kept on failure for diagnosis), and the failing error if any.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub execution_id: Uuid,
    pub pipeline: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Map<String, Value>,
    pub state: Map<String, Value>,
    pub error: Option<ErrorDetail>,
}

pub struct ExecutionEngine {
    registry: ComponentRegistry,
    runner: CommandRunner,
    handlers: Vec<Arc<dyn EventHandler>>,
    max_iterations: u64,
}

impl ExecutionEngine {
    /// Default iteration cap for loops that do not set `max_iterations`.
    pub const DEFAULT_MAX_ITERATIONS: u64 = 100;

    pub fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry,
            runner: CommandRunner::default(),
            handlers: Vec::new(),
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Engine over the stock registry (`variable_set`, `log`, `wait`).
    pub fn with_builtins() -> Self {
        Self::new(ComponentRegistry::with_builtins())
    }

    pub fn add_event_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn set_command_runner(&mut self, runner: CommandRunner) {
        self.runner = runner;
    }

    /// Override the engine-wide iteration cap applied to loops that do not
    /// set their own `max_iterations`.
    pub fn set_max_iterations(&mut self, cap: u64) {
        self.max_iterations = cap;
    }

    /// Execute a pipeline to completion. `overrides` are merged over the
    /// document's `variables` before the run starts.
    pub async fn run(
        &self,
        definition: &PipelineDefinition,
        overrides: Map<String, Value>,
    ) -> RunOutcome {
        self.run_with_cancel(definition, overrides, CancelFlag::new())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        definition: &PipelineDefinition,
        overrides: Map<String, Value>,
        cancel: CancelFlag,
    ) -> RunOutcome {
        let execution_id = Uuid::new_v4();
        let started_at = Utc::now();

        let mut variables = definition.variables.clone();
        variables.extend(overrides);
        let mut ctx = RunContext::new(variables);

        info!(pipeline = %definition.name, %execution_id, "pipeline started");
        self.emit(ExecutionEvent::PipelineStarted {
            pipeline: definition.name.clone(),
        })
        .await;

        let executor = StepExecutor::new(
            &self.registry,
            &self.runner,
            &cancel,
            &self.handlers,
            self.max_iterations,
        );
        let result = executor.execute_sequence(&definition.steps, &mut ctx).await;

        let (status, error) = match &result {
            Ok(_) => (RunStatus::Completed, None),
            Err(EngineError::Cancelled) => (RunStatus::Cancelled, None),
            Err(err) => (RunStatus::Failed, Some(ErrorDetail::from_error(err))),
        };

        info!(pipeline = %definition.name, %execution_id, ?status, "pipeline finished");
        self.emit(ExecutionEvent::PipelineCompleted {
            pipeline: definition.name.clone(),
            status,
        })
        .await;

        let (results, state) = ctx.into_final_state();
        RunOutcome {
            execution_id,
            pipeline: definition.name.clone(),
            status,
            started_at,
            finished_at: Utc::now(),
            results,
            state,
            error,
        }
    }

    async fn emit(&self, event: ExecutionEvent) {
        for handler in &self.handlers {
            handler.handle(event.clone()).await;
        }
    }
}
