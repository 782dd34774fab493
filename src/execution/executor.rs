//! Recursive step-tree executor
//!
//! One linear cursor walks the tree: steps run strictly sequentially,
//! nested sequences (conditional branches, loop bodies) share the caller's
//! context, and a `Break` control signal travels up to the nearest
//! enclosing loop, which swallows it.

use crate::components::process::CommandRunner;
use crate::components::ComponentRegistry;
use crate::core::context::RunContext;
use crate::core::error::EngineError;
use crate::core::interpolate::{interpolate, interpolate_params, is_single_placeholder, render};
use crate::core::pipeline::{steps_from_value, StepDefinition, StepKind};
use crate::execution::engine::{CancelFlag, EventHandler, ExecutionEvent};
use crate::expr;
use async_recursion::async_recursion;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// How a sequence should proceed after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// Stop the nearest enclosing loop. Not an error; a sequence that has
    /// no enclosing loop simply ends early.
    Break,
}

struct StepFlow {
    result: Option<Value>,
    control: Control,
}

impl StepFlow {
    fn done(result: Option<Value>) -> Self {
        Self {
            result,
            control: Control::Continue,
        }
    }
}

pub(crate) struct StepExecutor<'a> {
    registry: &'a ComponentRegistry,
    runner: &'a CommandRunner,
    cancel: &'a CancelFlag,
    handlers: &'a [Arc<dyn EventHandler>],
    max_iterations: u64,
}

impl<'a> StepExecutor<'a> {
    pub(crate) fn new(
        registry: &'a ComponentRegistry,
        runner: &'a CommandRunner,
        cancel: &'a CancelFlag,
        handlers: &'a [Arc<dyn EventHandler>],
        max_iterations: u64,
    ) -> Self {
        Self {
            registry,
            runner,
            cancel,
            handlers,
            max_iterations,
        }
    }

    /// Execute a sequence in order against the shared context. Returns the
    /// control signal the caller must honor (a pending `Break` aimed at an
    /// enclosing loop).
    #[async_recursion]
    pub(crate) async fn execute_sequence(
        &self,
        steps: &[StepDefinition],
        ctx: &mut RunContext,
    ) -> Result<Control, EngineError> {
        for step in steps {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            debug!(step = %step.name, "step started");
            self.emit(ExecutionEvent::StepStarted {
                step: step.name.clone(),
            })
            .await;

            match self.execute_step(step, ctx).await {
                Ok(flow) => {
                    if let Some(result) = flow.result {
                        ctx.record_result(&step.name, result);
                    }
                    self.emit(ExecutionEvent::StepCompleted {
                        step: step.name.clone(),
                    })
                    .await;
                    if flow.control == Control::Break {
                        return Ok(Control::Break);
                    }
                }
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                // Already attributed to an inner step; its flag was
                // consulted there, so just keep unwinding.
                Err(err @ EngineError::Step { .. }) => return Err(err),
                Err(err) => {
                    if step.ignore_errors {
                        warn!(step = %step.name, error = %err, "step failed, continuing");
                        self.emit(ExecutionEvent::StepFailed {
                            step: step.name.clone(),
                            error: err.to_string(),
                            ignored: true,
                        })
                        .await;
                        continue;
                    }
                    self.emit(ExecutionEvent::StepFailed {
                        step: step.name.clone(),
                        error: err.to_string(),
                        ignored: false,
                    })
                    .await;
                    return Err(err.at_step(&step.name));
                }
            }
        }
        Ok(Control::Continue)
    }

    async fn execute_step(
        &self,
        step: &StepDefinition,
        ctx: &mut RunContext,
    ) -> Result<StepFlow, EngineError> {
        match &step.kind {
            StepKind::Component { component, params } => match component.as_str() {
                "condition" => self.builtin_condition(params, ctx).await,
                "loop" => self.builtin_loop(params, ctx).await,
                "break" => self.builtin_break(params, ctx),
                _ => {
                    let handler = self.registry.resolve(component)?;
                    let params = interpolate_params(params, ctx)?;
                    let result = handler.execute(&params, ctx).await?;
                    Ok(StepFlow::done(Some(result)))
                }
            },
            StepKind::RawCommand { command } => {
                let body = self.interpolate_body(command, ctx)?;
                let result = self.runner.run_command(&body).await?;
                Ok(StepFlow::done(Some(result)))
            }
            StepKind::RawCode { code } => {
                let body = self.interpolate_body(code, ctx)?;
                let result = self.runner.run_code(&body).await?;
                Ok(StepFlow::done(Some(result)))
            }
        }
    }

    /// `condition`: evaluate, run one branch, record the decision. An
    /// absent branch is a no-op.
    async fn builtin_condition(
        &self,
        params: &Map<String, Value>,
        ctx: &mut RunContext,
    ) -> Result<StepFlow, EngineError> {
        let condition = params.get("condition").ok_or_else(|| {
            EngineError::component("condition", "missing param `condition`")
        })?;
        let decision = self.eval_condition_value(condition, ctx)?;

        let branch = if decision {
            params.get("true_pipeline")
        } else {
            params.get("false_pipeline")
        };

        let mut control = Control::Continue;
        if let Some(branch) = branch {
            let steps = steps_from_value(branch)?;
            control = self.execute_sequence(&steps, ctx).await?;
        }
        Ok(StepFlow {
            result: Some(Value::Bool(decision)),
            control,
        })
    }

    /// `loop`: `while` re-evaluates its condition before each iteration,
    /// `count` runs a fixed number of times, `for` walks a collection
    /// binding each element under `item_var`. All are bounded by
    /// `max_iterations`; hitting the cap ends the loop, it is not an error.
    async fn builtin_loop(
        &self,
        params: &Map<String, Value>,
        ctx: &mut RunContext,
    ) -> Result<StepFlow, EngineError> {
        let loop_type = params
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::component("loop", "missing param `type`"))?;
        let steps = steps_from_value(
            params
                .get("steps")
                .ok_or_else(|| EngineError::component("loop", "missing param `steps`"))?,
        )?;
        let max_iterations = self
            .u64_param(params, "max_iterations", ctx)?
            .unwrap_or(self.max_iterations);

        let mut iterations = 0u64;
        let mut capped = false;

        match loop_type {
            "while" => {
                let condition = params.get("condition").ok_or_else(|| {
                    EngineError::component("loop", "missing param `condition` for `while`")
                })?;
                loop {
                    if self.cancel.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    if iterations >= max_iterations {
                        capped = true;
                        debug!(max_iterations, "loop hit iteration cap");
                        break;
                    }
                    if !self.eval_condition_value(condition, ctx)? {
                        break;
                    }
                    if self.run_iteration(&steps, iterations, None, ctx).await? == Control::Break {
                        iterations += 1;
                        break;
                    }
                    iterations += 1;
                }
            }
            "count" => {
                let count = self
                    .u64_param(params, "iterations", ctx)?
                    .ok_or_else(|| {
                        EngineError::component("loop", "missing param `iterations` for `count`")
                    })?;
                capped = count > max_iterations;
                let target = count.min(max_iterations);
                while iterations < target {
                    if self.cancel.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    if self.run_iteration(&steps, iterations, None, ctx).await? == Control::Break {
                        iterations += 1;
                        break;
                    }
                    iterations += 1;
                }
            }
            "for" => {
                let item_var = params
                    .get("item_var")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        EngineError::component("loop", "missing param `item_var` for `for`")
                    })?
                    .to_string();
                let collection = interpolate(
                    params.get("collection").ok_or_else(|| {
                        EngineError::component("loop", "missing param `collection` for `for`")
                    })?,
                    ctx,
                )?;
                let items = match collection {
                    Value::Array(items) => items,
                    other => {
                        return Err(EngineError::component(
                            "loop",
                            format!("`collection` must resolve to an array, got {}", other),
                        ))
                    }
                };
                capped = items.len() as u64 > max_iterations;
                for item in items.into_iter().take(max_iterations as usize) {
                    if self.cancel.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    let binding = Some((item_var.as_str(), item));
                    if self.run_iteration(&steps, iterations, binding, ctx).await?
                        == Control::Break
                    {
                        iterations += 1;
                        break;
                    }
                    iterations += 1;
                }
            }
            other => {
                return Err(EngineError::component(
                    "loop",
                    format!("unknown loop type `{}`", other),
                ))
            }
        }

        Ok(StepFlow::done(Some(json!({
            "iterations": iterations,
            "capped": capped,
        }))))
    }

    /// Run one loop body with `loop.index` (and, for `for` loops, the item
    /// variable) bound; the bindings are removed on every exit path.
    async fn run_iteration(
        &self,
        steps: &[StepDefinition],
        index: u64,
        item: Option<(&str, Value)>,
        ctx: &mut RunContext,
    ) -> Result<Control, EngineError> {
        ctx.push_loop_local("index", json!(index));
        let has_item = item.is_some();
        if let Some((name, value)) = item {
            ctx.push_loop_local(name, value);
        }
        let outcome = self.execute_sequence(steps, ctx).await;
        if has_item {
            ctx.pop_loop_local();
        }
        ctx.pop_loop_local();
        outcome
    }

    /// `break`: signal the nearest enclosing loop when the (optional)
    /// condition holds.
    fn builtin_break(
        &self,
        params: &Map<String, Value>,
        ctx: &mut RunContext,
    ) -> Result<StepFlow, EngineError> {
        let fire = match params.get("condition") {
            None => true,
            Some(condition) => self.eval_condition_value(condition, ctx)?,
        };
        Ok(StepFlow {
            result: None,
            control: if fire { Control::Break } else { Control::Continue },
        })
    }

    /// A condition param is either an expression string, a whole-string
    /// placeholder (typed result, then truthiness), or a literal value. A
    /// template mixing placeholders with expression text is rendered first
    /// and the rendering evaluated as an expression, so `"${state.n} < 3"`
    /// means the comparison, not the truthiness of a non-empty string.
    fn eval_condition_value(
        &self,
        value: &Value,
        ctx: &RunContext,
    ) -> Result<bool, EngineError> {
        match value {
            Value::String(s) if is_single_placeholder(s) => {
                Ok(expr::is_truthy(&interpolate(value, ctx)?))
            }
            Value::String(s) if s.contains("${") => match interpolate(value, ctx)? {
                Value::String(rendered) => expr::evaluate_condition(&rendered, ctx),
                other => Ok(expr::is_truthy(&other)),
            },
            Value::String(s) => expr::evaluate_condition(s, ctx),
            other => Ok(expr::is_truthy(other)),
        }
    }

    fn u64_param(
        &self,
        params: &Map<String, Value>,
        key: &str,
        ctx: &RunContext,
    ) -> Result<Option<u64>, EngineError> {
        let Some(raw) = params.get(key) else {
            return Ok(None);
        };
        let value = interpolate(raw, ctx)?;
        value.as_u64().map(Some).ok_or_else(|| {
            EngineError::component("loop", format!("`{}` must be a non-negative integer", key))
        })
    }

    fn interpolate_body(&self, body: &str, ctx: &RunContext) -> Result<String, EngineError> {
        match interpolate(&Value::String(body.to_string()), ctx)? {
            Value::String(s) => Ok(s),
            other => Ok(render(&other)),
        }
    }

    async fn emit(&self, event: ExecutionEvent) {
        for handler in self.handlers {
            handler.handle(event.clone()).await;
        }
    }
}
