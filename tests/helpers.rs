//! Test utility functions for stepflow
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use stepflow::{
    Component, ComponentRegistry, EngineError, ExecutionEngine, PipelineDefinition, RunContext,
    RunOutcome, RunStatus,
};

/// Component that records every params map it is invoked with and returns
/// the value of its `return` param (or null).
pub struct Probe {
    calls: Mutex<Vec<Map<String, Value>>>,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Map<String, Value>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Component for Probe {
    async fn execute(
        &self,
        params: &Map<String, Value>,
        _ctx: &mut RunContext,
    ) -> Result<Value, EngineError> {
        self.calls.lock().unwrap().push(params.clone());
        Ok(params.get("return").cloned().unwrap_or(Value::Null))
    }
}

/// Component that always fails with a component error.
pub struct AlwaysFails;

#[async_trait]
impl Component for AlwaysFails {
    async fn execute(
        &self,
        _params: &Map<String, Value>,
        _ctx: &mut RunContext,
    ) -> Result<Value, EngineError> {
        Err(EngineError::component("fail", "boom"))
    }
}

/// Stock registry plus a shared `probe` component and a `fail` component.
pub fn test_registry() -> (ComponentRegistry, Arc<Probe>) {
    let probe = Probe::new();
    let mut registry = ComponentRegistry::with_builtins();
    registry.register("probe", probe.clone());
    registry.register("fail", Arc::new(AlwaysFails));
    (registry, probe)
}

/// Run a YAML pipeline against a fresh engine over [`test_registry`].
pub async fn run_yaml(yaml: &str) -> (RunOutcome, Arc<Probe>) {
    let (registry, probe) = test_registry();
    let definition = PipelineDefinition::from_yaml(yaml).expect("pipeline should parse");
    let engine = ExecutionEngine::new(registry);
    let outcome = engine.run(&definition, Map::new()).await;
    (outcome, probe)
}

pub fn assert_completed(outcome: &RunOutcome) {
    assert_eq!(
        outcome.status,
        RunStatus::Completed,
        "expected Completed, got {:?} (error: {:?})",
        outcome.status,
        outcome.error
    );
    assert!(outcome.error.is_none());
}

pub fn assert_failed(outcome: &RunOutcome, step: &str, kind: &str) {
    assert_eq!(outcome.status, RunStatus::Failed);
    let error = outcome.error.as_ref().expect("failed run carries an error");
    assert_eq!(error.step.as_deref(), Some(step));
    assert_eq!(error.kind, kind);
}
