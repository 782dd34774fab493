//! Component contract and registry
//!
//! A component is a named leaf handler behind one uniform async contract.
//! The registry is built explicitly at setup and read-only afterwards, so
//! concurrent runs can share it without synchronization.

pub mod builtin;
pub mod process;

use crate::core::context::RunContext;
use crate::core::error::EngineError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A named step handler. Params arrive fully interpolated; the context may
/// be read in all scopes and written in `results`/`state`, and must not be
/// retained beyond the call.
#[async_trait]
pub trait Component: Send + Sync {
    async fn execute(
        &self,
        params: &Map<String, Value>,
        ctx: &mut RunContext,
    ) -> Result<Value, EngineError>;
}

/// Name → handler lookup, read-only after setup.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    components: HashMap<String, Arc<dyn Component>>,
}

impl ComponentRegistry {
    /// An empty registry, for tests and embedders that bring their own set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock registry: `variable_set`, `log`, `wait`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("variable_set", Arc::new(builtin::VariableSet));
        registry.register("log", Arc::new(builtin::Log));
        registry.register("wait", Arc::new(builtin::Wait));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, component: Arc<dyn Component>) {
        self.components.insert(name.into(), component);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Component>, EngineError> {
        self.components
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownComponent(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.components.keys().collect();
        names.sort();
        f.debug_struct("ComponentRegistry")
            .field("components", &names)
            .finish()
    }
}
