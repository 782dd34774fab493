//! In-memory pipeline tree
//!
//! Built once from a parsed document, immutable afterwards. Nested pipelines
//! (`true_pipeline`, `false_pipeline`, a loop's `steps`) stay as raw param
//! values until the executor reaches them; [`steps_from_value`] parses them
//! on demand, so nesting depth is unbounded.

use crate::core::config::{validate_sequence, PipelineConfig, StepConfig, StepType};
use crate::core::error::EngineError;
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
    pub variables: Map<String, Value>,
    pub steps: Vec<StepDefinition>,
}

#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub name: String,
    pub ignore_errors: bool,
    pub kind: StepKind,
}

#[derive(Debug, Clone)]
pub enum StepKind {
    Component {
        component: String,
        params: Map<String, Value>,
    },
    RawCommand {
        command: String,
    },
    RawCode {
        code: String,
    },
}

impl PipelineDefinition {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        Self::from_config(PipelineConfig::from_file(path)?)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, EngineError> {
        Self::from_config(PipelineConfig::from_yaml(contents)?)
    }

    pub fn from_config(config: PipelineConfig) -> Result<Self, EngineError> {
        let steps = config
            .steps
            .into_iter()
            .map(StepDefinition::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: config.name,
            description: config.description,
            version: config.version,
            variables: config.variables,
            steps,
        })
    }
}

impl StepDefinition {
    fn from_config(config: StepConfig) -> Result<Self, EngineError> {
        let kind = match config.step_type {
            StepType::Component => StepKind::Component {
                // Presence checked by the document validation.
                component: config.component.ok_or_else(|| {
                    EngineError::Parse(format!("step `{}` has no component", config.name))
                })?,
                params: config.params,
            },
            StepType::Shell => StepKind::RawCommand {
                command: config.command.ok_or_else(|| {
                    EngineError::Parse(format!("step `{}` has no command", config.name))
                })?,
            },
            StepType::Python => StepKind::RawCode {
                code: config.code.ok_or_else(|| {
                    EngineError::Parse(format!("step `{}` has no code", config.name))
                })?,
            },
        };
        Ok(Self {
            name: config.name,
            ignore_errors: config.ignore_errors,
            kind,
        })
    }
}

/// Parse a nested pipeline out of a raw param value (a sequence of step
/// mappings). Used by the `condition` and `loop` built-ins at dispatch time.
pub fn steps_from_value(value: &Value) -> Result<Vec<StepDefinition>, EngineError> {
    let configs: Vec<StepConfig> = serde_json::from_value(value.clone())
        .map_err(|e| EngineError::Parse(format!("invalid nested pipeline: {}", e)))?;
    validate_sequence(&configs)?;
    configs
        .into_iter()
        .map(StepDefinition::from_config)
        .collect()
}
