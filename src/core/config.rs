//! Pipeline document schema and structural validation
//!
//! Loading is a pure parse: structure and `type` tags are checked here,
//! component names and expressions are not. Those surface at run time.

use crate::core::error::EngineError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub variables: Map<String, Value>,
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    pub name: String,
    #[serde(rename = "type", default)]
    pub step_type: StepType,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub ignore_errors: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    #[default]
    Component,
    Shell,
    Python,
}

impl PipelineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Parse(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, EngineError> {
        let config: PipelineConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), EngineError> {
        validate_sequence(&self.steps)
    }
}

/// Structural checks shared by the top-level sequence and nested pipelines.
pub fn validate_sequence(steps: &[StepConfig]) -> Result<(), EngineError> {
    let mut seen = std::collections::HashSet::new();
    for step in steps {
        if step.name.is_empty() {
            return Err(EngineError::Parse("step with an empty name".to_string()));
        }
        if !seen.insert(step.name.as_str()) {
            return Err(EngineError::Parse(format!(
                "duplicate step name `{}` in one sequence",
                step.name
            )));
        }
        match step.step_type {
            StepType::Component if step.component.is_none() => {
                return Err(EngineError::Parse(format!(
                    "step `{}` has type `component` but no `component` field",
                    step.name
                )));
            }
            StepType::Shell if step.command.is_none() => {
                return Err(EngineError::Parse(format!(
                    "step `{}` has type `shell` but no `command` field",
                    step.name
                )));
            }
            StepType::Python if step.code.is_none() => {
                return Err(EngineError::Parse(format!(
                    "step `{}` has type `python` but no `code` field",
                    step.name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
name: greeting
variables:
  who: world
steps:
  - name: greet
    component: log
    params:
      message: "hello ${variables.who}"
"#;

    #[test]
    fn test_parse_minimal_document() {
        let config = PipelineConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.name, "greeting");
        assert_eq!(config.variables["who"], serde_json::json!("world"));
        assert_eq!(config.steps.len(), 1);
        assert_eq!(config.steps[0].step_type, StepType::Component);
        assert!(!config.steps[0].ignore_errors);
    }

    #[test]
    fn test_missing_steps_is_parse_error() {
        let err = PipelineConfig::from_yaml("name: empty\n").unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[test]
    fn test_duplicate_step_names_rejected() {
        let doc = r#"
name: dup
steps:
  - name: a
    component: log
  - name: a
    component: log
"#;
        let err = PipelineConfig::from_yaml(doc).unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[test]
    fn test_unknown_type_tag_rejected() {
        let doc = r#"
name: bad
steps:
  - name: a
    type: javascript
    code: "1"
"#;
        assert!(PipelineConfig::from_yaml(doc).is_err());
    }

    #[test]
    fn test_shell_step_requires_command() {
        let doc = r#"
name: bad
steps:
  - name: a
    type: shell
"#;
        assert!(PipelineConfig::from_yaml(doc).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.name, "greeting");
    }

    #[test]
    fn test_from_missing_file_is_parse_error() {
        let err = PipelineConfig::from_file("/no/such/pipeline.yaml").unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }
}
