//! Stock leaf components

use crate::components::Component;
use crate::core::context::{RunContext, Scope};
use crate::core::error::EngineError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Write a named value into `state` (default) or `results`. Writing
/// `variables` or `loop` fails with a scope violation.
pub struct VariableSet;

#[async_trait]
impl Component for VariableSet {
    async fn execute(
        &self,
        params: &Map<String, Value>,
        ctx: &mut RunContext,
    ) -> Result<Value, EngineError> {
        let name = required_str(params, "name", "variable_set")?;
        let value = params.get("value").cloned().unwrap_or(Value::Null);
        let scope = match params.get("scope") {
            None => Scope::State,
            Some(Value::String(s)) => Scope::from_str(s).map_err(|()| {
                EngineError::component("variable_set", format!("unknown scope `{}`", s))
            })?,
            Some(other) => {
                return Err(EngineError::component(
                    "variable_set",
                    format!("scope must be a string, got {}", other),
                ))
            }
        };
        ctx.set(scope, name, value.clone())?;
        debug!(scope = %scope, name, "variable set");
        Ok(value)
    }
}

/// Emit a message through the process logger.
pub struct Log;

#[async_trait]
impl Component for Log {
    async fn execute(
        &self,
        params: &Map<String, Value>,
        _ctx: &mut RunContext,
    ) -> Result<Value, EngineError> {
        let message = required_str(params, "message", "log")?;
        let level = params
            .get("level")
            .and_then(Value::as_str)
            .unwrap_or("info");
        match level {
            "debug" => debug!("{}", message),
            "warn" => warn!("{}", message),
            "error" => error!("{}", message),
            _ => info!("{}", message),
        }
        Ok(Value::Null)
    }
}

/// Sleep for `seconds` (fractional allowed).
pub struct Wait;

#[async_trait]
impl Component for Wait {
    async fn execute(
        &self,
        params: &Map<String, Value>,
        _ctx: &mut RunContext,
    ) -> Result<Value, EngineError> {
        let seconds = params
            .get("seconds")
            .and_then(Value::as_f64)
            .ok_or_else(|| EngineError::component("wait", "missing numeric param `seconds`"))?;
        if !(0.0..=86_400.0).contains(&seconds) {
            return Err(EngineError::component(
                "wait",
                format!("seconds out of range: {}", seconds),
            ));
        }
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(Value::Null)
    }
}

fn required_str<'a>(
    params: &'a Map<String, Value>,
    key: &str,
    component: &str,
) -> Result<&'a str, EngineError> {
    params.get(key).and_then(Value::as_str).ok_or_else(|| {
        EngineError::component(component, format!("missing string param `{}`", key))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_variable_set_defaults_to_state() {
        let mut ctx = RunContext::new(Map::new());
        VariableSet
            .execute(&params(json!({"name": "n", "value": 3})), &mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.get(Scope::State, "n").unwrap(), json!(3));
    }

    #[tokio::test]
    async fn test_variable_set_rejects_variables_scope() {
        let mut ctx = RunContext::new(Map::new());
        let err = VariableSet
            .execute(
                &params(json!({"name": "n", "value": 3, "scope": "variables"})),
                &mut ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ScopeViolation(Scope::Variables)));
    }

    #[tokio::test]
    async fn test_variable_set_unknown_scope() {
        let mut ctx = RunContext::new(Map::new());
        let err = VariableSet
            .execute(
                &params(json!({"name": "n", "value": 3, "scope": "global"})),
                &mut ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Component { .. }));
    }

    #[tokio::test]
    async fn test_log_requires_message() {
        let mut ctx = RunContext::new(Map::new());
        assert!(Log.execute(&Map::new(), &mut ctx).await.is_err());
        assert!(Log
            .execute(&params(json!({"message": "hi", "level": "debug"})), &mut ctx)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_wait_validates_seconds() {
        let mut ctx = RunContext::new(Map::new());
        assert!(Wait.execute(&Map::new(), &mut ctx).await.is_err());
        assert!(Wait
            .execute(&params(json!({"seconds": -1})), &mut ctx)
            .await
            .is_err());
        assert!(Wait
            .execute(&params(json!({"seconds": 0})), &mut ctx)
            .await
            .is_ok());
    }
}
