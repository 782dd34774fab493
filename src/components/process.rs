//! Subprocess escape hatches for `shell` and `python` steps
//!
//! Raw bodies never run in-process: they are spawned as bounded child
//! processes with a wall-clock timeout. A non-zero exit is a step failure;
//! success yields `{exit_code, stdout, stderr}`.

use crate::core::error::EngineError;
use serde_json::{json, Value};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    python: String,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            python: "python3".to_string(),
        }
    }
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Run a shell command line through `sh -c`.
    pub async fn run_command(&self, command: &str) -> Result<Value, EngineError> {
        debug!(command, "spawning shell step");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        self.run("shell", cmd).await
    }

    /// Run a python snippet through the interpreter.
    pub async fn run_code(&self, code: &str) -> Result<Value, EngineError> {
        debug!("spawning python step");
        let mut cmd = Command::new(&self.python);
        cmd.arg("-c").arg(code);
        self.run("python", cmd).await
    }

    async fn run(&self, kind: &str, mut cmd: Command) -> Result<Value, EngineError> {
        cmd.kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                EngineError::component(kind, format!("timed out after {:?}", self.timeout))
            })?
            .map_err(|e| EngineError::component(kind, format!("failed to spawn: {}", e)))?;

        let result = to_result(&output);
        if output.status.success() {
            Ok(result)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(EngineError::component(
                kind,
                format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ))
        }
    }
}

fn to_result(output: &Output) -> Value {
    json!({
        "exit_code": output.status.code().unwrap_or(-1),
        "stdout": String::from_utf8_lossy(&output.stdout).trim_end(),
        "stderr": String::from_utf8_lossy(&output.stderr).trim_end(),
    })
}
