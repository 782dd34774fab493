//! CLI command definitions and entry points

use crate::cli::output::*;
use crate::core::pipeline::PipelineDefinition;
use crate::execution::{CancelFlag, ExecutionEngine, RunStatus};
use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Variable overrides (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub variable: Vec<(String, String)>,

    /// Output the run outcome in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a pipeline document
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

pub async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let definition =
        PipelineDefinition::from_file(&cmd.file).context("Failed to load pipeline")?;

    if !cmd.json {
        println!("{} Loaded pipeline: {}", INFO, style(&definition.name).bold());
    }

    // Variable overrides; values are YAML scalars so `n=3` stays a number.
    let mut overrides = Map::new();
    for (key, raw) in &cmd.variable {
        let value: Value =
            serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
        if !cmd.json {
            println!(
                "{} Variable override: {} = {}",
                INFO,
                style(key).cyan(),
                style(raw).dim()
            );
        }
        overrides.insert(key.clone(), value);
    }

    let mut engine = ExecutionEngine::with_builtins();
    if !cmd.json {
        engine.add_event_handler(Arc::new(ConsoleEventHandler));
    }

    // Ctrl-C cancels cooperatively; the run finishes its in-flight step and
    // reports a Cancelled outcome.
    let cancel = CancelFlag::new();
    let signal_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_flag.cancel();
        }
    });

    if !cmd.json {
        println!();
    }
    let outcome = engine
        .run_with_cancel(&definition, overrides, cancel)
        .await;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        match outcome.status {
            RunStatus::Completed => println!(
                "\n{} {} completed {}",
                CHECK,
                style(&outcome.pipeline).bold(),
                style("successfully").green()
            ),
            RunStatus::Cancelled => println!(
                "\n{} {} {}",
                WARN,
                style(&outcome.pipeline).bold(),
                style("cancelled").yellow()
            ),
            RunStatus::Failed => {
                println!(
                    "\n{} {} {}",
                    CROSS,
                    style(&outcome.pipeline).bold(),
                    style("failed").red()
                );
                if let Some(error) = &outcome.error {
                    println!("  {}", style(&error.message).red());
                }
            }
        }
    }

    if outcome.status == RunStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

pub fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    let result = PipelineDefinition::from_file(&cmd.file);

    if cmd.json {
        let report = match &result {
            Ok(definition) => serde_json::json!({
                "valid": true,
                "name": definition.name,
                "steps": definition.steps.len(),
                "variables": definition.variables.len(),
            }),
            Err(e) => serde_json::json!({
                "valid": false,
                "error": e.to_string(),
            }),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        if result.is_err() {
            std::process::exit(1);
        }
        return Ok(());
    }

    match result {
        Ok(definition) => {
            println!("{} Pipeline document is valid!", CHECK);
            println!("  Name: {}", style(&definition.name).bold());
            println!("  Steps: {}", style(definition.steps.len()).cyan());
            println!("  Variables: {}", style(definition.variables.len()).cyan());
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("a=b").unwrap(),
            ("a".to_string(), "b".to_string())
        );
        assert_eq!(
            parse_key_value("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_key_value("nope").is_err());
    }
}
