//! CLI output formatting

use crate::execution::{EventHandler, ExecutionEvent, RunStatus};
use async_trait::async_trait;
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Completed => style("COMPLETED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
        RunStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted { pipeline } => {
            format!("{} Starting pipeline {}", ROCKET, style(pipeline).bold())
        }
        ExecutionEvent::StepStarted { step } => {
            format!("{} {}", SPINNER, style(step).cyan())
        }
        ExecutionEvent::StepCompleted { step } => {
            format!("{} {}", CHECK, style(step).green())
        }
        ExecutionEvent::StepFailed {
            step,
            error,
            ignored,
        } => {
            if *ignored {
                format!(
                    "{} {} (ignored): {}",
                    WARN,
                    style(step).yellow(),
                    style(error).dim()
                )
            } else {
                format!("{} {}: {}", CROSS, style(step).red(), style(error).dim())
            }
        }
        ExecutionEvent::PipelineCompleted { pipeline, status } => {
            format!(
                "{} Pipeline {} {}",
                INFO,
                style(pipeline).bold(),
                format_status(*status)
            )
        }
    }
}

/// Prints each execution event to stdout.
pub struct ConsoleEventHandler;

#[async_trait]
impl EventHandler for ConsoleEventHandler {
    async fn handle(&self, event: ExecutionEvent) {
        println!("{}", format_execution_event(&event));
    }
}
