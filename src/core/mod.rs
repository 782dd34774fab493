pub mod config;
pub mod context;
pub mod error;
pub mod interpolate;
pub mod pipeline;

pub use config::PipelineConfig;
pub use context::{RunContext, Scope};
pub use error::EngineError;
pub use pipeline::{PipelineDefinition, StepDefinition, StepKind};
