pub mod engine;
pub mod executor;

pub use engine::{
    CancelFlag, ErrorDetail, EventHandler, ExecutionEngine, ExecutionEvent, RunOutcome, RunStatus,
};
pub use executor::Control;
