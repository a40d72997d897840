pub mod engine;
pub mod error;
pub mod events;

pub use engine::ReconcileEngine;
pub use error::EngineError;
pub use events::{EngineEvent, FailureKind, PlanOutcome, ReconcileSummary, StepResult};
