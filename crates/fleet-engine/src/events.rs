use chrono::{DateTime, Utc};
use fleet_differ::Step;
use serde::{Deserialize, Serialize};

/// Transient failures are retried by the next scheduled tick; permanent
/// failures mark the affected service `failed` in Current and reconciliation
/// continues with the rest of the plan where it safely can (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Transient,
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub steps_applied: usize,
    pub steps_total: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Outcome of an explicit `Reconcile()` call. An empty plan (target and
/// current already agree) surfaces as `Completed` with a zero-step summary,
/// not as a distinct variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanOutcome {
    Completed(ReconcileSummary),
    Failed { summary: ReconcileSummary, step_index: usize, kind: FailureKind },
    /// A reconciliation was already in flight; this call was a no-op.
    AlreadyRunning,
    /// Shutdown was requested at a step boundary; Current was persisted with
    /// whatever steps completed and execution stopped there.
    Cancelled(ReconcileSummary),
}

/// Broadcast on the engine's `Events` channel. `broadcast` clones the value
/// on every send, so subscribers can never observe or mutate engine state
/// through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    TargetChanged,
    ReconcileStarted,
    StepApplied { step: Step, result: StepResult },
    ReconcileCompleted(ReconcileSummary),
    ReconcileFailed { kind: FailureKind, step_index: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepResult {
    InProgress,
    Succeeded,
    Failed(String),
}
