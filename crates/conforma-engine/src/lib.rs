//! Conforma Engine - compliance pipeline execution
//!
//! Drives stage-gated pipeline runs:
//! - Loads and validates pipeline definitions (fatal before any run starts)
//! - Fans tasks out to runners in parallel within each stage
//! - Evaluates gates (verdict + branch/approval predicates) between stages
//! - Always dispatches a run summary, whatever the outcome

pub mod definition;
pub mod fakes;
pub mod gate;
pub mod notify;
pub mod orchestrator;
pub mod report;
pub mod runner;
pub mod stage;
pub mod telemetry;
pub mod tools;

// Re-export key types
pub use definition::{GateSpec, PipelineSpec, StageSpec, TaskSpec};
pub use gate::{evaluate_gate, ApprovalPredicate, BranchPredicate, GateContext, Predicate};
pub use notify::{LogChannel, NotificationChannel, NotificationDispatcher, WebhookChannel};
pub use orchestrator::{abort_channel, AbortHandle, Orchestrator, RunOutput, TriggerEvent};
pub use report::{RunReport, StageReport, TaskReport};
pub use runner::{never_cancelled, CancelSignal, CommandRunner, RunContext, TaskRunner};
pub use stage::StageExecutor;
pub use tools::BuiltinTool;
