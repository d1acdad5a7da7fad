//! Task outcomes produced by external tool invocations.

use serde::{Deserialize, Serialize};

/// Final status of a single task.
///
/// `Failure` and `Error` are deliberately distinct: a policy check that
/// reports violations is a `Failure` (the tool ran and said no), while a
/// scanner that could not be spawned or timed out is an `Error` (the check
/// itself never happened).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Tool ran and reported a positive result.
    Success,
    /// Tool ran and reported a negative result (non-zero exit, violations).
    Failure,
    /// Tool could not run to completion (spawn failure, timeout, abort).
    Error,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failure => write!(f, "failure"),
            TaskStatus::Error => write!(f, "error"),
        }
    }
}

/// Outcome of one task invocation. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Task name.
    pub task_name: String,

    /// Final status.
    pub status: TaskStatus,

    /// Human-readable detail (diagnostic text, exit code, error message).
    pub message: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Names of artifacts this task registered.
    pub artifacts: Vec<String>,
}

impl TaskOutcome {
    pub fn success(task_name: impl Into<String>, message: impl Into<String>, duration_ms: u64) -> Self {
        Self::with_status(task_name, TaskStatus::Success, message, duration_ms)
    }

    pub fn failure(task_name: impl Into<String>, message: impl Into<String>, duration_ms: u64) -> Self {
        Self::with_status(task_name, TaskStatus::Failure, message, duration_ms)
    }

    pub fn error(task_name: impl Into<String>, message: impl Into<String>, duration_ms: u64) -> Self {
        Self::with_status(task_name, TaskStatus::Error, message, duration_ms)
    }

    fn with_status(
        task_name: impl Into<String>,
        status: TaskStatus,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            status,
            message: message.into(),
            duration_ms,
            artifacts: Vec::new(),
        }
    }

    /// Attach names of artifacts registered by this task.
    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Whether this task counts toward the stage's pass tally.
    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Success
    }
}
