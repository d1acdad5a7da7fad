//! Stage verdicts and order-independent outcome aggregation.

use serde::{Deserialize, Serialize};

use crate::gate::GateDecision;
use crate::task::TaskOutcome;

/// Whether a stage's failure can close its gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Failure blocks everything downstream.
    Required,
    /// Failure is recorded but never blocks.
    Advisory,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Required => write!(f, "required"),
            ExecutionMode::Advisory => write!(f, "advisory"),
        }
    }
}

/// Aggregate outcome of all tasks in a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageVerdict {
    /// Every task succeeded.
    Pass,
    /// Every task failed or errored.
    Fail,
    /// Some tasks failed, some passed. Gates like `Fail`, reported
    /// distinctly because partial failures often point at flaky tools
    /// rather than policy violations.
    Partial,
}

impl std::fmt::Display for StageVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageVerdict::Pass => write!(f, "pass"),
            StageVerdict::Fail => write!(f, "fail"),
            StageVerdict::Partial => write!(f, "partial"),
        }
    }
}

/// Derive a stage verdict from collected task outcomes.
///
/// Pure aggregate over the outcome multiset: completion order never
/// influences the result.
pub fn aggregate_verdict(outcomes: &[TaskOutcome]) -> StageVerdict {
    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    if failed == 0 {
        StageVerdict::Pass
    } else if failed == outcomes.len() {
        StageVerdict::Fail
    } else {
        StageVerdict::Partial
    }
}

/// Record of one executed stage within a run.
///
/// Terminal once all task outcomes are collected; the gate decision is
/// attached by the orchestrator right after evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,

    /// Position in the declared sequence.
    pub ordinal: usize,

    /// Execution mode the stage was declared with.
    pub mode: ExecutionMode,

    /// Aggregate verdict over all task outcomes.
    pub verdict: StageVerdict,

    /// Outcomes of every task in the stage.
    pub tasks: Vec<TaskOutcome>,

    /// Decision of the gate following this stage, once evaluated.
    pub gate: Option<GateDecision>,

    /// Wall-clock duration of the stage in milliseconds.
    pub duration_ms: u64,
}

impl StageRecord {
    /// Build a record from collected outcomes, deriving the verdict.
    pub fn from_outcomes(
        name: impl Into<String>,
        ordinal: usize,
        mode: ExecutionMode,
        tasks: Vec<TaskOutcome>,
        duration_ms: u64,
    ) -> Self {
        let verdict = aggregate_verdict(&tasks);
        Self {
            name: name.into(),
            ordinal,
            mode,
            verdict,
            tasks,
            gate: None,
            duration_ms,
        }
    }

    /// Number of tasks that succeeded.
    pub fn passed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.succeeded()).count()
    }

    /// Number of tasks that failed or errored.
    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.succeeded()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskOutcome;

    fn ok(name: &str) -> TaskOutcome {
        TaskOutcome::success(name, "exit code 0", 10)
    }

    fn bad(name: &str) -> TaskOutcome {
        TaskOutcome::failure(name, "exited with code 1", 10)
    }

    fn broken(name: &str) -> TaskOutcome {
        TaskOutcome::error(name, "deadline exceeded", 10)
    }

    #[test]
    fn test_all_success_is_pass() {
        assert_eq!(aggregate_verdict(&[ok("a"), ok("b")]), StageVerdict::Pass);
    }

    #[test]
    fn test_all_failed_is_fail() {
        assert_eq!(aggregate_verdict(&[bad("a"), broken("b")]), StageVerdict::Fail);
    }

    #[test]
    fn test_mixed_is_partial() {
        assert_eq!(aggregate_verdict(&[ok("a"), bad("b")]), StageVerdict::Partial);
    }

    #[test]
    fn test_error_counts_like_failure() {
        assert_eq!(aggregate_verdict(&[ok("a"), broken("b")]), StageVerdict::Partial);
        assert_eq!(aggregate_verdict(&[broken("a")]), StageVerdict::Fail);
    }

    #[test]
    fn test_empty_outcomes_is_pass() {
        assert_eq!(aggregate_verdict(&[]), StageVerdict::Pass);
    }

    #[test]
    fn test_verdict_is_order_independent() {
        let outcomes = [ok("a"), bad("b"), ok("c")];
        let expected = aggregate_verdict(&outcomes);

        // Every rotation of the completion order yields the same verdict
        let mut rotated: Vec<TaskOutcome> = outcomes.to_vec();
        for _ in 0..outcomes.len() {
            rotated.rotate_left(1);
            assert_eq!(
                aggregate_verdict(&rotated),
                expected,
                "verdict must not depend on completion order"
            );
        }
    }

    #[test]
    fn test_stage_record_counts() {
        let record = StageRecord::from_outcomes(
            "security_scan",
            1,
            ExecutionMode::Required,
            vec![ok("tfsec"), bad("checkov")],
            250,
        );
        assert_eq!(record.verdict, StageVerdict::Partial);
        assert_eq!(record.passed_count(), 1);
        assert_eq!(record.failed_count(), 1);
        assert!(record.gate.is_none());
    }
}
