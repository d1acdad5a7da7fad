//! The pipeline run record.
//!
//! A `PipelineRun` is created on trigger receipt, mutated only by the
//! orchestrator (single writer), and immutable once a terminal status is
//! set. The core never persists it; the terminal record is exported and
//! then discarded by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{EventRecord, PipelineEvent};
use crate::stage::StageRecord;
use crate::task::TaskStatus;

/// What started the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerKind {
    Push,
    PullRequest,
    Schedule,
    Manual,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::Push => write!(f, "push"),
            TriggerKind::PullRequest => write!(f, "pull-request"),
            TriggerKind::Schedule => write!(f, "schedule"),
            TriggerKind::Manual => write!(f, "manual"),
        }
    }
}

/// Lifecycle status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// Created, not yet executing.
    Pending,
    Running,
    Succeeded,
    Failed,
    /// All quality stages passed; the deploy suffix was skipped by a
    /// predicate (wrong branch, missing approval).
    SkippedDeploy,
}

impl RunStatus {
    /// Terminal statuses are final; a new trigger creates a new run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::SkippedDeploy
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::SkippedDeploy => write!(f, "skipped-deploy"),
        }
    }
}

/// Accumulated run metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Total wall-clock time of the run in milliseconds.
    pub total_duration_ms: u64,

    /// Count of tasks reporting `failure` (tools that ran and said no).
    /// Errors (the check never happened) are tracked separately.
    pub violation_count: u32,

    /// Count of tasks reporting `error`.
    pub error_count: u32,
}

/// The full record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique run ID.
    pub id: String,

    /// What started the run.
    pub trigger: TriggerKind,

    /// Branch or ref the run was triggered for.
    pub branch: String,

    /// Current status.
    pub status: RunStatus,

    /// Stage results, appended as stages complete.
    pub stages: Vec<StageRecord>,

    /// Names of declared stages that never executed because an upstream
    /// gate closed with reason `skipped`.
    pub skipped_stages: Vec<String>,

    /// Append-only lifecycle event stream.
    pub events: Vec<EventRecord>,

    /// Accumulated metrics.
    pub metrics: RunMetrics,

    /// Reason string when the run was aborted by an operator.
    pub abort_reason: Option<String>,

    /// Timestamps
    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create a new run in `Pending` state.
    pub fn new(trigger: TriggerKind, branch: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            trigger,
            branch: branch.into(),
            status: RunStatus::Pending,
            stages: Vec::new(),
            skipped_stages: Vec::new(),
            events: Vec::new(),
            metrics: RunMetrics::default(),
            abort_reason: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Transition to running.
    pub fn start(&mut self) {
        debug_assert!(!self.status.is_terminal(), "terminal runs are immutable");
        self.status = RunStatus::Running;
        self.started_at = Utc::now();
    }

    /// Append a completed stage record and fold its outcomes into metrics.
    pub fn record_stage(&mut self, record: StageRecord) {
        debug_assert!(!self.status.is_terminal(), "terminal runs are immutable");
        for task in &record.tasks {
            match task.status {
                TaskStatus::Failure => self.metrics.violation_count += 1,
                TaskStatus::Error => self.metrics.error_count += 1,
                TaskStatus::Success => {}
            }
        }
        self.stages.push(record);
    }

    /// Append a lifecycle event, assigning the next sequence number.
    pub fn record_event(&mut self, event: PipelineEvent) {
        debug_assert!(!self.status.is_terminal(), "terminal runs are immutable");
        let seq = self.events.len() as u64 + 1;
        self.events.push(EventRecord::new(seq, event));
    }

    /// Set a terminal status and freeze the record.
    pub fn finish(&mut self, status: RunStatus) {
        debug_assert!(status.is_terminal(), "finish requires a terminal status");
        self.status = status;
        let now = Utc::now();
        self.metrics.total_duration_ms = now
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .try_into()
            .unwrap_or(0);
        self.finished_at = Some(now);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Number of executed stages whose verdict was `pass`.
    pub fn passed_stage_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.verdict == crate::stage::StageVerdict::Pass)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{ExecutionMode, StageRecord, StageVerdict};
    use crate::task::TaskOutcome;

    #[test]
    fn test_run_lifecycle() {
        let mut run = PipelineRun::new(TriggerKind::Push, "main");
        assert_eq!(run.status, RunStatus::Pending);
        assert!(!run.is_terminal());

        run.start();
        assert_eq!(run.status, RunStatus::Running);

        run.finish(RunStatus::Succeeded);
        assert_eq!(run.status, RunStatus::Succeeded);
        assert!(run.is_terminal());
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_record_stage_updates_metrics() {
        let mut run = PipelineRun::new(TriggerKind::PullRequest, "feature/x");
        run.start();

        let record = StageRecord::from_outcomes(
            "policy_eval",
            2,
            ExecutionMode::Required,
            vec![
                TaskOutcome::success("opa_backup", "exit code 0", 50),
                TaskOutcome::failure("opa_crypto", "2 rules violated", 60),
                TaskOutcome::error("opa_network", "deadline exceeded", 5000),
            ],
            5110,
        );
        run.record_stage(record);

        assert_eq!(run.stages.len(), 1);
        assert_eq!(run.metrics.violation_count, 1);
        assert_eq!(run.metrics.error_count, 1);
        assert_eq!(run.stages[0].verdict, StageVerdict::Partial);
    }

    #[test]
    fn test_event_sequence_numbers() {
        let mut run = PipelineRun::new(TriggerKind::Schedule, "main");
        run.start();
        run.record_event(PipelineEvent::RunStarted {
            run_id: run.id.clone(),
            branch: run.branch.clone(),
        });
        run.record_event(PipelineEvent::StageStarted {
            stage: "validate".to_string(),
            ordinal: 0,
        });

        assert_eq!(run.events.len(), 2);
        assert_eq!(run.events[0].seq, 1);
        assert_eq!(run.events[1].seq, 2);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(RunStatus::SkippedDeploy.to_string(), "skipped-deploy");
        assert_eq!(TriggerKind::PullRequest.to_string(), "pull-request");
    }

    #[test]
    fn test_run_ids_unique() {
        let a = PipelineRun::new(TriggerKind::Manual, "main");
        let b = PipelineRun::new(TriggerKind::Manual, "main");
        assert_ne!(a.id, b.id);
    }
}
