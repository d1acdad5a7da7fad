//! Pipeline run orchestration.
//!
//! Drives a run from trigger to terminal status: stages execute strictly
//! in declared order, each fanned out and gated, and the notification
//! dispatcher fires exactly once at the end whatever the outcome. The only
//! way to abort before a run starts is a malformed definition.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use conforma_domain::{
    ArtifactStore, CloseReason, GateDecision, PipelineEvent, PipelineRun, Result, RunStatus,
    TriggerKind,
};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::definition::PipelineSpec;
use crate::gate::{evaluate_gate, predicates_for, GateContext};
use crate::notify::NotificationDispatcher;
use crate::report::RunReport;
use crate::runner::{never_cancelled, CancelSignal, TaskRunner};
use crate::stage::StageExecutor;

/// The event that creates a run.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub trigger: TriggerKind,

    /// Branch or ref the event fired for.
    pub branch: String,

    /// Operator approval for the deploy suffix, resolved before the run.
    pub approved: bool,
}

impl TriggerEvent {
    pub fn new(trigger: TriggerKind, branch: impl Into<String>) -> Self {
        Self {
            trigger,
            branch: branch.into(),
            approved: false,
        }
    }

    pub fn approved(mut self) -> Self {
        self.approved = true;
        self
    }
}

/// Everything a finished run leaves behind.
#[derive(Debug)]
pub struct RunOutput {
    pub run: PipelineRun,
    pub report: RunReport,
    pub artifacts: Arc<ArtifactStore>,
}

/// Handle an operator uses to abort an in-flight run.
pub struct AbortHandle {
    tx: watch::Sender<Option<&'static str>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        let _ = self.tx.send(Some("aborted"));
    }
}

/// Create an abort handle plus the signal to hand the orchestrator.
pub fn abort_channel() -> (AbortHandle, CancelSignal) {
    let (tx, rx) = watch::channel(None);
    (AbortHandle { tx }, rx)
}

/// Drives pipeline runs.
pub struct Orchestrator {
    runner: Arc<dyn TaskRunner>,
    dispatcher: NotificationDispatcher,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn TaskRunner>, dispatcher: NotificationDispatcher) -> Self {
        Self { runner, dispatcher }
    }

    /// Execute a run without an external abort signal.
    pub async fn execute(&self, spec: &PipelineSpec, trigger: TriggerEvent) -> Result<RunOutput> {
        self.execute_with_abort(spec, trigger, never_cancelled()).await
    }

    /// Execute a run, observing an operator abort signal.
    ///
    /// Returns `Err` only for a malformed definition: that is an operator
    /// error, not a compliance signal, and no run record or notification is
    /// produced for it. Every other outcome terminates normally with a
    /// dispatched summary.
    #[instrument(skip_all, fields(pipeline = %spec.name, branch = %trigger.branch))]
    pub async fn execute_with_abort(
        &self,
        spec: &PipelineSpec,
        trigger: TriggerEvent,
        abort: CancelSignal,
    ) -> Result<RunOutput> {
        spec.validate()?;
        let digest = spec.digest();

        let mut run = PipelineRun::new(trigger.trigger, trigger.branch.clone());
        run.start();
        run.record_event(PipelineEvent::RunStarted {
            run_id: run.id.clone(),
            branch: run.branch.clone(),
        });
        info!(run_id = %run.id, digest = %spec.short_digest(), "starting pipeline run");

        let artifacts = Arc::new(ArtifactStore::new());
        let executor = StageExecutor::new(Arc::clone(&self.runner), spec.max_task_concurrency);
        let gate_ctx = GateContext {
            branch: trigger.branch.clone(),
            approved: trigger.approved,
        };
        let default_timeout = Duration::from_secs(spec.default_task_timeout_secs);

        let mut status = RunStatus::Succeeded;
        for (i, stage_spec) in spec.stages.iter().enumerate() {
            if abort.borrow().is_some() {
                run.abort_reason = Some("aborted".to_string());
                status = RunStatus::Failed;
                break;
            }

            info!(stage = %stage_spec.name, ordinal = i, "executing stage");
            run.record_event(PipelineEvent::StageStarted {
                stage: stage_spec.name.clone(),
                ordinal: i,
            });

            let mut record = executor
                .execute(
                    stage_spec,
                    i,
                    &trigger.branch,
                    default_timeout,
                    Arc::clone(&artifacts),
                    abort.clone(),
                )
                .await;

            for task in &record.tasks {
                run.record_event(PipelineEvent::TaskFinished {
                    stage: stage_spec.name.clone(),
                    task: task.task_name.clone(),
                    status: task.status,
                    duration_ms: task.duration_ms,
                });
            }
            run.record_event(PipelineEvent::StageFinished {
                stage: stage_spec.name.clone(),
                verdict: record.verdict,
                duration_ms: record.duration_ms,
            });

            // Operator abort trumps gating: the stage was cut short, not judged.
            if abort.borrow().is_some() {
                run.record_stage(record);
                run.abort_reason = Some("aborted".to_string());
                status = RunStatus::Failed;
                break;
            }

            let predicates = predicates_for(&stage_spec.gate);
            let decision = evaluate_gate(record.verdict, stage_spec.mode, &predicates, &gate_ctx);
            run.record_event(PipelineEvent::GateEvaluated {
                stage: stage_spec.name.clone(),
                decision: decision.clone(),
            });
            record.gate = Some(decision.clone());
            run.record_stage(record);

            match decision {
                GateDecision::Open => {}
                GateDecision::Closed {
                    reason: CloseReason::Blocked,
                    detail,
                } => {
                    warn!(stage = %stage_spec.name, detail = %detail, "gate blocked; downstream stages will not run");
                    status = RunStatus::Failed;
                    break;
                }
                GateDecision::Closed {
                    reason: CloseReason::Skipped,
                    detail,
                } => {
                    info!(stage = %stage_spec.name, detail = %detail, "gate skipped the remaining stages");
                    run.skipped_stages = spec.stages[i + 1..]
                        .iter()
                        .map(|s| s.name.clone())
                        .collect();
                    status = RunStatus::SkippedDeploy;
                    break;
                }
            }
        }

        let elapsed_ms = Utc::now()
            .signed_duration_since(run.started_at)
            .num_milliseconds()
            .max(0) as u64;
        run.record_event(PipelineEvent::RunFinished {
            run_id: run.id.clone(),
            status,
            duration_ms: elapsed_ms,
        });
        run.finish(status);

        let report = RunReport::build(&run, &artifacts, &spec.name, &digest);

        // Exactly once, for every terminal status.
        self.dispatcher.notify(&report).await;

        info!(
            run_id = %run.id,
            status = %run.status,
            duration_ms = run.metrics.total_duration_ms,
            "pipeline run finished"
        );

        Ok(RunOutput {
            run,
            report,
            artifacts,
        })
    }
}
