//! Stage fan-out execution.
//!
//! Tasks within one stage run concurrently under a semaphore bound; the
//! executor blocks until every fanned-out task reports, so a stage never
//! partially reports. A stage-level ceiling or a run-level cancellation
//! flips the shared signal and the outstanding tasks fold themselves into
//! `error` outcomes; the stage still produces a verdict from whatever
//! outcomes exist.

use std::sync::Arc;
use std::time::{Duration, Instant};

use conforma_domain::{ArtifactStore, StageRecord, TaskOutcome};
use futures::future::join_all;
use tokio::sync::{watch, Semaphore};
use tracing::warn;

use crate::definition::StageSpec;
use crate::runner::{wait_cancelled, CancelSignal, RunContext, TaskRunner};

/// Fans a stage's tasks out to the runner and collects the record.
pub struct StageExecutor {
    runner: Arc<dyn TaskRunner>,
    max_concurrency: usize,
}

impl StageExecutor {
    pub fn new(runner: Arc<dyn TaskRunner>, max_concurrency: usize) -> Self {
        Self {
            runner,
            max_concurrency,
        }
    }

    /// Execute every task of the stage and aggregate the verdict.
    pub async fn execute(
        &self,
        spec: &StageSpec,
        ordinal: usize,
        branch: &str,
        default_timeout: Duration,
        artifacts: Arc<ArtifactStore>,
        run_cancel: CancelSignal,
    ) -> StageRecord {
        let start = Instant::now();
        let (cancel_tx, cancel_rx) = watch::channel(None);
        let sem = Arc::new(Semaphore::new(self.max_concurrency));

        let mut names = Vec::new();
        let mut handles = Vec::new();
        for task in &spec.tasks {
            let runner = Arc::clone(&self.runner);
            let task = task.clone();
            let sem = Arc::clone(&sem);
            let ctx = RunContext::new(
                &spec.name,
                branch,
                default_timeout,
                Arc::clone(&artifacts),
                cancel_rx.clone(),
            );

            names.push(task.name.clone());
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                // Tasks still queued behind the bound when the stage is
                // cancelled must not start at all.
                if let Some(reason) = *ctx.cancel.borrow() {
                    return TaskOutcome::error(&task.name, format!("cancelled: {}", reason), 0);
                }
                runner.run(&task, &ctx).await
            }));
        }

        let joins = join_all(handles);
        tokio::pin!(joins);

        let ceiling = (spec.timeout_secs > 0).then(|| Duration::from_secs(spec.timeout_secs));

        let results = tokio::select! {
            results = &mut joins => results,
            _ = async { tokio::time::sleep(ceiling.unwrap()).await }, if ceiling.is_some() => {
                warn!(stage = %spec.name, "stage deadline exceeded; cancelling outstanding tasks");
                let _ = cancel_tx.send(Some("stage deadline exceeded"));
                (&mut joins).await
            }
            reason = wait_cancelled(run_cancel.clone()) => {
                warn!(stage = %spec.name, reason = %reason, "cancelling outstanding tasks");
                let _ = cancel_tx.send(Some(reason));
                (&mut joins).await
            }
        };

        let outcomes: Vec<TaskOutcome> = results
            .into_iter()
            .zip(names)
            .map(|(result, name)| match result {
                Ok(outcome) => outcome,
                Err(e) => TaskOutcome::error(&name, format!("task panicked: {}", e), 0),
            })
            .collect();

        let duration_ms = start.elapsed().as_millis() as u64;
        StageRecord::from_outcomes(&spec.name, ordinal, spec.mode, outcomes, duration_ms)
    }
}
