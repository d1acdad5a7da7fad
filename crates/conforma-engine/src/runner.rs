//! Task execution against external tools.
//!
//! The runner boundary is where the continue-and-report discipline is
//! enforced: every failure mode of a tool invocation (spawn failure,
//! non-zero exit, timeout, cancellation) is folded into a [`TaskOutcome`]
//! and never propagated as a program fault. The orchestrator can then apply
//! one uniform policy without per-tool special casing.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use conforma_domain::{Artifact, ArtifactKind, ArtifactStore, ConformaError, TaskOutcome};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::warn;

use crate::definition::TaskSpec;

/// Cancellation signal shared by every task in a stage.
///
/// Holds `None` until the stage or run is cancelled, then the reason.
pub type CancelSignal = watch::Receiver<Option<&'static str>>;

/// Create a signal that never fires, for callers without a canceller.
pub fn never_cancelled() -> CancelSignal {
    let (tx, rx) = watch::channel(None);
    // Receiver treats a closed channel as "never cancelled".
    drop(tx);
    rx
}

/// Resolve once the signal carries a cancellation reason.
pub(crate) async fn wait_cancelled(mut rx: CancelSignal) -> &'static str {
    loop {
        if let Some(reason) = *rx.borrow() {
            return reason;
        }
        if rx.changed().await.is_err() {
            // Sender dropped without cancelling: block forever.
            std::future::pending::<()>().await;
        }
    }
}

/// Context handed to every task of one stage.
#[derive(Clone)]
pub struct RunContext {
    /// Stage the tasks belong to; prefixes artifact keys.
    pub stage: String,

    /// Branch the run was triggered for.
    pub branch: String,

    /// Applied where a task declares timeout 0.
    pub default_timeout: Duration,

    /// Run-scoped artifact accumulator.
    pub artifacts: Arc<ArtifactStore>,

    /// Cooperative cancellation signal.
    pub cancel: CancelSignal,
}

impl RunContext {
    pub fn new(
        stage: impl Into<String>,
        branch: impl Into<String>,
        default_timeout: Duration,
        artifacts: Arc<ArtifactStore>,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            stage: stage.into(),
            branch: branch.into(),
            default_timeout,
            artifacts,
            cancel,
        }
    }
}

/// Executes one task and reports a structured outcome.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Never fails: all failure modes are translated into the outcome.
    async fn run(&self, task: &TaskSpec, ctx: &RunContext) -> TaskOutcome;
}

/// Runs tasks as external commands.
pub struct CommandRunner;

#[async_trait]
impl TaskRunner for CommandRunner {
    async fn run(&self, task: &TaskSpec, ctx: &RunContext) -> TaskOutcome {
        if task.command.is_empty() {
            return TaskOutcome::error(&task.name, "task has an empty command", 0);
        }

        let timeout = if task.timeout_secs == 0 {
            ctx.default_timeout
        } else {
            Duration::from_secs(task.timeout_secs)
        };

        // Spawn failures are the transient class worth retrying; a non-zero
        // exit or a timeout is a real result, not a fault of the invocation.
        let start = Instant::now();
        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(250);
        loop {
            attempt += 1;
            match self.try_once(task, ctx, timeout).await {
                Ok(outcome) => return outcome,
                Err(spawn_err) => {
                    if attempt > task.max_retries {
                        let elapsed = start.elapsed().as_millis() as u64;
                        let err = ConformaError::ToolUnavailable {
                            tool: task.command[0].clone(),
                            detail: spawn_err.to_string(),
                        };
                        return TaskOutcome::error(&task.name, err.to_string(), elapsed);
                    }
                    warn!(
                        task = %task.name,
                        attempt,
                        error = %spawn_err,
                        "spawn failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
}

impl CommandRunner {
    /// One invocation attempt. `Err` only on spawn failure.
    async fn try_once(
        &self,
        task: &TaskSpec,
        ctx: &RunContext,
        timeout: Duration,
    ) -> std::io::Result<TaskOutcome> {
        let start = Instant::now();

        let mut command = Command::new(&task.command[0]);
        command
            .args(&task.command[1..])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn()?;

        // kill_on_drop reaps the child when the unfinished branch is dropped
        let output = tokio::select! {
            out = child.wait_with_output() => match out {
                Ok(output) => output,
                Err(e) => {
                    let elapsed = start.elapsed().as_millis() as u64;
                    return Ok(TaskOutcome::error(
                        &task.name,
                        format!("failed to collect output: {}", e),
                        elapsed,
                    ));
                }
            },
            _ = tokio::time::sleep(timeout) => {
                let elapsed = start.elapsed().as_millis() as u64;
                return Ok(TaskOutcome::error(&task.name, "deadline exceeded", elapsed));
            }
            reason = wait_cancelled(ctx.cancel.clone()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                return Ok(TaskOutcome::error(
                    &task.name,
                    format!("cancelled: {}", reason),
                    elapsed,
                ));
            }
        };

        let elapsed = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        // Captured output is registered before the outcome returns, so the
        // record always points at artifacts that exist.
        let mut artifact_names = Vec::new();
        if !stdout.is_empty() {
            let name = format!("{}.stdout", task.name);
            ctx.artifacts.put(Artifact::new(
                &ctx.stage,
                &name,
                ArtifactKind::Log,
                stdout.into_bytes(),
            ));
            artifact_names.push(name);
        }
        if !stderr.is_empty() {
            let name = format!("{}.stderr", task.name);
            ctx.artifacts.put(Artifact::new(
                &ctx.stage,
                &name,
                ArtifactKind::Log,
                stderr.into_bytes(),
            ));
            artifact_names.push(name);
        }

        let outcome = if output.status.success() {
            TaskOutcome::success(&task.name, "exit code 0", elapsed)
        } else {
            TaskOutcome::failure(&task.name, format!("exited with code {}", exit_code), elapsed)
        };

        Ok(outcome.with_artifacts(artifact_names))
    }
}
