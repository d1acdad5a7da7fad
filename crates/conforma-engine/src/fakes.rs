//! In-memory fakes for engine seams (testing only)
//!
//! Provides `ScriptedRunner` and notification channel fakes that satisfy
//! the trait contracts without touching external tools or the network.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use conforma_domain::{TaskOutcome, TaskStatus};

use crate::definition::TaskSpec;
use crate::notify::NotificationChannel;
use crate::report::RunReport;
use crate::runner::{wait_cancelled, RunContext, TaskRunner};

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

/// Task runner returning pre-programmed outcomes by task name.
///
/// Tasks without a script entry succeed. An optional delay makes the
/// runner hold each task open so cancellation paths can be exercised.
#[derive(Default)]
pub struct ScriptedRunner {
    outcomes: HashMap<String, TaskStatus>,
    delay: Option<Duration>,
}

impl ScriptedRunner {
    /// Every task succeeds.
    pub fn all_success() -> Self {
        Self::default()
    }

    /// Script an outcome for one task.
    pub fn with(mut self, task: &str, status: TaskStatus) -> Self {
        self.outcomes.insert(task.to_string(), status);
        self
    }

    /// Hold every task open for `delay` before reporting.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl TaskRunner for ScriptedRunner {
    async fn run(&self, task: &TaskSpec, ctx: &RunContext) -> TaskOutcome {
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                reason = wait_cancelled(ctx.cancel.clone()) => {
                    return TaskOutcome::error(&task.name, format!("cancelled: {}", reason), 0);
                }
            }
        }

        match self
            .outcomes
            .get(&task.name)
            .copied()
            .unwrap_or(TaskStatus::Success)
        {
            TaskStatus::Success => TaskOutcome::success(&task.name, "scripted success", 1),
            TaskStatus::Failure => TaskOutcome::failure(&task.name, "scripted failure", 1),
            TaskStatus::Error => TaskOutcome::error(&task.name, "scripted error", 1),
        }
    }
}

// ---------------------------------------------------------------------------
// Notification channel fakes
// ---------------------------------------------------------------------------

/// Captures every dispatched report.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<RunReport>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports dispatched so far.
    pub fn sent(&self) -> Vec<RunReport> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, report: &RunReport) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(report.clone());
        Ok(())
    }
}

/// Always fails, for exercising the dispatcher's log-and-continue path.
pub struct FailingChannel;

#[async_trait]
impl NotificationChannel for FailingChannel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn send(&self, _report: &RunReport) -> anyhow::Result<()> {
        anyhow::bail!("channel down")
    }
}
