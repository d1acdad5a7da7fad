//! Run summary notification.
//!
//! The dispatcher fires once per terminal run, whatever the outcome:
//! failures are always surfaced, never swallowed silently. Channels are
//! fire-and-forget: a dispatch failure is logged and never escalates to a
//! run failure.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::report::RunReport;

/// A destination for run summaries.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name for logs.
    fn name(&self) -> &str;

    async fn send(&self, report: &RunReport) -> anyhow::Result<()>;
}

/// Posts the JSON run summary to a webhook (chat integrations).
pub struct WebhookChannel {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, report: &RunReport) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(report)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Emits the run summary into the process log stream.
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, report: &RunReport) -> anyhow::Result<()> {
        info!(
            run_id = %report.run_id,
            pipeline = %report.pipeline,
            status = %report.status,
            violations = report.violation_count,
            errors = report.error_count,
            duration_ms = report.total_duration_ms,
            "run summary"
        );
        Ok(())
    }
}

/// Fans a run summary out to every configured channel.
pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// Deliver the summary to every channel. Never fails.
    pub async fn notify(&self, report: &RunReport) {
        for channel in &self.channels {
            match channel.send(report).await {
                Ok(()) => debug!(channel = %channel.name(), "notification dispatched"),
                Err(e) => warn!(
                    channel = %channel.name(),
                    error = %e,
                    "notification dispatch failed"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FailingChannel, RecordingChannel};
    use crate::report::RunReport;
    use conforma_domain::{ArtifactStore, PipelineRun, RunStatus, TriggerKind};

    fn sample_report() -> RunReport {
        let mut run = PipelineRun::new(TriggerKind::Manual, "main");
        run.start();
        run.finish(RunStatus::Failed);
        RunReport::build(&run, &ArtifactStore::new(), "compliance", "digest")
    }

    #[tokio::test]
    async fn test_dispatch_reaches_all_channels() {
        let a = Arc::new(RecordingChannel::new());
        let b = Arc::new(RecordingChannel::new());
        let dispatcher =
            NotificationDispatcher::new(vec![a.clone() as Arc<dyn NotificationChannel>, b.clone()]);

        dispatcher.notify(&sample_report()).await;

        assert_eq!(a.sent().len(), 1);
        assert_eq!(b.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_channel_failure_never_escalates() {
        let failing = Arc::new(FailingChannel);
        let recording = Arc::new(RecordingChannel::new());
        let dispatcher = NotificationDispatcher::new(vec![
            failing as Arc<dyn NotificationChannel>,
            recording.clone(),
        ]);

        // notify has no error path; the broken channel must not stop the rest
        dispatcher.notify(&sample_report()).await;
        assert_eq!(recording.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_log_channel_accepts_any_report() {
        let report = sample_report();
        LogChannel.send(&report).await.expect("log channel never fails");
    }
}
