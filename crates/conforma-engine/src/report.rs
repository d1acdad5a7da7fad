//! Run summary artifacts.
//!
//! Provides two output shapes for run consumers:
//! - `RunReport`: machine-readable record (JSON; also the webhook payload)
//! - `RunReport::render_markdown`: human-readable summary

use chrono::{DateTime, Utc};
use conforma_domain::{
    ArtifactRef, ArtifactStore, CloseReason, ExecutionMode, GateDecision, PipelineRun, RunStatus,
    StageVerdict, TaskStatus, TriggerKind,
};
use serde::{Deserialize, Serialize};

/// Outcome of a single task, payload-free.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskReport {
    pub name: String,
    pub status: TaskStatus,
    pub message: String,
    pub duration_ms: u64,
}

/// One executed stage with its verdict and gate decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub name: String,
    pub ordinal: usize,
    pub mode: ExecutionMode,
    pub verdict: StageVerdict,
    pub gate: Option<GateDecision>,
    pub duration_ms: u64,
    pub tasks: Vec<TaskReport>,
}

/// Structured summary of a terminal pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub pipeline: String,
    /// Digest of the definition version that produced this run.
    pub definition_digest: String,
    pub trigger: TriggerKind,
    pub branch: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_duration_ms: u64,
    /// Tasks whose tool ran and reported a negative result.
    pub violation_count: u32,
    /// Tasks whose tool could not run to completion.
    pub error_count: u32,
    pub stages: Vec<StageReport>,
    /// Declared stages that never executed because a gate skipped them.
    pub skipped_stages: Vec<String>,
    pub artifacts: Vec<ArtifactRef>,
    pub abort_reason: Option<String>,
}

impl RunReport {
    /// Build a report from a terminal run and its artifact store.
    pub fn build(
        run: &PipelineRun,
        artifacts: &ArtifactStore,
        pipeline: impl Into<String>,
        definition_digest: impl Into<String>,
    ) -> Self {
        let stages = run
            .stages
            .iter()
            .map(|s| StageReport {
                name: s.name.clone(),
                ordinal: s.ordinal,
                mode: s.mode,
                verdict: s.verdict,
                gate: s.gate.clone(),
                duration_ms: s.duration_ms,
                tasks: s
                    .tasks
                    .iter()
                    .map(|t| TaskReport {
                        name: t.task_name.clone(),
                        status: t.status,
                        message: t.message.clone(),
                        duration_ms: t.duration_ms,
                    })
                    .collect(),
            })
            .collect();

        Self {
            run_id: run.id.clone(),
            pipeline: pipeline.into(),
            definition_digest: definition_digest.into(),
            trigger: run.trigger,
            branch: run.branch.clone(),
            status: run.status,
            started_at: run.started_at,
            finished_at: run.finished_at,
            total_duration_ms: run.metrics.total_duration_ms,
            violation_count: run.metrics.violation_count,
            error_count: run.metrics.error_count,
            stages,
            skipped_stages: run.skipped_stages.clone(),
            artifacts: artifacts.index(),
            abort_reason: run.abort_reason.clone(),
        }
    }

    /// Render the run summary as a Markdown string.
    pub fn render_markdown(&self) -> String {
        let mut md = format!("# Compliance Run {}\n", self.run_id);
        md.push_str(&format!(
            "\n- **Pipeline**: {} (`{}`)\n- **Trigger**: {} on `{}`\n- **Status**: {}\n- **Elapsed**: {} ms\n",
            self.pipeline,
            &self.definition_digest[..12.min(self.definition_digest.len())],
            self.trigger,
            self.branch,
            self.status,
            self.total_duration_ms,
        ));
        if let Some(reason) = &self.abort_reason {
            md.push_str(&format!("- **Aborted**: {}\n", reason));
        }
        md.push_str(&format!(
            "- **Violations**: {} | **Errors**: {}\n",
            self.violation_count, self.error_count
        ));

        md.push_str("\n## Stages\n\n");
        for stage in &self.stages {
            let gate = match &stage.gate {
                Some(GateDecision::Open) => "gate open".to_string(),
                Some(GateDecision::Closed { reason, detail }) => match reason {
                    CloseReason::Blocked => format!("gate closed (blocked): {}", detail),
                    CloseReason::Skipped => format!("gate closed (skipped): {}", detail),
                },
                None => "gate not evaluated".to_string(),
            };
            md.push_str(&format!(
                "- **{}** ({}): {} — {} ({} ms)\n",
                stage.name, stage.mode, stage.verdict, gate, stage.duration_ms
            ));
            for task in &stage.tasks {
                md.push_str(&format!(
                    "  - `{}`: {} — {}\n",
                    task.name, task.status, task.message
                ));
            }
        }

        for name in &self.skipped_stages {
            md.push_str(&format!("- **{}**: not executed (upstream gate skipped)\n", name));
        }

        md.push_str("\n## Artifacts\n\n");
        if self.artifacts.is_empty() {
            md.push_str("none\n");
        } else {
            for artifact in &self.artifacts {
                md.push_str(&format!(
                    "- `{}/{}` ({} bytes)\n",
                    artifact.stage, artifact.name, artifact.size_bytes
                ));
            }
        }

        md
    }
}
