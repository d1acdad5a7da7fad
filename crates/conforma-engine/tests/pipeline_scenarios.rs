//! End-to-end pipeline scenarios with in-memory fakes and real commands.

use std::sync::Arc;
use std::time::Duration;

use conforma_domain::{CloseReason, RunStatus, StageVerdict, TaskStatus, TriggerKind};
use conforma_engine::fakes::{RecordingChannel, ScriptedRunner};
use conforma_engine::orchestrator::abort_channel;
use conforma_engine::{
    CommandRunner, GateSpec, NotificationChannel, NotificationDispatcher, Orchestrator,
    PipelineSpec, StageSpec, TaskRunner, TaskSpec, TriggerEvent,
};

fn task(name: &str) -> TaskSpec {
    TaskSpec::new(name, vec![name.to_string()])
}

fn orchestrator_with(runner: Arc<dyn TaskRunner>) -> (Orchestrator, Arc<RecordingChannel>) {
    let channel = Arc::new(RecordingChannel::new());
    let dispatcher =
        NotificationDispatcher::new(vec![channel.clone() as Arc<dyn NotificationChannel>]);
    (Orchestrator::new(runner, dispatcher), channel)
}

/// Three required stages, all tasks succeed: run succeeds, all gates open,
/// one dispatch with status succeeded.
#[tokio::test]
async fn test_scenario_all_stages_pass() {
    let (orchestrator, channel) = orchestrator_with(Arc::new(ScriptedRunner::all_success()));
    let spec = PipelineSpec::new(
        "compliance",
        vec![
            StageSpec::new("validate", vec![task("terraform_fmt"), task("terraform_validate")]),
            StageSpec::new("security", vec![task("tfsec"), task("checkov")]),
            StageSpec::new("policy", vec![task("opa_backup")]),
        ],
    );

    let output = orchestrator
        .execute(&spec, TriggerEvent::new(TriggerKind::Push, "main"))
        .await
        .expect("run should complete");

    assert_eq!(output.run.status, RunStatus::Succeeded);
    assert_eq!(output.run.stages.len(), 3);
    for stage in &output.run.stages {
        assert_eq!(stage.verdict, StageVerdict::Pass);
        assert!(stage.gate.as_ref().unwrap().is_open(), "every gate should open");
    }

    let sent = channel.sent();
    assert_eq!(sent.len(), 1, "dispatcher fires exactly once");
    assert_eq!(sent[0].status, RunStatus::Succeeded);
}

/// One failing task in a two-task required stage: verdict partial, gate
/// closed (blocked), the third stage never executes, run fails.
#[tokio::test]
async fn test_scenario_partial_failure_blocks_downstream() {
    let runner = ScriptedRunner::all_success().with("checkov", TaskStatus::Failure);
    let (orchestrator, channel) = orchestrator_with(Arc::new(runner));
    let spec = PipelineSpec::new(
        "compliance",
        vec![
            StageSpec::new("validate", vec![task("terraform_fmt")]),
            StageSpec::new("security", vec![task("tfsec"), task("checkov")]),
            StageSpec::new("policy", vec![task("opa_backup")]),
        ],
    );

    let output = orchestrator
        .execute(&spec, TriggerEvent::new(TriggerKind::PullRequest, "main"))
        .await
        .expect("run should complete");

    assert_eq!(output.run.status, RunStatus::Failed);
    assert_eq!(output.run.stages.len(), 2, "policy stage must never execute");

    let security = &output.run.stages[1];
    assert_eq!(security.verdict, StageVerdict::Partial);
    assert_eq!(
        security.gate.as_ref().unwrap().close_reason(),
        Some(CloseReason::Blocked)
    );

    let sent = channel.sent();
    assert_eq!(sent.len(), 1, "failed runs are still notified");
    assert_eq!(sent[0].status, RunStatus::Failed);
    assert_eq!(sent[0].violation_count, 1);
}

/// A single-task required stage failing yields verdict fail, not partial.
#[tokio::test]
async fn test_scenario_single_task_failure_is_fail_verdict() {
    let runner = ScriptedRunner::all_success().with("tfsec", TaskStatus::Failure);
    let (orchestrator, _channel) = orchestrator_with(Arc::new(runner));
    let spec = PipelineSpec::new(
        "compliance",
        vec![StageSpec::new("security", vec![task("tfsec")])],
    );

    let output = orchestrator
        .execute(&spec, TriggerEvent::new(TriggerKind::Push, "main"))
        .await
        .expect("run should complete");

    assert_eq!(output.run.stages[0].verdict, StageVerdict::Fail);
    assert_eq!(output.run.status, RunStatus::Failed);
}

/// Branch predicate false on a feature branch: quality stages pass, the
/// deploy suffix is skipped, run ends skipped-deploy and is notified.
#[tokio::test]
async fn test_scenario_feature_branch_skips_deploy() {
    let (orchestrator, channel) = orchestrator_with(Arc::new(ScriptedRunner::all_success()));
    let spec = PipelineSpec::new(
        "compliance",
        vec![
            StageSpec::new("validate", vec![task("terraform_fmt")]),
            StageSpec::new("report", vec![task("report_gen")]).with_gate(GateSpec {
                require_branch: Some("main".to_string()),
                require_approval: true,
            }),
            StageSpec::new("deploy", vec![task("terraform_apply_stub")]),
        ],
    );

    let output = orchestrator
        .execute(
            &spec,
            TriggerEvent::new(TriggerKind::Push, "feature/encryption").approved(),
        )
        .await
        .expect("run should complete");

    assert_eq!(output.run.status, RunStatus::SkippedDeploy);
    assert_eq!(output.run.stages.len(), 2, "deploy must not execute");
    assert_eq!(output.run.skipped_stages, vec!["deploy".to_string()]);

    let report_gate = output.run.stages[1].gate.as_ref().unwrap();
    assert_eq!(report_gate.close_reason(), Some(CloseReason::Skipped));

    // Prior stage results remain untouched by the skip
    assert_eq!(output.run.stages[0].verdict, StageVerdict::Pass);

    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].status, RunStatus::SkippedDeploy);
    assert_eq!(sent[0].skipped_stages, vec!["deploy".to_string()]);
}

/// Missing approval on the primary branch also skips the deploy suffix.
#[tokio::test]
async fn test_scenario_missing_approval_skips_deploy() {
    let (orchestrator, _channel) = orchestrator_with(Arc::new(ScriptedRunner::all_success()));
    let spec = PipelineSpec::new(
        "compliance",
        vec![
            StageSpec::new("report", vec![task("report_gen")]).with_gate(GateSpec {
                require_branch: Some("main".to_string()),
                require_approval: true,
            }),
            StageSpec::new("deploy", vec![task("terraform_apply_stub")]),
        ],
    );

    let output = orchestrator
        .execute(&spec, TriggerEvent::new(TriggerKind::Manual, "main"))
        .await
        .expect("run should complete");

    assert_eq!(output.run.status, RunStatus::SkippedDeploy);
    assert_eq!(output.run.skipped_stages, vec!["deploy".to_string()]);
}

/// A task running past its deadline reports `error` with "deadline
/// exceeded" and aggregates like a failure.
#[tokio::test]
async fn test_scenario_task_timeout_is_error_outcome() {
    let (orchestrator, channel) = orchestrator_with(Arc::new(CommandRunner));
    let spec = PipelineSpec::new(
        "compliance",
        vec![StageSpec::new(
            "security",
            vec![
                TaskSpec::new("quick", vec!["echo".to_string(), "ok".to_string()]),
                TaskSpec::new("slow_scan", vec!["sleep".to_string(), "5".to_string()])
                    .with_timeout(1)
                    .with_max_retries(0),
            ],
        )],
    );

    let output = orchestrator
        .execute(&spec, TriggerEvent::new(TriggerKind::Schedule, "main"))
        .await
        .expect("run should complete");

    let stage = &output.run.stages[0];
    assert_eq!(stage.verdict, StageVerdict::Partial);

    let slow = stage
        .tasks
        .iter()
        .find(|t| t.task_name == "slow_scan")
        .expect("slow task outcome recorded");
    assert_eq!(slow.status, TaskStatus::Error);
    assert_eq!(slow.message, "deadline exceeded");

    assert_eq!(output.run.status, RunStatus::Failed);
    assert_eq!(channel.sent().len(), 1);
    assert_eq!(channel.sent()[0].error_count, 1);
}

/// Advisory stages inform but never block: a failing advisory scanner
/// leaves the run green.
#[tokio::test]
async fn test_scenario_advisory_failure_does_not_block() {
    let runner = ScriptedRunner::all_success().with("cost_estimate", TaskStatus::Failure);
    let (orchestrator, _channel) = orchestrator_with(Arc::new(runner));
    let spec = PipelineSpec::new(
        "compliance",
        vec![
            StageSpec::new("cost", vec![task("cost_estimate")]).advisory(),
            StageSpec::new("validate", vec![task("terraform_fmt")]),
        ],
    );

    let output = orchestrator
        .execute(&spec, TriggerEvent::new(TriggerKind::Push, "main"))
        .await
        .expect("run should complete");

    assert_eq!(output.run.status, RunStatus::Succeeded);
    assert_eq!(output.run.stages.len(), 2, "advisory failure must not stop the run");
    assert_eq!(output.run.stages[0].verdict, StageVerdict::Fail);
    assert!(output.run.stages[0].gate.as_ref().unwrap().is_open());
    assert_eq!(output.run.metrics.violation_count, 1, "failure is still recorded");
}

/// Operator abort cancels the active stage and terminates the run failed
/// with reason aborted, and the summary is still dispatched.
#[tokio::test]
async fn test_scenario_operator_abort() {
    let runner = ScriptedRunner::all_success().with_delay(Duration::from_secs(5));
    let (orchestrator, channel) = orchestrator_with(Arc::new(runner));
    let spec = PipelineSpec::new(
        "compliance",
        vec![
            StageSpec::new("security", vec![task("tfsec")]),
            StageSpec::new("policy", vec![task("opa_backup")]),
        ],
    );

    let (handle, signal) = abort_channel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();
    });

    let output = orchestrator
        .execute_with_abort(&spec, TriggerEvent::new(TriggerKind::Manual, "main"), signal)
        .await
        .expect("run should complete");

    assert_eq!(output.run.status, RunStatus::Failed);
    assert_eq!(output.run.abort_reason.as_deref(), Some("aborted"));
    assert_eq!(output.run.stages.len(), 1, "only the active stage is recorded");
    assert_eq!(output.run.stages[0].tasks[0].status, TaskStatus::Error);
    assert_eq!(channel.sent().len(), 1, "aborted runs are still notified");
}

/// Real commands end to end: captured stdout flows into the artifact
/// store and the report's artifact index.
#[tokio::test]
async fn test_scenario_artifacts_flow_into_report() {
    let (orchestrator, _channel) = orchestrator_with(Arc::new(CommandRunner));
    let spec = PipelineSpec::new(
        "compliance",
        vec![StageSpec::new(
            "plan",
            vec![TaskSpec::new(
                "render_plan",
                vec!["echo".to_string(), "2 resources to add".to_string()],
            )],
        )],
    );

    let output = orchestrator
        .execute(&spec, TriggerEvent::new(TriggerKind::Push, "main"))
        .await
        .expect("run should complete");

    let artifact = output
        .artifacts
        .get("plan", "render_plan.stdout")
        .expect("stdout artifact should be registered");
    assert!(String::from_utf8_lossy(&artifact.payload).contains("2 resources to add"));

    assert_eq!(output.report.artifacts.len(), 1);
    assert_eq!(output.report.artifacts[0].stage, "plan");
    assert_eq!(output.report.artifacts[0].name, "render_plan.stdout");
}

/// The exported report is machine-readable and mirrors the run record.
#[tokio::test]
async fn test_report_round_trips_as_json() {
    let (orchestrator, _channel) = orchestrator_with(Arc::new(ScriptedRunner::all_success()));
    let spec = PipelineSpec::new(
        "compliance",
        vec![StageSpec::new("validate", vec![task("terraform_fmt")])],
    );

    let output = orchestrator
        .execute(&spec, TriggerEvent::new(TriggerKind::Push, "main"))
        .await
        .expect("run should complete");

    let json = serde_json::to_string(&output.report).expect("report serializes");
    let back: conforma_engine::RunReport = serde_json::from_str(&json).expect("report parses");
    assert_eq!(back.run_id, output.run.id);
    assert_eq!(back.status, RunStatus::Succeeded);
}
