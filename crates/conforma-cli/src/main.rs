//! Conforma - continuous compliance pipeline CLI
//!
//! The `conforma` command drives stage-gated compliance runs over
//! infrastructure-as-code changes.
//!
//! ## Commands
//!
//! - `run`: execute a pipeline definition against the current workspace
//! - `check`: validate a pipeline definition without running it
//! - `tools`: list the builtin compliance tool catalog

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{warn, Level};

use conforma_domain::{ConformaError, RunStatus, TriggerKind};
use conforma_engine::orchestrator::abort_channel;
use conforma_engine::telemetry::init_tracing;
use conforma_engine::{
    BuiltinTool, CommandRunner, LogChannel, NotificationChannel, NotificationDispatcher,
    Orchestrator, PipelineSpec, TriggerEvent, WebhookChannel,
};

#[derive(Parser)]
#[command(name = "conforma")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Continuous compliance pipeline orchestrator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline definition
    ///
    /// Exit code 0 for `succeeded` and `skipped-deploy`, 1 for `failed`,
    /// 2 for a malformed definition.
    Run {
        /// Path to the pipeline definition (JSON)
        #[arg(short, long)]
        definition: PathBuf,

        /// Branch or ref the run is triggered for
        #[arg(short, long, default_value = "main")]
        branch: String,

        /// What triggered the run: push, pull-request, schedule, manual
        #[arg(short, long, default_value = "manual", value_parser = parse_trigger)]
        trigger: TriggerKind,

        /// Grant deployment approval for this run
        #[arg(long)]
        approve: bool,

        /// Webhook URL to notify with the JSON run summary (repeatable)
        #[arg(long = "webhook")]
        webhooks: Vec<String>,

        /// Write the Markdown run summary to this file
        #[arg(long)]
        report_out: Option<PathBuf>,

        /// Write the JSON run record to this file
        #[arg(long)]
        json_out: Option<PathBuf>,
    },

    /// Validate a pipeline definition without running it
    Check {
        /// Path to the pipeline definition (JSON)
        #[arg(short, long)]
        definition: PathBuf,
    },

    /// List the builtin compliance tool catalog
    Tools,
}

fn parse_trigger(raw: &str) -> std::result::Result<TriggerKind, String> {
    match raw {
        "push" => Ok(TriggerKind::Push),
        "pull-request" => Ok(TriggerKind::PullRequest),
        "schedule" => Ok(TriggerKind::Schedule),
        "manual" => Ok(TriggerKind::Manual),
        other => Err(format!(
            "unknown trigger '{}'; expected push, pull-request, schedule or manual",
            other
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            definition,
            branch,
            trigger,
            approve,
            webhooks,
            report_out,
            json_out,
        } => {
            let spec = match PipelineSpec::from_file(&definition) {
                Ok(spec) => spec,
                Err(e @ ConformaError::Configuration(_)) | Err(e @ ConformaError::Serialization(_)) => {
                    eprintln!("invalid pipeline definition: {}", e);
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            };

            let mut channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(LogChannel)];
            for url in &webhooks {
                channels.push(Arc::new(WebhookChannel::new("webhook", url)));
            }
            let orchestrator =
                Orchestrator::new(Arc::new(CommandRunner), NotificationDispatcher::new(channels));

            // Ctrl-C aborts the active stage; the run still reports.
            let (abort, signal) = abort_channel();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received; aborting run");
                    abort.abort();
                }
            });

            let mut event = TriggerEvent::new(trigger, branch);
            if approve {
                event = event.approved();
            }

            let output = match orchestrator.execute_with_abort(&spec, event, signal).await {
                Ok(output) => output,
                Err(e @ ConformaError::Configuration(_)) => {
                    eprintln!("invalid pipeline definition: {}", e);
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            };

            println!("{}", output.report.render_markdown());

            if let Some(path) = report_out {
                std::fs::write(&path, output.report.render_markdown())
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            if let Some(path) = json_out {
                let json = serde_json::to_string_pretty(&output.report)
                    .context("failed to serialize run report")?;
                std::fs::write(&path, json)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }

            match output.run.status {
                RunStatus::Failed => std::process::exit(1),
                _ => Ok(()),
            }
        }

        Commands::Check { definition } => {
            match PipelineSpec::from_file(&definition) {
                Ok(spec) => {
                    println!(
                        "pipeline '{}' is valid ({} stages, digest {})",
                        spec.name,
                        spec.stages.len(),
                        spec.short_digest()
                    );
                    Ok(())
                }
                Err(e) => {
                    eprintln!("invalid pipeline definition: {}", e);
                    std::process::exit(2);
                }
            }
        }

        Commands::Tools => {
            for (name, description) in BuiltinTool::catalog() {
                println!("{:<20} {}", name, description);
            }
            Ok(())
        }
    }
}
