//! Pipeline definitions and load-time validation.
//!
//! A definition is a JSON document describing the ordered stage sequence.
//! `validate` runs at load time and is the only place a pipeline can abort
//! before a run starts: a malformed definition is an operator error, not a
//! compliance signal, and must fail fast and loudly.

use std::collections::HashSet;
use std::path::Path;

use conforma_domain::{ConformaError, ExecutionMode, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::tools::is_apply_command;

fn default_mode() -> ExecutionMode {
    ExecutionMode::Required
}

fn default_max_retries() -> u32 {
    2
}

fn default_task_timeout() -> u64 {
    300
}

fn default_concurrency() -> usize {
    4
}

/// One tool invocation within a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task name, unique within its stage.
    pub name: String,

    /// Command to execute (first element is the executable).
    pub command: Vec<String>,

    /// Timeout in seconds; 0 inherits the pipeline-wide default.
    #[serde(default)]
    pub timeout_secs: u64,

    /// Bounded retries for transient invocation failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            timeout_secs: 0,
            max_retries: default_max_retries(),
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Predicates guarding everything downstream of a stage.
///
/// The gate always folds in the stage's verdict and mode; these fields add
/// the external conditions (branch eligibility, human approval) that make
/// a closed gate `skipped` rather than `blocked`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateSpec {
    /// Downstream stages run only on this branch.
    #[serde(default)]
    pub require_branch: Option<String>,

    /// Downstream stages run only with explicit operator approval.
    #[serde(default)]
    pub require_approval: bool,
}

impl GateSpec {
    pub fn has_predicates(&self) -> bool {
        self.require_branch.is_some() || self.require_approval
    }
}

/// A named, gated group of tasks executed as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    /// Stage name, unique within the pipeline.
    pub name: String,

    /// Whether failure closes the gate (`required`) or only informs
    /// (`advisory`).
    #[serde(default = "default_mode")]
    pub mode: ExecutionMode,

    /// Tasks fanned out in parallel.
    pub tasks: Vec<TaskSpec>,

    /// Wall-clock ceiling for the whole stage in seconds; 0 = unlimited.
    #[serde(default)]
    pub timeout_secs: u64,

    /// Conditions for proceeding past this stage.
    #[serde(default)]
    pub gate: GateSpec,
}

impl StageSpec {
    pub fn new(name: impl Into<String>, tasks: Vec<TaskSpec>) -> Self {
        Self {
            name: name.into(),
            mode: ExecutionMode::Required,
            tasks,
            timeout_secs: 0,
            gate: GateSpec::default(),
        }
    }

    pub fn advisory(mut self) -> Self {
        self.mode = ExecutionMode::Advisory;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_gate(mut self, gate: GateSpec) -> Self {
        self.gate = gate;
        self
    }
}

/// A complete pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Pipeline name.
    pub name: String,

    /// Default task timeout in seconds, applied where a task declares 0.
    #[serde(default = "default_task_timeout")]
    pub default_task_timeout_secs: u64,

    /// Upper bound on concurrently running tasks within one stage.
    #[serde(default = "default_concurrency")]
    pub max_task_concurrency: usize,

    /// Ordered stage sequence.
    pub stages: Vec<StageSpec>,
}

impl PipelineSpec {
    pub fn new(name: impl Into<String>, stages: Vec<StageSpec>) -> Self {
        Self {
            name: name.into(),
            default_task_timeout_secs: default_task_timeout(),
            max_task_concurrency: default_concurrency(),
            stages,
        }
    }

    /// Parse a definition from JSON and validate it.
    pub fn from_json(raw: &str) -> Result<Self> {
        let spec: PipelineSpec = serde_json::from_str(raw)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load a definition from a JSON file and validate it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConformaError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    /// Check the definition for operator errors.
    ///
    /// Every violation is a [`ConformaError::Configuration`], fatal before
    /// any run starts.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConformaError::Configuration(
                "pipeline name must not be empty".to_string(),
            ));
        }
        if self.stages.is_empty() {
            return Err(ConformaError::Configuration(
                "pipeline must declare at least one stage".to_string(),
            ));
        }
        if self.max_task_concurrency == 0 {
            return Err(ConformaError::Configuration(
                "max_task_concurrency must be at least 1".to_string(),
            ));
        }

        let mut stage_names = HashSet::new();
        for (i, stage) in self.stages.iter().enumerate() {
            if !stage_names.insert(stage.name.as_str()) {
                return Err(ConformaError::Configuration(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
            if stage.tasks.is_empty() {
                return Err(ConformaError::Configuration(format!(
                    "stage '{}' declares no tasks",
                    stage.name
                )));
            }

            let mut task_names = HashSet::new();
            for task in &stage.tasks {
                if !task_names.insert(task.name.as_str()) {
                    return Err(ConformaError::Configuration(format!(
                        "duplicate task name '{}' in stage '{}'",
                        task.name, stage.name
                    )));
                }
                if task.command.is_empty() || task.command[0].trim().is_empty() {
                    return Err(ConformaError::Configuration(format!(
                        "task '{}' in stage '{}' has an empty command",
                        task.name, stage.name
                    )));
                }

                // Apply-class tools mutate infrastructure; they may only sit
                // behind an approval-gated predecessor.
                if is_apply_command(&task.command) {
                    let approved_entry = i > 0 && self.stages[i - 1].gate.require_approval;
                    if !approved_entry {
                        return Err(ConformaError::Configuration(format!(
                            "task '{}' in stage '{}' applies infrastructure but the \
                             preceding stage's gate does not require approval",
                            task.name, stage.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Deterministic SHA-256 digest identifying this definition version.
    pub fn digest(&self) -> String {
        let json = serde_json::to_string(self).expect("PipelineSpec is serializable");
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Short digest (first 12 chars).
    pub fn short_digest(&self) -> String {
        let digest = self.digest();
        digest[..12.min(digest.len())].to_string()
    }
}
