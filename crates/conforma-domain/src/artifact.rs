//! Run-scoped artifact storage.
//!
//! Artifacts are named outputs (reports, plans, logs) keyed by
//! `(stage name, artifact name)`, retained for the life of the run.
//! Writes from sibling tasks are serialized; reads are concurrent.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Category of an artifact payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Plain diagnostic text.
    Text,
    /// Structured report (findings, violations).
    Report,
    /// Rendered infrastructure plan.
    Plan,
    /// Captured tool output.
    Log,
}

/// A named output produced by a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Stage the producing task belonged to.
    pub stage: String,

    /// Artifact name, unique within the stage.
    pub name: String,

    /// Payload category.
    pub kind: ArtifactKind,

    /// Opaque payload bytes.
    pub payload: Vec<u8>,

    /// When the artifact was registered.
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(
        stage: impl Into<String>,
        name: impl Into<String>,
        kind: ArtifactKind,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            stage: stage.into(),
            name: name.into(),
            kind,
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Index entry describing an artifact without its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub stage: String,
    pub name: String,
    pub kind: ArtifactKind,
    pub size_bytes: usize,
}

/// Thread-safe artifact accumulator for one pipeline run.
///
/// Keys are unique within a run. A later write under an existing key wins
/// and is logged as a correctness smell: duplicate keys never occur in a
/// correct pipeline definition, but a misconfigured one must still run to
/// completion and report.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    inner: RwLock<HashMap<(String, String), Artifact>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact. Last write wins on duplicate keys.
    pub fn put(&self, artifact: Artifact) {
        let key = (artifact.stage.clone(), artifact.name.clone());
        let mut inner = self.inner.write().expect("artifact store lock poisoned");
        if inner.contains_key(&key) {
            warn!(
                stage = %key.0,
                artifact = %key.1,
                "duplicate artifact key overwritten; check the pipeline definition"
            );
        }
        inner.insert(key, artifact);
    }

    /// Fetch an artifact by stage and name.
    pub fn get(&self, stage: &str, name: &str) -> Option<Artifact> {
        let inner = self.inner.read().expect("artifact store lock poisoned");
        inner.get(&(stage.to_string(), name.to_string())).cloned()
    }

    /// All artifacts registered by one stage, ordered by name.
    pub fn list(&self, stage: &str) -> Vec<Artifact> {
        let inner = self.inner.read().expect("artifact store lock poisoned");
        let mut out: Vec<Artifact> = inner
            .values()
            .filter(|a| a.stage == stage)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Payload-free index of everything in the store, ordered by key.
    pub fn index(&self) -> Vec<ArtifactRef> {
        let inner = self.inner.read().expect("artifact store lock poisoned");
        let mut out: Vec<ArtifactRef> = inner
            .values()
            .map(|a| ArtifactRef {
                stage: a.stage.clone(),
                name: a.name.clone(),
                kind: a.kind,
                size_bytes: a.payload.len(),
            })
            .collect();
        out.sort_by(|a, b| (&a.stage, &a.name).cmp(&(&b.stage, &b.name)));
        out
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("artifact store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
