//! Run lifecycle events.
//!
//! Each run carries an append-only, sequence-numbered event stream: the
//! audit trail embedded in the exported record. No external ledger is
//! required; the stream lives and dies with the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gate::GateDecision;
use crate::run::RunStatus;
use crate::stage::StageVerdict;
use crate::task::TaskStatus;

/// A unique event ID (UUID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        EventId(Uuid::new_v4())
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle events in run order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    /// A run has begun executing.
    RunStarted { run_id: String, branch: String },

    /// A stage has begun execution.
    StageStarted { stage: String, ordinal: usize },

    /// A task reported its outcome.
    TaskFinished {
        stage: String,
        task: String,
        status: TaskStatus,
        duration_ms: u64,
    },

    /// A stage collected all outcomes and produced a verdict.
    StageFinished {
        stage: String,
        verdict: StageVerdict,
        duration_ms: u64,
    },

    /// A gate decision was computed for a completed stage.
    GateEvaluated { stage: String, decision: GateDecision },

    /// The run reached a terminal status.
    RunFinished {
        run_id: String,
        status: RunStatus,
        duration_ms: u64,
    },
}

/// An ordered record of a lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event ID.
    pub event_id: EventId,

    /// Sequence number in the run's event stream, starting at 1.
    pub seq: u64,

    /// The event itself.
    pub event: PipelineEvent,

    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(seq: u64, event: PipelineEvent) -> Self {
        Self {
            event_id: EventId::new(),
            seq,
            event,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_unique() {
        let e1 = EventId::new();
        let e2 = EventId::new();
        assert_ne!(e1, e2);
    }

    #[test]
    fn test_event_serialization() {
        let event = PipelineEvent::GateEvaluated {
            stage: "policy_eval".to_string(),
            decision: GateDecision::open(),
        };

        let json = serde_json::to_string(&event).expect("should serialize");
        let _back: PipelineEvent = serde_json::from_str(&json).expect("should deserialize");
    }

    #[test]
    fn test_record_carries_sequence() {
        let record = EventRecord::new(
            3,
            PipelineEvent::StageStarted {
                stage: "validate".to_string(),
                ordinal: 0,
            },
        );
        assert_eq!(record.seq, 3);
    }
}
