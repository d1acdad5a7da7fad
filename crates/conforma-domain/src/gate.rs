//! Gate decisions.
//!
//! A gate is the pass/block decision computed after a stage completes. It
//! either opens (downstream proceeds) or closes, and a closed gate carries
//! the reason class operators triage by: `blocked` is a quality failure,
//! `skipped` is policy about *when* to proceed.

use serde::{Deserialize, Serialize};

/// Why a gate closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    /// A required stage did not pass.
    Blocked,
    /// A predicate (branch, approval) declined to proceed.
    Skipped,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Blocked => write!(f, "blocked"),
            CloseReason::Skipped => write!(f, "skipped"),
        }
    }
}

/// Decision produced by evaluating a stage's gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum GateDecision {
    /// Downstream stages proceed.
    Open,
    /// Downstream stages do not run.
    Closed {
        reason: CloseReason,
        /// Human-readable explanation for the run record.
        detail: String,
    },
}

impl GateDecision {
    pub fn open() -> Self {
        GateDecision::Open
    }

    pub fn blocked(detail: impl Into<String>) -> Self {
        GateDecision::Closed {
            reason: CloseReason::Blocked,
            detail: detail.into(),
        }
    }

    pub fn skipped(detail: impl Into<String>) -> Self {
        GateDecision::Closed {
            reason: CloseReason::Skipped,
            detail: detail.into(),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, GateDecision::Open)
    }

    /// The close reason, if the gate closed.
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self {
            GateDecision::Open => None,
            GateDecision::Closed { reason, .. } => Some(*reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_has_no_close_reason() {
        let decision = GateDecision::open();
        assert!(decision.is_open());
        assert_eq!(decision.close_reason(), None);
    }

    #[test]
    fn test_blocked_and_skipped_reasons() {
        let blocked = GateDecision::blocked("required stage verdict fail");
        assert!(!blocked.is_open());
        assert_eq!(blocked.close_reason(), Some(CloseReason::Blocked));

        let skipped = GateDecision::skipped("predicate 'branch == main' not satisfied");
        assert_eq!(skipped.close_reason(), Some(CloseReason::Skipped));
    }

    #[test]
    fn test_decision_serialization() {
        let decision = GateDecision::blocked("required stage verdict fail");
        let json = serde_json::to_string(&decision).expect("should serialize");
        assert!(json.contains("\"decision\":\"closed\""));
        assert!(json.contains("\"reason\":\"blocked\""));

        let back: GateDecision = serde_json::from_str(&json).expect("should deserialize");
        assert_eq!(back, decision);
    }
}
