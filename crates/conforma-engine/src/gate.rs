//! Gate evaluation rules engine.
//!
//! Computes the open/closed decision that follows a completed stage from
//! its verdict, its execution mode, and the pluggable predicates declared
//! on its gate. The step order is a deliberate tie-break: required-stage
//! failures take precedence over branch/approval predicates in the
//! reported reason, so operators triage real defects before caring about
//! branch eligibility.

use conforma_domain::{ExecutionMode, GateDecision, StageVerdict};

use crate::definition::GateSpec;

/// Run-scoped facts the predicates evaluate against.
#[derive(Debug, Clone)]
pub struct GateContext {
    /// Branch or ref the run was triggered for.
    pub branch: String,

    /// Whether an operator granted deployment approval for this run.
    pub approved: bool,
}

/// A pluggable boolean condition on a gate.
///
/// Predicates express policy about *when* to proceed, not quality: a false
/// predicate closes the gate as `skipped`, never `blocked`.
pub trait Predicate: Send + Sync {
    /// Name used in the run record when the predicate declines.
    fn name(&self) -> String;

    fn holds(&self, ctx: &GateContext) -> bool;
}

/// Downstream stages run only on the expected branch.
pub struct BranchPredicate {
    pub expected: String,
}

impl Predicate for BranchPredicate {
    fn name(&self) -> String {
        format!("branch == {}", self.expected)
    }

    fn holds(&self, ctx: &GateContext) -> bool {
        ctx.branch == self.expected
    }
}

/// Downstream stages run only with explicit operator approval.
pub struct ApprovalPredicate;

impl Predicate for ApprovalPredicate {
    fn name(&self) -> String {
        "deployment approved".to_string()
    }

    fn holds(&self, ctx: &GateContext) -> bool {
        ctx.approved
    }
}

/// Build the predicate set declared by a gate.
pub fn predicates_for(gate: &GateSpec) -> Vec<Box<dyn Predicate>> {
    let mut predicates: Vec<Box<dyn Predicate>> = Vec::new();
    if let Some(branch) = &gate.require_branch {
        predicates.push(Box::new(BranchPredicate {
            expected: branch.clone(),
        }));
    }
    if gate.require_approval {
        predicates.push(Box::new(ApprovalPredicate));
    }
    predicates
}

/// Evaluate a stage's gate.
///
/// Step 1: advisory stages inform but never block, so the gate is `open`
/// regardless of verdict. Step 2: a required stage with verdict `fail` or `partial`
/// closes the gate as `blocked`. Step 3: every predicate must hold; the
/// first that does not closes the gate as `skipped`.
pub fn evaluate_gate(
    verdict: StageVerdict,
    mode: ExecutionMode,
    predicates: &[Box<dyn Predicate>],
    ctx: &GateContext,
) -> GateDecision {
    if mode == ExecutionMode::Advisory {
        return GateDecision::open();
    }

    if matches!(verdict, StageVerdict::Fail | StageVerdict::Partial) {
        return GateDecision::blocked(format!("required stage verdict {}", verdict));
    }

    for predicate in predicates {
        if !predicate.holds(ctx) {
            return GateDecision::skipped(format!(
                "predicate '{}' not satisfied",
                predicate.name()
            ));
        }
    }

    GateDecision::open()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conforma_domain::CloseReason;

    fn ctx(branch: &str, approved: bool) -> GateContext {
        GateContext {
            branch: branch.to_string(),
            approved,
        }
    }

    fn main_branch_predicates() -> Vec<Box<dyn Predicate>> {
        predicates_for(&GateSpec {
            require_branch: Some("main".to_string()),
            require_approval: false,
        })
    }

    #[test]
    fn test_advisory_is_always_open() {
        for verdict in [StageVerdict::Pass, StageVerdict::Fail, StageVerdict::Partial] {
            let decision = evaluate_gate(
                verdict,
                ExecutionMode::Advisory,
                &main_branch_predicates(),
                &ctx("feature/x", false),
            );
            assert!(decision.is_open(), "advisory gate must open for verdict {}", verdict);
        }
    }

    #[test]
    fn test_required_fail_blocks() {
        let decision = evaluate_gate(
            StageVerdict::Fail,
            ExecutionMode::Required,
            &[],
            &ctx("main", true),
        );
        assert_eq!(decision.close_reason(), Some(CloseReason::Blocked));
    }

    #[test]
    fn test_required_partial_blocks() {
        let decision = evaluate_gate(
            StageVerdict::Partial,
            ExecutionMode::Required,
            &[],
            &ctx("main", true),
        );
        assert_eq!(decision.close_reason(), Some(CloseReason::Blocked));
    }

    #[test]
    fn test_pass_with_satisfied_predicates_opens() {
        let predicates = predicates_for(&GateSpec {
            require_branch: Some("main".to_string()),
            require_approval: true,
        });
        let decision = evaluate_gate(
            StageVerdict::Pass,
            ExecutionMode::Required,
            &predicates,
            &ctx("main", true),
        );
        assert!(decision.is_open());
    }

    #[test]
    fn test_false_branch_predicate_skips() {
        let decision = evaluate_gate(
            StageVerdict::Pass,
            ExecutionMode::Required,
            &main_branch_predicates(),
            &ctx("feature/x", true),
        );
        assert_eq!(decision.close_reason(), Some(CloseReason::Skipped));
        match decision {
            GateDecision::Closed { detail, .. } => {
                assert!(detail.contains("branch == main"), "detail was: {}", detail)
            }
            GateDecision::Open => panic!("gate should be closed"),
        }
    }

    #[test]
    fn test_missing_approval_skips() {
        let predicates = predicates_for(&GateSpec {
            require_branch: None,
            require_approval: true,
        });
        let decision = evaluate_gate(
            StageVerdict::Pass,
            ExecutionMode::Required,
            &predicates,
            &ctx("main", false),
        );
        assert_eq!(decision.close_reason(), Some(CloseReason::Skipped));
    }

    #[test]
    fn test_required_failure_takes_precedence_over_predicates() {
        // Both the verdict and the branch predicate would close this gate;
        // the reported reason must be the quality failure.
        let decision = evaluate_gate(
            StageVerdict::Fail,
            ExecutionMode::Required,
            &main_branch_predicates(),
            &ctx("feature/x", false),
        );
        assert_eq!(decision.close_reason(), Some(CloseReason::Blocked));
    }

    #[test]
    fn test_predicates_for_builds_declared_set() {
        let predicates = predicates_for(&GateSpec {
            require_branch: Some("main".to_string()),
            require_approval: true,
        });
        assert_eq!(predicates.len(), 2);

        let none = predicates_for(&GateSpec::default());
        assert!(none.is_empty());
    }
}
