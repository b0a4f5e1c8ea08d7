//! Structural validator for pricing trees.
//!
//! Each analysis is a separate module producing plain `Finding` lists;
//! [`validate`] orchestrates them per lifecycle mode and aggregates
//! everything into a sorted [`ValidationReport`]. Draft mode runs only
//! the symbol/reference/type sweep so authors can edit freely; publish
//! and restore add the structural, graph, and safety analyses; the
//! eval gate is a narrow status check run just before evaluation.

pub mod ambiguity;
pub mod cycles;
pub mod division;
pub mod exprcheck;
pub mod lifecycle;
pub mod nonneg;
pub mod reachability;
pub mod report;
pub mod structure;
pub mod unsat;

pub use lifecycle::{ChangeSet, EvalPurpose};
pub use report::ValidationReport;
pub use unsat::provably_unsat;

use pricetree_core::{Finding, Tree};

/// Which lifecycle transition is being validated.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidateMode {
    /// Loose validation while editing.
    Draft,
    /// Full validation gating DRAFT -> ACTIVE.
    Publish,
    /// Publish-level validation plus restore-specific collision and
    /// dangling-edge checks against the post-restore snapshot.
    Restore(ChangeSet),
    /// Pre-evaluation status gate.
    EvalGate(EvalPurpose),
}

/// Severity dials for the downgradable analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatePolicy {
    /// Ambiguous same-priority edges are errors instead of warnings.
    pub strict_ambiguity: bool,
    /// Unguarded division is an error instead of a warning.
    pub strict_division: bool,
}

impl ValidatePolicy {
    /// Publish default: everything strict.
    pub fn publish() -> Self {
        ValidatePolicy {
            strict_ambiguity: true,
            strict_division: true,
        }
    }

    /// Draft default: downgradable analyses stay warnings.
    pub fn draft() -> Self {
        ValidatePolicy {
            strict_ambiguity: false,
            strict_division: false,
        }
    }
}

fn publish_findings(tree: &Tree, policy: &ValidatePolicy) -> Vec<Finding> {
    let mut findings = Vec::new();
    findings.extend(structure::check_duplicate_ids(tree));
    findings.extend(structure::check_duplicate_keys(tree));
    findings.extend(structure::check_roots(tree));
    findings.extend(structure::check_edges(tree));
    findings.extend(exprcheck::check_expressions(tree));
    findings.extend(cycles::check_runtime_cycles(tree));
    findings.extend(cycles::check_compute_cycles(tree));
    findings.extend(ambiguity::check_ambiguous_edges(tree, policy));
    findings.extend(reachability::check_reachability(tree));
    findings.extend(division::check_division(tree, policy));
    findings.extend(nonneg::check_effect_quantities(tree));
    findings
}

/// Validate a tree snapshot for the given lifecycle transition.
pub fn validate(tree: &Tree, mode: ValidateMode, policy: &ValidatePolicy) -> ValidationReport {
    let findings = match mode {
        ValidateMode::Draft => exprcheck::check_expressions(tree),
        ValidateMode::Publish => publish_findings(tree, policy),
        ValidateMode::Restore(changes) => {
            let mut findings = publish_findings(tree, policy);
            findings.extend(lifecycle::check_restore(tree, &changes));
            findings
        }
        ValidateMode::EvalGate(purpose) => lifecycle::check_eval_gate(tree, purpose),
    };
    ValidationReport::from_findings(findings)
}
