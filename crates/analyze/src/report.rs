//! ValidationReport — aggregated output of a validation run.
//!
//! Findings are sorted by severity, code, path, entity id, then
//! message, so reports diff stably in UI snapshots and tests.

use pricetree_core::finding::{sort_findings, Finding, Severity};
use serde::Serialize;

/// The result handed back to the caller: `ok` is false iff any ERROR
/// finding is present. Callers must block publish on errors, may allow
/// publish-with-confirmation on warnings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub ok: bool,
    pub findings: Vec<Finding>,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub info: Vec<Finding>,
}

impl ValidationReport {
    pub fn from_findings(mut findings: Vec<Finding>) -> ValidationReport {
        sort_findings(&mut findings);
        let errors: Vec<Finding> = findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .cloned()
            .collect();
        let warnings: Vec<Finding> = findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
            .cloned()
            .collect();
        let info: Vec<Finding> = findings
            .iter()
            .filter(|f| f.severity == Severity::Info)
            .cloned()
            .collect();
        ValidationReport {
            ok: errors.is_empty(),
            findings,
            errors,
            warnings,
            info,
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.findings.iter().any(|f| f.code == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricetree_core::finding::codes;

    #[test]
    fn report_partitions_and_sorts() {
        let findings = vec![
            Finding::warning(codes::W_AMBIGUOUS_EDGES, "/b", "w"),
            Finding::error(codes::E_GRAPH_CYCLE, "/a", "e"),
            Finding::info("PBV2_I_NOTE", "/c", "i"),
        ];
        let report = ValidationReport::from_findings(findings);
        assert!(!report.ok);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.info.len(), 1);
        // Errors sort first in the combined list.
        assert_eq!(report.findings[0].code, codes::E_GRAPH_CYCLE);
    }
}
