//! Ambiguous same-priority edge detection.
//!
//! Traversal picks the first matching edge within a priority bucket,
//! so two ENABLED edges sharing a source and priority can race unless
//! all but one are provably unsatisfiable. The prover is best-effort;
//! unproven buckets are flagged at the policy's severity.

use crate::unsat::provably_unsat;
use crate::ValidatePolicy;
use pricetree_core::{codes, Edge, EntityStatus, Finding, Tree};
use std::collections::BTreeMap;

/// Flag every priority bucket with more than one live edge.
pub fn check_ambiguous_edges(tree: &Tree, policy: &ValidatePolicy) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut buckets: BTreeMap<(&str, i64), Vec<&Edge>> = BTreeMap::new();
    for edge in &tree.edges {
        if edge.status != EntityStatus::Enabled {
            continue;
        }
        buckets
            .entry((edge.from_node_id.as_str(), edge.priority))
            .or_default()
            .push(edge);
    }
    for ((from, priority), edges) in buckets {
        if edges.len() < 2 {
            continue;
        }
        let live: Vec<&&Edge> = edges
            .iter()
            .filter(|e| match &e.condition {
                Some(cond) => !provably_unsat(cond),
                None => true,
            })
            .collect();
        if live.len() < 2 {
            continue;
        }
        let ids: Vec<&str> = live.iter().map(|e| e.id.as_str()).collect();
        let message = format!(
            "node '{}' has {} edges at priority {} whose conditions may overlap ({})",
            from,
            live.len(),
            priority,
            ids.join(", ")
        );
        let path = format!("/nodes/{}/edges", from);
        findings.push(if policy.strict_ambiguity {
            Finding::error(codes::E_AMBIGUOUS_EDGES, path, message).with_entity(from)
        } else {
            Finding::warning(codes::W_AMBIGUOUS_EDGES, path, message).with_entity(from)
        });
    }
    findings
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
