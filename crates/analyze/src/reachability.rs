//! Reachability of runtime nodes from the declared roots.
//!
//! Edges whose conditions are provably unsatisfiable are excluded
//! before the walk, so an input gated behind an impossible condition
//! counts as unreachable. An input whose every incoming edge is gated
//! on its own selection key can never become visible through a fresh
//! traversal; that is reported as circular self-gating, distinct from
//! plain unreachability.

use crate::unsat::provably_unsat;
use pricetree_core::tree::NodeBody;
use pricetree_core::{codes, EntityStatus, Finding, Ref, Tree};
use std::collections::{BTreeSet, VecDeque};

fn condition_mentions_key(edge: &pricetree_core::Edge, selection_key: &str) -> bool {
    let Some(cond) = &edge.condition else {
        return false;
    };
    let mut mentions = false;
    cond.visit_refs(&mut |r| match r {
        Ref::SelectionRef { selection_key: k }
        | Ref::EffectiveRef { selection_key: k }
        | Ref::OptionParamRef {
            selection_key: k, ..
        }
        | Ref::OptionParamOfRef {
            selection_key: k, ..
        } => {
            if k == selection_key {
                mentions = true;
            }
        }
        _ => {}
    });
    mentions
}

/// Reachable runtime-node ids, walking only edges the prover cannot
/// rule out.
fn reachable_set(tree: &Tree) -> BTreeSet<&str> {
    let runtime: BTreeSet<&str> = tree.runtime_nodes().map(|n| n.id.as_str()).collect();
    let mut reached = BTreeSet::new();
    let mut queue = VecDeque::new();
    for root in &tree.root_node_ids {
        if runtime.contains(root.as_str()) && reached.insert(root.as_str()) {
            queue.push_back(root.as_str());
        }
    }
    while let Some(node_id) = queue.pop_front() {
        for edge in tree.enabled_edges_from(node_id) {
            if let Some(cond) = &edge.condition {
                if provably_unsat(cond) {
                    continue;
                }
            }
            let to = edge.to_node_id.as_str();
            if runtime.contains(to) && reached.insert(to) {
                queue.push_back(to);
            }
        }
    }
    reached
}

/// Reachability findings for every runtime node. Self-gating is
/// checked before plain reachability: the prover cannot rule out an
/// `exists(y)` gate, so a self-gated input often still looks reachable
/// to the walk.
pub fn check_reachability(tree: &Tree) -> Vec<Finding> {
    let reached = reachable_set(tree);
    let mut findings = Vec::new();
    for node in tree.runtime_nodes() {
        let path = format!("/nodes/{}", node.id);
        let required_input = match &node.body {
            NodeBody::Input(input) if input.required => input.selection_key.as_deref(),
            _ => None,
        };
        let is_root = tree.root_node_ids.iter().any(|r| r == &node.id);

        if let Some(selection_key) = required_input {
            if !is_root {
                let incoming: Vec<_> = tree
                    .edges
                    .iter()
                    .filter(|e| e.status == EntityStatus::Enabled && e.to_node_id == node.id)
                    .collect();
                let self_gated = !incoming.is_empty()
                    && incoming
                        .iter()
                        .all(|e| condition_mentions_key(e, selection_key));
                if self_gated {
                    findings.push(
                        Finding::error(
                            codes::E_INPUT_SELF_GATED,
                            path,
                            format!(
                                "required INPUT '{}' is only reachable through conditions on \
                                 its own selection key",
                                selection_key
                            ),
                        )
                        .with_entity(&node.id),
                    );
                    continue;
                }
            }
            if !reached.contains(node.id.as_str()) {
                findings.push(
                    Finding::error(
                        codes::E_INPUT_UNREACHABLE,
                        path,
                        format!(
                            "required INPUT '{}' is unreachable from the roots",
                            selection_key
                        ),
                    )
                    .with_entity(&node.id),
                );
            }
        } else if !reached.contains(node.id.as_str()) {
            findings.push(
                Finding::warning(
                    codes::W_NODE_UNREACHABLE,
                    path,
                    format!(
                        "{} node '{}' is unreachable from the roots",
                        node.body.kind_name(),
                        node.id
                    ),
                )
                .with_entity(&node.id),
            );
        }
    }
    findings
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
