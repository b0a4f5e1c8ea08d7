//! Cycle detection, twice over.
//!
//! The runtime graph (ENABLED edges between ENABLED non-GROUP nodes)
//! and the compute-dependency graph (`nodeOutputRef` edges between
//! COMPUTE expressions) are distinct graphs: the first decides which
//! nodes activate, the second decides evaluation order. A cycle in
//! either one blocks publish.

use pricetree_core::tree::NodeBody;
use pricetree_core::{codes, Finding, Ref, Tree};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mark {
    InProgress,
    Done,
}

fn dfs(
    node: &str,
    adjacency: &BTreeMap<&str, Vec<&str>>,
    marks: &mut BTreeMap<String, Mark>,
    cycle_nodes: &mut BTreeSet<String>,
) {
    match marks.get(node) {
        Some(Mark::Done) => return,
        Some(Mark::InProgress) => {
            cycle_nodes.insert(node.to_string());
            return;
        }
        None => {}
    }
    marks.insert(node.to_string(), Mark::InProgress);
    if let Some(nexts) = adjacency.get(node) {
        for next in nexts {
            dfs(next, adjacency, marks, cycle_nodes);
        }
    }
    marks.insert(node.to_string(), Mark::Done);
}

fn cycle_findings(
    adjacency: BTreeMap<&str, Vec<&str>>,
    code: &str,
    path_prefix: &str,
    label: &str,
) -> Vec<Finding> {
    let mut marks = BTreeMap::new();
    let mut cycle_nodes = BTreeSet::new();
    for &node in adjacency.keys() {
        dfs(node, &adjacency, &mut marks, &mut cycle_nodes);
    }
    cycle_nodes
        .into_iter()
        .map(|id| {
            Finding::error(
                code,
                format!("{}/{}", path_prefix, id),
                format!("node '{}' participates in a {} cycle", id, label),
            )
            .with_entity(id)
        })
        .collect()
}

/// DFS over the runtime graph looking for back-edges.
pub fn check_runtime_cycles(tree: &Tree) -> Vec<Finding> {
    let runtime: BTreeSet<&str> = tree.runtime_nodes().map(|n| n.id.as_str()).collect();
    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for id in &runtime {
        adjacency.insert(*id, Vec::new());
    }
    for edge in &tree.edges {
        if edge.status != pricetree_core::EntityStatus::Enabled {
            continue;
        }
        let (from, to) = (edge.from_node_id.as_str(), edge.to_node_id.as_str());
        if runtime.contains(from) && runtime.contains(to) {
            if let Some(nexts) = adjacency.get_mut(from) {
                nexts.push(to);
            }
        }
    }
    cycle_findings(adjacency, codes::E_GRAPH_CYCLE, "/nodes", "runtime edge")
}

/// DFS over `nodeOutputRef` dependencies between COMPUTE expressions.
pub fn check_compute_cycles(tree: &Tree) -> Vec<Finding> {
    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for node in tree.runtime_nodes() {
        let NodeBody::Compute(compute) = &node.body else {
            continue;
        };
        let mut deps = Vec::new();
        for output in &compute.outputs {
            output.expression.visit_refs(&mut |r| {
                if let Ref::NodeOutputRef { node_id, .. } = r {
                    deps.push(node_id.as_str());
                }
            });
        }
        adjacency.insert(&node.id, deps);
    }
    cycle_findings(adjacency, codes::E_COMPUTE_CYCLE, "/nodes", "compute dependency")
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
