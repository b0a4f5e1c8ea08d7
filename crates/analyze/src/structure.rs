//! Structural integrity checks: identifiers, keys, roots, and edges.

use pricetree_core::tree::NodeBody;
use pricetree_core::{codes, Edge, EntityStatus, Finding, Tree};
use std::collections::{BTreeMap, BTreeSet};

/// Duplicate node/edge id detection. Every occurrence after the first
/// is reported; DELETED entities still occupy their id.
pub fn check_duplicate_ids(tree: &Tree) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut node_ids = BTreeSet::new();
    for node in &tree.nodes {
        if !node_ids.insert(node.id.as_str()) {
            findings.push(
                Finding::error(
                    codes::E_DUPLICATE_ID,
                    format!("/nodes/{}", node.id),
                    format!("duplicate node id '{}'", node.id),
                )
                .with_entity(&node.id),
            );
        }
    }
    let mut edge_ids = BTreeSet::new();
    for edge in &tree.edges {
        if !edge_ids.insert(edge.id.as_str()) {
            findings.push(
                Finding::error(
                    codes::E_DUPLICATE_ID,
                    format!("/edges/{}", edge.id),
                    format!("duplicate edge id '{}'", edge.id),
                )
                .with_entity(&edge.id),
            );
        }
    }
    findings
}

/// Node-key and INPUT-selectionKey uniqueness among non-DELETED nodes.
pub fn check_duplicate_keys(tree: &Tree) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut keys: BTreeMap<&str, &str> = BTreeMap::new();
    let mut selection_keys: BTreeMap<&str, &str> = BTreeMap::new();
    for node in &tree.nodes {
        if node.status == EntityStatus::Deleted {
            continue;
        }
        if let Some(key) = node.key.as_deref() {
            if let Some(first) = keys.get(key) {
                findings.push(
                    Finding::error(
                        codes::E_DUPLICATE_KEY,
                        format!("/nodes/{}/key", node.id),
                        format!("node key '{}' already used by node '{}'", key, first),
                    )
                    .with_entity(&node.id),
                );
            } else {
                keys.insert(key, &node.id);
            }
        }
        if let NodeBody::Input(input) = &node.body {
            if let Some(sk) = input.selection_key.as_deref() {
                if let Some(first) = selection_keys.get(sk) {
                    findings.push(
                        Finding::error(
                            codes::E_DUPLICATE_KEY,
                            format!("/nodes/{}/selectionKey", node.id),
                            format!(
                                "selection key '{}' already declared by node '{}'",
                                sk, first
                            ),
                        )
                        .with_entity(&node.id),
                    );
                } else {
                    selection_keys.insert(sk, &node.id);
                }
            }
        }
    }
    findings
}

/// Root validity: each declared root must exist, be ENABLED, and not
/// be a GROUP; at least one root must survive those checks.
pub fn check_roots(tree: &Tree) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut surviving = 0usize;
    for (i, root_id) in tree.root_node_ids.iter().enumerate() {
        let path = format!("/rootNodeIds/{}", i);
        match tree.node(root_id) {
            None => findings.push(
                Finding::error(
                    codes::E_ROOT_INVALID,
                    path,
                    format!("root '{}' does not exist", root_id),
                )
                .with_entity(root_id),
            ),
            Some(node) if node.status != EntityStatus::Enabled => findings.push(
                Finding::error(
                    codes::E_ROOT_INVALID,
                    path,
                    format!("root '{}' is {}", root_id, node.status.as_str()),
                )
                .with_entity(root_id),
            ),
            Some(node) if matches!(node.body, NodeBody::Group) => findings.push(
                Finding::error(
                    codes::E_ROOT_INVALID,
                    path,
                    format!("root '{}' is a GROUP node", root_id),
                )
                .with_entity(root_id),
            ),
            Some(_) => surviving += 1,
        }
    }
    if surviving == 0 {
        findings.push(Finding::error(
            codes::E_ROOT_INVALID,
            "/rootNodeIds",
            "tree has no usable root node",
        ));
    }
    findings
}

fn endpoint_findings(tree: &Tree, edge: &Edge, which: &str, node_id: &str) -> Vec<Finding> {
    let path = format!("/edges/{}/{}", edge.id, which);
    let Some(node) = tree.node(node_id) else {
        return vec![Finding::error(
            codes::E_EDGE_ENDPOINT,
            path,
            format!("edge endpoint '{}' does not exist", node_id),
        )
        .with_entity(&edge.id)];
    };
    let mut findings = Vec::new();
    if edge.status == EntityStatus::Enabled {
        if node.status == EntityStatus::Deleted {
            findings.push(
                Finding::error(
                    codes::E_EDGE_STATUS,
                    path.clone(),
                    format!("ENABLED edge touches DELETED node '{}'", node_id),
                )
                .with_entity(&edge.id),
            );
        }
        if matches!(node.body, NodeBody::Group) {
            findings.push(
                Finding::error(
                    codes::E_EDGE_STATUS,
                    path.clone(),
                    format!("ENABLED edge touches GROUP node '{}'", node_id),
                )
                .with_entity(&edge.id),
            );
        }
    }
    // A DISABLED endpoint forces the edge DISABLED as well.
    if node.status == EntityStatus::Disabled && edge.status == EntityStatus::Enabled {
        findings.push(
            Finding::error(
                codes::E_EDGE_STATUS,
                path,
                format!(
                    "edge must be DISABLED because endpoint '{}' is DISABLED",
                    node_id
                ),
            )
            .with_entity(&edge.id),
        );
    }
    findings
}

/// Per-edge checks: endpoints exist, no self-loops, non-negative
/// integer priority, status consistency with endpoints.
pub fn check_edges(tree: &Tree) -> Vec<Finding> {
    let mut findings = Vec::new();
    for edge in &tree.edges {
        if edge.status == EntityStatus::Deleted {
            continue;
        }
        if edge.from_node_id == edge.to_node_id {
            findings.push(
                Finding::error(
                    codes::E_EDGE_SELF_LOOP,
                    format!("/edges/{}", edge.id),
                    format!("edge loops on node '{}'", edge.from_node_id),
                )
                .with_entity(&edge.id),
            );
        }
        if edge.priority < 0 {
            findings.push(
                Finding::error(
                    codes::E_EDGE_PRIORITY,
                    format!("/edges/{}/priority", edge.id),
                    format!("edge priority {} is negative", edge.priority),
                )
                .with_entity(&edge.id),
            );
        }
        findings.extend(endpoint_findings(tree, edge, "fromNodeId", &edge.from_node_id));
        findings.extend(endpoint_findings(tree, edge, "toNodeId", &edge.to_node_id));
    }
    findings
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
