//! Restore and evaluation-gate lifecycle checks.

use pricetree_core::tree::NodeBody;
use pricetree_core::{codes, EntityStatus, Finding, Tree, TreeStatus};
use std::collections::BTreeSet;

/// Node/edge ids brought back from DELETED by a restore. Validation
/// runs against the post-restore snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub node_ids: BTreeSet<String>,
    pub edge_ids: BTreeSet<String>,
}

impl ChangeSet {
    pub fn nodes(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        ChangeSet {
            node_ids: ids.into_iter().map(Into::into).collect(),
            edge_ids: BTreeSet::new(),
        }
    }
}

/// What an evaluation result will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalPurpose {
    /// Result is persisted (quote line, order). Requires ACTIVE.
    Persist,
    /// Interactive preview; DRAFT is tolerated with a warning.
    Preview,
}

fn node_keys(node: &pricetree_core::tree::Node) -> (Option<&str>, Option<&str>) {
    let selection_key = match &node.body {
        NodeBody::Input(input) => input.selection_key.as_deref(),
        _ => None,
    };
    (node.key.as_deref(), selection_key)
}

/// Collisions and dangling edges introduced by a restore.
pub fn check_restore(tree: &Tree, changes: &ChangeSet) -> Vec<Finding> {
    let mut findings = Vec::new();

    // Restored keys against the keys the surviving graph already owns.
    for node in &tree.nodes {
        if !changes.node_ids.contains(&node.id) || node.status == EntityStatus::Deleted {
            continue;
        }
        let (key, selection_key) = node_keys(node);
        for other in &tree.nodes {
            if other.id == node.id
                || other.status == EntityStatus::Deleted
                || changes.node_ids.contains(&other.id)
            {
                continue;
            }
            let (other_key, other_selection) = node_keys(other);
            if key.is_some() && key == other_key {
                findings.push(
                    Finding::error(
                        codes::E_RESTORE_COLLISION,
                        format!("/nodes/{}/key", node.id),
                        format!(
                            "restored node key '{}' collides with node '{}'",
                            key.unwrap_or_default(),
                            other.id
                        ),
                    )
                    .with_entity(&node.id),
                );
            }
            if selection_key.is_some() && selection_key == other_selection {
                findings.push(
                    Finding::error(
                        codes::E_RESTORE_COLLISION,
                        format!("/nodes/{}/selectionKey", node.id),
                        format!(
                            "restored selection key '{}' collides with node '{}'",
                            selection_key.unwrap_or_default(),
                            other.id
                        ),
                    )
                    .with_entity(&node.id),
                );
            }
        }
    }

    // No ENABLED edge may point at a still-DELETED endpoint after the
    // restore, whether or not the edge itself was restored.
    for edge in &tree.edges {
        if edge.status != EntityStatus::Enabled {
            continue;
        }
        for (which, node_id) in [("fromNodeId", &edge.from_node_id), ("toNodeId", &edge.to_node_id)]
        {
            let deleted = match tree.node(node_id) {
                Some(node) => node.status == EntityStatus::Deleted,
                None => true,
            };
            if deleted {
                findings.push(
                    Finding::error(
                        codes::E_RESTORE_DANGLING,
                        format!("/edges/{}/{}", edge.id, which),
                        format!(
                            "ENABLED edge '{}' points at still-DELETED node '{}'",
                            edge.id, node_id
                        ),
                    )
                    .with_entity(&edge.id),
                );
            }
        }
    }

    findings
}

/// Narrow pre-evaluation gate on the tree's lifecycle status.
pub fn check_eval_gate(tree: &Tree, purpose: EvalPurpose) -> Vec<Finding> {
    let status = tree.status;
    match (purpose, status) {
        (_, TreeStatus::Active) => Vec::new(),
        (EvalPurpose::Preview, TreeStatus::Draft) => vec![Finding::warning(
            codes::W_EVAL_DRAFT_PREVIEW,
            "/status",
            "previewing against a DRAFT tree version",
        )],
        (EvalPurpose::Persist, TreeStatus::Draft) => vec![Finding::error(
            codes::E_EVAL_TREE_STATUS,
            "/status",
            "cannot persist evaluation results against a DRAFT tree version",
        )],
        (EvalPurpose::Persist, TreeStatus::Archived) => vec![Finding::error(
            codes::E_EVAL_TREE_STATUS,
            "/status",
            "cannot persist evaluation results against an ARCHIVED tree version",
        )],
        (EvalPurpose::Preview, TreeStatus::Archived) => vec![Finding::error(
            codes::E_EVAL_TREE_STATUS,
            "/status",
            "cannot evaluate an ARCHIVED tree version",
        )],
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
