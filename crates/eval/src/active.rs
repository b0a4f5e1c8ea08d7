//! Active-node resolution.
//!
//! Deterministic breadth-first traversal from the tree's roots:
//! ENABLED outgoing edges are grouped by priority ascending; within a
//! priority bucket candidates are ordered by edge id and the first
//! whose condition evaluates true (or which has no condition) wins the
//! bucket. Later edges in the same bucket are never visited from this
//! node, mirroring first-matching-rule semantics. An already-active
//! node is never revisited.

use crate::exprs::Evaluator;
use crate::types::EvalError;
use pricetree_core::tree::Edge;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Resolve the active node set for the evaluator's selections and env.
pub fn active_nodes(ev: &mut Evaluator<'_>) -> Result<BTreeSet<String>, EvalError> {
    let tree = ev.tree;
    let mut active: BTreeSet<String> = BTreeSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    for root_id in &tree.root_node_ids {
        // Non-ENABLED, GROUP, and unknown roots are skipped; publish
        // validation flags them.
        let Some(root) = tree.node(root_id) else {
            continue;
        };
        if root.is_runtime() && active.insert(root.id.clone()) {
            queue.push_back(root.id.clone());
        }
    }

    while let Some(node_id) = queue.pop_front() {
        // Priority ascending; BTreeMap gives the order for free.
        let mut buckets: BTreeMap<i64, Vec<&Edge>> = BTreeMap::new();
        for edge in tree.enabled_edges_from(&node_id) {
            buckets.entry(edge.priority).or_default().push(edge);
        }

        for bucket in buckets.values_mut() {
            bucket.sort_by(|a, b| a.id.cmp(&b.id));
            for edge in bucket.iter() {
                let taken = match &edge.condition {
                    None => true,
                    Some(condition) => {
                        let path = format!("/edges/{}/condition", edge.id);
                        ev.eval_condition(condition, &path)?
                    }
                };
                if !taken {
                    continue;
                }
                // First match consumes the bucket, whether or not the
                // target is new.
                let target_runtime = ev
                    .tree
                    .node(&edge.to_node_id)
                    .map(|n| n.is_runtime())
                    .unwrap_or(false);
                if target_runtime && active.insert(edge.to_node_id.clone()) {
                    queue.push_back(edge.to_node_id.clone());
                }
                break;
            }
        }
    }

    Ok(active)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Env, NoPricebook, Selections};
    use pricetree_core::ast::{ConditionRule, ExpressionSpec, Ref};
    use pricetree_core::contract::EnvKeys;
    use pricetree_core::symbols::build_symbols;
    use pricetree_core::tree::*;
    use serde_json::json;

    fn group(id: &str) -> Node {
        Node {
            id: id.to_string(),
            key: None,
            status: EntityStatus::Enabled,
            body: NodeBody::Group,
        }
    }

    fn input(id: &str) -> Node {
        Node {
            id: id.to_string(),
            key: Some(id.to_string()),
            status: EntityStatus::Enabled,
            body: NodeBody::Input(InputSpec {
                selection_key: Some(id.to_string()),
                value_type: "NUMBER".to_string(),
                default: None,
                required: false,
                constraints: None,
                options: Vec::new(),
            }),
        }
    }

    fn edge(id: &str, from: &str, to: &str, priority: i64, condition: Option<ConditionRule>) -> Edge {
        Edge {
            id: id.to_string(),
            from_node_id: from.to_string(),
            to_node_id: to.to_string(),
            priority,
            condition,
            status: EntityStatus::Enabled,
        }
    }

    fn sel_eq(key: &str, value: serde_json::Value) -> ConditionRule {
        ConditionRule::Eq {
            left: ExpressionSpec::of(Ref::EffectiveRef {
                selection_key: key.to_string(),
            }),
            right: ExpressionSpec::of(Ref::Constant { value }),
        }
    }

    fn resolve(t: &Tree, selections: &Selections) -> BTreeSet<String> {
        let keys = EnvKeys::default();
        let (table, _) = build_symbols(t, &keys);
        let env = Env::new();
        let mut ev = Evaluator::new(t, &table, selections, &env, &NoPricebook);
        active_nodes(&mut ev).unwrap()
    }

    #[test]
    fn first_match_wins_within_a_priority_bucket() {
        let t = Tree {
            version_id: "tv1".to_string(),
            status: TreeStatus::Active,
            root_node_ids: vec!["root".to_string()],
            nodes: vec![input("root"), input("a"), input("b")],
            edges: vec![
                // Same priority; e1 sorts first by id and has no
                // condition, so e2's target is never reached.
                edge("e1", "root", "a", 0, None),
                edge("e2", "root", "b", 0, None),
            ],
            meta: TreeMeta::default(),
        };
        let active = resolve(&t, &Selections::new());
        assert!(active.contains("a"));
        assert!(!active.contains("b"));
    }

    #[test]
    fn later_priority_bucket_still_routes() {
        let t = Tree {
            version_id: "tv1".to_string(),
            status: TreeStatus::Active,
            root_node_ids: vec!["root".to_string()],
            nodes: vec![input("root"), input("a"), input("b")],
            edges: vec![
                edge("e1", "root", "a", 0, None),
                edge("e2", "root", "b", 1, None),
            ],
            meta: TreeMeta::default(),
        };
        let active = resolve(&t, &Selections::new());
        assert!(active.contains("a"));
        assert!(active.contains("b"));
    }

    #[test]
    fn condition_gated_edge_skipped_and_next_candidate_taken() {
        let t = Tree {
            version_id: "tv1".to_string(),
            status: TreeStatus::Active,
            root_node_ids: vec!["root".to_string()],
            nodes: vec![input("root"), input("mode"), input("a"), input("b")],
            edges: vec![
                edge("e1", "root", "a", 0, Some(sel_eq("mode", json!("x")))),
                edge("e2", "root", "b", 0, None),
            ],
            meta: TreeMeta::default(),
        };
        // mode unset: e1's condition is false (NULL != "x"), e2 wins.
        let active = resolve(&t, &Selections::new());
        assert!(!active.contains("a"));
        assert!(active.contains("b"));

        let mut sel = Selections::new();
        sel.insert("mode".to_string(), json!("x"));
        let active = resolve(&t, &sel);
        assert!(active.contains("a"));
        assert!(!active.contains("b"));
    }

    #[test]
    fn group_and_disabled_targets_never_activate() {
        let mut disabled = input("d");
        disabled.status = EntityStatus::Disabled;
        let t = Tree {
            version_id: "tv1".to_string(),
            status: TreeStatus::Active,
            root_node_ids: vec!["root".to_string()],
            nodes: vec![input("root"), group("g"), disabled],
            edges: vec![
                edge("e1", "root", "g", 0, None),
                edge("e2", "root", "d", 1, None),
            ],
            meta: TreeMeta::default(),
        };
        let active = resolve(&t, &Selections::new());
        assert_eq!(active.len(), 1);
        assert!(active.contains("root"));
    }

    #[test]
    fn already_active_node_is_not_revisited() {
        let t = Tree {
            version_id: "tv1".to_string(),
            status: TreeStatus::Active,
            root_node_ids: vec!["r1".to_string(), "r2".to_string()],
            nodes: vec![input("r1"), input("r2"), input("a")],
            edges: vec![
                edge("e1", "r1", "a", 0, None),
                edge("e2", "r2", "a", 0, None),
            ],
            meta: TreeMeta::default(),
        };
        let active = resolve(&t, &Selections::new());
        assert_eq!(active.len(), 3);
    }
}
