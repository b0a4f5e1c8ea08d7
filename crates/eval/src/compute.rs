//! Compute-dependency evaluation pass.
//!
//! Active COMPUTE nodes are topologically sorted by their
//! `nodeOutputRef` dependencies and evaluated in that order against
//! the evaluator's memo. Traversal-time on-demand evaluation may have
//! filled parts of the memo already; the results are identical by
//! construction. A dependency cycle among active nodes is the fatal
//! dependency-cycle error, never silently broken.

use crate::exprs::Evaluator;
use crate::types::{EvalError, Value};
use pricetree_core::ast::Ref;
use pricetree_core::tree::NodeBody;
use std::collections::{BTreeMap, BTreeSet};

/// Evaluate every active COMPUTE node, returning node id -> output.
pub fn evaluate_computes(
    ev: &mut Evaluator<'_>,
    active: &BTreeSet<String>,
) -> Result<BTreeMap<String, Value>, EvalError> {
    let order = topo_order(ev, active)?;
    let mut outputs = BTreeMap::new();
    for node_id in order {
        let Some(symbol) = ev.table.computes.get(node_id.as_str()) else {
            continue;
        };
        let output_key = symbol.output_key.to_string();
        let value = ev.compute_value(&node_id, &output_key)?;
        outputs.insert(node_id, value);
    }
    Ok(outputs)
}

/// Topological order of the active COMPUTE nodes by `nodeOutputRef`
/// dependency, ties broken by node id.
fn topo_order(ev: &Evaluator<'_>, active: &BTreeSet<String>) -> Result<Vec<String>, EvalError> {
    let mut deps: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for node in &ev.tree.nodes {
        if !active.contains(&node.id) {
            continue;
        }
        let NodeBody::Compute(compute) = &node.body else {
            continue;
        };
        let mut targets = Vec::new();
        for output in &compute.outputs {
            output.expression.visit_refs(&mut |r| {
                if let Ref::NodeOutputRef { node_id, .. } = r {
                    targets.push(node_id.clone());
                }
            });
        }
        deps.insert(&node.id, targets);
    }

    // DFS with an in-stack set; revisiting a stacked node is a cycle.
    let mut order = Vec::new();
    let mut done: BTreeSet<&str> = BTreeSet::new();
    let mut stack: BTreeSet<&str> = BTreeSet::new();
    for &node_id in deps.keys() {
        visit(node_id, &deps, &mut done, &mut stack, &mut order)?;
    }
    Ok(order)
}

fn visit<'a>(
    node_id: &'a str,
    deps: &'a BTreeMap<&'a str, Vec<String>>,
    done: &mut BTreeSet<&'a str>,
    stack: &mut BTreeSet<&'a str>,
    order: &mut Vec<String>,
) -> Result<(), EvalError> {
    if done.contains(node_id) {
        return Ok(());
    }
    if !stack.insert(node_id) {
        return Err(EvalError::ComputeCycle {
            node_id: node_id.to_string(),
        });
    }
    if let Some(targets) = deps.get(node_id) {
        for target in targets {
            // Dependencies outside the active COMPUTE set resolve on
            // demand through the memo; only in-set edges order the pass.
            if let Some((&key, _)) = deps.get_key_value(target.as_str()) {
                visit(key, deps, done, stack, order)?;
            }
        }
    }
    stack.remove(node_id);
    done.insert(node_id);
    order.push(node_id.to_string());
    Ok(())
}
