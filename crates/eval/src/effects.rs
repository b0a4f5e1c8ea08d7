//! Material effects, child-item proposals, and EFFECT outputs.
//!
//! Each derivation walks the same active set as pricing: PRICE-node
//! effects are condition-gated and their quantities come from
//! NUMBER-typed expressions. Publish validation proves those
//! expressions non-negative; dropping non-positive results here is the
//! runtime safety net, not the sole guard.

use crate::exprs::Evaluator;
use crate::pricing::run;
use crate::types::{
    ChildItemProposal, Env, EvalError, MaterialEffect, NoPricebook, Selections, Value,
};
use pricetree_core::tree::{NodeBody, Tree};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) fn collect_materials(
    ev: &mut Evaluator<'_>,
    active: &BTreeSet<String>,
    tree: &Tree,
) -> Result<Vec<MaterialEffect>, EvalError> {
    let mut out = Vec::new();
    for node in &tree.nodes {
        if !active.contains(&node.id) {
            continue;
        }
        let NodeBody::Price(spec) = &node.body else {
            continue;
        };
        for (i, material) in spec.materials.iter().enumerate() {
            let path = format!("/nodes/{}/materials/{}", node.id, i);
            if let Some(condition) = &material.applies_when {
                if !ev.eval_condition(condition, &format!("{}/appliesWhen", path))? {
                    continue;
                }
            }
            let quantity = ev
                .eval_expr(&material.quantity, &format!("{}/quantity", path))?
                .as_number(&path)?;
            if quantity <= 0.0 {
                continue;
            }
            out.push(MaterialEffect {
                material_key: material.material_key.clone(),
                quantity,
                unit: material.unit.clone(),
                node_id: node.id.clone(),
            });
        }
    }
    Ok(out)
}

pub(crate) fn collect_child_items(
    ev: &mut Evaluator<'_>,
    active: &BTreeSet<String>,
    tree: &Tree,
) -> Result<Vec<ChildItemProposal>, EvalError> {
    let mut out = Vec::new();
    for node in &tree.nodes {
        if !active.contains(&node.id) {
            continue;
        }
        let NodeBody::Price(spec) = &node.body else {
            continue;
        };
        for (i, child) in spec.child_items.iter().enumerate() {
            let path = format!("/nodes/{}/childItems/{}", node.id, i);
            if let Some(condition) = &child.applies_when {
                if !ev.eval_condition(condition, &format!("{}/appliesWhen", path))? {
                    continue;
                }
            }
            let quantity = ev
                .eval_expr(&child.quantity, &format!("{}/quantity", path))?
                .as_number(&path)?;
            if quantity <= 0.0 {
                continue;
            }
            out.push(ChildItemProposal {
                product_key: child.product_key.clone(),
                quantity,
                node_id: node.id.clone(),
            });
        }
    }
    Ok(out)
}

/// Derive material consumptions for the active configuration.
pub fn materials(
    tree: &Tree,
    selections: &Selections,
    env: &Env,
) -> Result<Vec<MaterialEffect>, EvalError> {
    run(tree, selections, env, &NoPricebook, |ev, active| {
        collect_materials(ev, active, tree)
    })
}

/// Derive child line-item proposals for the active configuration.
pub fn child_item_proposals(
    tree: &Tree,
    selections: &Selections,
    env: &Env,
) -> Result<Vec<ChildItemProposal>, EvalError> {
    run(tree, selections, env, &NoPricebook, |ev, active| {
        collect_child_items(ev, active, tree)
    })
}

/// Evaluate the named outputs of every active EFFECT node, keyed by
/// output name. Later nodes win on name collision; uniqueness is a
/// publish-time concern.
pub fn effect_outputs(
    tree: &Tree,
    selections: &Selections,
    env: &Env,
) -> Result<BTreeMap<String, Value>, EvalError> {
    run(tree, selections, env, &NoPricebook, |ev, active| {
        let mut out = BTreeMap::new();
        for node in &tree.nodes {
            if !active.contains(&node.id) {
                continue;
            }
            let NodeBody::Effect(spec) = &node.body else {
                continue;
            };
            for (name, expression) in &spec.outputs {
                let path = format!("/nodes/{}/outputs/{}", node.id, name);
                let value = ev.eval_expr(expression, &path)?;
                out.insert(name.clone(), value);
            }
        }
        Ok(out)
    })
}
