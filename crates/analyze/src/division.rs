//! Divide-by-zero guard analysis.
//!
//! Division evaluates to a hard failure at runtime when the
//! denominator is zero, so every `div` with a non-constant denominator
//! must be guarded. Recognized guards: an enclosing
//! `if(denom == 0, fallback, …)` (the division sits in the branch the
//! zero case cannot reach) and `clamp(denom, lo, hi)` with a constant
//! `lo > 0`. A constant-zero denominator is always an error; it cannot
//! succeed at any input.

use crate::ValidatePolicy;
use pricetree_core::tree::NodeBody;
use pricetree_core::{codes, ConditionRule, ExpressionSpec, Finding, Ref, Tree};
use std::collections::BTreeSet;

fn constant_number(expr: &ExpressionSpec) -> Option<f64> {
    match expr {
        ExpressionSpec::Ref {
            target: Ref::Constant { value },
        } => value.as_f64(),
        _ => None,
    }
}

/// `eq(x, 0)` / `eq(0, x)` pins the guard key for the else branch;
/// `neq` pins it for the then branch.
fn zero_test_key(cond: &ExpressionSpec) -> Option<(String, bool)> {
    let (left, right, guards_else) = match cond {
        ExpressionSpec::Eq { left, right } => (left, right, true),
        ExpressionSpec::Neq { left, right } => (left, right, false),
        _ => return None,
    };
    let key = if constant_number(right) == Some(0.0) {
        left.canonical_key()
    } else if constant_number(left) == Some(0.0) {
        right.canonical_key()
    } else {
        return None;
    };
    Some((key, guards_else))
}

fn denominator_is_safe(denom: &ExpressionSpec, guards: &BTreeSet<String>) -> Option<bool> {
    if let Some(n) = constant_number(denom) {
        // Constant denominator: safe unless it is exactly zero.
        return Some(n != 0.0);
    }
    if let ExpressionSpec::Clamp { lo, .. } = denom {
        if matches!(constant_number(lo), Some(n) if n > 0.0) {
            return Some(true);
        }
    }
    if guards.contains(&denom.canonical_key()) {
        return Some(true);
    }
    None
}

fn walk_expr(
    expr: &ExpressionSpec,
    guards: &BTreeSet<String>,
    path: &str,
    strict: bool,
    findings: &mut Vec<Finding>,
) {
    match expr {
        ExpressionSpec::Div { left, right } => {
            walk_expr(left, guards, &format!("{}/left", path), strict, findings);
            walk_expr(right, guards, &format!("{}/right", path), strict, findings);
            match denominator_is_safe(right, guards) {
                Some(true) => {}
                Some(false) => findings.push(Finding::error(
                    codes::E_DIV_UNGUARDED,
                    format!("{}/right", path),
                    "division by a constant zero denominator",
                )),
                None => {
                    let message = "division denominator is not guarded against zero";
                    findings.push(if strict {
                        Finding::error(codes::E_DIV_UNGUARDED, format!("{}/right", path), message)
                    } else {
                        Finding::warning(codes::W_DIV_UNGUARDED, format!("{}/right", path), message)
                    });
                }
            }
        }
        ExpressionSpec::If {
            cond,
            then,
            otherwise,
        } => {
            walk_expr(cond, guards, &format!("{}/cond", path), strict, findings);
            let mut then_guards = guards.clone();
            let mut else_guards = guards.clone();
            if let Some((key, guards_else)) = zero_test_key(cond) {
                if guards_else {
                    else_guards.insert(key);
                } else {
                    then_guards.insert(key);
                }
            }
            walk_expr(then, &then_guards, &format!("{}/then", path), strict, findings);
            walk_expr(
                otherwise,
                &else_guards,
                &format!("{}/else", path),
                strict,
                findings,
            );
        }
        _ => {
            // Other operators neither guard nor divide; recurse via a
            // structural match on their children.
            walk_children(expr, guards, path, strict, findings);
        }
    }
}

fn walk_children(
    expr: &ExpressionSpec,
    guards: &BTreeSet<String>,
    path: &str,
    strict: bool,
    findings: &mut Vec<Finding>,
) {
    match expr {
        ExpressionSpec::Ref { .. } | ExpressionSpec::Exists { .. } => {}
        ExpressionSpec::Add { args }
        | ExpressionSpec::Mul { args }
        | ExpressionSpec::Min { args }
        | ExpressionSpec::Max { args }
        | ExpressionSpec::And { args }
        | ExpressionSpec::Or { args }
        | ExpressionSpec::Concat { args }
        | ExpressionSpec::Coalesce { args } => {
            for (i, a) in args.iter().enumerate() {
                walk_expr(a, guards, &format!("{}/args/{}", path, i), strict, findings);
            }
        }
        ExpressionSpec::Sub { left, right }
        | ExpressionSpec::Eq { left, right }
        | ExpressionSpec::Neq { left, right }
        | ExpressionSpec::Gt { left, right }
        | ExpressionSpec::Gte { left, right }
        | ExpressionSpec::Lt { left, right }
        | ExpressionSpec::Lte { left, right } => {
            walk_expr(left, guards, &format!("{}/left", path), strict, findings);
            walk_expr(right, guards, &format!("{}/right", path), strict, findings);
        }
        ExpressionSpec::Clamp { value, lo, hi } => {
            walk_expr(value, guards, &format!("{}/value", path), strict, findings);
            walk_expr(lo, guards, &format!("{}/lo", path), strict, findings);
            walk_expr(hi, guards, &format!("{}/hi", path), strict, findings);
        }
        ExpressionSpec::Ceil { arg }
        | ExpressionSpec::Floor { arg }
        | ExpressionSpec::Round { arg }
        | ExpressionSpec::Abs { arg }
        | ExpressionSpec::Not { arg }
        | ExpressionSpec::Strlen { arg } => {
            walk_expr(arg, guards, &format!("{}/arg", path), strict, findings);
        }
        // Handled in walk_expr.
        ExpressionSpec::Div { .. } | ExpressionSpec::If { .. } => {}
    }
}

fn walk_condition(
    cond: &ConditionRule,
    path: &str,
    strict: bool,
    findings: &mut Vec<Finding>,
) {
    let fresh = BTreeSet::new();
    match cond {
        ConditionRule::And { rules } | ConditionRule::Or { rules } => {
            for (i, r) in rules.iter().enumerate() {
                walk_condition(r, &format!("{}/rules/{}", path, i), strict, findings);
            }
        }
        ConditionRule::Not { rule } => {
            walk_condition(rule, &format!("{}/rule", path), strict, findings)
        }
        ConditionRule::Exists { .. } => {}
        ConditionRule::Eq { left, right }
        | ConditionRule::Neq { left, right }
        | ConditionRule::Gt { left, right }
        | ConditionRule::Gte { left, right }
        | ConditionRule::Lt { left, right }
        | ConditionRule::Lte { left, right } => {
            walk_expr(left, &fresh, &format!("{}/left", path), strict, findings);
            walk_expr(right, &fresh, &format!("{}/right", path), strict, findings);
        }
        ConditionRule::In { left, .. } => {
            walk_expr(left, &fresh, &format!("{}/left", path), strict, findings)
        }
    }
}

/// Walk every expression and condition in the tree's ENABLED nodes and
/// edges, flagging unguarded divisions at the policy's severity.
pub fn check_division(tree: &Tree, policy: &ValidatePolicy) -> Vec<Finding> {
    let strict = policy.strict_division;
    let fresh = BTreeSet::new();
    let mut findings = Vec::new();
    let mut out: Vec<Finding> = Vec::new();

    for node in tree.runtime_nodes() {
        let base = format!("/nodes/{}", node.id);
        match &node.body {
            NodeBody::Compute(compute) => {
                for (i, output) in compute.outputs.iter().enumerate() {
                    walk_expr(
                        &output.expression,
                        &fresh,
                        &format!("{}/outputs/{}/expression", base, i),
                        strict,
                        &mut out,
                    );
                }
            }
            NodeBody::Price(price) => {
                for (i, component) in price.components.iter().enumerate() {
                    let cbase = format!("{}/components/{}", base, i);
                    for (field, expr) in [
                        ("unitPrice", &component.unit_price),
                        ("quantity", &component.quantity),
                        ("overageBase", &component.overage_base),
                    ] {
                        if let Some(expr) = expr {
                            walk_expr(expr, &fresh, &format!("{}/{}", cbase, field), strict, &mut out);
                        }
                    }
                    if let Some(cond) = &component.applies_when {
                        walk_condition(cond, &format!("{}/appliesWhen", cbase), strict, &mut out);
                    }
                }
                for (i, material) in price.materials.iter().enumerate() {
                    walk_expr(
                        &material.quantity,
                        &fresh,
                        &format!("{}/materials/{}/quantity", base, i),
                        strict,
                        &mut out,
                    );
                }
                for (i, child) in price.child_items.iter().enumerate() {
                    walk_expr(
                        &child.quantity,
                        &fresh,
                        &format!("{}/childItems/{}/quantity", base, i),
                        strict,
                        &mut out,
                    );
                }
            }
            NodeBody::Effect(effect) => {
                for (key, expr) in &effect.outputs {
                    walk_expr(
                        expr,
                        &fresh,
                        &format!("{}/outputs/{}", base, key),
                        strict,
                        &mut out,
                    );
                }
            }
            NodeBody::Input(_) | NodeBody::Group => {}
        }
        findings.extend(out.drain(..).map(|f| f.with_entity(&node.id)));
    }

    for edge in &tree.edges {
        if edge.status != pricetree_core::EntityStatus::Enabled {
            continue;
        }
        if let Some(cond) = &edge.condition {
            walk_condition(
                cond,
                &format!("/edges/{}/condition", edge.id),
                strict,
                &mut out,
            );
        }
        findings.extend(out.drain(..).map(|f| f.with_entity(&edge.id)));
    }

    findings
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
