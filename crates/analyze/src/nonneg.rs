//! Non-negativity prover for effect quantity expressions.
//!
//! Material and child-item quantities feed inventory and order
//! generation; a negative quantity there corrupts downstream rollups.
//! Publish requires the quantity expression to be provably
//! non-negative. The prover is structural and incomplete on purpose:
//! anything it cannot prove is rejected, and authors wrap the
//! expression in `max(0, …)` or `abs(…)` to state the intent.

use pricetree_core::tree::NodeBody;
use pricetree_core::{codes, ExpressionSpec, Finding, Ref, Tree};

/// True when the expression provably evaluates to a value >= 0 for
/// every input.
pub fn prove_non_negative(expr: &ExpressionSpec) -> bool {
    match expr {
        ExpressionSpec::Ref { target } => match target {
            Ref::Constant { value } => matches!(value.as_f64(), Some(n) if n >= 0.0),
            // Environment dimensions and quantities are non-negative by
            // construction.
            Ref::EnvRef { .. } => true,
            _ => false,
        },
        ExpressionSpec::Abs { .. } => true,
        ExpressionSpec::Ceil { arg }
        | ExpressionSpec::Floor { arg }
        | ExpressionSpec::Round { arg } => prove_non_negative(arg),
        ExpressionSpec::Add { args } | ExpressionSpec::Mul { args } => {
            !args.is_empty() && args.iter().all(prove_non_negative)
        }
        ExpressionSpec::Div { left, right } => {
            prove_non_negative(left) && prove_non_negative(right)
        }
        ExpressionSpec::Max { args } => args.iter().any(prove_non_negative),
        ExpressionSpec::Min { args } => {
            !args.is_empty() && args.iter().all(prove_non_negative)
        }
        ExpressionSpec::Clamp { lo, .. } => prove_non_negative(lo),
        ExpressionSpec::If {
            then, otherwise, ..
        } => prove_non_negative(then) && prove_non_negative(otherwise),
        ExpressionSpec::Coalesce { args } => {
            !args.is_empty() && args.iter().all(prove_non_negative)
        }
        _ => false,
    }
}

/// Reject unprovable material/child-item quantity expressions.
pub fn check_effect_quantities(tree: &Tree) -> Vec<Finding> {
    let mut findings = Vec::new();
    for node in tree.runtime_nodes() {
        let NodeBody::Price(price) = &node.body else {
            continue;
        };
        for (i, material) in price.materials.iter().enumerate() {
            if !prove_non_negative(&material.quantity) {
                findings.push(
                    Finding::error(
                        codes::E_EFFECT_QTY_SIGN,
                        format!("/nodes/{}/materials/{}/quantity", node.id, i),
                        format!(
                            "material '{}' quantity is not provably non-negative; \
                             wrap it in max(0, ...) or abs(...)",
                            material.material_key
                        ),
                    )
                    .with_entity(&node.id),
                );
            }
        }
        for (i, child) in price.child_items.iter().enumerate() {
            if !prove_non_negative(&child.quantity) {
                findings.push(
                    Finding::error(
                        codes::E_EFFECT_QTY_SIGN,
                        format!("/nodes/{}/childItems/{}/quantity", node.id, i),
                        format!(
                            "child item '{}' quantity is not provably non-negative; \
                             wrap it in max(0, ...) or abs(...)",
                            child.product_key
                        ),
                    )
                    .with_entity(&node.id),
                );
            }
        }
    }
    findings
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pricetree_core::ingest_tree;
    use serde_json::{json, Value};

    fn expr(v: Value) -> ExpressionSpec {
        serde_json::from_value(v).unwrap()
    }

    fn envref(key: &str) -> Value {
        json!({ "op": "ref", "ref": { "kind": "envRef", "key": key } })
    }

    fn num(n: f64) -> Value {
        json!({ "op": "ref", "ref": { "kind": "constant", "value": n } })
    }

    #[test]
    fn provable_shapes() {
        for v in [
            num(3.0),
            envref("quantity"),
            json!({ "op": "ceil", "arg": { "op": "div",
                "left": envref("perimeterIn"), "right": num(12.0) } }),
            json!({ "op": "max", "args": [num(0.0), {
                "op": "sub", "left": envref("sqft"), "right": num(10.0) }] }),
            json!({ "op": "abs", "arg": { "op": "sub",
                "left": num(1.0), "right": num(5.0) } }),
            json!({ "op": "clamp", "value": { "op": "sub",
                "left": num(1.0), "right": num(5.0) },
                "lo": num(0.0), "hi": num(100.0) }),
        ] {
            assert!(prove_non_negative(&expr(v.clone())), "{}", v);
        }
    }

    #[test]
    fn unprovable_shapes() {
        for v in [
            num(-1.0),
            json!({ "op": "ref", "ref": { "kind": "selectionRef", "selectionKey": "n" } }),
            json!({ "op": "sub", "left": envref("sqft"), "right": num(10.0) }),
            json!({ "op": "min", "args": [] }),
        ] {
            assert!(!prove_non_negative(&expr(v.clone())), "{}", v);
        }
    }

    #[test]
    fn unprovable_material_quantity_is_flagged() {
        let t = ingest_tree(&json!({
            "versionId": "tv1",
            "rootNodeIds": ["p1"],
            "nodes": [
                { "id": "p1", "kind": "PRICE", "components": [], "materials": [
                    { "materialKey": "vinyl", "quantity": {
                        "op": "sub", "left": envref("sqft"), "right": num(1.0) } },
                ] },
            ],
            "edges": []
        }))
        .unwrap();
        let findings = check_effect_quantities(&t);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, codes::E_EFFECT_QTY_SIGN);
    }
}
