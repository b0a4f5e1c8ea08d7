//! Tree-wide expression and condition type checking.
//!
//! Builds the symbol table, then pushes every expression the tree
//! carries through the type checker in its own evaluation context:
//! COMPUTE outputs against their declared types, PRICE money and
//! quantity expressions as non-nullable NUMBER, gate conditions as
//! conditions, EFFECT outputs freely. Component field requirements and
//! input default ranges ride along in the same pass.

use pricetree_core::tree::{ComponentKind, NodeBody, PriceComponent};
use pricetree_core::{
    build_symbols, codes, type_check_condition, type_check_expr, Checked, EnvKeys, EvalContext,
    Finding, ScalarType, SymbolTable, Tree,
};

fn require_number(checked: &Checked, path: &str, findings: &mut Vec<Finding>) {
    if checked.inferred.is_poisoned() {
        return;
    }
    if checked.inferred.ty != ScalarType::Number {
        findings.push(Finding::error(
            codes::E_TYPE_MISMATCH,
            path,
            format!(
                "expected NUMBER, found {}",
                checked.inferred.ty.as_str()
            ),
        ));
    } else if checked.inferred.nullable {
        findings.push(Finding::error(
            codes::E_TYPE_NULLABLE,
            path,
            "expression may be NULL here; wrap it in coalesce(...)",
        ));
    }
}

fn check_component(
    component: &PriceComponent,
    table: &SymbolTable<'_>,
    path: &str,
    findings: &mut Vec<Finding>,
) {
    let required: &[&str] = match component.kind {
        ComponentKind::Flat => &["unitPrice"],
        ComponentKind::PerUnit => &["unitPrice", "quantity"],
        ComponentKind::PerOverage => &["unitPrice", "quantity", "overageBase"],
        // Skipped at runtime; nothing is required of it.
        ComponentKind::Tiered => &[],
    };
    let fields = [
        ("unitPrice", component.unit_price.as_ref()),
        ("quantity", component.quantity.as_ref()),
        ("overageBase", component.overage_base.as_ref()),
    ];
    for (field, expr) in fields {
        let field_path = format!("{}/{}", path, field);
        match expr {
            Some(expr) => {
                let checked = type_check_expr(expr, EvalContext::Price, table, &field_path);
                findings.extend(checked.findings.iter().cloned());
                require_number(&checked, &field_path, findings);
            }
            None if required.contains(&field) => findings.push(Finding::error(
                codes::E_COMPONENT_FIELD,
                field_path,
                format!(
                    "{} component is missing required field '{}'",
                    component.kind.as_str(),
                    field
                ),
            )),
            None => {}
        }
    }
    if let Some(cond) = &component.applies_when {
        findings.extend(type_check_condition(
            cond,
            EvalContext::Condition,
            table,
            &format!("{}/appliesWhen", path),
        ));
    }
}

fn default_in_range(input: &pricetree_core::tree::InputSpec) -> bool {
    let (Some(constraints), Some(default)) = (&input.constraints, &input.default) else {
        return true;
    };
    let Some(n) = default.as_f64() else {
        return true;
    };
    if matches!(constraints.min, Some(min) if n < min) {
        return false;
    }
    if matches!(constraints.max, Some(max) if n > max) {
        return false;
    }
    true
}

/// Symbol table plus the full expression/condition sweep.
pub fn check_expressions(tree: &Tree) -> Vec<Finding> {
    let env_keys = EnvKeys::default();
    let (table, mut findings) = build_symbols(tree, &env_keys);
    let mut scoped: Vec<Finding> = Vec::new();

    for node in tree.runtime_nodes() {
        let base = format!("/nodes/{}", node.id);
        match &node.body {
            NodeBody::Input(input) => {
                if !default_in_range(input) {
                    scoped.push(Finding::warning(
                        codes::W_DEFAULT_RANGE,
                        format!("{}/default", base),
                        format!(
                            "default {} falls outside the declared constraints",
                            input.default.clone().unwrap_or_default()
                        ),
                    ));
                }
            }
            NodeBody::Compute(compute) => {
                for (i, output) in compute.outputs.iter().enumerate() {
                    let path = format!("{}/outputs/{}/expression", base, i);
                    let checked =
                        type_check_expr(&output.expression, EvalContext::Compute, &table, &path);
                    scoped.extend(checked.findings.iter().cloned());
                    if checked.inferred.is_poisoned() {
                        continue;
                    }
                    let declared = ScalarType::parse(&output.value_type);
                    if let Some(declared) = declared {
                        if checked.inferred.ty != declared {
                            scoped.push(Finding::error(
                                codes::E_TYPE_MISMATCH,
                                path.clone(),
                                format!(
                                    "output '{}' declares {} but the expression is {}",
                                    output.key,
                                    declared.as_str(),
                                    checked.inferred.ty.as_str()
                                ),
                            ));
                        }
                    }
                    if checked.inferred.nullable {
                        scoped.push(Finding::error(
                            codes::E_TYPE_NULLABLE,
                            path,
                            format!(
                                "output '{}' may evaluate to NULL; wrap it in coalesce(...)",
                                output.key
                            ),
                        ));
                    }
                }
            }
            NodeBody::Price(price) => {
                for (i, component) in price.components.iter().enumerate() {
                    check_component(
                        component,
                        &table,
                        &format!("{}/components/{}", base, i),
                        &mut scoped,
                    );
                }
                for (i, material) in price.materials.iter().enumerate() {
                    let path = format!("{}/materials/{}/quantity", base, i);
                    let checked =
                        type_check_expr(&material.quantity, EvalContext::Price, &table, &path);
                    scoped.extend(checked.findings.iter().cloned());
                    require_number(&checked, &path, &mut scoped);
                    if let Some(cond) = &material.applies_when {
                        scoped.extend(type_check_condition(
                            cond,
                            EvalContext::Condition,
                            &table,
                            &format!("{}/materials/{}/appliesWhen", base, i),
                        ));
                    }
                }
                for (i, child) in price.child_items.iter().enumerate() {
                    let path = format!("{}/childItems/{}/quantity", base, i);
                    let checked =
                        type_check_expr(&child.quantity, EvalContext::Price, &table, &path);
                    scoped.extend(checked.findings.iter().cloned());
                    require_number(&checked, &path, &mut scoped);
                    if let Some(cond) = &child.applies_when {
                        scoped.extend(type_check_condition(
                            cond,
                            EvalContext::Condition,
                            &table,
                            &format!("{}/childItems/{}/appliesWhen", base, i),
                        ));
                    }
                }
            }
            NodeBody::Effect(effect) => {
                for (key, expr) in &effect.outputs {
                    let path = format!("{}/outputs/{}", base, key);
                    let checked = type_check_expr(expr, EvalContext::Effect, &table, &path);
                    scoped.extend(checked.findings.iter().cloned());
                }
            }
            NodeBody::Group => {}
        }
        findings.extend(scoped.drain(..).map(|f| f.with_entity(&node.id)));
    }

    for edge in &tree.edges {
        if edge.status != pricetree_core::EntityStatus::Enabled {
            continue;
        }
        if let Some(cond) = &edge.condition {
            let edge_findings = type_check_condition(
                cond,
                EvalContext::Condition,
                &table,
                &format!("/edges/{}/condition", edge.id),
            );
            findings.extend(edge_findings.into_iter().map(|f| f.with_entity(&edge.id)));
        }
    }

    findings
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
