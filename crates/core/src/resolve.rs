//! Ref resolver: checks a single reference against the symbol table and
//! the context-legality contract.
//!
//! Resolution failures are structured findings with distinct codes per
//! failure shape, so the editor can highlight the exact ref and phrase
//! the problem precisely.

use crate::ast::{Ref, ScalarType};
use crate::contract::{constant_value_to_type, ref_legal_in_context, EvalContext};
use crate::finding::{codes, Finding};
use crate::symbols::SymbolTable;

/// Resolve one ref in the given context. An empty result means the ref
/// is legal and resolvable.
pub fn resolve(r: &Ref, ctx: EvalContext, table: &SymbolTable<'_>, path: &str) -> Vec<Finding> {
    // Context legality first; a pricebook ref out of place gets its own
    // code to aid UI messaging.
    if !ref_legal_in_context(r, ctx) {
        let code = match r {
            Ref::PricebookRef { .. } => codes::E_REF_PRICEBOOK_CONTEXT,
            _ => codes::E_REF_CONTEXT,
        };
        return vec![Finding::error(
            code,
            path,
            format!(
                "{} is not legal in {} context",
                r.kind_name(),
                ctx.as_str()
            ),
        )];
    }

    match r {
        Ref::Constant { value } => {
            if constant_value_to_type(value) == ScalarType::Json {
                vec![Finding::error(
                    codes::E_REF_CONSTANT_SCALAR,
                    path,
                    "constant must be a scalar; object/array constants are not legal here",
                )]
            } else {
                Vec::new()
            }
        }

        Ref::SelectionRef { selection_key } | Ref::EffectiveRef { selection_key } => {
            if table.inputs.contains_key(selection_key.as_str()) {
                Vec::new()
            } else {
                vec![Finding::error(
                    codes::E_REF_UNRESOLVED,
                    path,
                    format!("selection key '{}' is not declared by any INPUT", selection_key),
                )]
            }
        }

        Ref::NodeOutputRef {
            node_id,
            output_key,
        } => resolve_node_output(node_id, output_key, table, path),

        Ref::EnvRef { key } => {
            if table.env_keys.contains(key) {
                Vec::new()
            } else {
                vec![Finding::error(
                    codes::E_REF_ENV_KEY,
                    path,
                    format!("'{}' is not a recognized environment key", key),
                )]
            }
        }

        // Legality already established; the pricebook itself is an
        // evaluation-time collaborator, not a symbol.
        Ref::PricebookRef { .. } => Vec::new(),

        Ref::OptionParamRef {
            selection_key,
            param,
        } => resolve_option_param(selection_key, param, None, table, path),

        Ref::OptionParamOfRef {
            selection_key,
            option_value,
            param,
        } => resolve_option_param(selection_key, param, Some(option_value), table, path),
    }
}

fn resolve_node_output(
    node_id: &str,
    output_key: &str,
    table: &SymbolTable<'_>,
    path: &str,
) -> Vec<Finding> {
    let kind = match table.node_kinds.get(node_id) {
        Some(k) => *k,
        None => {
            return vec![Finding::error(
                codes::E_REF_UNRESOLVED,
                path,
                format!("nodeOutputRef targets unknown node '{}'", node_id),
            )
            .with_entity(node_id)];
        }
    };
    if kind != "COMPUTE" {
        // GROUP and EFFECT targets are named explicitly; they are the
        // mistakes editors actually make.
        let message = match kind {
            "GROUP" => format!(
                "nodeOutputRef may not target GROUP node '{}'; groups are editor-only",
                node_id
            ),
            "EFFECT" => format!(
                "nodeOutputRef may not target EFFECT node '{}'; effect outputs are not readable",
                node_id
            ),
            other => format!(
                "nodeOutputRef must target a COMPUTE node; '{}' is {}",
                node_id, other
            ),
        };
        return vec![Finding::error(codes::E_REF_TARGET_KIND, path, message).with_entity(node_id)];
    }
    match table.computes.get(node_id) {
        Some(sym) if sym.output_key == output_key => Vec::new(),
        Some(sym) => vec![Finding::error(
            codes::E_REF_OUTPUT_KEY,
            path,
            format!(
                "COMPUTE node '{}' declares output '{}', not '{}'",
                node_id, sym.output_key, output_key
            ),
        )
        .with_entity(node_id)],
        // The node is COMPUTE but produced no symbol (disabled or bad
        // declaration); report unresolved rather than type-checking it.
        None => vec![Finding::error(
            codes::E_REF_UNRESOLVED,
            path,
            format!("COMPUTE node '{}' has no resolvable output", node_id),
        )
        .with_entity(node_id)],
    }
}

fn resolve_option_param(
    selection_key: &str,
    param: &str,
    option_value: Option<&str>,
    table: &SymbolTable<'_>,
    path: &str,
) -> Vec<Finding> {
    let sym = match table.inputs.get(selection_key) {
        Some(s) => s,
        None => {
            return vec![Finding::error(
                codes::E_REF_UNRESOLVED,
                path,
                format!("selection key '{}' is not declared by any INPUT", selection_key),
            )];
        }
    };
    if !sym.is_enum {
        return vec![Finding::error(
            codes::E_REF_OPTION_PARAM,
            path,
            format!(
                "option-param ref requires an ENUM input; '{}' is {}",
                selection_key,
                sym.declared.as_str()
            ),
        )];
    }
    if let Some(value) = option_value {
        if !sym.options.iter().any(|o| o.value == value) {
            return vec![Finding::error(
                codes::E_REF_OPTION_PARAM,
                path,
                format!(
                    "ENUM input '{}' declares no option '{}'",
                    selection_key, value
                ),
            )];
        }
    }
    if !sym.options.iter().any(|o| o.params.contains_key(param)) {
        return vec![Finding::error(
            codes::E_REF_OPTION_PARAM,
            path,
            format!(
                "no option of ENUM input '{}' declares parameter '{}'",
                selection_key, param
            ),
        )];
    }
    Vec::new()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExpressionSpec;
    use crate::contract::EnvKeys;
    use crate::symbols::build_symbols;
    use crate::tree::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn fixture_tree() -> Tree {
        let mut params = BTreeMap::new();
        params.insert("centsPerSqft".to_string(), json!(90));
        Tree {
            version_id: "tv1".to_string(),
            status: TreeStatus::Draft,
            root_node_ids: Vec::new(),
            nodes: vec![
                Node {
                    id: "i1".to_string(),
                    key: Some("width".to_string()),
                    status: EntityStatus::Enabled,
                    body: NodeBody::Input(InputSpec {
                        selection_key: Some("width".to_string()),
                        value_type: "NUMBER".to_string(),
                        default: None,
                        required: false,
                        constraints: None,
                        options: Vec::new(),
                    }),
                },
                Node {
                    id: "i2".to_string(),
                    key: Some("material".to_string()),
                    status: EntityStatus::Enabled,
                    body: NodeBody::Input(InputSpec {
                        selection_key: Some("material".to_string()),
                        value_type: "ENUM".to_string(),
                        default: Some(json!("13oz")),
                        required: true,
                        constraints: None,
                        options: vec![OptionChoice {
                            value: "13oz".to_string(),
                            label: None,
                            params,
                        }],
                    }),
                },
                Node {
                    id: "c1".to_string(),
                    key: None,
                    status: EntityStatus::Enabled,
                    body: NodeBody::Compute(ComputeSpec {
                        outputs: vec![ComputeOutput {
                            key: "area".to_string(),
                            value_type: "NUMBER".to_string(),
                            expression: ExpressionSpec::number(0.0),
                        }],
                    }),
                },
                Node {
                    id: "g1".to_string(),
                    key: None,
                    status: EntityStatus::Enabled,
                    body: NodeBody::Group,
                },
            ],
            edges: Vec::new(),
            meta: TreeMeta::default(),
        }
    }

    fn check(r: &Ref, ctx: EvalContext) -> Vec<Finding> {
        let env = EnvKeys::default();
        let tree = fixture_tree();
        let (table, _) = build_symbols(&tree, &env);
        resolve(r, ctx, &table, "/nodes/x/expression")
    }

    #[test]
    fn resolves_known_selection() {
        let r = Ref::EffectiveRef {
            selection_key: "width".to_string(),
        };
        assert!(check(&r, EvalContext::Compute).is_empty());
    }

    #[test]
    fn unknown_selection_is_unresolved() {
        let r = Ref::SelectionRef {
            selection_key: "missing".to_string(),
        };
        let findings = check(&r, EvalContext::Compute);
        assert_eq!(findings[0].code, codes::E_REF_UNRESOLVED);
    }

    #[test]
    fn pricebook_context_violation_distinctly_coded() {
        let r = Ref::PricebookRef {
            item_key: "grommet".to_string(),
        };
        let findings = check(&r, EvalContext::Compute);
        assert_eq!(findings[0].code, codes::E_REF_PRICEBOOK_CONTEXT);
        assert!(check(&r, EvalContext::Price).is_empty());
    }

    #[test]
    fn node_output_ref_requires_compute_target() {
        let to_group = Ref::NodeOutputRef {
            node_id: "g1".to_string(),
            output_key: "x".to_string(),
        };
        let findings = check(&to_group, EvalContext::Compute);
        assert_eq!(findings[0].code, codes::E_REF_TARGET_KIND);
        assert!(findings[0].message.contains("GROUP"));

        let wrong_key = Ref::NodeOutputRef {
            node_id: "c1".to_string(),
            output_key: "volume".to_string(),
        };
        let findings = check(&wrong_key, EvalContext::Compute);
        assert_eq!(findings[0].code, codes::E_REF_OUTPUT_KEY);

        let ok = Ref::NodeOutputRef {
            node_id: "c1".to_string(),
            output_key: "area".to_string(),
        };
        assert!(check(&ok, EvalContext::Compute).is_empty());
    }

    #[test]
    fn env_ref_checked_against_allowlist() {
        let ok = Ref::EnvRef {
            key: "sqft".to_string(),
        };
        assert!(check(&ok, EvalContext::Condition).is_empty());
        let bad = Ref::EnvRef {
            key: "weightLbs".to_string(),
        };
        assert_eq!(
            check(&bad, EvalContext::Condition)[0].code,
            codes::E_REF_ENV_KEY
        );
    }

    #[test]
    fn json_constant_rejected_where_scalars_required() {
        let r = Ref::Constant {
            value: json!({"a": 1}),
        };
        assert_eq!(
            check(&r, EvalContext::Compute)[0].code,
            codes::E_REF_CONSTANT_SCALAR
        );
    }

    #[test]
    fn option_param_needs_enum_and_declared_param() {
        let ok = Ref::OptionParamRef {
            selection_key: "material".to_string(),
            param: "centsPerSqft".to_string(),
        };
        assert!(check(&ok, EvalContext::Price).is_empty());

        let not_enum = Ref::OptionParamRef {
            selection_key: "width".to_string(),
            param: "centsPerSqft".to_string(),
        };
        assert_eq!(
            check(&not_enum, EvalContext::Price)[0].code,
            codes::E_REF_OPTION_PARAM
        );

        let missing_option = Ref::OptionParamOfRef {
            selection_key: "material".to_string(),
            option_value: "18oz".to_string(),
            param: "centsPerSqft".to_string(),
        };
        assert_eq!(
            check(&missing_option, EvalContext::Price)[0].code,
            codes::E_REF_OPTION_PARAM
        );
    }

    #[test]
    fn input_context_rejects_non_constants() {
        let r = Ref::SelectionRef {
            selection_key: "width".to_string(),
        };
        assert_eq!(check(&r, EvalContext::Input)[0].code, codes::E_REF_CONTEXT);
    }
}
