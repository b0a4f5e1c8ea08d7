//! Symbol table builder.
//!
//! One scan over the tree's ENABLED nodes produces the lookup later
//! passes read: selection keys with their declared types and
//! constraints, and COMPUTE nodes with their declared outputs. Gaps
//! (missing selection key, unknown value type) are recorded as findings
//! and the offending symbol is omitted, so the rest of validation can
//! proceed and report further issues in the same pass.

use crate::ast::ScalarType;
use crate::contract::EnvKeys;
use crate::finding::{codes, Finding};
use crate::tree::{Constraints, EntityStatus, NodeBody, OptionChoice, Tree};
use std::collections::BTreeMap;

/// Declared shape of one INPUT selection key.
#[derive(Debug, Clone)]
pub struct InputSymbol<'a> {
    pub node_id: &'a str,
    /// Base scalar type; ENUM inputs are TEXT-based with options.
    pub declared: ScalarType,
    pub is_enum: bool,
    pub has_default: bool,
    pub default: Option<&'a serde_json::Value>,
    pub required: bool,
    pub constraints: Option<Constraints>,
    pub options: &'a [OptionChoice],
}

/// Declared output of one COMPUTE node.
#[derive(Debug, Clone)]
pub struct ComputeSymbol<'a> {
    pub node_id: &'a str,
    pub output_key: &'a str,
    pub declared: ScalarType,
    pub expression: &'a crate::ast::ExpressionSpec,
}

/// Lookup produced by [`build_symbols`].
#[derive(Debug)]
pub struct SymbolTable<'a> {
    /// Node id -> kind name, for ref-target diagnostics.
    pub node_kinds: BTreeMap<&'a str, &'static str>,
    /// Selection key -> input declaration.
    pub inputs: BTreeMap<&'a str, InputSymbol<'a>>,
    /// COMPUTE node id -> output declaration.
    pub computes: BTreeMap<&'a str, ComputeSymbol<'a>>,
    pub env_keys: &'a EnvKeys,
}

/// Parse a declared value-type string. ENUM maps to a TEXT base with
/// the enum flag set.
fn parse_value_type(raw: &str) -> Option<(ScalarType, bool)> {
    match raw {
        "ENUM" => Some((ScalarType::Text, true)),
        other => match ScalarType::parse(other) {
            Some(ScalarType::Null) | None => None,
            Some(t) => Some((t, false)),
        },
    }
}

/// Scan the tree and build the symbol table.
///
/// Returns the table together with the findings raised for skipped
/// symbols; the table itself is always usable.
pub fn build_symbols<'a>(
    tree: &'a Tree,
    env_keys: &'a EnvKeys,
) -> (SymbolTable<'a>, Vec<Finding>) {
    let mut findings = Vec::new();
    let mut table = SymbolTable {
        node_kinds: BTreeMap::new(),
        inputs: BTreeMap::new(),
        computes: BTreeMap::new(),
        env_keys,
    };

    for node in &tree.nodes {
        table.node_kinds.insert(&node.id, node.body.kind_name());
        if node.status != EntityStatus::Enabled {
            continue;
        }
        match &node.body {
            NodeBody::Input(input) => {
                let path = format!("/nodes/{}", node.id);
                let selection_key = match input.selection_key.as_deref() {
                    Some(k) if !k.is_empty() => k,
                    _ => {
                        findings.push(
                            Finding::warning(
                                codes::W_INPUT_KEY_MISSING,
                                path,
                                "INPUT node has no resolvable selection key and is excluded \
                                 from the symbol table",
                            )
                            .with_entity(&node.id),
                        );
                        continue;
                    }
                };
                let (declared, is_enum) = match parse_value_type(&input.value_type) {
                    Some(parsed) => parsed,
                    None => {
                        findings.push(
                            Finding::error(
                                codes::E_INPUT_TYPE_UNKNOWN,
                                format!("{}/valueType", path),
                                format!(
                                    "INPUT '{}' declares unrecognized value type '{}'",
                                    selection_key, input.value_type
                                ),
                            )
                            .with_entity(&node.id),
                        );
                        continue;
                    }
                };
                // First declaration wins; duplicate selection keys are a
                // structural finding, not a symbol-table concern.
                table.inputs.entry(selection_key).or_insert(InputSymbol {
                    node_id: &node.id,
                    declared,
                    is_enum,
                    has_default: input.default.is_some(),
                    default: input.default.as_ref(),
                    required: input.required,
                    constraints: input.constraints,
                    options: &input.options,
                });
            }
            NodeBody::Compute(compute) => {
                let path = format!("/nodes/{}/outputs", node.id);
                if compute.outputs.len() != 1 {
                    findings.push(
                        Finding::error(
                            codes::E_COMPUTE_OUTPUT_ARITY,
                            path,
                            format!(
                                "COMPUTE node must declare exactly one output, found {}",
                                compute.outputs.len()
                            ),
                        )
                        .with_entity(&node.id),
                    );
                    continue;
                }
                let output = &compute.outputs[0];
                let declared = match parse_value_type(&output.value_type) {
                    Some((t, false)) => t,
                    _ => {
                        findings.push(
                            Finding::error(
                                codes::E_OUTPUT_TYPE_UNKNOWN,
                                format!("{}/0/valueType", path),
                                format!(
                                    "COMPUTE output '{}' declares unrecognized value type '{}'",
                                    output.key, output.value_type
                                ),
                            )
                            .with_entity(&node.id),
                        );
                        continue;
                    }
                };
                table.computes.insert(
                    &node.id,
                    ComputeSymbol {
                        node_id: &node.id,
                        output_key: &output.key,
                        declared,
                        expression: &output.expression,
                    },
                );
            }
            NodeBody::Price(_) | NodeBody::Effect(_) | NodeBody::Group => {}
        }
    }

    (table, findings)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
