//! Ingest: loosely-shaped tree JSON -> strict internal model.
//!
//! The source system emits duck-typed JSON: nodes and edges arrive as
//! arrays or id-keyed maps, and several fields have historical aliases.
//! This module is the single fallible boundary; everything after it
//! operates on exhaustively matched sum types. Malformed shapes are
//! ingest errors here rather than `unknown`-typed lookups threaded
//! through every algorithm.
//!
//! Unknown node kinds are a hard error: a pricing tree is closed-world,
//! and guessing at an unrecognized kind would change prices silently.

use crate::ast::{ConditionRule, ExpressionSpec};
use crate::finding::{codes, Finding};
use crate::tree::*;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A shape problem found while ingesting tree JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestError {
    pub path: String,
    pub message: String,
}

impl IngestError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        IngestError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Render as the finding the validator reports for unparseable trees.
    pub fn into_finding(self) -> Finding {
        Finding::error(codes::E_INGEST_SHAPE, self.path, self.message)
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ingest error at {}: {}", self.path, self.message)
    }
}

impl std::error::Error for IngestError {}

// ──────────────────────────────────────────────
// Field helpers
// ──────────────────────────────────────────────

/// First present alias wins.
fn field<'a>(obj: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|a| obj.get(*a))
}

fn field_str(obj: &Value, aliases: &[&str]) -> Option<String> {
    field(obj, aliases)
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn required_str(obj: &Value, aliases: &[&str], path: &str) -> Result<String, IngestError> {
    field_str(obj, aliases).ok_or_else(|| {
        IngestError::new(path, format!("missing required string field '{}'", aliases[0]))
    })
}

fn field_bool(obj: &Value, aliases: &[&str]) -> Option<bool> {
    field(obj, aliases).and_then(Value::as_bool)
}

fn field_f64(obj: &Value, aliases: &[&str]) -> Option<f64> {
    field(obj, aliases).and_then(Value::as_f64)
}

/// Accept an array of objects or an id-keyed map of objects. The map
/// key backfills a missing `id` field.
fn entries(value: &Value, path: &str) -> Result<Vec<(Option<String>, Value)>, IngestError> {
    match value {
        Value::Array(items) => Ok(items.iter().map(|v| (None, v.clone())).collect()),
        Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| (Some(k.clone()), v.clone()))
            .collect()),
        _ => Err(IngestError::new(
            path,
            "expected an array or an id-keyed object",
        )),
    }
}

fn parse_status(obj: &Value, path: &str) -> Result<EntityStatus, IngestError> {
    match field_str(obj, &["status"]).as_deref() {
        None | Some("ENABLED") => Ok(EntityStatus::Enabled),
        Some("DISABLED") => Ok(EntityStatus::Disabled),
        Some("DELETED") => Ok(EntityStatus::Deleted),
        Some(other) => Err(IngestError::new(
            format!("{}/status", path),
            format!("unknown status '{}'", other),
        )),
    }
}

fn parse_expression(value: &Value, path: &str) -> Result<ExpressionSpec, IngestError> {
    serde_json::from_value(value.clone())
        .map_err(|e| IngestError::new(path, format!("malformed expression: {}", e)))
}

fn parse_condition(value: &Value, path: &str) -> Result<ConditionRule, IngestError> {
    serde_json::from_value(value.clone())
        .map_err(|e| IngestError::new(path, format!("malformed condition: {}", e)))
}

fn opt_condition(obj: &Value, aliases: &[&str], path: &str) -> Result<Option<ConditionRule>, IngestError> {
    match field(obj, aliases) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_condition(v, path).map(Some),
    }
}

fn opt_expression(obj: &Value, aliases: &[&str], path: &str) -> Result<Option<ExpressionSpec>, IngestError> {
    match field(obj, aliases) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_expression(v, path).map(Some),
    }
}

// ──────────────────────────────────────────────
// Tree ingest
// ──────────────────────────────────────────────

/// Parse a tree snapshot from loosely-shaped JSON.
pub fn ingest_tree(raw: &Value) -> Result<Tree, IngestError> {
    if !raw.is_object() {
        return Err(IngestError::new("/", "tree snapshot must be a JSON object"));
    }

    let version_id = required_str(raw, &["versionId", "version_id", "id"], "/versionId")?;

    let status = match field_str(raw, &["status"]).as_deref() {
        None | Some("DRAFT") => TreeStatus::Draft,
        Some("ACTIVE") => TreeStatus::Active,
        Some("ARCHIVED") => TreeStatus::Archived,
        Some(other) => {
            return Err(IngestError::new(
                "/status",
                format!("unknown tree status '{}'", other),
            ));
        }
    };

    let root_node_ids = match field(raw, &["rootNodeIds", "root_node_ids", "roots"]) {
        None => Vec::new(),
        Some(Value::Array(items)) => {
            let mut roots = Vec::new();
            for (i, item) in items.iter().enumerate() {
                roots.push(
                    item.as_str()
                        .map(str::to_owned)
                        .ok_or_else(|| {
                            IngestError::new(
                                format!("/rootNodeIds/{}", i),
                                "root ids must be strings",
                            )
                        })?,
                );
            }
            roots
        }
        Some(_) => {
            return Err(IngestError::new(
                "/rootNodeIds",
                "expected an array of node ids",
            ));
        }
    };

    let mut nodes = Vec::new();
    if let Some(raw_nodes) = field(raw, &["nodes"]) {
        for (map_key, raw_node) in entries(raw_nodes, "/nodes")? {
            nodes.push(ingest_node(&raw_node, map_key)?);
        }
    }

    let mut edges = Vec::new();
    if let Some(raw_edges) = field(raw, &["edges"]) {
        for (map_key, raw_edge) in entries(raw_edges, "/edges")? {
            edges.push(ingest_edge(&raw_edge, map_key)?);
        }
    }

    let meta = match field(raw, &["meta"]) {
        None | Some(Value::Null) => TreeMeta::default(),
        Some(m) => ingest_meta(m)?,
    };

    Ok(Tree {
        version_id,
        status,
        root_node_ids,
        nodes,
        edges,
        meta,
    })
}

// ──────────────────────────────────────────────
// Nodes
// ──────────────────────────────────────────────

fn ingest_node(raw: &Value, map_key: Option<String>) -> Result<Node, IngestError> {
    let id = field_str(raw, &["id"])
        .or(map_key)
        .ok_or_else(|| IngestError::new("/nodes", "node is missing an id"))?;
    let path = format!("/nodes/{}", id);

    let kind = required_str(raw, &["kind", "type"], &path)?;
    let status = parse_status(raw, &path)?;
    let key = field_str(raw, &["key", "nodeKey"]);

    let body = match kind.as_str() {
        "INPUT" => NodeBody::Input(ingest_input(raw, &path)?),
        "COMPUTE" => NodeBody::Compute(ingest_compute(raw, &path)?),
        "PRICE" => NodeBody::Price(ingest_price(raw, &path)?),
        "EFFECT" => NodeBody::Effect(ingest_effect(raw, &path)?),
        "GROUP" => NodeBody::Group,
        other => {
            return Err(IngestError::new(
                format!("{}/kind", path),
                format!("unknown node kind '{}'", other),
            ));
        }
    };

    Ok(Node {
        id,
        key,
        status,
        body,
    })
}

fn ingest_input(raw: &Value, path: &str) -> Result<InputSpec, IngestError> {
    let selection_key = field_str(raw, &["selectionKey", "selection_key", "key"]);
    let value_type = field_str(raw, &["valueType", "value_type", "inputType"])
        .unwrap_or_else(|| "TEXT".to_string());
    let default = field(raw, &["default", "defaultValue"])
        .filter(|v| !v.is_null())
        .cloned();
    let required = field_bool(raw, &["required"]).unwrap_or(false);

    let constraints = field(raw, &["constraints"]).map(|c| Constraints {
        min: field_f64(c, &["min"]),
        max: field_f64(c, &["max"]),
    });

    let mut options = Vec::new();
    if let Some(Value::Array(raw_options)) = field(raw, &["options", "choices"]) {
        for (i, raw_option) in raw_options.iter().enumerate() {
            let option_path = format!("{}/options/{}", path, i);
            let value = required_str(raw_option, &["value"], &option_path)?;
            let label = field_str(raw_option, &["label"]);
            let mut params = BTreeMap::new();
            if let Some(Value::Object(raw_params)) = field(raw_option, &["params", "meta"]) {
                for (k, v) in raw_params {
                    params.insert(k.clone(), v.clone());
                }
            }
            options.push(OptionChoice {
                value,
                label,
                params,
            });
        }
    }

    Ok(InputSpec {
        selection_key,
        value_type,
        default,
        required,
        constraints,
        options,
    })
}

fn ingest_compute(raw: &Value, path: &str) -> Result<ComputeSpec, IngestError> {
    let mut outputs = Vec::new();
    match field(raw, &["outputs"]) {
        Some(Value::Array(raw_outputs)) => {
            for (i, raw_output) in raw_outputs.iter().enumerate() {
                let output_path = format!("{}/outputs/{}", path, i);
                outputs.push(ComputeOutput {
                    key: required_str(raw_output, &["key", "outputKey"], &output_path)?,
                    value_type: field_str(raw_output, &["valueType", "value_type"])
                        .unwrap_or_else(|| "NUMBER".to_string()),
                    expression: parse_expression(
                        field(raw_output, &["expression", "expr"]).ok_or_else(|| {
                            IngestError::new(&output_path, "compute output needs an expression")
                        })?,
                        &format!("{}/expression", output_path),
                    )?,
                });
            }
        }
        // Single-output shorthand used by older snapshots.
        None => {
            if let Some(expr) = field(raw, &["expression", "expr"]) {
                outputs.push(ComputeOutput {
                    key: required_str(raw, &["outputKey", "output_key"], path)?,
                    value_type: field_str(raw, &["valueType", "value_type"])
                        .unwrap_or_else(|| "NUMBER".to_string()),
                    expression: parse_expression(expr, &format!("{}/expression", path))?,
                });
            }
        }
        Some(_) => {
            return Err(IngestError::new(
                format!("{}/outputs", path),
                "expected an array of outputs",
            ));
        }
    }
    Ok(ComputeSpec { outputs })
}

fn ingest_price(raw: &Value, path: &str) -> Result<PriceSpec, IngestError> {
    let mut spec = PriceSpec::default();

    if let Some(Value::Array(raw_components)) = field(raw, &["components", "priceComponents"]) {
        for (i, raw_component) in raw_components.iter().enumerate() {
            let component_path = format!("{}/components/{}", path, i);
            spec.components
                .push(ingest_component(raw_component, &component_path)?);
        }
    }

    if let Some(Value::Array(raw_materials)) = field(raw, &["materials", "materialEffects"]) {
        for (i, raw_material) in raw_materials.iter().enumerate() {
            let material_path = format!("{}/materials/{}", path, i);
            spec.materials.push(MaterialEffectSpec {
                material_key: required_str(raw_material, &["materialKey", "material_key"], &material_path)?,
                quantity: parse_expression(
                    field(raw_material, &["quantity", "qty"]).ok_or_else(|| {
                        IngestError::new(&material_path, "material effect needs a quantity")
                    })?,
                    &format!("{}/quantity", material_path),
                )?,
                unit: field_str(raw_material, &["unit"]),
                applies_when: opt_condition(
                    raw_material,
                    &["appliesWhen", "applies_when", "condition"],
                    &format!("{}/appliesWhen", material_path),
                )?,
            });
        }
    }

    if let Some(Value::Array(raw_children)) = field(raw, &["childItems", "child_items"]) {
        for (i, raw_child) in raw_children.iter().enumerate() {
            let child_path = format!("{}/childItems/{}", path, i);
            spec.child_items.push(ChildItemSpec {
                product_key: required_str(raw_child, &["productKey", "product_key"], &child_path)?,
                quantity: parse_expression(
                    field(raw_child, &["quantity", "qty"]).ok_or_else(|| {
                        IngestError::new(&child_path, "child item needs a quantity")
                    })?,
                    &format!("{}/quantity", child_path),
                )?,
                applies_when: opt_condition(
                    raw_child,
                    &["appliesWhen", "applies_when", "condition"],
                    &format!("{}/appliesWhen", child_path),
                )?,
            });
        }
    }

    Ok(spec)
}

fn ingest_component(raw: &Value, path: &str) -> Result<PriceComponent, IngestError> {
    let kind = match required_str(raw, &["kind", "type"], path)?.as_str() {
        "FLAT" => ComponentKind::Flat,
        "PER_UNIT" => ComponentKind::PerUnit,
        "PER_OVERAGE" => ComponentKind::PerOverage,
        "TIERED" => ComponentKind::Tiered,
        other => {
            return Err(IngestError::new(
                format!("{}/kind", path),
                format!("unknown component kind '{}'", other),
            ));
        }
    };

    // A bare number is shorthand for a constant cents expression.
    let unit_price = match field(raw, &["unitPriceCents", "unitPrice", "unit_price_cents"]) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(ExpressionSpec::number(n.as_f64().unwrap_or(0.0))),
        Some(v) => Some(parse_expression(v, &format!("{}/unitPriceCents", path))?),
    };
    let quantity = match field(raw, &["quantity", "qty"]) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(ExpressionSpec::number(n.as_f64().unwrap_or(0.0))),
        Some(v) => Some(parse_expression(v, &format!("{}/quantity", path))?),
    };
    let overage_base = match field(raw, &["overageBase", "overage_base"]) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(ExpressionSpec::number(n.as_f64().unwrap_or(0.0))),
        Some(v) => Some(parse_expression(v, &format!("{}/overageBase", path))?),
    };

    Ok(PriceComponent {
        kind,
        label: field_str(raw, &["label", "name"]).unwrap_or_default(),
        unit_price,
        quantity,
        overage_base,
        applies_when: opt_condition(
            raw,
            &["appliesWhen", "applies_when", "condition"],
            &format!("{}/appliesWhen", path),
        )?,
        discount: match field(raw, &["discount"]) {
            None | Some(Value::Null) => None,
            Some(d) => Some(ingest_discount(d, &format!("{}/discount", path))?),
        },
    })
}

fn ingest_discount(raw: &Value, path: &str) -> Result<DiscountConfig, IngestError> {
    // Scope arrives either as flags or as a list of scope names.
    let (customer_tier_scope, volume_scope) = match field(raw, &["scope"]) {
        Some(Value::Array(items)) => {
            let names: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            (names.contains(&"customerTier"), names.contains(&"volume"))
        }
        Some(obj) if obj.is_object() => (
            field_bool(obj, &["customerTier", "customer_tier"]).unwrap_or(false),
            field_bool(obj, &["volume"]).unwrap_or(false),
        ),
        _ => (false, false),
    };

    let method = match required_str(raw, &["method"], path)?.as_str() {
        "PERCENT" => DiscountMethod::Percent,
        "CENTS_OFF" => DiscountMethod::CentsOff,
        "OVERRIDE" => DiscountMethod::Override,
        other => {
            return Err(IngestError::new(
                format!("{}/method", path),
                format!("unknown discount method '{}'", other),
            ));
        }
    };

    let mut tier_rates = BTreeMap::new();
    if let Some(Value::Object(raw_rates)) = field(raw, &["tierRates", "tier_rates"]) {
        for (tier, rate) in raw_rates {
            let rate = rate.as_f64().ok_or_else(|| {
                IngestError::new(
                    format!("{}/tierRates/{}", path, tier),
                    "tier rate must be a number",
                )
            })?;
            tier_rates.insert(tier.clone(), rate);
        }
    }

    let mut volume_tiers = Vec::new();
    if let Some(Value::Array(raw_tiers)) = field(raw, &["volumeTiers", "volume_tiers"]) {
        for (i, raw_tier) in raw_tiers.iter().enumerate() {
            let tier_path = format!("{}/volumeTiers/{}", path, i);
            volume_tiers.push(VolumeTier {
                min_qty: field_f64(raw_tier, &["minQty", "min_qty"]).ok_or_else(|| {
                    IngestError::new(&tier_path, "volume tier needs a numeric minQty")
                })?,
                customer_tier: field_str(raw_tier, &["customerTier", "customer_tier"]),
                rate: field_f64(raw_tier, &["rate"]).ok_or_else(|| {
                    IngestError::new(&tier_path, "volume tier needs a numeric rate")
                })?,
            });
        }
    }

    let trigger = match field_str(raw, &["trigger"]).as_deref() {
        None | Some("COMPONENT_QTY") => VolumeTrigger::ComponentQty,
        Some("PRODUCT_QTY") => VolumeTrigger::ProductQty,
        Some(other) => {
            return Err(IngestError::new(
                format!("{}/trigger", path),
                format!("unknown volume trigger '{}'", other),
            ));
        }
    };

    Ok(DiscountConfig {
        customer_tier_scope,
        volume_scope,
        method,
        tier_rates,
        volume_tiers,
        trigger,
    })
}

fn ingest_effect(raw: &Value, path: &str) -> Result<EffectSpec, IngestError> {
    let mut outputs = BTreeMap::new();
    if let Some(Value::Object(raw_outputs)) = field(raw, &["outputs"]) {
        for (name, raw_expr) in raw_outputs {
            outputs.insert(
                name.clone(),
                parse_expression(raw_expr, &format!("{}/outputs/{}", path, name))?,
            );
        }
    }
    Ok(EffectSpec { outputs })
}

// ──────────────────────────────────────────────
// Edges and meta
// ──────────────────────────────────────────────

fn ingest_edge(raw: &Value, map_key: Option<String>) -> Result<Edge, IngestError> {
    let id = field_str(raw, &["id"])
        .or(map_key)
        .ok_or_else(|| IngestError::new("/edges", "edge is missing an id"))?;
    let path = format!("/edges/{}", id);

    let priority = match field(raw, &["priority"]) {
        None => 0,
        Some(v) => v.as_i64().ok_or_else(|| {
            IngestError::new(
                format!("{}/priority", path),
                "priority must be an integer",
            )
        })?,
    };

    Ok(Edge {
        id: id.clone(),
        from_node_id: required_str(raw, &["fromNodeId", "from_node_id", "from"], &path)?,
        to_node_id: required_str(raw, &["toNodeId", "to_node_id", "to"], &path)?,
        priority,
        condition: opt_condition(raw, &["condition"], &format!("{}/condition", path))?,
        status: parse_status(raw, &path)?,
    })
}

fn ingest_meta(raw: &Value) -> Result<TreeMeta, IngestError> {
    let pricing = match field(raw, &["pricingV2", "pricing_v2", "pricing"]) {
        None | Some(Value::Null) => None,
        Some(p) => {
            let mut base = BasePricing {
                minimum_cents: field(p, &["minimumCents", "minimum_cents"])
                    .and_then(Value::as_i64)
                    .unwrap_or(0),
                ..BasePricing::default()
            };
            if let Some(Value::Array(raw_tiers)) = field(p, &["qtyTiers", "qty_tiers"]) {
                for (i, raw_tier) in raw_tiers.iter().enumerate() {
                    let tier_path = format!("/meta/pricingV2/qtyTiers/{}", i);
                    base.qty_tiers.push(QtyTier {
                        min_qty: field_f64(raw_tier, &["minQty", "min_qty"])
                            .ok_or_else(|| IngestError::new(&tier_path, "needs numeric minQty"))?,
                        unit_cents: field(raw_tier, &["unitCents", "unit_cents"])
                            .and_then(Value::as_i64)
                            .ok_or_else(|| {
                                IngestError::new(&tier_path, "needs integer unitCents")
                            })?,
                    });
                }
            }
            if let Some(Value::Array(raw_tiers)) = field(p, &["sqftTiers", "sqft_tiers"]) {
                for (i, raw_tier) in raw_tiers.iter().enumerate() {
                    let tier_path = format!("/meta/pricingV2/sqftTiers/{}", i);
                    base.sqft_tiers.push(SqftTier {
                        min_sqft: field_f64(raw_tier, &["minSqft", "min_sqft"])
                            .ok_or_else(|| IngestError::new(&tier_path, "needs numeric minSqft"))?,
                        cents_per_sqft: field(raw_tier, &["centsPerSqft", "cents_per_sqft"])
                            .and_then(Value::as_i64)
                            .ok_or_else(|| {
                                IngestError::new(&tier_path, "needs integer centsPerSqft")
                            })?,
                    });
                }
            }
            Some(base)
        }
    };

    Ok(TreeMeta {
        pricing,
        base_weight_lbs: field_f64(raw, &["baseWeightLbs", "base_weight_lbs", "baseWeight"]),
    })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
