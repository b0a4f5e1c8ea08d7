//! The strict internal tree model.
//!
//! Produced by [`crate::ingest`] from loosely-shaped JSON; every
//! algorithm downstream of ingest matches exhaustively over these sum
//! types and never touches raw JSON lookups again.

use crate::ast::{ConditionRule, ExpressionSpec};
use serde::Serialize;
use std::collections::BTreeMap;

// ──────────────────────────────────────────────
// Lifecycle statuses
// ──────────────────────────────────────────────

/// Tree version lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TreeStatus {
    Draft,
    Active,
    Archived,
}

/// Node/edge lifecycle within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityStatus {
    Enabled,
    Disabled,
    Deleted,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Enabled => "ENABLED",
            EntityStatus::Disabled => "DISABLED",
            EntityStatus::Deleted => "DELETED",
        }
    }
}

// ──────────────────────────────────────────────
// Inputs
// ──────────────────────────────────────────────

/// Numeric range constraints on an INPUT node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Constraints {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// One declared choice of an ENUM input, with arbitrary parameter
/// metadata that option-param refs index into.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionChoice {
    pub value: String,
    pub label: Option<String>,
    pub params: BTreeMap<String, serde_json::Value>,
}

/// INPUT node payload. `selection_key` may be absent in malformed
/// drafts; the symbol-table builder skips such inputs and reports a
/// separate finding rather than failing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSpec {
    pub selection_key: Option<String>,
    /// Declared value type as ingested: NUMBER, BOOLEAN, TEXT, JSON, or
    /// ENUM. Unrecognized strings survive to symbol-build time, where
    /// they raise a finding and exclude the symbol.
    pub value_type: String,
    pub default: Option<serde_json::Value>,
    pub required: bool,
    pub constraints: Option<Constraints>,
    pub options: Vec<OptionChoice>,
}

impl InputSpec {
    pub fn option(&self, value: &str) -> Option<&OptionChoice> {
        self.options.iter().find(|o| o.value == value)
    }
}

// ──────────────────────────────────────────────
// Compute / Price / Effect payloads
// ──────────────────────────────────────────────

/// One declared output of a COMPUTE node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputeOutput {
    pub key: String,
    pub value_type: String,
    pub expression: ExpressionSpec,
}

/// COMPUTE node payload. Multi-output is representable here but
/// enforced to arity 1 at symbol-build time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputeSpec {
    pub outputs: Vec<ComputeOutput>,
}

/// Pricing kind of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentKind {
    Flat,
    PerUnit,
    PerOverage,
    /// Representable but not priced at runtime; skipped, never guessed.
    Tiered,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Flat => "FLAT",
            ComponentKind::PerUnit => "PER_UNIT",
            ComponentKind::PerOverage => "PER_OVERAGE",
            ComponentKind::Tiered => "TIERED",
        }
    }
}

/// Which quantity triggers volume-discount tier selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolumeTrigger {
    ComponentQty,
    ProductQty,
}

/// Per-method adjustment semantics for discounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountMethod {
    /// Rate is a percentage off, clamped to [0, 100].
    Percent,
    /// Rate is cents off the unit price; never drives it below zero.
    CentsOff,
    /// Rate replaces the unit price outright.
    Override,
}

/// One volume tier. A tier with no `customer_tier` is eligible for any
/// pricing context; a tier with one is eligible only when it matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeTier {
    pub min_qty: f64,
    pub customer_tier: Option<String>,
    pub rate: f64,
}

/// Discount configuration on a price component. Application order is
/// fixed: customer tier first, then volume, each on the running unit
/// price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscountConfig {
    pub customer_tier_scope: bool,
    pub volume_scope: bool,
    pub method: DiscountMethod,
    /// customerTier name -> method-specific rate.
    pub tier_rates: BTreeMap<String, f64>,
    pub volume_tiers: Vec<VolumeTier>,
    pub trigger: VolumeTrigger,
}

/// One price component of a PRICE node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceComponent {
    pub kind: ComponentKind,
    pub label: String,
    /// Unit price in cents (NUMBER-typed expression).
    pub unit_price: Option<ExpressionSpec>,
    /// Quantity (NUMBER-typed expression); unused for FLAT.
    pub quantity: Option<ExpressionSpec>,
    /// Overage threshold for PER_OVERAGE.
    pub overage_base: Option<ExpressionSpec>,
    pub applies_when: Option<ConditionRule>,
    pub discount: Option<DiscountConfig>,
}

/// Material-consumption effect declared on a PRICE node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialEffectSpec {
    pub material_key: String,
    pub quantity: ExpressionSpec,
    pub unit: Option<String>,
    pub applies_when: Option<ConditionRule>,
}

/// Child-item proposal declared on a PRICE node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChildItemSpec {
    pub product_key: String,
    pub quantity: ExpressionSpec,
    pub applies_when: Option<ConditionRule>,
}

/// PRICE node payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PriceSpec {
    pub components: Vec<PriceComponent>,
    pub materials: Vec<MaterialEffectSpec>,
    pub child_items: Vec<ChildItemSpec>,
}

/// EFFECT node payload: named side-effect output expressions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectSpec {
    pub outputs: BTreeMap<String, ExpressionSpec>,
}

// ──────────────────────────────────────────────
// Nodes and edges
// ──────────────────────────────────────────────

/// Node payload, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum NodeBody {
    Input(InputSpec),
    Compute(ComputeSpec),
    Price(PriceSpec),
    Effect(EffectSpec),
    /// Editor-only grouping; excluded from the runtime graph.
    Group,
}

impl NodeBody {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeBody::Input(_) => "INPUT",
            NodeBody::Compute(_) => "COMPUTE",
            NodeBody::Price(_) => "PRICE",
            NodeBody::Effect(_) => "EFFECT",
            NodeBody::Group => "GROUP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    /// Editor-facing key; unique among non-DELETED nodes.
    pub key: Option<String>,
    pub status: EntityStatus,
    #[serde(flatten)]
    pub body: NodeBody,
}

impl Node {
    /// True when the node participates in the runtime graph.
    pub fn is_runtime(&self) -> bool {
        self.status == EntityStatus::Enabled && !matches!(self.body, NodeBody::Group)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    /// Non-negative integer; lower priorities route first.
    pub priority: i64,
    pub condition: Option<ConditionRule>,
    pub status: EntityStatus,
}

// ──────────────────────────────────────────────
// Tree meta (base pricing)
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QtyTier {
    pub min_qty: f64,
    pub unit_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SqftTier {
    pub min_sqft: f64,
    pub cents_per_sqft: i64,
}

/// Base pricing tiers carried in tree meta (`pricingV2`).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BasePricing {
    pub qty_tiers: Vec<QtyTier>,
    pub sqft_tiers: Vec<SqftTier>,
    pub minimum_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TreeMeta {
    pub pricing: Option<BasePricing>,
    pub base_weight_lbs: Option<f64>,
}

// ──────────────────────────────────────────────
// Tree
// ──────────────────────────────────────────────

/// A versioned pricing graph. Logically immutable during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tree {
    pub version_id: String,
    pub status: TreeStatus,
    /// Ordered entry points of the traversal.
    pub root_node_ids: Vec<String>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub meta: TreeMeta,
}

impl Tree {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// ENABLED edges leaving the given node.
    pub fn enabled_edges_from<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges
            .iter()
            .filter(move |e| e.status == EntityStatus::Enabled && e.from_node_id == node_id)
    }

    /// Nodes participating in the runtime graph (ENABLED, non-GROUP).
    pub fn runtime_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_runtime())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn input_node(id: &str, status: EntityStatus) -> Node {
        Node {
            id: id.to_string(),
            key: Some(id.to_string()),
            status,
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

    #[test]
    fn runtime_excludes_disabled_and_group() {
        let tree = Tree {
            version_id: "tv1".to_string(),
            status: TreeStatus::Draft,
            root_node_ids: vec!["a".to_string()],
            nodes: vec![
                input_node("a", EntityStatus::Enabled),
                input_node("b", EntityStatus::Disabled),
                Node {
                    id: "g".to_string(),
                    key: None,
                    status: EntityStatus::Enabled,
                    body: NodeBody::Group,
                },
            ],
            edges: Vec::new(),
            meta: TreeMeta::default(),
        };
        let ids: Vec<&str> = tree.runtime_nodes().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn enabled_edges_from_filters_status_and_source() {
        let edge = |id: &str, from: &str, status| Edge {
            id: id.to_string(),
            from_node_id: from.to_string(),
            to_node_id: "z".to_string(),
            priority: 0,
            condition: None,
            status,
        };
        let tree = Tree {
            version_id: "tv1".to_string(),
            status: TreeStatus::Draft,
            root_node_ids: Vec::new(),
            nodes: Vec::new(),
            edges: vec![
                edge("e1", "a", EntityStatus::Enabled),
                edge("e2", "a", EntityStatus::Disabled),
                edge("e3", "b", EntityStatus::Enabled),
            ],
            meta: TreeMeta::default(),
        };
        let ids: Vec<&str> = tree.enabled_edges_from("a").map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1"]);
    }
}
