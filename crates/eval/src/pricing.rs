//! Component pricing over the active node set.
//!
//! Components are priced in declaration order per active PRICE node:
//! FLAT is the unit price, PER_UNIT is quantity times unit price,
//! PER_OVERAGE is max(quantity - overageBase, 0) times unit price.
//! TIERED is representable but not priced at runtime; it is recorded
//! as a skipped breakdown line, never guessed. Amounts round to
//! integer cents at the component level.

use crate::active::active_nodes;
use crate::compute::evaluate_computes;
use crate::discount::apply_discount;
use crate::exprs::Evaluator;
use crate::money::round_cents;
use crate::types::{
    BreakdownLine, ChildItemProposal, Env, EvalError, MaterialEffect, NoPricebook, Pricebook,
    PricingContext, PricingResult, Selections,
};
use serde::Serialize;
use pricetree_core::contract::EnvKeys;
use pricetree_core::symbols::build_symbols;
use pricetree_core::tree::{BasePricing, ComponentKind, NodeBody, PriceComponent, Tree};
use std::collections::BTreeSet;

/// Options for [`price_with`].
pub struct PriceOpts<'a> {
    pub pricebook: &'a dyn Pricebook,
    pub context: PricingContext,
}

impl Default for PriceOpts<'_> {
    fn default() -> Self {
        PriceOpts {
            pricebook: &NoPricebook,
            context: PricingContext::default(),
        }
    }
}

/// Build the evaluator, resolve the active set, run the compute pass,
/// then hand off to `f`. Shared by every evaluation entry point.
pub(crate) fn run<T>(
    tree: &Tree,
    selections: &Selections,
    env: &Env,
    pricebook: &dyn Pricebook,
    f: impl for<'a> FnOnce(&mut Evaluator<'a>, &BTreeSet<String>) -> Result<T, EvalError>,
) -> Result<T, EvalError> {
    let env_keys = EnvKeys::default();
    let (table, _) = build_symbols(tree, &env_keys);
    let mut ev = Evaluator::new(tree, &table, selections, env, pricebook);
    let active = active_nodes(&mut ev)?;
    evaluate_computes(&mut ev, &active)?;
    f(&mut ev, &active)
}

/// Price the tree for the given selections and environment.
pub fn price(tree: &Tree, selections: &Selections, env: &Env) -> Result<PricingResult, EvalError> {
    price_with(tree, selections, env, &PriceOpts::default())
}

/// Price with an explicit pricebook and discount context.
pub fn price_with(
    tree: &Tree,
    selections: &Selections,
    env: &Env,
    opts: &PriceOpts<'_>,
) -> Result<PricingResult, EvalError> {
    run(tree, selections, env, opts.pricebook, |ev, active| {
        price_active(ev, active, tree, env, opts)
    })
}

fn price_active(
    ev: &mut Evaluator<'_>,
    active: &BTreeSet<String>,
    tree: &Tree,
    env: &Env,
    opts: &PriceOpts<'_>,
) -> Result<PricingResult, EvalError> {
    let mut breakdown = Vec::new();

    if let Some(pricing) = &tree.meta.pricing {
        if let Some(line) = base_price_line(pricing, env)? {
            breakdown.push(line);
        }
    }

    let product_qty = opts.context.product_qty.unwrap_or_else(|| env.quantity());
    let customer_tier = opts.context.customer_tier.as_deref();

    for node in &tree.nodes {
        if !active.contains(&node.id) {
            continue;
        }
        let NodeBody::Price(spec) = &node.body else {
            continue;
        };
        for (i, component) in spec.components.iter().enumerate() {
            let path = format!("/nodes/{}/components/{}", node.id, i);
            if let Some(line) =
                price_component(ev, &node.id, component, &path, customer_tier, product_qty)?
            {
                breakdown.push(line);
            }
        }
    }

    let add_on_cents = breakdown.iter().map(|l| l.amount_cents).sum();
    Ok(PricingResult {
        add_on_cents,
        breakdown,
    })
}

/// Complete evaluation result: pricing plus the derived effects, all
/// from a single traversal and compute pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub add_on_cents: i64,
    pub breakdown: Vec<BreakdownLine>,
    pub materials: Vec<MaterialEffect>,
    pub child_items: Vec<ChildItemProposal>,
}

/// Price the tree and derive its effects in one pass.
pub fn evaluate(
    tree: &Tree,
    selections: &Selections,
    env: &Env,
    opts: &PriceOpts<'_>,
) -> Result<Evaluation, EvalError> {
    run(tree, selections, env, opts.pricebook, |ev, active| {
        let pricing = price_active(ev, active, tree, env, opts)?;
        let materials = crate::effects::collect_materials(ev, active, tree)?;
        let child_items = crate::effects::collect_child_items(ev, active, tree)?;
        Ok(Evaluation {
            add_on_cents: pricing.add_on_cents,
            breakdown: pricing.breakdown,
            materials,
            child_items,
        })
    })
}

fn price_component(
    ev: &mut Evaluator<'_>,
    node_id: &str,
    component: &PriceComponent,
    path: &str,
    customer_tier: Option<&str>,
    product_qty: f64,
) -> Result<Option<BreakdownLine>, EvalError> {
    if let Some(condition) = &component.applies_when {
        if !ev.eval_condition(condition, &format!("{}/appliesWhen", path))? {
            return Ok(None);
        }
    }

    if component.kind == ComponentKind::Tiered {
        return Ok(Some(BreakdownLine {
            label: component.label.clone(),
            kind: component.kind.as_str().to_string(),
            node_id: Some(node_id.to_string()),
            quantity: 0.0,
            unit_price_cents: 0,
            amount_cents: 0,
            skipped: true,
            discount: None,
        }));
    }

    let require = |field: &str, expr: &Option<pricetree_core::ast::ExpressionSpec>| {
        expr.clone().ok_or_else(|| EvalError::ComponentField {
            node_id: node_id.to_string(),
            field: field.to_string(),
        })
    };

    let unit_expr = require("unitPriceCents", &component.unit_price)?;
    let unit_raw = ev
        .eval_expr(&unit_expr, &format!("{}/unitPriceCents", path))?
        .as_number(path)?;
    let unit_cents = round_cents(unit_raw, &format!("{}/unitPriceCents", path))?;

    let quantity = match component.kind {
        ComponentKind::Flat => 1.0,
        ComponentKind::PerUnit => {
            let quantity_expr = require("quantity", &component.quantity)?;
            ev.eval_expr(&quantity_expr, &format!("{}/quantity", path))?
                .as_number(path)?
        }
        ComponentKind::PerOverage => {
            let quantity_expr = require("quantity", &component.quantity)?;
            let base_expr = require("overageBase", &component.overage_base)?;
            let qty = ev
                .eval_expr(&quantity_expr, &format!("{}/quantity", path))?
                .as_number(path)?;
            let base = ev
                .eval_expr(&base_expr, &format!("{}/overageBase", path))?
                .as_number(path)?;
            (qty - base).max(0.0)
        }
        ComponentKind::Tiered => unreachable!("handled above"),
    };

    let (unit_final, amount_cents, discount_debug) = match &component.discount {
        Some(config) => {
            let outcome =
                apply_discount(quantity, unit_cents, config, customer_tier, product_qty, path)?;
            (
                outcome.unit_price_cents,
                outcome.amount_cents,
                Some(outcome.debug),
            )
        }
        None => (
            unit_cents,
            round_cents(quantity * unit_cents as f64, path)?,
            None,
        ),
    };

    Ok(Some(BreakdownLine {
        label: component.label.clone(),
        kind: component.kind.as_str().to_string(),
        node_id: Some(node_id.to_string()),
        quantity,
        unit_price_cents: unit_final,
        amount_cents,
        skipped: false,
        discount: discount_debug,
    }))
}

/// Base price from tree meta: best qty tier and best sqft tier resolve
/// independently (highest threshold at or below the actual value wins
/// each), floored at the minimum charge. Reported as a synthetic
/// zero-indexed line when non-zero.
fn base_price_line(pricing: &BasePricing, env: &Env) -> Result<Option<BreakdownLine>, EvalError> {
    let quantity = env.quantity();
    let sqft_each = env.get("sqft").unwrap_or(0.0);
    let total_sqft = sqft_each * quantity;

    let mut cents: i64 = 0;
    if let Some(tier) = pricing
        .qty_tiers
        .iter()
        .filter(|t| t.min_qty <= quantity)
        .fold(None, |best: Option<&pricetree_core::tree::QtyTier>, t| match best {
            Some(b) if b.min_qty >= t.min_qty => Some(b),
            _ => Some(t),
        })
    {
        cents += round_cents(quantity * tier.unit_cents as f64, "/meta/pricingV2/qtyTiers")?;
    }
    if let Some(tier) = pricing
        .sqft_tiers
        .iter()
        .filter(|t| t.min_sqft <= total_sqft)
        .fold(None, |best: Option<&pricetree_core::tree::SqftTier>, t| match best {
            Some(b) if b.min_sqft >= t.min_sqft => Some(b),
            _ => Some(t),
        })
    {
        cents += round_cents(
            total_sqft * tier.cents_per_sqft as f64,
            "/meta/pricingV2/sqftTiers",
        )?;
    }

    if cents < pricing.minimum_cents {
        cents = pricing.minimum_cents;
    }
    if cents <= 0 {
        return Ok(None);
    }
    Ok(Some(BreakdownLine {
        label: "Base price".to_string(),
        kind: "BASE".to_string(),
        node_id: None,
        quantity,
        unit_price_cents: 0,
        amount_cents: cents,
        skipped: false,
        discount: None,
    }))
}
