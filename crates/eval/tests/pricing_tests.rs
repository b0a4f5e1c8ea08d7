//! End-to-end pricing scenarios over ingested JSON trees.

use pricetree_core::ingest_tree;
use pricetree_core::tree::Tree;
use pricetree_eval::{
    child_item_proposals, evaluate, materials, price, price_with, Env, PriceOpts, PricingContext,
    Selections,
};
use serde_json::{json, Value};

fn tree(raw: Value) -> Tree {
    ingest_tree(&raw).expect("fixture tree must ingest")
}

fn sel(pairs: &[(&str, Value)]) -> Selections {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn eref(key: &str) -> Value {
    json!({ "op": "ref", "ref": { "kind": "effectiveRef", "selectionKey": key } })
}

fn envref(key: &str) -> Value {
    json!({ "op": "ref", "ref": { "kind": "envRef", "key": key } })
}

fn constant(v: Value) -> Value {
    json!({ "op": "ref", "ref": { "kind": "constant", "value": v } })
}

// ── Grommet spacing ──────────────────────────────────────────────────

fn grommet_tree() -> Tree {
    tree(json!({
        "versionId": "grommets-v1",
        "status": "ACTIVE",
        "rootNodeIds": ["grommets", "spacing"],
        "nodes": [
            {
                "id": "grommets",
                "kind": "INPUT",
                "selectionKey": "grommets",
                "valueType": "BOOLEAN",
                "default": true
            },
            {
                "id": "spacing",
                "kind": "INPUT",
                "selectionKey": "spacing",
                "valueType": "NUMBER",
                "default": 24
            },
            {
                "id": "grommet-price",
                "kind": "PRICE",
                "components": [ {
                    "kind": "FLAT",
                    "label": "Dense grommet spacing",
                    "unitPriceCents": 100,
                    "appliesWhen": {
                        "op": "lt",
                        "left": eref("spacing"),
                        "right": constant(json!(24))
                    }
                } ]
            }
        ],
        "edges": [ {
            "id": "e-grommets",
            "from": "grommets",
            "to": "grommet-price",
            "priority": 0,
            "condition": {
                "op": "eq",
                "left": eref("grommets"),
                "right": constant(json!(true))
            }
        } ]
    }))
}

#[test]
fn grommet_default_spacing_costs_nothing() {
    let t = grommet_tree();
    let env = Env::from_dimensions(24.0, 48.0, 1.0);
    let result = price(&t, &sel(&[]), &env).unwrap();
    assert_eq!(result.add_on_cents, 0);
}

#[test]
fn grommet_dense_spacing_adds_surcharge() {
    let t = grommet_tree();
    let env = Env::from_dimensions(24.0, 48.0, 1.0);
    let result = price(&t, &sel(&[("spacing", json!(12))]), &env).unwrap();
    assert_eq!(result.add_on_cents, 100);
    assert_eq!(result.breakdown.len(), 1);
    assert_eq!(result.breakdown[0].label, "Dense grommet spacing");
}

#[test]
fn grommets_disabled_costs_nothing_regardless_of_spacing() {
    let t = grommet_tree();
    let env = Env::from_dimensions(24.0, 48.0, 1.0);
    let result = price(
        &t,
        &sel(&[("grommets", json!(false)), ("spacing", json!(12))]),
        &env,
    )
    .unwrap();
    assert_eq!(result.add_on_cents, 0);
    assert!(result.breakdown.is_empty());
}

// ── Sign extrusion child items ───────────────────────────────────────

#[test]
fn extrusion_child_item_quantity_is_ceiled_perimeter() {
    let t = tree(json!({
        "versionId": "sign-v1",
        "status": "ACTIVE",
        "rootNodeIds": ["sign-price"],
        "nodes": [ {
            "id": "sign-price",
            "kind": "PRICE",
            "childItems": [ {
                "productKey": "extrusion-stick",
                "quantity": {
                    "op": "ceil",
                    "arg": {
                        "op": "div",
                        "left": envref("perimeterIn"),
                        "right": constant(json!(12))
                    }
                }
            } ]
        } ]
    }));
    let mut env = Env::new();
    env.set("perimeterIn", 25.0);
    env.set("quantity", 1.0);
    let proposals = child_item_proposals(&t, &sel(&[]), &env).unwrap();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].product_key, "extrusion-stick");
    assert_eq!(proposals[0].quantity, 3.0);
}

// ── Banner material pricing ──────────────────────────────────────────

fn banner_tree() -> Tree {
    let total_sqft = || json!({ "op": "mul", "args": [envref("sqft"), envref("quantity")] });
    tree(json!({
        "versionId": "banner-v1",
        "status": "ACTIVE",
        "rootNodeIds": ["material", "sides"],
        "nodes": [
            {
                "id": "material",
                "kind": "INPUT",
                "selectionKey": "material",
                "valueType": "ENUM",
                "default": "13oz",
                "options": [
                    { "value": "13oz" },
                    { "value": "18oz" }
                ]
            },
            {
                "id": "sides",
                "kind": "INPUT",
                "selectionKey": "sides",
                "valueType": "TEXT",
                "default": "SS"
            },
            {
                "id": "banner-price",
                "kind": "PRICE",
                "components": [
                    {
                        "kind": "PER_UNIT",
                        "label": "13oz vinyl",
                        "quantity": total_sqft(),
                        "unitPriceCents": {
                            "op": "if",
                            "cond": { "op": "gte", "left": total_sqft(), "right": constant(json!(6)) },
                            "then": constant(json!(90)),
                            "else": constant(json!(120))
                        },
                        "appliesWhen": {
                            "op": "eq",
                            "left": eref("material"),
                            "right": constant(json!("13oz"))
                        }
                    },
                    {
                        "kind": "PER_UNIT",
                        "label": "18oz vinyl",
                        "quantity": total_sqft(),
                        "unitPriceCents": {
                            "op": "if",
                            "cond": { "op": "gte", "left": total_sqft(), "right": constant(json!(100)) },
                            "then": constant(json!(100)),
                            "else": constant(json!(120))
                        },
                        "appliesWhen": {
                            "op": "eq",
                            "left": eref("material"),
                            "right": constant(json!("18oz"))
                        }
                    }
                ]
            }
        ],
        "edges": [
            { "id": "e1", "from": "material", "to": "banner-price", "priority": 0 }
        ]
    }))
}

fn banner_env() -> Env {
    // 10 sqft per unit, 5 units: 50 total sqft.
    let mut env = Env::new();
    env.set("sqft", 10.0);
    env.set("quantity", 5.0);
    env
}

#[test]
fn banner_13oz_reaches_discount_tier() {
    let result = price(&banner_tree(), &sel(&[("sides", json!("SS"))]), &banner_env()).unwrap();
    // 50 sqft over the 6-sqft threshold: 50 x 90¢.
    assert_eq!(result.add_on_cents, 4500);
}

#[test]
fn banner_18oz_misses_tier_threshold() {
    let result = price(
        &banner_tree(),
        &sel(&[("material", json!("18oz")), ("sides", json!("SS"))]),
        &banner_env(),
    )
    .unwrap();
    // 100-sqft threshold not reached: 50 x 120¢.
    assert_eq!(result.add_on_cents, 6000);
}

// ── Discount ordering ────────────────────────────────────────────────

#[test]
fn tier_discount_applies_before_volume_discount() {
    let t = tree(json!({
        "versionId": "disc-v1",
        "status": "ACTIVE",
        "rootNodeIds": ["p"],
        "nodes": [ {
            "id": "p",
            "kind": "PRICE",
            "components": [ {
                "kind": "PER_UNIT",
                "label": "widget",
                "quantity": envref("quantity"),
                "unitPriceCents": 1000,
                "discount": {
                    "scope": ["customerTier", "volume"],
                    "method": "PERCENT",
                    "tierRates": { "gold": 10 },
                    "volumeTiers": [ { "minQty": 100, "rate": 5 } ]
                }
            } ]
        } ]
    }));
    let mut env = Env::new();
    env.set("quantity", 100.0);
    let opts = PriceOpts {
        context: PricingContext {
            customer_tier: Some("gold".to_string()),
            product_qty: None,
        },
        ..PriceOpts::default()
    };
    let result = price_with(&t, &sel(&[]), &env, &opts).unwrap();
    // round(round(1000 x 0.9) x 0.95) = 855, tier before volume.
    let line = &result.breakdown[0];
    assert_eq!(line.unit_price_cents, 855);
    assert_eq!(result.add_on_cents, 85_500);
    let debug = line.discount.as_ref().unwrap();
    assert_eq!(debug.tier_adjusted_cents, Some(900));
    assert_eq!(debug.volume_adjusted_cents, Some(855));
}

// ── Structural runtime behavior ──────────────────────────────────────

#[test]
fn tiered_component_is_skipped_not_guessed() {
    let t = tree(json!({
        "versionId": "tiered-v1",
        "status": "ACTIVE",
        "rootNodeIds": ["p"],
        "nodes": [ {
            "id": "p",
            "kind": "PRICE",
            "components": [ {
                "kind": "TIERED",
                "label": "legacy tiered",
                "unitPriceCents": 999
            } ]
        } ]
    }));
    let mut env = Env::new();
    env.set("quantity", 1.0);
    let result = price(&t, &sel(&[]), &env).unwrap();
    assert_eq!(result.add_on_cents, 0);
    assert_eq!(result.breakdown.len(), 1);
    assert!(result.breakdown[0].skipped);
}

#[test]
fn base_pricing_meta_prepends_synthetic_line() {
    let t = tree(json!({
        "versionId": "base-v1",
        "status": "ACTIVE",
        "rootNodeIds": ["p"],
        "nodes": [ {
            "id": "p",
            "kind": "PRICE",
            "components": [ {
                "kind": "FLAT",
                "label": "setup",
                "unitPriceCents": 250
            } ]
        } ],
        "meta": {
            "pricingV2": {
                "qtyTiers": [ { "minQty": 1, "unitCents": 500 } ],
                "minimumCents": 0
            }
        }
    }));
    let mut env = Env::new();
    env.set("quantity", 2.0);
    let result = price(&t, &sel(&[]), &env).unwrap();
    assert_eq!(result.breakdown[0].kind, "BASE");
    assert_eq!(result.breakdown[0].amount_cents, 1000);
    assert_eq!(result.breakdown[1].label, "setup");
    assert_eq!(result.add_on_cents, 1250);
}

#[test]
fn material_effects_are_condition_gated() {
    let t = tree(json!({
        "versionId": "mat-v1",
        "status": "ACTIVE",
        "rootNodeIds": ["hem"],
        "nodes": [
            {
                "id": "hem",
                "kind": "INPUT",
                "selectionKey": "hem",
                "valueType": "BOOLEAN",
                "default": false
            },
            {
                "id": "p",
                "kind": "PRICE",
                "materials": [ {
                    "materialKey": "hem-tape",
                    "unit": "in",
                    "quantity": envref("perimeterIn"),
                    "appliesWhen": {
                        "op": "eq",
                        "left": eref("hem"),
                        "right": constant(json!(true))
                    }
                } ]
            }
        ],
        "edges": [ { "id": "e1", "from": "hem", "to": "p", "priority": 0 } ]
    }));
    let mut env = Env::new();
    env.set("perimeterIn", 144.0);
    env.set("quantity", 1.0);

    assert!(materials(&t, &sel(&[]), &env).unwrap().is_empty());

    let effects = materials(&t, &sel(&[("hem", json!(true))]), &env).unwrap();
    assert_eq!(effects.len(), 1);
    assert_eq!(effects[0].material_key, "hem-tape");
    assert_eq!(effects[0].quantity, 144.0);
    assert_eq!(effects[0].unit.as_deref(), Some("in"));
}

#[test]
fn evaluate_returns_pricing_and_effects_together() {
    let t = tree(json!({
        "versionId": "combo-v1",
        "status": "ACTIVE",
        "rootNodeIds": ["p"],
        "nodes": [
            {
                "id": "p",
                "kind": "PRICE",
                "components": [ {
                    "kind": "FLAT",
                    "label": "Setup",
                    "unitPriceCents": 500
                } ],
                "materials": [ {
                    "materialKey": "vinyl",
                    "unit": "sqft",
                    "quantity": envref("sqft")
                } ],
                "childItems": [ {
                    "productKey": "pole-pocket",
                    "quantity": constant(json!(2))
                } ]
            }
        ],
        "edges": []
    }));
    let mut env = Env::new();
    env.set("sqft", 12.0);
    env.set("quantity", 1.0);

    let result = evaluate(&t, &sel(&[]), &env, &PriceOpts::default()).unwrap();
    assert_eq!(result.add_on_cents, 500);
    assert_eq!(result.breakdown.len(), 1);
    assert_eq!(result.materials.len(), 1);
    assert_eq!(result.materials[0].material_key, "vinyl");
    assert_eq!(result.child_items.len(), 1);
    assert_eq!(result.child_items[0].quantity, 2.0);

    // The split entry points agree with the combined one.
    assert_eq!(materials(&t, &sel(&[]), &env).unwrap(), result.materials);
    assert_eq!(
        child_item_proposals(&t, &sel(&[]), &env).unwrap(),
        result.child_items
    );
}

#[test]
fn pricing_is_idempotent() {
    let t = banner_tree();
    let selections = sel(&[("material", json!("18oz"))]);
    let env = banner_env();
    let first = price(&t, &selections, &env).unwrap();
    let second = price(&t, &selections, &env).unwrap();
    assert_eq!(first, second);
}
