//! End-to-end validator scenarios across lifecycle modes.

use pricetree_analyze::{
    validate, ChangeSet, EvalPurpose, ValidateMode, ValidatePolicy,
};
use pricetree_core::ingest_tree;
use serde_json::json;

fn tree(v: serde_json::Value) -> pricetree_core::Tree {
    ingest_tree(&v).expect("fixture ingests")
}

fn sel_eq(key: &str, v: serde_json::Value) -> serde_json::Value {
    json!({ "op": "eq",
            "left": { "op": "ref", "ref": { "kind": "selectionRef", "selectionKey": key } },
            "right": { "op": "ref", "ref": { "kind": "constant", "value": v } } })
}

#[test]
fn publish_blocks_on_runtime_cycle() {
    let t = tree(json!({
        "versionId": "tv1",
        "rootNodeIds": ["a"],
        "nodes": [
            { "id": "a", "kind": "INPUT", "selectionKey": "x", "valueType": "NUMBER" },
            { "id": "b", "kind": "INPUT", "selectionKey": "y", "valueType": "NUMBER" },
        ],
        "edges": [
            { "id": "e1", "from": "a", "to": "b" },
            { "id": "e2", "from": "b", "to": "a" },
        ]
    }));
    let report = validate(&t, ValidateMode::Publish, &ValidatePolicy::publish());
    assert!(!report.ok);
    assert!(report.has_code("PBV2_E_GRAPH_CYCLE"));
}

#[test]
fn draft_mode_ignores_structural_problems() {
    // Same cyclic tree: draft only runs the expression sweep.
    let t = tree(json!({
        "versionId": "tv1",
        "rootNodeIds": ["a"],
        "nodes": [
            { "id": "a", "kind": "INPUT", "selectionKey": "x", "valueType": "NUMBER" },
            { "id": "b", "kind": "INPUT", "selectionKey": "y", "valueType": "NUMBER" },
        ],
        "edges": [
            { "id": "e1", "from": "a", "to": "b" },
            { "id": "e2", "from": "b", "to": "a" },
        ]
    }));
    let report = validate(&t, ValidateMode::Draft, &ValidatePolicy::draft());
    assert!(report.ok);
}

#[test]
fn ambiguity_severity_tracks_policy() {
    let fixture = json!({
        "versionId": "tv1",
        "rootNodeIds": ["a"],
        "nodes": [
            { "id": "a", "kind": "INPUT", "selectionKey": "x", "valueType": "NUMBER" },
            { "id": "b", "kind": "INPUT", "selectionKey": "y", "valueType": "NUMBER" },
            { "id": "c", "kind": "INPUT", "selectionKey": "z", "valueType": "NUMBER" },
        ],
        "edges": [
            { "id": "e1", "from": "a", "to": "b", "priority": 0,
              "condition": sel_eq("x", json!(1)) },
            { "id": "e2", "from": "a", "to": "c", "priority": 0,
              "condition": sel_eq("x", json!(1)) },
        ]
    });
    let strict = validate(
        &tree(fixture.clone()),
        ValidateMode::Publish,
        &ValidatePolicy::publish(),
    );
    assert!(!strict.ok);
    assert!(strict.has_code("PBV2_E_AMBIGUOUS_EDGES"));

    let lenient = validate(
        &tree(fixture),
        ValidateMode::Publish,
        &ValidatePolicy {
            strict_ambiguity: false,
            ..ValidatePolicy::publish()
        },
    );
    assert!(lenient.has_code("PBV2_W_AMBIGUOUS_EDGES"));
    assert!(!lenient.has_code("PBV2_E_AMBIGUOUS_EDGES"));
}

#[test]
fn unsat_pruning_disarms_same_priority_bucket() {
    let unsat = json!({ "op": "and", "rules": [
        sel_eq("x", json!(1)), sel_eq("x", json!(2)),
    ]});
    let t = tree(json!({
        "versionId": "tv1",
        "rootNodeIds": ["a"],
        "nodes": [
            { "id": "a", "kind": "INPUT", "selectionKey": "x", "valueType": "NUMBER" },
            { "id": "b", "kind": "INPUT", "selectionKey": "y", "valueType": "NUMBER" },
            { "id": "c", "kind": "INPUT", "selectionKey": "z", "valueType": "NUMBER" },
        ],
        "edges": [
            { "id": "e1", "from": "a", "to": "b", "priority": 0,
              "condition": sel_eq("x", json!(1)) },
            { "id": "e2", "from": "a", "to": "c", "priority": 0, "condition": unsat },
        ]
    }));
    let report = validate(&t, ValidateMode::Publish, &ValidatePolicy::publish());
    assert!(!report.has_code("PBV2_E_AMBIGUOUS_EDGES"));
    // The dead edge leaves node c unreachable, which is only a warning.
    assert!(report.has_code("PBV2_W_NODE_UNREACHABLE"));
}

#[test]
fn guarded_division_passes_where_unguarded_fails() {
    let guarded = json!({
        "op": "if",
        "cond": { "op": "eq",
                  "left": { "op": "ref", "ref": { "kind": "envRef", "key": "quantity" } },
                  "right": { "op": "ref", "ref": { "kind": "constant", "value": 0 } } },
        "then": { "op": "ref", "ref": { "kind": "constant", "value": 0 } },
        "else": { "op": "div",
                  "left": { "op": "ref", "ref": { "kind": "constant", "value": 100 } },
                  "right": { "op": "ref", "ref": { "kind": "envRef", "key": "quantity" } } }
    });
    let unguarded = json!({
        "op": "div",
        "left": { "op": "ref", "ref": { "kind": "constant", "value": 100 } },
        "right": { "op": "ref", "ref": { "kind": "envRef", "key": "quantity" } }
    });
    let fixture = |expr: serde_json::Value| {
        tree(json!({
            "versionId": "tv1",
            "rootNodeIds": ["c1"],
            "nodes": [
                { "id": "c1", "kind": "COMPUTE", "outputKey": "perUnit",
                  "valueType": "NUMBER", "expression": expr },
            ],
            "edges": []
        }))
    };
    let ok = validate(&fixture(guarded), ValidateMode::Publish, &ValidatePolicy::publish());
    assert!(ok.ok, "guarded division should pass publish: {:?}", ok.findings);

    let bad = validate(&fixture(unguarded), ValidateMode::Publish, &ValidatePolicy::publish());
    assert!(!bad.ok);
    assert!(bad.has_code("PBV2_E_DIV_UNGUARDED"));
}

#[test]
fn restore_reports_collision_and_dangling_edge() {
    let t = tree(json!({
        "versionId": "tv1",
        "rootNodeIds": ["a"],
        "nodes": [
            { "id": "a", "kind": "INPUT", "selectionKey": "size", "valueType": "NUMBER" },
            // Just restored; clashes with the surviving declaration.
            { "id": "b", "kind": "INPUT", "selectionKey": "size", "valueType": "NUMBER" },
            { "id": "gone", "kind": "INPUT", "selectionKey": "w", "valueType": "NUMBER",
              "status": "DELETED" },
        ],
        "edges": [
            { "id": "e1", "from": "b", "to": "gone" },
        ]
    }));
    let report = validate(
        &t,
        ValidateMode::Restore(ChangeSet::nodes(["b"])),
        &ValidatePolicy::publish(),
    );
    assert!(!report.ok);
    assert!(report.has_code("PBV2_E_RESTORE_COLLISION"));
    assert!(report.has_code("PBV2_E_RESTORE_DANGLING"));
}

#[test]
fn eval_gate_persist_vs_preview() {
    let draft = tree(json!({
        "versionId": "tv1", "status": "DRAFT",
        "rootNodeIds": [], "nodes": [], "edges": []
    }));
    let persist = validate(
        &draft,
        ValidateMode::EvalGate(EvalPurpose::Persist),
        &ValidatePolicy::publish(),
    );
    assert!(!persist.ok);
    assert!(persist.has_code("PBV2_E_EVAL_TREE_STATUS"));

    let preview = validate(
        &draft,
        ValidateMode::EvalGate(EvalPurpose::Preview),
        &ValidatePolicy::publish(),
    );
    assert!(preview.ok);
    assert!(preview.has_code("PBV2_W_EVAL_DRAFT_PREVIEW"));
    assert_eq!(preview.warnings.len(), 1);
}

#[test]
fn findings_are_sorted_for_stable_diffing() {
    let t = tree(json!({
        "versionId": "tv1",
        "rootNodeIds": ["missing"],
        "nodes": [
            { "id": "a", "kind": "INPUT", "selectionKey": "x", "valueType": "NUMBER" },
            { "id": "b", "kind": "INPUT", "selectionKey": "y", "valueType": "NUMBER",
              "required": true },
        ],
        "edges": [
            { "id": "e1", "from": "a", "to": "gone" },
        ]
    }));
    let report = validate(&t, ValidateMode::Publish, &ValidatePolicy::publish());
    assert!(!report.ok);
    let mut sorted = report.findings.clone();
    pricetree_core::sort_findings(&mut sorted);
    assert_eq!(report.findings, sorted);
    // Errors come first in the sorted list.
    assert!(report.findings[0].is_error());
}

#[test]
fn clean_publishable_tree() {
    let t = tree(json!({
        "versionId": "tv1",
        "rootNodeIds": ["i1"],
        "nodes": [
            { "id": "i1", "kind": "INPUT", "selectionKey": "grommets",
              "valueType": "BOOLEAN", "default": true },
            { "id": "c1", "kind": "COMPUTE", "outputKey": "count", "valueType": "NUMBER",
              "expression": { "op": "ceil", "arg": { "op": "div",
                "left": { "op": "ref", "ref": { "kind": "envRef", "key": "perimeterIn" } },
                "right": { "op": "ref", "ref": { "kind": "constant", "value": 24 } } } } },
            { "id": "p1", "kind": "PRICE", "components": [
                { "kind": "PER_UNIT", "label": "Grommets",
                  "unitPrice": 25,
                  "quantity": { "op": "ref", "ref": { "kind": "nodeOutputRef",
                    "nodeId": "c1", "outputKey": "count" } } },
            ] },
        ],
        "edges": [
            { "id": "e1", "from": "i1", "to": "c1", "condition": {
                "op": "eq",
                "left": { "op": "ref", "ref": { "kind": "effectiveRef",
                                                 "selectionKey": "grommets" } },
                "right": { "op": "ref", "ref": { "kind": "constant", "value": true } } } },
            { "id": "e2", "from": "c1", "to": "p1" },
        ]
    }));
    let report = validate(&t, ValidateMode::Publish, &ValidatePolicy::publish());
    assert!(report.ok, "expected clean publish, got {:?}", report.findings);
    assert!(report.findings.is_empty());
}
