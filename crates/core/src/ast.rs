//! Expression, condition, and reference AST types.
//!
//! These are the JSON-serializable sum types every algorithm in the
//! workspace matches over: the type checker, the structural analyses,
//! and the evaluator all consume the same trees. They are immutable and
//! structurally comparable; canonical stringification (sorted-key JSON)
//! is the comparison key used by the duplicate/ambiguity analyses.

use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Scalar types
// ──────────────────────────────────────────────

/// The five scalar types a value can take at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScalarType {
    Number,
    Boolean,
    Text,
    Json,
    Null,
}

impl ScalarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Number => "NUMBER",
            ScalarType::Boolean => "BOOLEAN",
            ScalarType::Text => "TEXT",
            ScalarType::Json => "JSON",
            ScalarType::Null => "NULL",
        }
    }

    pub fn parse(s: &str) -> Option<ScalarType> {
        match s {
            "NUMBER" => Some(ScalarType::Number),
            "BOOLEAN" => Some(ScalarType::Boolean),
            "TEXT" => Some(ScalarType::Text),
            "JSON" => Some(ScalarType::Json),
            "NULL" => Some(ScalarType::Null),
            _ => None,
        }
    }
}

// ──────────────────────────────────────────────
// References
// ──────────────────────────────────────────────

/// A typed pointer into the graph, environment, or pricebook.
///
/// Context legality for each kind is defined by
/// [`crate::contract::ref_legal_in_context`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Ref {
    /// A literal constant. Object/array constants are JSON-typed and
    /// rejected wherever only scalars are legal.
    Constant { value: serde_json::Value },
    /// The raw user-supplied value for a selection key; NULL when the
    /// user made no explicit choice.
    SelectionRef { selection_key: String },
    /// The user value or the input's declared default. Nullable only
    /// when the input declares no default.
    EffectiveRef { selection_key: String },
    /// The declared output of a COMPUTE node. Never targets EFFECT or
    /// GROUP nodes.
    NodeOutputRef { node_id: String, output_key: String },
    /// One of the fixed environment keys (widthIn, heightIn, quantity,
    /// sqft, perimeterIn).
    EnvRef { key: String },
    /// External price lookup; legal only in PRICE/EFFECT contexts.
    PricebookRef { item_key: String },
    /// A parameter of the effectively selected option of an ENUM input.
    /// Nullable when some declared option omits the parameter.
    OptionParamRef { selection_key: String, param: String },
    /// A parameter of a named option of an ENUM input. Nullable when
    /// that option omits the parameter.
    OptionParamOfRef {
        selection_key: String,
        option_value: String,
        param: String,
    },
}

impl Ref {
    /// Short kind name used in finding messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Ref::Constant { .. } => "constant",
            Ref::SelectionRef { .. } => "selectionRef",
            Ref::EffectiveRef { .. } => "effectiveRef",
            Ref::NodeOutputRef { .. } => "nodeOutputRef",
            Ref::EnvRef { .. } => "envRef",
            Ref::PricebookRef { .. } => "pricebookRef",
            Ref::OptionParamRef { .. } => "optionParamRef",
            Ref::OptionParamOfRef { .. } => "optionParamOfRef",
        }
    }
}

// ──────────────────────────────────────────────
// Expressions
// ──────────────────────────────────────────────

/// Expression tree for COMPUTE outputs, PRICE quantities/prices, and
/// EFFECT outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ExpressionSpec {
    /// Leaf: a reference.
    Ref {
        #[serde(rename = "ref")]
        target: Ref,
    },
    Add {
        args: Vec<ExpressionSpec>,
    },
    Sub {
        left: Box<ExpressionSpec>,
        right: Box<ExpressionSpec>,
    },
    Mul {
        args: Vec<ExpressionSpec>,
    },
    Div {
        left: Box<ExpressionSpec>,
        right: Box<ExpressionSpec>,
    },
    Min {
        args: Vec<ExpressionSpec>,
    },
    Max {
        args: Vec<ExpressionSpec>,
    },
    /// clamp(value, lo, hi): value bounded into [lo, hi].
    Clamp {
        value: Box<ExpressionSpec>,
        lo: Box<ExpressionSpec>,
        hi: Box<ExpressionSpec>,
    },
    Ceil {
        arg: Box<ExpressionSpec>,
    },
    Floor {
        arg: Box<ExpressionSpec>,
    },
    Round {
        arg: Box<ExpressionSpec>,
    },
    Abs {
        arg: Box<ExpressionSpec>,
    },
    Eq {
        left: Box<ExpressionSpec>,
        right: Box<ExpressionSpec>,
    },
    Neq {
        left: Box<ExpressionSpec>,
        right: Box<ExpressionSpec>,
    },
    Gt {
        left: Box<ExpressionSpec>,
        right: Box<ExpressionSpec>,
    },
    Gte {
        left: Box<ExpressionSpec>,
        right: Box<ExpressionSpec>,
    },
    Lt {
        left: Box<ExpressionSpec>,
        right: Box<ExpressionSpec>,
    },
    Lte {
        left: Box<ExpressionSpec>,
        right: Box<ExpressionSpec>,
    },
    And {
        args: Vec<ExpressionSpec>,
    },
    Or {
        args: Vec<ExpressionSpec>,
    },
    Not {
        arg: Box<ExpressionSpec>,
    },
    /// if(cond, then, else). Both branches must share a base type.
    If {
        cond: Box<ExpressionSpec>,
        then: Box<ExpressionSpec>,
        #[serde(rename = "else")]
        otherwise: Box<ExpressionSpec>,
    },
    /// First non-null argument; arguments must share a base type.
    Coalesce {
        args: Vec<ExpressionSpec>,
    },
    /// True iff the reference resolves to a non-null value.
    Exists {
        #[serde(rename = "ref")]
        target: Ref,
    },
    Concat {
        args: Vec<ExpressionSpec>,
    },
    Strlen {
        arg: Box<ExpressionSpec>,
    },
}

impl ExpressionSpec {
    /// Convenience constructor for a ref leaf.
    pub fn of(target: Ref) -> Self {
        ExpressionSpec::Ref { target }
    }

    /// Convenience constructor for a numeric constant leaf.
    pub fn number(n: f64) -> Self {
        ExpressionSpec::Ref {
            target: Ref::Constant {
                value: serde_json::json!(n),
            },
        }
    }

    /// Canonical sorted-key JSON rendering, used as a structural
    /// comparison key by the ambiguity and duplicate analyses.
    pub fn canonical_key(&self) -> String {
        canonical_of(self)
    }

    /// Visit every ref in the tree, leaves first.
    pub fn visit_refs<'a>(&'a self, f: &mut impl FnMut(&'a Ref)) {
        match self {
            ExpressionSpec::Ref { target } | ExpressionSpec::Exists { target } => f(target),
            ExpressionSpec::Add { args }
            | ExpressionSpec::Mul { args }
            | ExpressionSpec::Min { args }
            | ExpressionSpec::Max { args }
            | ExpressionSpec::And { args }
            | ExpressionSpec::Or { args }
            | ExpressionSpec::Concat { args }
            | ExpressionSpec::Coalesce { args } => {
                for a in args {
                    a.visit_refs(f);
                }
            }
            ExpressionSpec::Sub { left, right }
            | ExpressionSpec::Div { left, right }
            | ExpressionSpec::Eq { left, right }
            | ExpressionSpec::Neq { left, right }
            | ExpressionSpec::Gt { left, right }
            | ExpressionSpec::Gte { left, right }
            | ExpressionSpec::Lt { left, right }
            | ExpressionSpec::Lte { left, right } => {
                left.visit_refs(f);
                right.visit_refs(f);
            }
            ExpressionSpec::Clamp { value, lo, hi } => {
                value.visit_refs(f);
                lo.visit_refs(f);
                hi.visit_refs(f);
            }
            ExpressionSpec::Ceil { arg }
            | ExpressionSpec::Floor { arg }
            | ExpressionSpec::Round { arg }
            | ExpressionSpec::Abs { arg }
            | ExpressionSpec::Not { arg }
            | ExpressionSpec::Strlen { arg } => arg.visit_refs(f),
            ExpressionSpec::If {
                cond,
                then,
                otherwise,
            } => {
                cond.visit_refs(f);
                then.visit_refs(f);
                otherwise.visit_refs(f);
            }
        }
    }
}

// ──────────────────────────────────────────────
// Conditions
// ──────────────────────────────────────────────

/// Boolean condition rule gating edges, price components, and effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ConditionRule {
    And {
        rules: Vec<ConditionRule>,
    },
    Or {
        rules: Vec<ConditionRule>,
    },
    Not {
        rule: Box<ConditionRule>,
    },
    /// True iff the reference resolves non-null.
    Exists {
        #[serde(rename = "ref")]
        target: Ref,
    },
    Eq {
        left: ExpressionSpec,
        right: ExpressionSpec,
    },
    Neq {
        left: ExpressionSpec,
        right: ExpressionSpec,
    },
    Gt {
        left: ExpressionSpec,
        right: ExpressionSpec,
    },
    Gte {
        left: ExpressionSpec,
        right: ExpressionSpec,
    },
    Lt {
        left: ExpressionSpec,
        right: ExpressionSpec,
    },
    Lte {
        left: ExpressionSpec,
        right: ExpressionSpec,
    },
    /// Scalar membership in a constant option list.
    In {
        left: ExpressionSpec,
        options: Vec<serde_json::Value>,
    },
}

impl ConditionRule {
    pub fn canonical_key(&self) -> String {
        canonical_of(self)
    }

    /// Visit every ref reachable from this rule.
    pub fn visit_refs<'a>(&'a self, f: &mut impl FnMut(&'a Ref)) {
        match self {
            ConditionRule::And { rules } | ConditionRule::Or { rules } => {
                for r in rules {
                    r.visit_refs(f);
                }
            }
            ConditionRule::Not { rule } => rule.visit_refs(f),
            ConditionRule::Exists { target } => f(target),
            ConditionRule::Eq { left, right }
            | ConditionRule::Neq { left, right }
            | ConditionRule::Gt { left, right }
            | ConditionRule::Gte { left, right }
            | ConditionRule::Lt { left, right }
            | ConditionRule::Lte { left, right } => {
                left.visit_refs(f);
                right.visit_refs(f);
            }
            ConditionRule::In { left, .. } => left.visit_refs(f),
        }
    }
}

fn canonical_of<T: Serialize>(value: &T) -> String {
    // AST types serialize infallibly (no non-string map keys, no
    // non-finite numbers can be constructed through ingest).
    let v = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
    crate::canonical::canonicalize(&v).unwrap_or_default()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_serde_tags() {
        let r = Ref::SelectionRef {
            selection_key: "material".to_string(),
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["kind"], "selectionRef");
        assert_eq!(v["selectionKey"], "material");
        let back: Ref = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn expression_serde_round_trip() {
        let e = ExpressionSpec::Div {
            left: Box::new(ExpressionSpec::of(Ref::EnvRef {
                key: "perimeterIn".to_string(),
            })),
            right: Box::new(ExpressionSpec::number(12.0)),
        };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["op"], "div");
        let back: ExpressionSpec = serde_json::from_value(v).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn condition_if_else_field_names() {
        let e = ExpressionSpec::If {
            cond: Box::new(ExpressionSpec::of(Ref::Constant {
                value: serde_json::json!(true),
            })),
            then: Box::new(ExpressionSpec::number(1.0)),
            otherwise: Box::new(ExpressionSpec::number(2.0)),
        };
        let v = serde_json::to_value(&e).unwrap();
        assert!(v.get("else").is_some());
        assert!(v.get("otherwise").is_none());
    }

    #[test]
    fn canonical_key_insensitive_to_structural_identity() {
        let a = ConditionRule::Eq {
            left: ExpressionSpec::of(Ref::SelectionRef {
                selection_key: "color".to_string(),
            }),
            right: ExpressionSpec::of(Ref::Constant {
                value: serde_json::json!("red"),
            }),
        };
        let b = a.clone();
        assert_eq!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn visit_refs_reaches_all_leaves() {
        let e = ExpressionSpec::Add {
            args: vec![
                ExpressionSpec::of(Ref::EnvRef {
                    key: "quantity".to_string(),
                }),
                ExpressionSpec::Coalesce {
                    args: vec![
                        ExpressionSpec::of(Ref::SelectionRef {
                            selection_key: "spacing".to_string(),
                        }),
                        ExpressionSpec::number(24.0),
                    ],
                },
            ],
        };
        let mut seen = Vec::new();
        e.visit_refs(&mut |r| seen.push(r.kind_name()));
        assert_eq!(seen, vec!["envRef", "selectionRef", "constant"]);
    }
}
