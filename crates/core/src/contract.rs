//! Ref & type contract: which reference kinds are legal in which
//! evaluation context, plus constant-literal typing and the env-key
//! allowlist.
//!
//! The allowlist is an explicit value threaded into the symbol-table
//! builder and evaluator rather than a process-wide constant, so
//! multiple tree schemas can coexist in one process.

use crate::ast::{Ref, ScalarType};
use serde::Serialize;

// ──────────────────────────────────────────────
// Evaluation contexts
// ──────────────────────────────────────────────

/// The five places an expression or condition can appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvalContext {
    Input,
    Compute,
    Price,
    Condition,
    Effect,
}

impl EvalContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvalContext::Input => "INPUT",
            EvalContext::Compute => "COMPUTE",
            EvalContext::Price => "PRICE",
            EvalContext::Condition => "CONDITION",
            EvalContext::Effect => "EFFECT",
        }
    }
}

/// Pure legality lookup: `context x refKind -> legal?`.
///
/// INPUT allows only constants. COMPUTE/CONDITION allow everything
/// except pricebook lookups. PRICE/EFFECT additionally allow pricebook
/// lookups. Violations are ERROR findings, never silent fallbacks.
pub fn ref_legal_in_context(r: &Ref, ctx: EvalContext) -> bool {
    match ctx {
        EvalContext::Input => matches!(r, Ref::Constant { .. }),
        EvalContext::Compute | EvalContext::Condition => {
            !matches!(r, Ref::PricebookRef { .. })
        }
        EvalContext::Price | EvalContext::Effect => true,
    }
}

// ──────────────────────────────────────────────
// Constant typing
// ──────────────────────────────────────────────

/// Map a constant literal to its scalar type. Objects and arrays map to
/// JSON; they are rejected wherever only scalars are legal.
pub fn constant_value_to_type(value: &serde_json::Value) -> ScalarType {
    match value {
        serde_json::Value::Null => ScalarType::Null,
        serde_json::Value::Bool(_) => ScalarType::Boolean,
        serde_json::Value::Number(_) => ScalarType::Number,
        serde_json::Value::String(_) => ScalarType::Text,
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => ScalarType::Json,
    }
}

// ──────────────────────────────────────────────
// Environment keys
// ──────────────────────────────────────────────

/// The canonical derived-numeric environment keys.
pub const DEFAULT_ENV_KEYS: [&str; 5] = ["widthIn", "heightIn", "quantity", "sqft", "perimeterIn"];

/// The env-key allowlist in force for one tree schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvKeys {
    keys: Vec<String>,
}

impl EnvKeys {
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        EnvKeys {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

impl Default for EnvKeys {
    fn default() -> Self {
        EnvKeys::new(DEFAULT_ENV_KEYS)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pricebook_ref() -> Ref {
        Ref::PricebookRef {
            item_key: "grommet".to_string(),
        }
    }

    #[test]
    fn input_context_allows_only_constants() {
        let constant = Ref::Constant { value: json!(1) };
        let sel = Ref::SelectionRef {
            selection_key: "x".to_string(),
        };
        assert!(ref_legal_in_context(&constant, EvalContext::Input));
        assert!(!ref_legal_in_context(&sel, EvalContext::Input));
        assert!(!ref_legal_in_context(&pricebook_ref(), EvalContext::Input));
    }

    #[test]
    fn pricebook_only_in_price_and_effect() {
        assert!(!ref_legal_in_context(&pricebook_ref(), EvalContext::Compute));
        assert!(!ref_legal_in_context(
            &pricebook_ref(),
            EvalContext::Condition
        ));
        assert!(ref_legal_in_context(&pricebook_ref(), EvalContext::Price));
        assert!(ref_legal_in_context(&pricebook_ref(), EvalContext::Effect));
    }

    #[test]
    fn compute_allows_graph_refs() {
        let out = Ref::NodeOutputRef {
            node_id: "n1".to_string(),
            output_key: "area".to_string(),
        };
        let env = Ref::EnvRef {
            key: "sqft".to_string(),
        };
        assert!(ref_legal_in_context(&out, EvalContext::Compute));
        assert!(ref_legal_in_context(&env, EvalContext::Condition));
    }

    #[test]
    fn constant_typing() {
        assert_eq!(constant_value_to_type(&json!(null)), ScalarType::Null);
        assert_eq!(constant_value_to_type(&json!(true)), ScalarType::Boolean);
        assert_eq!(constant_value_to_type(&json!(3.5)), ScalarType::Number);
        assert_eq!(constant_value_to_type(&json!("x")), ScalarType::Text);
        assert_eq!(constant_value_to_type(&json!([1])), ScalarType::Json);
        assert_eq!(constant_value_to_type(&json!({"a": 1})), ScalarType::Json);
    }

    #[test]
    fn default_env_keys_fixed_set() {
        let keys = EnvKeys::default();
        for k in DEFAULT_ENV_KEYS {
            assert!(keys.contains(k));
        }
        assert!(!keys.contains("weightLbs"));
    }
}
