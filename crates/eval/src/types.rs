//! Runtime value model and evaluator inputs/outputs.
//!
//! Expression-land numbers are `f64` (tree JSON carries plain JSON
//! numbers); money leaves expression-land only through
//! [`crate::money::round_cents`], which rounds to integer cents via
//! `rust_decimal`. Any non-finite intermediate is a fatal error.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

// ──────────────────────────────────────────────
// Values
// ──────────────────────────────────────────────

/// A runtime scalar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Text(String),
    /// Structured constant (object/array). Legal only where the type
    /// checker admits JSON.
    Json(serde_json::Value),
    Null,
}

impl Value {
    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Json(other.clone()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "NUMBER",
            Value::Bool(_) => "BOOLEAN",
            Value::Text(_) => "TEXT",
            Value::Json(_) => "JSON",
            Value::Null => "NULL",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self, path: &str) -> Result<f64, EvalError> {
        match self {
            Value::Number(n) if n.is_finite() => Ok(*n),
            Value::Number(_) => Err(EvalError::NonFinite { path: path.to_string() }),
            other => Err(EvalError::TypeError {
                path: path.to_string(),
                message: format!("expected NUMBER, got {}", other.type_name()),
            }),
        }
    }

    pub fn as_bool(&self, path: &str) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(EvalError::TypeError {
                path: path.to_string(),
                message: format!("expected BOOLEAN, got {}", other.type_name()),
            }),
        }
    }

    pub fn as_text(&self, path: &str) -> Result<&str, EvalError> {
        match self {
            Value::Text(s) => Ok(s),
            other => Err(EvalError::TypeError {
                path: path.to_string(),
                message: format!("expected TEXT, got {}", other.type_name()),
            }),
        }
    }

    /// Scalar equality used by eq/neq/in. NULL equals NULL; values of
    /// different base types are never equal.
    pub fn scalar_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            _ => false,
        }
    }
}

// ──────────────────────────────────────────────
// Evaluator inputs
// ──────────────────────────────────────────────

/// Explicit user selections keyed by selection key.
pub type Selections = BTreeMap<String, serde_json::Value>;

/// Numeric environment record (dimensions, quantity, derived values).
/// Extra keys beyond the canonical allowlist are carried but only
/// resolvable when the allowlist admits them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Env {
    values: BTreeMap<String, f64>,
}

impl Env {
    pub fn new() -> Env {
        Env::default()
    }

    /// Standard record derived from physical dimensions in inches.
    pub fn from_dimensions(width_in: f64, height_in: f64, quantity: f64) -> Env {
        let mut env = Env::new();
        env.set("widthIn", width_in);
        env.set("heightIn", height_in);
        env.set("quantity", quantity);
        env.set("sqft", width_in * height_in / 144.0);
        env.set("perimeterIn", 2.0 * (width_in + height_in));
        env
    }

    pub fn set(&mut self, key: &str, value: f64) -> &mut Env {
        self.values.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn quantity(&self) -> f64 {
        self.get("quantity").unwrap_or(0.0)
    }
}

/// External price lookup consulted by `pricebookRef`.
pub trait Pricebook {
    /// Unit price in cents for an item key, if listed.
    fn unit_cents(&self, item_key: &str) -> Option<f64>;
}

/// Empty pricebook; every lookup misses.
pub struct NoPricebook;

impl Pricebook for NoPricebook {
    fn unit_cents(&self, _item_key: &str) -> Option<f64> {
        None
    }
}

/// Discount context supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PricingContext {
    pub customer_tier: Option<String>,
    /// Product-level quantity for PRODUCT_QTY volume triggers; defaults
    /// to the env quantity when absent.
    pub product_qty: Option<f64>,
}

// ──────────────────────────────────────────────
// Evaluator outputs
// ──────────────────────────────────────────────

/// One line of the pricing breakdown. Index 0 is the synthetic base
/// price line when base pricing is configured and non-zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownLine {
    pub label: String,
    pub kind: String,
    pub node_id: Option<String>,
    pub quantity: f64,
    pub unit_price_cents: i64,
    pub amount_cents: i64,
    /// True for components representable but not priced (TIERED).
    pub skipped: bool,
    pub discount: Option<DiscountDebug>,
}

/// Per-step discount trace attached to a breakdown line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountDebug {
    pub base_unit_cents: i64,
    pub tier_adjusted_cents: Option<i64>,
    pub volume_adjusted_cents: Option<i64>,
    pub volume_tier_min_qty: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingResult {
    pub add_on_cents: i64,
    pub breakdown: Vec<BreakdownLine>,
}

/// A derived material consumption for the active configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialEffect {
    pub material_key: String,
    pub quantity: f64,
    pub unit: Option<String>,
    pub node_id: String,
}

/// A proposed child line item for the active configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildItemProposal {
    pub product_key: String,
    pub quantity: f64,
    pub node_id: String,
}

// ──────────────────────────────────────────────
// Fatal errors
// ──────────────────────────────────────────────

/// Hard evaluation failures. These indicate the evaluator was invoked
/// on a tree that should never have passed publish validation; expected
/// domain conditions travel as findings, not here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("dependency cycle through COMPUTE node '{node_id}'")]
    ComputeCycle { node_id: String },
    #[error("non-finite number at {path}")]
    NonFinite { path: String },
    #[error("type error at {path}: {message}")]
    TypeError { path: String, message: String },
    #[error("COMPUTE node '{node_id}' has no output '{output_key}'")]
    UnknownOutput { node_id: String, output_key: String },
    #[error("environment key '{key}' is not present")]
    MissingEnv { key: String },
    #[error("pricebook has no item '{item_key}'")]
    PricebookMiss { item_key: String },
    #[error("PRICE node '{node_id}' component is missing '{field}'")]
    ComponentField { node_id: String, field: String },
    #[error("monetary amount out of range at {path}")]
    AmountOverflow { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_scalars() {
        assert_eq!(Value::from_json(&json!(2.5)), Value::Number(2.5));
        assert_eq!(Value::from_json(&json!("x")), Value::Text("x".to_string()));
        assert_eq!(Value::from_json(&json!(null)), Value::Null);
        assert!(matches!(Value::from_json(&json!({"a": 1})), Value::Json(_)));
    }

    #[test]
    fn scalar_eq_null_and_cross_type() {
        assert!(Value::Null.scalar_eq(&Value::Null));
        assert!(!Value::Number(1.0).scalar_eq(&Value::Text("1".to_string())));
        assert!(!Value::Number(1.0).scalar_eq(&Value::Null));
    }

    #[test]
    fn env_from_dimensions_derives_area_and_perimeter() {
        let env = Env::from_dimensions(24.0, 48.0, 2.0);
        assert_eq!(env.get("sqft"), Some(8.0));
        assert_eq!(env.get("perimeterIn"), Some(144.0));
        assert_eq!(env.quantity(), 2.0);
    }
}
