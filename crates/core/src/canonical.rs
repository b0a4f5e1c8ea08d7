//! Deterministic JSON canonicalization.
//!
//! Recursive serialization with object keys emitted in sorted order and
//! non-finite numbers rejected. Fails closed: a value that cannot be
//! canonicalized yields an error, never a lossy rendering. Key order of
//! the input never affects the output.

use serde_json::Value;
use std::fmt;

/// Errors from canonicalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalError {
    /// A number that is not representable (NaN/Infinity cannot occur in
    /// a parsed `serde_json::Value`, but guarded against regardless).
    NonFiniteNumber { path: String },
}

impl fmt::Display for CanonicalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalError::NonFiniteNumber { path } => {
                write!(f, "non-finite number at {}", path)
            }
        }
    }
}

impl std::error::Error for CanonicalError {}

/// Render a JSON value to its canonical string form.
pub fn canonicalize(value: &Value) -> Result<String, CanonicalError> {
    let mut out = String::new();
    write_value(value, "$", &mut out)?;
    Ok(out)
}

fn write_value(value: &Value, path: &str, out: &mut String) -> Result<(), CanonicalError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(CanonicalError::NonFiniteNumber {
                        path: path.to_owned(),
                    });
                }
            }
            out.push_str(&n.to_string());
        }
        Value::String(s) => {
            // serde_json string escaping is deterministic.
            out.push_str(&Value::String(s.clone()).to_string());
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, &format!("{}[{}]", path, i), out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_value(&map[*key], &format!("{}.{}", path, key), out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
