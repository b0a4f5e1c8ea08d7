//! Findings -- the sole reporting channel for validation and evaluation
//! diagnostics.
//!
//! Every expected domain problem (bad ref, type mismatch, dangling edge,
//! ambiguous routing) travels as a [`Finding`], never as an opaque error.
//! Callers block publish on any `Error`, treat `Warning`/`Info` as
//! advisory, and rely on the stable sort order for diffable output.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ──────────────────────────────────────────────
// Severity
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }
}

// ──────────────────────────────────────────────
// Finding
// ──────────────────────────────────────────────

/// A structured, severity-tagged diagnostic with a JSON-pointer-like path
/// and optional entity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub code: String,
    pub severity: Severity,
    pub message: String,
    /// JSON-pointer-like path into the tree for UI highlighting,
    /// e.g. `/nodes/n3/expression/args/1`.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Extra machine-readable detail for the UI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl Finding {
    pub fn new(
        code: &str,
        severity: Severity,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Finding {
            code: code.to_owned(),
            severity,
            message: message.into(),
            path: path.into(),
            entity_id: None,
            context: None,
        }
    }

    pub fn error(code: &str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Finding::new(code, Severity::Error, path, message)
    }

    pub fn warning(code: &str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Finding::new(code, Severity::Warning, path, message)
    }

    pub fn info(code: &str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Finding::new(code, Severity::Info, path, message)
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Total order used everywhere findings are returned: severity, then
/// code, then path, then entity id, then message.
pub fn compare_findings(a: &Finding, b: &Finding) -> Ordering {
    a.severity
        .cmp(&b.severity)
        .then_with(|| a.code.cmp(&b.code))
        .then_with(|| a.path.cmp(&b.path))
        .then_with(|| a.entity_id.cmp(&b.entity_id))
        .then_with(|| a.message.cmp(&b.message))
}

/// Sort a finding list into the canonical order.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(compare_findings);
}

// ──────────────────────────────────────────────
// Codes
// ──────────────────────────────────────────────

/// Stable finding codes. `PBV2_E_*` are errors, `PBV2_W_*` warnings,
/// `PBV2_I_*` informational.
pub mod codes {
    // Reference errors
    pub const E_REF_CONTEXT: &str = "PBV2_E_REF_CONTEXT";
    pub const E_REF_PRICEBOOK_CONTEXT: &str = "PBV2_E_REF_PRICEBOOK_CONTEXT";
    pub const E_REF_UNRESOLVED: &str = "PBV2_E_REF_UNRESOLVED";
    pub const E_REF_TARGET_KIND: &str = "PBV2_E_REF_TARGET_KIND";
    pub const E_REF_OUTPUT_KEY: &str = "PBV2_E_REF_OUTPUT_KEY";
    pub const E_REF_ENV_KEY: &str = "PBV2_E_REF_ENV_KEY";
    pub const E_REF_CONSTANT_SCALAR: &str = "PBV2_E_REF_CONSTANT_SCALAR";
    pub const E_REF_OPTION_PARAM: &str = "PBV2_E_REF_OPTION_PARAM";

    // Type errors
    pub const E_TYPE_MISMATCH: &str = "PBV2_E_TYPE_MISMATCH";
    pub const E_TYPE_NULLABLE: &str = "PBV2_E_TYPE_NULLABLE";
    pub const E_TYPE_ARITY: &str = "PBV2_E_TYPE_ARITY";

    // Symbol table
    pub const E_INPUT_TYPE_UNKNOWN: &str = "PBV2_E_INPUT_TYPE_UNKNOWN";
    pub const W_INPUT_KEY_MISSING: &str = "PBV2_W_INPUT_KEY_MISSING";
    pub const E_COMPUTE_OUTPUT_ARITY: &str = "PBV2_E_COMPUTE_OUTPUT_ARITY";
    pub const E_OUTPUT_TYPE_UNKNOWN: &str = "PBV2_E_OUTPUT_TYPE_UNKNOWN";

    // Structural errors
    pub const E_DUPLICATE_ID: &str = "PBV2_E_DUPLICATE_ID";
    pub const E_DUPLICATE_KEY: &str = "PBV2_E_DUPLICATE_KEY";
    pub const E_ROOT_INVALID: &str = "PBV2_E_ROOT_INVALID";
    pub const E_EDGE_ENDPOINT: &str = "PBV2_E_EDGE_ENDPOINT";
    pub const E_EDGE_SELF_LOOP: &str = "PBV2_E_EDGE_SELF_LOOP";
    pub const E_EDGE_PRIORITY: &str = "PBV2_E_EDGE_PRIORITY";
    pub const E_EDGE_STATUS: &str = "PBV2_E_EDGE_STATUS";

    // Graph errors
    pub const E_GRAPH_CYCLE: &str = "PBV2_E_GRAPH_CYCLE";
    pub const E_COMPUTE_CYCLE: &str = "PBV2_E_COMPUTE_CYCLE";
    pub const E_INPUT_UNREACHABLE: &str = "PBV2_E_INPUT_UNREACHABLE";
    pub const E_INPUT_SELF_GATED: &str = "PBV2_E_INPUT_SELF_GATED";
    pub const W_NODE_UNREACHABLE: &str = "PBV2_W_NODE_UNREACHABLE";

    // Pricing errors
    pub const E_COMPONENT_FIELD: &str = "PBV2_E_COMPONENT_FIELD";
    pub const E_EFFECT_QTY_SIGN: &str = "PBV2_E_EFFECT_QTY_SIGN";

    // Safety warnings
    pub const W_AMBIGUOUS_EDGES: &str = "PBV2_W_AMBIGUOUS_EDGES";
    pub const E_AMBIGUOUS_EDGES: &str = "PBV2_E_AMBIGUOUS_EDGES";
    pub const W_DIV_UNGUARDED: &str = "PBV2_W_DIV_UNGUARDED";
    pub const E_DIV_UNGUARDED: &str = "PBV2_E_DIV_UNGUARDED";
    pub const W_DEFAULT_RANGE: &str = "PBV2_W_DEFAULT_RANGE";

    // Ingest
    pub const E_INGEST_SHAPE: &str = "PBV2_E_INGEST_SHAPE";

    // Lifecycle
    pub const E_RESTORE_COLLISION: &str = "PBV2_E_RESTORE_COLLISION";
    pub const E_RESTORE_DANGLING: &str = "PBV2_E_RESTORE_DANGLING";
    pub const E_EVAL_TREE_STATUS: &str = "PBV2_E_EVAL_TREE_STATUS";
    pub const W_EVAL_DRAFT_PREVIEW: &str = "PBV2_W_EVAL_DRAFT_PREVIEW";
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
