//! pricetree-core: shared model and static analysis for pricing trees.
//!
//! A pricing tree is a directed graph of typed nodes (INPUT, COMPUTE,
//! PRICE, EFFECT, GROUP) joined by prioritized, optionally conditional
//! edges. This crate owns everything both the evaluator and the
//! validator need to agree on:
//!
//! - [`ingest_tree()`] -- loosely-shaped JSON snapshot into the strict model
//! - AST types: [`ExpressionSpec`], [`ConditionRule`], [`Ref`]
//! - [`build_symbols()`] -- selection and compute-output symbol table
//! - [`resolve()`] -- per-context reference resolution
//! - [`type_check_expr()`] / [`type_check_condition`] -- static types
//!   with nullability
//! - [`canonicalize()`] and [`signature()`] -- deterministic hashing
//!   for evaluation caching
//!
//! Diagnostics are data ([`Finding`]), never panics; callers decide
//! which severities block which lifecycle transitions.

pub mod ast;
pub mod canonical;
pub mod contract;
pub mod finding;
pub mod ingest;
pub mod resolve;
pub mod signature;
pub mod symbols;
pub mod tree;
pub mod typecheck;

// ── Convenience re-exports: key types ────────────────────────────────

pub use ast::{ConditionRule, ExpressionSpec, Ref, ScalarType};
pub use contract::{EnvKeys, EvalContext};
pub use finding::{codes, sort_findings, Finding, Severity};
pub use symbols::SymbolTable;
pub use tree::{Edge, EntityStatus, Node, NodeBody, Tree, TreeStatus};

// ── Convenience re-exports: entry points ─────────────────────────────

pub use canonical::canonicalize;
pub use ingest::{ingest_tree, IngestError};
pub use resolve::resolve;
pub use signature::signature;
pub use symbols::build_symbols;
pub use typecheck::{type_check_condition, type_check_expr, Checked, Inferred};
