//! pricetree-eval: graph evaluator for pricing trees.
//!
//! Pure and synchronous: every entry point is a deterministic function
//! of its (tree, selections, env) inputs, so a stored price reproduces
//! byte-for-byte from a snapshot. Expected domain conditions are
//! handled upstream by validation; the [`EvalError`] variants here are
//! hard failures that indicate the evaluator was invoked on a tree
//! that should never have passed publish validation.
//!
//! Entry points:
//!
//! - [`price()`] / [`price_with()`] -- active-set pricing with
//!   breakdown lines
//! - [`evaluate()`] -- pricing plus derived effects in one pass
//! - [`materials()`] -- derived material consumptions
//! - [`child_item_proposals()`] -- proposed child line items
//! - [`effect_outputs()`] -- named EFFECT node outputs

pub mod active;
pub mod compute;
pub mod discount;
pub mod effects;
pub mod exprs;
pub mod money;
pub mod pricing;
pub mod types;

// ── Convenience re-exports: key types ────────────────────────────────

pub use types::{
    BreakdownLine, ChildItemProposal, DiscountDebug, Env, EvalError, MaterialEffect, NoPricebook,
    Pricebook, PricingContext, PricingResult, Selections, Value,
};

// ── Convenience re-exports: entry points ─────────────────────────────

pub use effects::{child_item_proposals, effect_outputs, materials};
pub use exprs::Evaluator;
pub use pricing::{evaluate, price, price_with, Evaluation, PriceOpts};
