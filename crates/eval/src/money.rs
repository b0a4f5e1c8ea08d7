//! Monetary rounding.
//!
//! All cent rounding goes through `rust_decimal` with
//! `RoundingStrategy::MidpointAwayFromZero` (commercial rounding), at
//! the component level rather than accumulated across steps. The same
//! rule applies at every rounding site so stored prices reproduce
//! byte-for-byte.

use crate::types::EvalError;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// Round a cent amount to the nearest integer cent, ties away from
/// zero. Non-finite inputs are fatal.
pub fn round_cents(amount: f64, path: &str) -> Result<i64, EvalError> {
    if !amount.is_finite() {
        return Err(EvalError::NonFinite {
            path: path.to_string(),
        });
    }
    let d = Decimal::from_f64(amount).ok_or_else(|| EvalError::AmountOverflow {
        path: path.to_string(),
    })?;
    d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| EvalError::AmountOverflow {
            path: path.to_string(),
        })
}
