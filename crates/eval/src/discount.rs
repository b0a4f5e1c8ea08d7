//! Discount engine.
//!
//! Application order is fixed and not configurable: the customer-tier
//! adjustment first, then the volume adjustment, each applied to the
//! running unit price and rounded to integer cents per step. The final
//! amount is quantity times the final unit price, rounded once more.

use crate::money::round_cents;
use crate::types::{DiscountDebug, EvalError};
use pricetree_core::tree::{DiscountConfig, DiscountMethod, VolumeTier, VolumeTrigger};

/// Result of applying a component's discount configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscountOutcome {
    pub unit_price_cents: i64,
    pub amount_cents: i64,
    pub debug: DiscountDebug,
}

/// Apply one method-specific adjustment to a unit price.
fn apply_method(
    unit_cents: i64,
    method: DiscountMethod,
    rate: f64,
    path: &str,
) -> Result<i64, EvalError> {
    match method {
        DiscountMethod::Percent => {
            let pct = rate.clamp(0.0, 100.0);
            round_cents(unit_cents as f64 * (1.0 - pct / 100.0), path)
        }
        DiscountMethod::CentsOff => {
            let off = round_cents(rate, path)?;
            Ok((unit_cents - off).max(0))
        }
        DiscountMethod::Override => Ok(round_cents(rate, path)?.max(0)),
    }
}

/// Pick the eligible volume tier with the highest `minQty` at or below
/// the trigger quantity. Tier-agnostic tiers are eligible for any
/// customer tier; tier-specific tiers only when they match.
fn select_volume_tier<'a>(
    tiers: &'a [VolumeTier],
    trigger_qty: f64,
    customer_tier: Option<&str>,
) -> Option<&'a VolumeTier> {
    tiers
        .iter()
        .filter(|t| t.min_qty <= trigger_qty)
        .filter(|t| match (&t.customer_tier, customer_tier) {
            (None, _) => true,
            (Some(wanted), Some(have)) => wanted == have,
            (Some(_), None) => false,
        })
        .fold(None, |best: Option<&VolumeTier>, t| match best {
            Some(b) if b.min_qty >= t.min_qty => Some(b),
            _ => Some(t),
        })
}

/// Apply a component's discount configuration.
pub fn apply_discount(
    quantity: f64,
    unit_price_cents: i64,
    config: &DiscountConfig,
    customer_tier: Option<&str>,
    product_qty: f64,
    path: &str,
) -> Result<DiscountOutcome, EvalError> {
    let mut unit = unit_price_cents;
    let mut debug = DiscountDebug {
        base_unit_cents: unit_price_cents,
        tier_adjusted_cents: None,
        volume_adjusted_cents: None,
        volume_tier_min_qty: None,
    };

    if config.customer_tier_scope {
        if let Some(tier) = customer_tier {
            if let Some(&rate) = config.tier_rates.get(tier) {
                unit = apply_method(unit, config.method, rate, path)?;
                debug.tier_adjusted_cents = Some(unit);
            }
        }
    }

    if config.volume_scope {
        let trigger_qty = match config.trigger {
            VolumeTrigger::ComponentQty => quantity,
            VolumeTrigger::ProductQty => product_qty,
        };
        if let Some(tier) = select_volume_tier(&config.volume_tiers, trigger_qty, customer_tier) {
            unit = apply_method(unit, config.method, tier.rate, path)?;
            debug.volume_adjusted_cents = Some(unit);
            debug.volume_tier_min_qty = Some(tier.min_qty);
        }
    }

    let amount_cents = round_cents(quantity * unit as f64, path)?;
    Ok(DiscountOutcome {
        unit_price_cents: unit,
        amount_cents,
        debug,
    })
}
