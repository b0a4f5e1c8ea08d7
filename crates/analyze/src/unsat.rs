//! Best-effort UNSAT prover for condition rules.
//!
//! Deliberately incomplete: it proves a condition unsatisfiable only
//! for three patterns — conflicting `eq` constants on the same
//! expression key, disjoint numeric bounds from `gt/gte` + `lt/lte`
//! on the same key, and an `or` whose every branch is UNSAT. Anything
//! it cannot prove is treated as satisfiable. The ambiguity and
//! reachability analyses depend on that asymmetry: a false "SAT" only
//! weakens a warning, a false "UNSAT" would silently drop edges.

use pricetree_core::{ConditionRule, ExpressionSpec, Ref};
use std::collections::BTreeMap;

// ──────────────────────────────────────────────
// Per-key constraint accumulation
// ──────────────────────────────────────────────

/// Accumulated constraints on one expression key within an `and`.
#[derive(Debug, Clone, Default)]
struct KeyConstraints {
    /// Exact value pinned by an `eq` against a constant.
    eq: Option<serde_json::Value>,
    /// Strictest lower bound seen, with strictness flag.
    lower: Option<(f64, bool)>,
    /// Strictest upper bound seen, with strictness flag.
    upper: Option<(f64, bool)>,
    /// Two different `eq` constants were pinned on this key.
    conflicting_eq: bool,
}

impl KeyConstraints {
    fn pin_eq(&mut self, value: &serde_json::Value) {
        match &self.eq {
            Some(existing) if existing != value => self.conflicting_eq = true,
            Some(_) => {}
            None => self.eq = Some(value.clone()),
        }
    }

    fn add_lower(&mut self, bound: f64, strict: bool) {
        let tighter = match self.lower {
            Some((b, s)) => bound > b || (bound == b && strict && !s),
            None => true,
        };
        if tighter {
            self.lower = Some((bound, strict));
        }
    }

    fn add_upper(&mut self, bound: f64, strict: bool) {
        let tighter = match self.upper {
            Some((b, s)) => bound < b || (bound == b && strict && !s),
            None => true,
        };
        if tighter {
            self.upper = Some((bound, strict));
        }
    }

    fn is_unsat(&self) -> bool {
        if self.conflicting_eq {
            return true;
        }
        // A pinned numeric eq outside the accumulated bounds.
        if let Some(serde_json::Value::Number(n)) = &self.eq {
            if let Some(v) = n.as_f64() {
                if let Some((lo, strict)) = self.lower {
                    if v < lo || (strict && v == lo) {
                        return true;
                    }
                }
                if let Some((hi, strict)) = self.upper {
                    if v > hi || (strict && v == hi) {
                        return true;
                    }
                }
            }
        }
        match (self.lower, self.upper) {
            (Some((lo, lo_strict)), Some((hi, hi_strict))) => {
                lo > hi || (lo == hi && (lo_strict || hi_strict))
            }
            _ => false,
        }
    }
}

/// Split a comparison into (key expression, constant), when exactly
/// one side is a constant scalar.
fn keyed_constant<'a>(
    left: &'a ExpressionSpec,
    right: &'a ExpressionSpec,
) -> Option<(&'a ExpressionSpec, &'a serde_json::Value, bool)> {
    match (constant_of(left), constant_of(right)) {
        (None, Some(c)) => Some((left, c, false)),
        (Some(c), None) => Some((right, c, true)),
        _ => None,
    }
}

fn constant_of(expr: &ExpressionSpec) -> Option<&serde_json::Value> {
    match expr {
        ExpressionSpec::Ref {
            target: Ref::Constant { value },
        } => Some(value),
        _ => None,
    }
}

/// Fold one leaf comparison into the constraint map. `flipped` means
/// the constant was on the left, so the comparison direction reverses.
fn absorb(
    constraints: &mut BTreeMap<String, KeyConstraints>,
    rule: &ConditionRule,
) {
    match rule {
        ConditionRule::Eq { left, right } => {
            if let Some((key_expr, constant, _)) = keyed_constant(left, right) {
                constraints
                    .entry(key_expr.canonical_key())
                    .or_default()
                    .pin_eq(constant);
            }
        }
        ConditionRule::Gt { left, right }
        | ConditionRule::Gte { left, right }
        | ConditionRule::Lt { left, right }
        | ConditionRule::Lte { left, right } => {
            let Some((key_expr, constant, flipped)) = keyed_constant(left, right) else {
                return;
            };
            let Some(bound) = constant.as_f64() else {
                return;
            };
            let entry = constraints.entry(key_expr.canonical_key()).or_default();
            let (is_lower, strict) = match rule {
                ConditionRule::Gt { .. } => (!flipped, true),
                ConditionRule::Gte { .. } => (!flipped, false),
                ConditionRule::Lt { .. } => (flipped, true),
                _ => (flipped, false),
            };
            if is_lower {
                entry.add_lower(bound, strict);
            } else {
                entry.add_upper(bound, strict);
            }
        }
        // Not / Exists / In / Neq carry no provable constraints here.
        _ => {}
    }
}

// ──────────────────────────────────────────────
// Entry point
// ──────────────────────────────────────────────

/// True when the condition is provably unsatisfiable. False means
/// "not proven", never "satisfiable".
pub fn provably_unsat(cond: &ConditionRule) -> bool {
    match cond {
        ConditionRule::And { rules } => {
            let mut constraints: BTreeMap<String, KeyConstraints> = BTreeMap::new();
            for rule in rules {
                if provably_unsat(rule) {
                    return true;
                }
                absorb(&mut constraints, rule);
            }
            constraints.values().any(KeyConstraints::is_unsat)
        }
        ConditionRule::Or { rules } => !rules.is_empty() && rules.iter().all(provably_unsat),
        ConditionRule::Eq { .. }
        | ConditionRule::Gt { .. }
        | ConditionRule::Gte { .. }
        | ConditionRule::Lt { .. }
        | ConditionRule::Lte { .. } => {
            // A single comparison can conflict with itself only via the
            // constraint map, e.g. eq pinned against its own bounds —
            // not possible with one rule, so defer to the map path.
            let mut constraints: BTreeMap<String, KeyConstraints> = BTreeMap::new();
            absorb(&mut constraints, cond);
            constraints.values().any(KeyConstraints::is_unsat)
        }
        ConditionRule::Not { .. }
        | ConditionRule::Exists { .. }
        | ConditionRule::Neq { .. }
        | ConditionRule::In { .. } => false,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pricetree_core::{ExpressionSpec, Ref};
    use serde_json::json;

    fn sel(key: &str) -> ExpressionSpec {
        ExpressionSpec::of(Ref::SelectionRef {
            selection_key: key.to_string(),
        })
    }

    fn constant(v: serde_json::Value) -> ExpressionSpec {
        ExpressionSpec::of(Ref::Constant { value: v })
    }

    fn eq(key: &str, v: serde_json::Value) -> ConditionRule {
        ConditionRule::Eq {
            left: sel(key),
            right: constant(v),
        }
    }

    #[test]
    fn conflicting_eq_constants_on_same_key() {
        let cond = ConditionRule::And {
            rules: vec![eq("material", json!("13oz")), eq("material", json!("18oz"))],
        };
        assert!(provably_unsat(&cond));
    }

    #[test]
    fn same_eq_constant_twice_is_sat() {
        let cond = ConditionRule::And {
            rules: vec![eq("material", json!("13oz")), eq("material", json!("13oz"))],
        };
        assert!(!provably_unsat(&cond));
    }

    #[test]
    fn disjoint_numeric_bounds() {
        let cond = ConditionRule::And {
            rules: vec![
                ConditionRule::Gt {
                    left: sel("qty"),
                    right: constant(json!(100)),
                },
                ConditionRule::Lt {
                    left: sel("qty"),
                    right: constant(json!(50)),
                },
            ],
        };
        assert!(provably_unsat(&cond));
    }

    #[test]
    fn touching_bounds_strict_vs_inclusive() {
        let strict = ConditionRule::And {
            rules: vec![
                ConditionRule::Gt {
                    left: sel("qty"),
                    right: constant(json!(10)),
                },
                ConditionRule::Lte {
                    left: sel("qty"),
                    right: constant(json!(10)),
                },
            ],
        };
        assert!(provably_unsat(&strict));

        let inclusive = ConditionRule::And {
            rules: vec![
                ConditionRule::Gte {
                    left: sel("qty"),
                    right: constant(json!(10)),
                },
                ConditionRule::Lte {
                    left: sel("qty"),
                    right: constant(json!(10)),
                },
            ],
        };
        assert!(!provably_unsat(&inclusive));
    }

    #[test]
    fn constant_on_left_flips_direction() {
        // 100 < qty AND qty < 50 is the disjoint case again.
        let cond = ConditionRule::And {
            rules: vec![
                ConditionRule::Lt {
                    left: constant(json!(100)),
                    right: sel("qty"),
                },
                ConditionRule::Lt {
                    left: sel("qty"),
                    right: constant(json!(50)),
                },
            ],
        };
        assert!(provably_unsat(&cond));
    }

    #[test]
    fn eq_outside_bounds() {
        let cond = ConditionRule::And {
            rules: vec![
                eq("qty", json!(5)),
                ConditionRule::Gte {
                    left: sel("qty"),
                    right: constant(json!(10)),
                },
            ],
        };
        assert!(provably_unsat(&cond));
    }

    #[test]
    fn all_unsat_or_branches() {
        let branch = |a: &str, b: &str| ConditionRule::And {
            rules: vec![eq("material", json!(a)), eq("material", json!(b))],
        };
        let cond = ConditionRule::Or {
            rules: vec![branch("a", "b"), branch("c", "d")],
        };
        assert!(provably_unsat(&cond));

        let mixed = ConditionRule::Or {
            rules: vec![branch("a", "b"), eq("material", json!("a"))],
        };
        assert!(!provably_unsat(&mixed));
    }

    #[test]
    fn not_and_in_are_never_proven() {
        let cond = ConditionRule::Not {
            rule: Box::new(eq("x", json!(1))),
        };
        assert!(!provably_unsat(&cond));
        let cond = ConditionRule::In {
            left: sel("x"),
            options: vec![],
        };
        assert!(!provably_unsat(&cond));
    }

    #[test]
    fn empty_or_is_not_proven() {
        // An empty or is an arity error elsewhere; the prover stays out.
        let cond = ConditionRule::Or { rules: vec![] };
        assert!(!provably_unsat(&cond));
    }
}
