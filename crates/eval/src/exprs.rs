//! Expression and condition interpreter.
//!
//! One [`Evaluator`] instance lives for the duration of a single
//! pricing call. COMPUTE outputs are memoized on first demand with an
//! in-progress set, so a dependency cycle surfaces as the fatal
//! dependency-cycle error rather than non-termination; edge conditions
//! evaluated during traversal and the post-traversal compute pass see
//! identical results by construction.
//!
//! Null handling at runtime is a safety net, not the contract: the
//! type checker already forbids nullable operands where they would
//! matter. `exists` is the only null-aware operator; `eq`/`neq` treat
//! NULL = NULL as true; ordering comparisons involving NULL evaluate
//! to false.

use crate::types::{Env, EvalError, Pricebook, Selections, Value};
use pricetree_core::ast::{ConditionRule, ExpressionSpec, Ref};
use pricetree_core::symbols::SymbolTable;
use pricetree_core::tree::Tree;
use std::collections::{BTreeMap, BTreeSet};

pub struct Evaluator<'a> {
    pub tree: &'a Tree,
    pub table: &'a SymbolTable<'a>,
    selections: &'a Selections,
    env: &'a Env,
    pricebook: &'a dyn Pricebook,
    /// COMPUTE node id -> evaluated output value.
    memo: BTreeMap<String, Value>,
    in_progress: BTreeSet<String>,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        tree: &'a Tree,
        table: &'a SymbolTable<'a>,
        selections: &'a Selections,
        env: &'a Env,
        pricebook: &'a dyn Pricebook,
    ) -> Evaluator<'a> {
        Evaluator {
            tree,
            table,
            selections,
            env,
            pricebook,
            memo: BTreeMap::new(),
            in_progress: BTreeSet::new(),
        }
    }

    pub fn env(&self) -> &Env {
        self.env
    }

    // ──────────────────────────────────────────
    // References
    // ──────────────────────────────────────────

    /// A selection's explicit user value, or its declared default.
    fn effective_selection(&self, selection_key: &str) -> Value {
        if let Some(explicit) = self.selections.get(selection_key) {
            if !explicit.is_null() {
                return Value::from_json(explicit);
            }
        }
        match self.table.inputs.get(selection_key).and_then(|s| s.default) {
            Some(default) => Value::from_json(default),
            None => Value::Null,
        }
    }

    fn option_param(&self, selection_key: &str, option_value: &str, param: &str) -> Value {
        let Some(symbol) = self.table.inputs.get(selection_key) else {
            return Value::Null;
        };
        symbol
            .options
            .iter()
            .find(|o| o.value == option_value)
            .and_then(|o| o.params.get(param))
            .map(Value::from_json)
            .unwrap_or(Value::Null)
    }

    pub fn eval_ref(&mut self, target: &Ref, path: &str) -> Result<Value, EvalError> {
        match target {
            Ref::Constant { value } => Ok(Value::from_json(value)),
            Ref::SelectionRef { selection_key } => Ok(self
                .selections
                .get(selection_key)
                .map(Value::from_json)
                .unwrap_or(Value::Null)),
            Ref::EffectiveRef { selection_key } => Ok(self.effective_selection(selection_key)),
            Ref::NodeOutputRef {
                node_id,
                output_key,
            } => self.compute_value(node_id, output_key),
            Ref::EnvRef { key } => self
                .env
                .get(key)
                .map(Value::Number)
                .ok_or_else(|| EvalError::MissingEnv { key: key.clone() }),
            Ref::PricebookRef { item_key } => self
                .pricebook
                .unit_cents(item_key)
                .map(Value::Number)
                .ok_or_else(|| EvalError::PricebookMiss {
                    item_key: item_key.clone(),
                }),
            Ref::OptionParamRef {
                selection_key,
                param,
            } => match self.effective_selection(selection_key) {
                Value::Text(selected) => Ok(self.option_param(selection_key, &selected, param)),
                Value::Null => Ok(Value::Null),
                other => Err(EvalError::TypeError {
                    path: path.to_string(),
                    message: format!(
                        "ENUM selection '{}' resolved to {}, expected TEXT",
                        selection_key,
                        other.type_name()
                    ),
                }),
            },
            Ref::OptionParamOfRef {
                selection_key,
                option_value,
                param,
            } => Ok(self.option_param(selection_key, option_value, param)),
        }
    }

    /// Memoized, cycle-checked evaluation of one COMPUTE output.
    pub fn compute_value(&mut self, node_id: &str, output_key: &str) -> Result<Value, EvalError> {
        if let Some(v) = self.memo.get(node_id) {
            return self.check_output_key(node_id, output_key).map(|_| v.clone());
        }
        if self.in_progress.contains(node_id) {
            return Err(EvalError::ComputeCycle {
                node_id: node_id.to_string(),
            });
        }
        let symbol = self.table.computes.get(node_id).ok_or_else(|| {
            EvalError::UnknownOutput {
                node_id: node_id.to_string(),
                output_key: output_key.to_string(),
            }
        })?;
        if symbol.output_key != output_key {
            return Err(EvalError::UnknownOutput {
                node_id: node_id.to_string(),
                output_key: output_key.to_string(),
            });
        }
        let expression = symbol.expression;
        let owned_id = node_id.to_string();
        self.in_progress.insert(owned_id.clone());
        let path = format!("/nodes/{}/expression", node_id);
        let result = self.eval_expr(expression, &path);
        self.in_progress.remove(&owned_id);
        let value = result?;
        self.memo.insert(owned_id, value.clone());
        Ok(value)
    }

    fn check_output_key(&self, node_id: &str, output_key: &str) -> Result<(), EvalError> {
        match self.table.computes.get(node_id) {
            Some(symbol) if symbol.output_key == output_key => Ok(()),
            _ => Err(EvalError::UnknownOutput {
                node_id: node_id.to_string(),
                output_key: output_key.to_string(),
            }),
        }
    }

    // ──────────────────────────────────────────
    // Expressions
    // ──────────────────────────────────────────

    fn num(&mut self, e: &ExpressionSpec, path: &str) -> Result<f64, EvalError> {
        self.eval_expr(e, path)?.as_number(path)
    }

    fn finish_number(&self, n: f64, path: &str) -> Result<Value, EvalError> {
        if n.is_finite() {
            Ok(Value::Number(n))
        } else {
            Err(EvalError::NonFinite {
                path: path.to_string(),
            })
        }
    }

    /// Ordering comparison; NULL on either side is false.
    fn ordered(
        &mut self,
        left: &ExpressionSpec,
        right: &ExpressionSpec,
        path: &str,
        cmp: fn(f64, f64) -> bool,
    ) -> Result<Value, EvalError> {
        let l = self.eval_expr(left, path)?;
        let r = self.eval_expr(right, path)?;
        if l.is_null() || r.is_null() {
            return Ok(Value::Bool(false));
        }
        Ok(Value::Bool(cmp(l.as_number(path)?, r.as_number(path)?)))
    }

    pub fn eval_expr(&mut self, e: &ExpressionSpec, path: &str) -> Result<Value, EvalError> {
        match e {
            ExpressionSpec::Ref { target } => self.eval_ref(target, path),
            ExpressionSpec::Add { args } => {
                let mut sum = 0.0;
                for (i, a) in args.iter().enumerate() {
                    sum += self.num(a, &format!("{}/args/{}", path, i))?;
                }
                self.finish_number(sum, path)
            }
            ExpressionSpec::Sub { left, right } => {
                let n = self.num(left, path)? - self.num(right, path)?;
                self.finish_number(n, path)
            }
            ExpressionSpec::Mul { args } => {
                let mut product = 1.0;
                for (i, a) in args.iter().enumerate() {
                    product *= self.num(a, &format!("{}/args/{}", path, i))?;
                }
                self.finish_number(product, path)
            }
            ExpressionSpec::Div { left, right } => {
                // Division by zero yields a non-finite result and is
                // fatal; published trees carry guards.
                let n = self.num(left, path)? / self.num(right, path)?;
                self.finish_number(n, path)
            }
            ExpressionSpec::Min { args } => self.fold_numeric(args, path, f64::min),
            ExpressionSpec::Max { args } => self.fold_numeric(args, path, f64::max),
            ExpressionSpec::Clamp { value, lo, hi } => {
                let v = self.num(value, path)?;
                let lo = self.num(lo, path)?;
                let hi = self.num(hi, path)?;
                let clamped = if v < lo {
                    lo
                } else if v > hi {
                    hi
                } else {
                    v
                };
                self.finish_number(clamped, path)
            }
            ExpressionSpec::Ceil { arg } => {
                let n = self.num(arg, path)?.ceil();
                self.finish_number(n, path)
            }
            ExpressionSpec::Floor { arg } => {
                let n = self.num(arg, path)?.floor();
                self.finish_number(n, path)
            }
            ExpressionSpec::Round { arg } => {
                // f64::round ties away from zero, matching cent rounding.
                let n = self.num(arg, path)?.round();
                self.finish_number(n, path)
            }
            ExpressionSpec::Abs { arg } => {
                let n = self.num(arg, path)?.abs();
                self.finish_number(n, path)
            }
            ExpressionSpec::Eq { left, right } => {
                let l = self.eval_expr(left, path)?;
                let r = self.eval_expr(right, path)?;
                Ok(Value::Bool(l.scalar_eq(&r)))
            }
            ExpressionSpec::Neq { left, right } => {
                let l = self.eval_expr(left, path)?;
                let r = self.eval_expr(right, path)?;
                Ok(Value::Bool(!l.scalar_eq(&r)))
            }
            ExpressionSpec::Gt { left, right } => self.ordered(left, right, path, |a, b| a > b),
            ExpressionSpec::Gte { left, right } => self.ordered(left, right, path, |a, b| a >= b),
            ExpressionSpec::Lt { left, right } => self.ordered(left, right, path, |a, b| a < b),
            ExpressionSpec::Lte { left, right } => self.ordered(left, right, path, |a, b| a <= b),
            ExpressionSpec::And { args } => {
                for (i, a) in args.iter().enumerate() {
                    let sub = format!("{}/args/{}", path, i);
                    if !self.eval_expr(a, &sub)?.as_bool(&sub)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            ExpressionSpec::Or { args } => {
                for (i, a) in args.iter().enumerate() {
                    let sub = format!("{}/args/{}", path, i);
                    if self.eval_expr(a, &sub)?.as_bool(&sub)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            ExpressionSpec::Not { arg } => {
                let b = self.eval_expr(arg, path)?.as_bool(path)?;
                Ok(Value::Bool(!b))
            }
            ExpressionSpec::If {
                cond,
                then,
                otherwise,
            } => {
                // Only the taken branch is evaluated; the untaken branch
                // may divide by the guarded value.
                let taken = self.eval_expr(cond, path)?.as_bool(path)?;
                if taken {
                    self.eval_expr(then, &format!("{}/then", path))
                } else {
                    self.eval_expr(otherwise, &format!("{}/else", path))
                }
            }
            ExpressionSpec::Coalesce { args } => {
                for (i, a) in args.iter().enumerate() {
                    let v = self.eval_expr(a, &format!("{}/args/{}", path, i))?;
                    if !v.is_null() {
                        return Ok(v);
                    }
                }
                Ok(Value::Null)
            }
            ExpressionSpec::Exists { target } => {
                let v = self.eval_ref(target, path)?;
                Ok(Value::Bool(!v.is_null()))
            }
            ExpressionSpec::Concat { args } => {
                let mut out = String::new();
                for (i, a) in args.iter().enumerate() {
                    let sub = format!("{}/args/{}", path, i);
                    out.push_str(self.eval_expr(a, &sub)?.as_text(&sub)?);
                }
                Ok(Value::Text(out))
            }
            ExpressionSpec::Strlen { arg } => {
                let n = self.eval_expr(arg, path)?.as_text(path)?.chars().count();
                Ok(Value::Number(n as f64))
            }
        }
    }

    fn fold_numeric(
        &mut self,
        args: &[ExpressionSpec],
        path: &str,
        pick: fn(f64, f64) -> f64,
    ) -> Result<Value, EvalError> {
        let mut iter = args.iter().enumerate();
        let Some((i, first)) = iter.next() else {
            return Err(EvalError::TypeError {
                path: path.to_string(),
                message: "expected at least one argument".to_string(),
            });
        };
        let mut acc = self.num(first, &format!("{}/args/{}", path, i))?;
        for (i, a) in iter {
            acc = pick(acc, self.num(a, &format!("{}/args/{}", path, i))?);
        }
        self.finish_number(acc, path)
    }

    // ──────────────────────────────────────────
    // Conditions
    // ──────────────────────────────────────────

    pub fn eval_condition(&mut self, c: &ConditionRule, path: &str) -> Result<bool, EvalError> {
        match c {
            ConditionRule::And { rules } => {
                for (i, r) in rules.iter().enumerate() {
                    if !self.eval_condition(r, &format!("{}/rules/{}", path, i))? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ConditionRule::Or { rules } => {
                for (i, r) in rules.iter().enumerate() {
                    if self.eval_condition(r, &format!("{}/rules/{}", path, i))? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            ConditionRule::Not { rule } => Ok(!self.eval_condition(rule, path)?),
            ConditionRule::Exists { target } => Ok(!self.eval_ref(target, path)?.is_null()),
            ConditionRule::Eq { left, right } => {
                let l = self.eval_expr(left, path)?;
                let r = self.eval_expr(right, path)?;
                Ok(l.scalar_eq(&r))
            }
            ConditionRule::Neq { left, right } => {
                let l = self.eval_expr(left, path)?;
                let r = self.eval_expr(right, path)?;
                Ok(!l.scalar_eq(&r))
            }
            ConditionRule::Gt { left, right } => self.ordered_cond(left, right, path, |a, b| a > b),
            ConditionRule::Gte { left, right } => {
                self.ordered_cond(left, right, path, |a, b| a >= b)
            }
            ConditionRule::Lt { left, right } => self.ordered_cond(left, right, path, |a, b| a < b),
            ConditionRule::Lte { left, right } => {
                self.ordered_cond(left, right, path, |a, b| a <= b)
            }
            ConditionRule::In { left, options } => {
                let l = self.eval_expr(left, path)?;
                Ok(options.iter().any(|o| l.scalar_eq(&Value::from_json(o))))
            }
        }
    }

    fn ordered_cond(
        &mut self,
        left: &ExpressionSpec,
        right: &ExpressionSpec,
        path: &str,
        cmp: fn(f64, f64) -> bool,
    ) -> Result<bool, EvalError> {
        self.ordered(left, right, path, cmp)?.as_bool(path)
    }
}
