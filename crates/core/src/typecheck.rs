//! Static type checker with nullability tracking.
//!
//! Walks expression and condition trees bottom-up, resolving refs at
//! the leaves and inferring `{type, nullable}` for every interior node.
//! Nullable operands are deliberately rejected by arithmetic,
//! comparison, and logical operators: authors must route them through
//! `coalesce`/`exists` first. That friction is the design, not a bug.

use crate::ast::{ConditionRule, ExpressionSpec, Ref, ScalarType};
use crate::contract::{constant_value_to_type, EvalContext};
use crate::finding::{codes, Finding};
use crate::resolve::resolve;
use crate::symbols::SymbolTable;

// ──────────────────────────────────────────────
// Inference result
// ──────────────────────────────────────────────

/// Inferred static shape of an expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inferred {
    pub ty: ScalarType,
    pub nullable: bool,
    /// True when inference already failed underneath; operators skip
    /// their own checks to avoid cascading noise.
    poisoned: bool,
}

impl Inferred {
    fn of(ty: ScalarType, nullable: bool) -> Self {
        Inferred {
            ty,
            nullable,
            poisoned: false,
        }
    }

    fn poisoned() -> Self {
        Inferred {
            ty: ScalarType::Null,
            nullable: true,
            poisoned: true,
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}

/// Result of checking one expression tree.
#[derive(Debug)]
pub struct Checked {
    pub inferred: Inferred,
    pub findings: Vec<Finding>,
}

impl Checked {
    fn ok(ty: ScalarType, nullable: bool) -> Self {
        Checked {
            inferred: Inferred::of(ty, nullable),
            findings: Vec::new(),
        }
    }

    fn fail(findings: Vec<Finding>) -> Self {
        Checked {
            inferred: Inferred::poisoned(),
            findings,
        }
    }
}

// ──────────────────────────────────────────────
// Ref typing
// ──────────────────────────────────────────────

/// Infer the static shape of a resolved ref.
fn infer_ref(r: &Ref, table: &SymbolTable<'_>, path: &str) -> Checked {
    match r {
        Ref::Constant { value } => {
            let ty = constant_value_to_type(value);
            Checked::ok(ty, ty == ScalarType::Null)
        }
        Ref::SelectionRef { selection_key } => {
            // Raw user value: absent until the user chooses.
            let sym = &table.inputs[selection_key.as_str()];
            Checked::ok(sym.declared, true)
        }
        Ref::EffectiveRef { selection_key } => {
            let sym = &table.inputs[selection_key.as_str()];
            Checked::ok(sym.declared, !sym.has_default)
        }
        Ref::NodeOutputRef { node_id, .. } => {
            let sym = &table.computes[node_id.as_str()];
            Checked::ok(sym.declared, false)
        }
        Ref::EnvRef { .. } => Checked::ok(ScalarType::Number, false),
        Ref::PricebookRef { .. } => Checked::ok(ScalarType::Number, false),
        Ref::OptionParamRef {
            selection_key,
            param,
        } => {
            let sym = &table.inputs[selection_key.as_str()];
            let mut param_nullable = !sym.has_default;
            infer_option_param(
                sym.options.iter().map(|o| o.params.get(param.as_str())),
                &mut param_nullable,
                path,
                selection_key,
                param,
            )
        }
        Ref::OptionParamOfRef {
            selection_key,
            option_value,
            param,
        } => {
            let sym = &table.inputs[selection_key.as_str()];
            let mut param_nullable = false;
            infer_option_param(
                sym.options
                    .iter()
                    .filter(|o| o.value == *option_value)
                    .map(|o| o.params.get(param.as_str())),
                &mut param_nullable,
                path,
                selection_key,
                param,
            )
        }
    }
}

/// Shared typing of option-parameter metadata: the parameter must have
/// one base type across every option that declares it; options that
/// omit it make the ref nullable.
fn infer_option_param<'a>(
    values: impl Iterator<Item = Option<&'a serde_json::Value>>,
    nullable: &mut bool,
    path: &str,
    selection_key: &str,
    param: &str,
) -> Checked {
    let mut base: Option<ScalarType> = None;
    for value in values {
        match value {
            None => *nullable = true,
            Some(v) => {
                let ty = constant_value_to_type(v);
                match base {
                    None => base = Some(ty),
                    Some(b) if b == ty => {}
                    Some(b) => {
                        return Checked::fail(vec![Finding::error(
                            codes::E_TYPE_MISMATCH,
                            path,
                            format!(
                                "parameter '{}' of ENUM input '{}' mixes {} and {} across options",
                                param,
                                selection_key,
                                b.as_str(),
                                ty.as_str()
                            ),
                        )]);
                    }
                }
            }
        }
    }
    match base {
        Some(ty) => Checked::ok(ty, *nullable),
        // Resolver guarantees at least one option declares the param;
        // absent here only for OptionParamOfRef on an omitting option.
        None => Checked::ok(ScalarType::Null, true),
    }
}

// ──────────────────────────────────────────────
// Expression checking
// ──────────────────────────────────────────────

/// Type-check an expression in the given context.
pub fn type_check_expr(
    expr: &ExpressionSpec,
    ctx: EvalContext,
    table: &SymbolTable<'_>,
    path: &str,
) -> Checked {
    match expr {
        ExpressionSpec::Ref { target } | ExpressionSpec::Exists { target } => {
            let ref_findings = resolve(target, ctx, table, path);
            if !ref_findings.is_empty() {
                return Checked::fail(ref_findings);
            }
            match expr {
                ExpressionSpec::Exists { .. } => Checked::ok(ScalarType::Boolean, false),
                _ => infer_ref(target, table, path),
            }
        }

        ExpressionSpec::Add { args } | ExpressionSpec::Mul { args } => {
            check_numeric_nary(args, 2, ctx, table, path)
        }
        ExpressionSpec::Min { args } | ExpressionSpec::Max { args } => {
            check_numeric_nary(args, 1, ctx, table, path)
        }

        ExpressionSpec::Sub { left, right } | ExpressionSpec::Div { left, right } => {
            let mut findings = Vec::new();
            let l = type_check_expr(left, ctx, table, &format!("{}/left", path));
            let r = type_check_expr(right, ctx, table, &format!("{}/right", path));
            findings.extend(l.findings);
            findings.extend(r.findings);
            require_number(&l.inferred, &format!("{}/left", path), &mut findings);
            require_number(&r.inferred, &format!("{}/right", path), &mut findings);
            finish_numeric(findings)
        }

        ExpressionSpec::Clamp { value, lo, hi } => {
            let mut findings = Vec::new();
            for (sub, name) in [(value, "value"), (lo, "lo"), (hi, "hi")] {
                let sub_path = format!("{}/{}", path, name);
                let c = type_check_expr(sub, ctx, table, &sub_path);
                findings.extend(c.findings);
                require_number(&c.inferred, &sub_path, &mut findings);
            }
            finish_numeric(findings)
        }

        ExpressionSpec::Ceil { arg }
        | ExpressionSpec::Floor { arg }
        | ExpressionSpec::Round { arg }
        | ExpressionSpec::Abs { arg } => {
            let sub_path = format!("{}/arg", path);
            let c = type_check_expr(arg, ctx, table, &sub_path);
            let mut findings = c.findings;
            require_number(&c.inferred, &sub_path, &mut findings);
            finish_numeric(findings)
        }

        ExpressionSpec::Eq { left, right } | ExpressionSpec::Neq { left, right } => {
            let mut findings = Vec::new();
            check_equality_operands(left, right, ctx, table, path, &mut findings);
            finish_boolean(findings)
        }

        ExpressionSpec::Gt { left, right }
        | ExpressionSpec::Gte { left, right }
        | ExpressionSpec::Lt { left, right }
        | ExpressionSpec::Lte { left, right } => {
            let mut findings = Vec::new();
            let l = type_check_expr(left, ctx, table, &format!("{}/left", path));
            let r = type_check_expr(right, ctx, table, &format!("{}/right", path));
            findings.extend(l.findings);
            findings.extend(r.findings);
            require_number(&l.inferred, &format!("{}/left", path), &mut findings);
            require_number(&r.inferred, &format!("{}/right", path), &mut findings);
            finish_boolean(findings)
        }

        ExpressionSpec::And { args } | ExpressionSpec::Or { args } => {
            let mut findings = Vec::new();
            if args.len() < 2 {
                findings.push(arity_error(path, 2, args.len()));
            }
            for (i, arg) in args.iter().enumerate() {
                let sub_path = format!("{}/args/{}", path, i);
                let c = type_check_expr(arg, ctx, table, &sub_path);
                findings.extend(c.findings);
                require_boolean(&c.inferred, &sub_path, &mut findings);
            }
            finish_boolean(findings)
        }

        ExpressionSpec::Not { arg } => {
            let sub_path = format!("{}/arg", path);
            let c = type_check_expr(arg, ctx, table, &sub_path);
            let mut findings = c.findings;
            require_boolean(&c.inferred, &sub_path, &mut findings);
            finish_boolean(findings)
        }

        ExpressionSpec::If {
            cond,
            then,
            otherwise,
        } => {
            let mut findings = Vec::new();
            let c = type_check_expr(cond, ctx, table, &format!("{}/cond", path));
            findings.extend(c.findings);
            require_boolean(&c.inferred, &format!("{}/cond", path), &mut findings);

            let t = type_check_expr(then, ctx, table, &format!("{}/then", path));
            let e = type_check_expr(otherwise, ctx, table, &format!("{}/else", path));
            findings.extend(t.findings);
            findings.extend(e.findings);

            let inferred = merge_branches(t.inferred, e.inferred, path, &mut findings);
            Checked { inferred, findings }
        }

        ExpressionSpec::Coalesce { args } => {
            let mut findings = Vec::new();
            if args.is_empty() {
                findings.push(arity_error(path, 1, 0));
                return Checked::fail(findings);
            }
            let mut base: Option<ScalarType> = None;
            let mut any_non_nullable = false;
            let mut poisoned = false;
            for (i, arg) in args.iter().enumerate() {
                let sub_path = format!("{}/args/{}", path, i);
                let c = type_check_expr(arg, ctx, table, &sub_path);
                findings.extend(c.findings);
                if c.inferred.is_poisoned() {
                    poisoned = true;
                    continue;
                }
                if !c.inferred.nullable {
                    any_non_nullable = true;
                }
                if c.inferred.ty == ScalarType::Null {
                    continue;
                }
                match base {
                    None => base = Some(c.inferred.ty),
                    Some(b) if b == c.inferred.ty => {}
                    Some(b) => {
                        findings.push(Finding::error(
                            codes::E_TYPE_MISMATCH,
                            &sub_path,
                            format!(
                                "coalesce arguments mix {} and {}",
                                b.as_str(),
                                c.inferred.ty.as_str()
                            ),
                        ));
                        poisoned = true;
                    }
                }
            }
            if poisoned || base.is_none() {
                return Checked {
                    inferred: Inferred::poisoned(),
                    findings,
                };
            }
            Checked {
                inferred: Inferred::of(base.unwrap_or(ScalarType::Null), !any_non_nullable),
                findings,
            }
        }

        ExpressionSpec::Concat { args } => {
            let mut findings = Vec::new();
            if args.is_empty() {
                findings.push(arity_error(path, 1, 0));
            }
            for (i, arg) in args.iter().enumerate() {
                let sub_path = format!("{}/args/{}", path, i);
                let c = type_check_expr(arg, ctx, table, &sub_path);
                findings.extend(c.findings);
                require_text(&c.inferred, &sub_path, &mut findings);
            }
            if findings.iter().any(Finding::is_error) {
                Checked::fail(findings)
            } else {
                Checked {
                    inferred: Inferred::of(ScalarType::Text, false),
                    findings,
                }
            }
        }

        ExpressionSpec::Strlen { arg } => {
            let sub_path = format!("{}/arg", path);
            let c = type_check_expr(arg, ctx, table, &sub_path);
            let mut findings = c.findings;
            require_text(&c.inferred, &sub_path, &mut findings);
            finish_numeric(findings)
        }
    }
}

fn check_numeric_nary(
    args: &[ExpressionSpec],
    min_arity: usize,
    ctx: EvalContext,
    table: &SymbolTable<'_>,
    path: &str,
) -> Checked {
    let mut findings = Vec::new();
    if args.len() < min_arity {
        findings.push(arity_error(path, min_arity, args.len()));
    }
    for (i, arg) in args.iter().enumerate() {
        let sub_path = format!("{}/args/{}", path, i);
        let c = type_check_expr(arg, ctx, table, &sub_path);
        findings.extend(c.findings);
        require_number(&c.inferred, &sub_path, &mut findings);
    }
    finish_numeric(findings)
}

/// Branch merge for `if`: identical base types, or one NULL-typed
/// branch adopting the other's base with nullability forced on.
fn merge_branches(
    t: Inferred,
    e: Inferred,
    path: &str,
    findings: &mut Vec<Finding>,
) -> Inferred {
    if t.is_poisoned() || e.is_poisoned() {
        return Inferred::poisoned();
    }
    let nullable = t.nullable || e.nullable;
    if t.ty == e.ty {
        return Inferred::of(t.ty, nullable);
    }
    if t.ty == ScalarType::Null {
        return Inferred::of(e.ty, true);
    }
    if e.ty == ScalarType::Null {
        return Inferred::of(t.ty, true);
    }
    findings.push(Finding::error(
        codes::E_TYPE_MISMATCH,
        path,
        format!(
            "if branches must share a base type; found {} and {}",
            t.ty.as_str(),
            e.ty.as_str()
        ),
    ));
    Inferred::poisoned()
}

fn check_equality_operands(
    left: &ExpressionSpec,
    right: &ExpressionSpec,
    ctx: EvalContext,
    table: &SymbolTable<'_>,
    path: &str,
    findings: &mut Vec<Finding>,
) {
    let l = type_check_expr(left, ctx, table, &format!("{}/left", path));
    let r = type_check_expr(right, ctx, table, &format!("{}/right", path));
    findings.extend(l.findings);
    findings.extend(r.findings);
    if l.inferred.is_poisoned() || r.inferred.is_poisoned() {
        return;
    }
    for (inf, side) in [(&l.inferred, "left"), (&r.inferred, "right")] {
        if inf.nullable {
            findings.push(Finding::error(
                codes::E_TYPE_NULLABLE,
                format!("{}/{}", path, side),
                "equality operand may be null; wrap it in coalesce or test with exists first",
            ));
        }
    }
    if l.inferred.ty != r.inferred.ty {
        findings.push(Finding::error(
            codes::E_TYPE_MISMATCH,
            path,
            format!(
                "cannot compare {} with {}",
                l.inferred.ty.as_str(),
                r.inferred.ty.as_str()
            ),
        ));
    }
}

// ──────────────────────────────────────────────
// Condition checking
// ──────────────────────────────────────────────

/// Type-check a condition rule. Conditions type as BOOLEAN; this
/// returns only the findings.
pub fn type_check_condition(
    cond: &ConditionRule,
    ctx: EvalContext,
    table: &SymbolTable<'_>,
    path: &str,
) -> Vec<Finding> {
    match cond {
        ConditionRule::And { rules } | ConditionRule::Or { rules } => {
            let mut findings = Vec::new();
            if rules.len() < 2 {
                findings.push(arity_error(path, 2, rules.len()));
            }
            for (i, rule) in rules.iter().enumerate() {
                findings.extend(type_check_condition(
                    rule,
                    ctx,
                    table,
                    &format!("{}/rules/{}", path, i),
                ));
            }
            findings
        }
        ConditionRule::Not { rule } => {
            type_check_condition(rule, ctx, table, &format!("{}/rule", path))
        }
        ConditionRule::Exists { target } => resolve(target, ctx, table, path),
        ConditionRule::Eq { left, right } | ConditionRule::Neq { left, right } => {
            let mut findings = Vec::new();
            check_equality_operands(left, right, ctx, table, path, &mut findings);
            findings
        }
        ConditionRule::Gt { left, right }
        | ConditionRule::Gte { left, right }
        | ConditionRule::Lt { left, right }
        | ConditionRule::Lte { left, right } => {
            let mut findings = Vec::new();
            let l = type_check_expr(left, ctx, table, &format!("{}/left", path));
            let r = type_check_expr(right, ctx, table, &format!("{}/right", path));
            findings.extend(l.findings);
            findings.extend(r.findings);
            require_number(&l.inferred, &format!("{}/left", path), &mut findings);
            require_number(&r.inferred, &format!("{}/right", path), &mut findings);
            findings
        }
        ConditionRule::In { left, options } => {
            let mut findings = Vec::new();
            let l = type_check_expr(left, ctx, table, &format!("{}/left", path));
            findings.extend(l.findings);
            if l.inferred.is_poisoned() {
                return findings;
            }
            if l.inferred.nullable {
                findings.push(Finding::error(
                    codes::E_TYPE_NULLABLE,
                    format!("{}/left", path),
                    "in-operand may be null; wrap it in coalesce or test with exists first",
                ));
            }
            for (i, option) in options.iter().enumerate() {
                let ty = constant_value_to_type(option);
                if ty != l.inferred.ty {
                    findings.push(Finding::error(
                        codes::E_TYPE_MISMATCH,
                        format!("{}/options/{}", path, i),
                        format!(
                            "in-option is {} but the operand is {}",
                            ty.as_str(),
                            l.inferred.ty.as_str()
                        ),
                    ));
                }
            }
            findings
        }
    }
}

// ──────────────────────────────────────────────
// Operand requirements
// ──────────────────────────────────────────────

fn require_number(inf: &Inferred, path: &str, findings: &mut Vec<Finding>) {
    if inf.is_poisoned() {
        return;
    }
    if inf.ty != ScalarType::Number {
        findings.push(Finding::error(
            codes::E_TYPE_MISMATCH,
            path,
            format!("expected NUMBER, found {}", inf.ty.as_str()),
        ));
    } else if inf.nullable {
        findings.push(Finding::error(
            codes::E_TYPE_NULLABLE,
            path,
            "numeric operand may be null; wrap it in coalesce or test with exists first",
        ));
    }
}

fn require_boolean(inf: &Inferred, path: &str, findings: &mut Vec<Finding>) {
    if inf.is_poisoned() {
        return;
    }
    if inf.ty != ScalarType::Boolean {
        findings.push(Finding::error(
            codes::E_TYPE_MISMATCH,
            path,
            format!("expected BOOLEAN, found {}", inf.ty.as_str()),
        ));
    } else if inf.nullable {
        findings.push(Finding::error(
            codes::E_TYPE_NULLABLE,
            path,
            "boolean operand may be null; wrap it in coalesce or test with exists first",
        ));
    }
}

fn require_text(inf: &Inferred, path: &str, findings: &mut Vec<Finding>) {
    if inf.is_poisoned() {
        return;
    }
    if inf.ty != ScalarType::Text {
        findings.push(Finding::error(
            codes::E_TYPE_MISMATCH,
            path,
            format!("expected TEXT, found {}", inf.ty.as_str()),
        ));
    } else if inf.nullable {
        findings.push(Finding::error(
            codes::E_TYPE_NULLABLE,
            path,
            "text operand may be null; wrap it in coalesce or test with exists first",
        ));
    }
}

fn arity_error(path: &str, min: usize, got: usize) -> Finding {
    Finding::error(
        codes::E_TYPE_ARITY,
        path,
        format!("operator requires at least {} operand(s), found {}", min, got),
    )
}

fn finish_numeric(findings: Vec<Finding>) -> Checked {
    if findings.iter().any(Finding::is_error) {
        Checked::fail(findings)
    } else {
        Checked {
            inferred: Inferred::of(ScalarType::Number, false),
            findings,
        }
    }
}

fn finish_boolean(findings: Vec<Finding>) -> Checked {
    if findings.iter().any(Finding::is_error) {
        Checked::fail(findings)
    } else {
        Checked {
            inferred: Inferred::of(ScalarType::Boolean, false),
            findings,
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
