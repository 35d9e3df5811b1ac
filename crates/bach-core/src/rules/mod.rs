//! Rule expressions: compile once, evaluate per row.
//!
//! A rule is a boolean predicate over report fields such as
//! `clicks > 10 and placement_type = WEBSITE`. Compilation happens when the
//! rule is attached to a pipeline so malformed text is rejected before any
//! report is fetched; evaluation walks the compiled tree for every row.

mod lexer;
mod parser;

pub use parser::{CmpOp, Expr, FieldRef, Matcher, ADS_RULE_SOURCE};

use crate::error::{BachError, Result};
use crate::report::{Row, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// CompiledRule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CompiledRule {
    source: String,
    expr: Expr,
}

/// Compile rule text into an evaluable tree.
pub fn compile(expression: &str) -> Result<CompiledRule> {
    let source = expression.trim().to_string();
    let expr = parser::parse(&source)?;
    Ok(CompiledRule { source, expr })
}

impl CompiledRule {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn fields(&self) -> Vec<&str> {
        self.expr.fields()
    }

    /// Enrichment sources this rule reads, each with the attributes it needs.
    pub fn sources(&self) -> BTreeMap<String, Vec<String>> {
        let mut out = BTreeMap::new();
        collect_sources(self.expr.sourced_fields(), &mut out);
        out
    }

    /// Fail with a binding error if the rule names a field outside `columns`.
    pub fn check_bindings(&self, columns: &[String]) -> Result<()> {
        match self.fields().into_iter().find(|f| !columns.iter().any(|c| c.as_str() == *f)) {
            Some(field) => Err(BachError::Binding {
                rule: self.source.clone(),
                field: field.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn evaluate(&self, row: &Row<'_>) -> Result<bool> {
        eval(&self.expr, row, &self.source)
    }
}

fn eval(expr: &Expr, row: &Row<'_>, rule: &str) -> Result<bool> {
    match expr {
        Expr::Comparison { field, op, literal } => {
            let value = lookup(row, field, rule)?;
            compare(value, *op, literal, rule)
        }
        Expr::Match { field, matcher } => {
            let value = lookup(row, field, rule)?;
            if *value == Value::Null {
                return Ok(false);
            }
            let Some(text) = value.as_str() else {
                return Err(BachError::Type {
                    rule: rule.to_string(),
                    reason: format!(
                        "'{}' is {} but text matching needs a string",
                        field.name,
                        value.type_name()
                    ),
                });
            };
            Ok(match matcher {
                Matcher::Contains(needle) => text.contains(needle.as_str()),
                Matcher::Regexp(re) => re.is_match(text),
            })
        }
        Expr::And(items) => {
            for item in items {
                if !eval(item, row, rule)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Expr::Or(items) => {
            for item in items {
                if eval(item, row, rule)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Expr::Not(inner) => Ok(!eval(inner, row, rule)?),
    }
}

fn lookup<'a>(row: &Row<'a>, field: &FieldRef, rule: &str) -> Result<&'a Value> {
    row.get(&field.name).ok_or_else(|| BachError::Binding {
        rule: rule.to_string(),
        field: field.name.clone(),
    })
}

fn compare(value: &Value, op: CmpOp, literal: &Value, rule: &str) -> Result<bool> {
    let ordering = match (value, literal) {
        // Missing enrichment data satisfies nothing but `!=`.
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => cmp_int_float(*a, *b),
        (Value::Float(a), Value::Int(b)) => cmp_int_float(*b, *a).map(Ordering::reverse),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => {
            return Err(BachError::Type {
                rule: rule.to_string(),
                reason: format!(
                    "cannot compare {} '{value}' with {} '{literal}'",
                    value.type_name(),
                    literal.type_name()
                ),
            })
        }
    };

    // NaN and null cells compare unequal to everything.
    let Some(ordering) = ordering else {
        return Ok(op == CmpOp::Ne);
    };
    Ok(match op {
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Ge => ordering != Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
    })
}

fn collect_sources<'a>(
    fields: impl IntoIterator<Item = &'a FieldRef>,
    out: &mut BTreeMap<String, Vec<String>>,
) {
    for field in fields {
        let Some(source) = &field.source else {
            continue;
        };
        let attributes: &mut Vec<String> = out.entry(source.clone()).or_default();
        if !attributes.contains(&field.attribute) {
            attributes.push(field.attribute.clone());
        }
    }
}

/// Exact ordering of an integer against a float, without rounding the
/// integer through `f64`.
fn cmp_int_float(i: i64, f: f64) -> Option<Ordering> {
    // 2^63 is exactly representable; every finite float below it and at or
    // above -2^63 truncates into i64 range.
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return None;
    }
    if f >= TWO_POW_63 {
        return Some(Ordering::Less);
    }
    if f < -TWO_POW_63 {
        return Some(Ordering::Greater);
    }
    let whole = f.trunc();
    Some(i.cmp(&(whole as i64)).then_with(|| {
        let fraction = f - whole;
        if fraction > 0.0 {
            Ordering::Less
        } else if fraction < 0.0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }))
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// Rules attached to one pipeline, combined with AND.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile and append `expression`. Re-adding identical text is a no-op.
    pub fn add(&mut self, expression: &str) -> Result<()> {
        self.insert(compile(expression)?);
        Ok(())
    }

    /// Append an already compiled rule, skipping duplicates.
    pub fn insert(&mut self, rule: CompiledRule) {
        if !self.rules.iter().any(|r| r.source == rule.source) {
            self.rules.push(rule);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter()
    }

    /// Source text of every rule, in insertion order.
    pub fn expressions(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.source.clone()).collect()
    }

    /// Union of [`CompiledRule::sources`] over every rule.
    pub fn sources(&self) -> BTreeMap<String, Vec<String>> {
        let mut out = BTreeMap::new();
        for rule in &self.rules {
            collect_sources(rule.expr.sourced_fields(), &mut out);
        }
        out
    }

    pub fn check_bindings(&self, columns: &[String]) -> Result<()> {
        self.rules.iter().try_for_each(|r| r.check_bindings(columns))
    }

    pub fn matches(&self, row: &Row<'_>) -> Result<bool> {
        for rule in &self.rules {
            if !rule.evaluate(row)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
