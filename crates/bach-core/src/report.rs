//! Tabular query results.
//!
//! A `Report` is an immutable grid: a fixed column list plus rows holding one
//! typed `Value` per column. Reports travel between pipeline stages by value;
//! filtering produces a new report and never touches the original.

use crate::error::{BachError, Result};
use crate::rules::RuleSet;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single typed cell. `Null` marks an attribute an enrichment source had
/// no data for; it is written as JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

impl Value {
    /// Coerce free text into a value: integer first, then float, then string.
    ///
    /// Non-finite floats (`nan`, `inf`) stay strings.
    pub fn parse_literal(text: &str) -> Value {
        if let Ok(i) = text.parse::<i64>() {
            return Value::Int(i);
        }
        match text.parse::<f64>() {
            Ok(f) if f.is_finite() => Value::Float(f),
            _ => Value::Str(text.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(_) | Value::Null => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Null => "null",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
            Value::Null => Ok(()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// Borrowed view of one report row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c == field)
            .map(|i| &self.values[i])
    }

    /// String value of `field`, or `None` when missing or not a string.
    pub fn get_str(&self, field: &str) -> Option<&'a str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Immutable tabular result. Every row holds exactly one value per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawReport")]
pub struct Report {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct RawReport {
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

impl TryFrom<RawReport> for Report {
    type Error = BachError;

    fn try_from(raw: RawReport) -> Result<Self> {
        Report::new(raw.columns, raw.rows)
    }
}

impl Report {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        for (i, c) in columns.iter().enumerate() {
            if columns[..i].contains(c) {
                return Err(BachError::InvalidReport(format!("duplicate column '{c}'")));
            }
        }
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != columns.len())
        {
            return Err(BachError::InvalidReport(format!(
                "row {i} has {} values but the report has {} columns",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn empty(columns: Vec<String>) -> Result<Self> {
        Self::new(columns, Vec::new())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        self.rows.iter().map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Append `extra`'s columns, renamed `<source>:<column>`, row by row.
    pub fn join(&self, source: &str, extra: Report) -> Result<Report> {
        if extra.len() != self.len() {
            return Err(BachError::InvalidReport(format!(
                "{source} returned {} rows for a report of {}",
                extra.len(),
                self.len()
            )));
        }
        let mut columns = self.columns.clone();
        columns.extend(extra.columns.iter().map(|c| format!("{source}:{c}")));
        let rows = self
            .rows
            .iter()
            .zip(extra.rows)
            .map(|(row, more)| row.iter().cloned().chain(more).collect())
            .collect();
        Report::new(columns, rows)
    }

    /// Keep the rows matching every rule, preserving their relative order.
    ///
    /// Field references are checked against the column set before any row is
    /// evaluated, so a bad reference fails even on an empty report.
    pub fn filter(&self, rules: &RuleSet) -> Result<Report> {
        rules.check_bindings(&self.columns)?;
        let mut kept = Vec::new();
        for row in self.rows() {
            if rules.matches(&row)? {
                kept.push(row.values.to_vec());
            }
        }
        Ok(Report {
            columns: self.columns.clone(),
            rows: kept,
        })
    }
}
