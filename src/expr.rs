//! Declarative row expressions used for filtering.
//!
//! Expressions are plain data: they serialize with serde (so a
//! [`RowFilter`](crate::features::RowFilter) persists inside a model bundle),
//! report the columns they reference, and are type-checked against a schema
//! before any row is evaluated.
//!
//! ```
//! use stagewise::expr::{col, lit};
//!
//! let positive = col("Score").gt(lit(3)).and(col("Summary").is_not_null());
//! assert_eq!(positive.to_string(), "((Score > 3) AND (Summary IS NOT NULL))");
//! ```
//!
//! Null handling follows three-valued logic: comparisons involving null are
//! null, `AND`/`OR` short-circuit on a decisive operand, and a filter keeps
//! only rows whose predicate is exactly `true`.

use crate::dataset::Row;
use crate::error::{Error, Result};
use crate::schema::{DataType, Schema};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Literal {
    fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(DataType::Boolean),
            Self::Int(_) => Some(DataType::Int64),
            Self::Float(_) => Some(DataType::Float64),
            Self::Str(_) => Some(DataType::Utf8),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Float(f) => Value::Float(*f),
            Self::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::NotEq => ord != Ordering::Equal,
            Self::Lt => ord == Ordering::Less,
            Self::LtEq => ord != Ordering::Greater,
            Self::Gt => ord == Ordering::Greater,
            Self::GtEq => ord != Ordering::Less,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    Column {
        name: String,
    },
    Literal {
        value: Literal,
    },
    Compare {
        cmp: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Or {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not {
        expr: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
    },
    IsNotNull {
        expr: Box<Expr>,
    },
}

/// Reference a column by name.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column { name: name.into() }
}

/// A literal value.
pub fn lit(value: impl Into<Literal>) -> Expr {
    Expr::Literal {
        value: value.into(),
    }
}

impl Expr {
    fn compare(self, cmp: CmpOp, other: Self) -> Self {
        Self::Compare {
            cmp,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    #[must_use]
    pub fn eq(self, other: Self) -> Self {
        self.compare(CmpOp::Eq, other)
    }

    #[must_use]
    pub fn not_eq(self, other: Self) -> Self {
        self.compare(CmpOp::NotEq, other)
    }

    #[must_use]
    pub fn lt(self, other: Self) -> Self {
        self.compare(CmpOp::Lt, other)
    }

    #[must_use]
    pub fn lt_eq(self, other: Self) -> Self {
        self.compare(CmpOp::LtEq, other)
    }

    #[must_use]
    pub fn gt(self, other: Self) -> Self {
        self.compare(CmpOp::Gt, other)
    }

    #[must_use]
    pub fn gt_eq(self, other: Self) -> Self {
        self.compare(CmpOp::GtEq, other)
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    #[must_use]
    pub fn is_null(self) -> Self {
        Self::IsNull {
            expr: Box::new(self),
        }
    }

    #[must_use]
    pub fn is_not_null(self) -> Self {
        Self::IsNotNull {
            expr: Box::new(self),
        }
    }

    /// Columns referenced anywhere in the expression, sorted.
    pub fn columns(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Column { name } => {
                out.insert(name.clone());
            }
            Self::Literal { .. } => {}
            Self::Compare { left, right, .. } | Self::And { left, right } | Self::Or { left, right } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Self::Not { expr } | Self::IsNull { expr } | Self::IsNotNull { expr } => {
                expr.collect_columns(out);
            }
        }
    }

    /// Static type of the expression under `schema`; `None` for a bare null literal.
    pub fn data_type(&self, schema: &Schema) -> Result<Option<DataType>> {
        match self {
            Self::Column { name } => Ok(Some(schema.require(name)?.data_type)),
            Self::Literal { value } => Ok(value.data_type()),
            Self::Compare { cmp, left, right } => {
                let (l, r) = (left.data_type(schema)?, right.data_type(schema)?);
                if let (Some(l), Some(r)) = (l, r)
                    && !comparable(l, r)
                {
                    return Err(Error::schema_mismatch(
                        blamed_column(self),
                        format!("cannot be compared: {l} {} {r} in `{self}`", cmp.symbol()),
                    ));
                }
                Ok(Some(DataType::Boolean))
            }
            Self::And { left, right } | Self::Or { left, right } => {
                expect_boolean(left, schema)?;
                expect_boolean(right, schema)?;
                Ok(Some(DataType::Boolean))
            }
            Self::Not { expr } => {
                expect_boolean(expr, schema)?;
                Ok(Some(DataType::Boolean))
            }
            Self::IsNull { expr } | Self::IsNotNull { expr } => {
                expr.data_type(schema)?;
                Ok(Some(DataType::Boolean))
            }
        }
    }

    /// Check that this expression is a well-typed predicate over `schema`.
    pub fn validate_predicate(&self, schema: &Schema) -> Result<()> {
        expect_boolean(self, schema)
    }

    /// Evaluate against a single row.
    pub fn evaluate(&self, row: &Row<'_>) -> Result<Value> {
        match self {
            Self::Column { name } => row
                .get(name)
                .cloned()
                .ok_or_else(|| Error::missing_column(name)),
            Self::Literal { value } => Ok(value.to_value()),
            Self::Compare { cmp, left, right } => {
                let (l, r) = (left.evaluate(row)?, right.evaluate(row)?);
                if l.is_null() || r.is_null() {
                    return Ok(Value::Null);
                }
                let ord = compare_values(&l, &r).ok_or_else(|| {
                    Error::InvalidData(format!(
                        "cannot compare {} with {}",
                        l.type_name(),
                        r.type_name()
                    ))
                })?;
                Ok(Value::Bool(cmp.holds(ord)))
            }
            Self::And { left, right } => {
                let l = truth(&left.evaluate(row)?)?;
                if l == Some(false) {
                    return Ok(Value::Bool(false));
                }
                let r = truth(&right.evaluate(row)?)?;
                Ok(match (l, r) {
                    (_, Some(false)) => Value::Bool(false),
                    (Some(true), Some(true)) => Value::Bool(true),
                    _ => Value::Null,
                })
            }
            Self::Or { left, right } => {
                let l = truth(&left.evaluate(row)?)?;
                if l == Some(true) {
                    return Ok(Value::Bool(true));
                }
                let r = truth(&right.evaluate(row)?)?;
                Ok(match (l, r) {
                    (_, Some(true)) => Value::Bool(true),
                    (Some(false), Some(false)) => Value::Bool(false),
                    _ => Value::Null,
                })
            }
            Self::Not { expr } => Ok(truth(&expr.evaluate(row)?)?.map_or(Value::Null, |b| Value::Bool(!b))),
            Self::IsNull { expr } => Ok(Value::Bool(expr.evaluate(row)?.is_null())),
            Self::IsNotNull { expr } => Ok(Value::Bool(!expr.evaluate(row)?.is_null())),
        }
    }

    /// Evaluate as a filter predicate: only `true` keeps the row.
    pub fn matches(&self, row: &Row<'_>) -> Result<bool> {
        Ok(truth(&self.evaluate(row)?)? == Some(true))
    }
}

impl std::ops::Not for Expr {
    type Output = Self;

    fn not(self) -> Self {
        Self::Not {
            expr: Box::new(self),
        }
    }
}

fn comparable(l: DataType, r: DataType) -> bool {
    (l == r && matches!(l, DataType::Boolean | DataType::Utf8))
        || (l.is_numeric() && r.is_numeric())
}

fn expect_boolean(expr: &Expr, schema: &Schema) -> Result<()> {
    match expr.data_type(schema)? {
        None | Some(DataType::Boolean) => Ok(()),
        Some(other) => Err(Error::schema_mismatch(
            blamed_column(expr),
            format!("makes `{expr}` a {other}, expected boolean"),
        )),
    }
}

/// First column an ill-typed expression reads, or the expression itself.
fn blamed_column(expr: &Expr) -> String {
    expr.columns()
        .into_iter()
        .next()
        .unwrap_or_else(|| expr.to_string())
}

fn truth(v: &Value) -> Result<Option<bool>> {
    match v {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(Error::InvalidData(format!(
            "expected boolean, got {}",
            other.type_name()
        ))),
    }
}

fn compare_values(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => l.as_f64()?.partial_cmp(&r.as_f64()?),
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "'{s}'"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column { name } => write!(f, "{name}"),
            Self::Literal { value } => write!(f, "{value}"),
            Self::Compare { cmp, left, right } => write!(f, "({left} {} {right})", cmp.symbol()),
            Self::And { left, right } => write!(f, "({left} AND {right})"),
            Self::Or { left, right } => write!(f, "({left} OR {right})"),
            Self::Not { expr } => write!(f, "(NOT {expr})"),
            Self::IsNull { expr } => write!(f, "({expr} IS NULL)"),
            Self::IsNotNull { expr } => write!(f, "({expr} IS NOT NULL)"),
        }
    }
}
