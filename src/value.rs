//! Cell values and the sparse vector type used by feature columns.

use crate::error::{Error, Result};
use crate::schema::DataType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};
use std::fmt;

/// A sparse `f64` vector of fixed `size`.
///
/// `indices` are strictly increasing and every index is `< size`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub size: usize,
    pub indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl SparseVector {
    /// Build a vector from `(index, value)` pairs; pairs may arrive unsorted,
    /// duplicates are summed and explicit zeros dropped.
    pub fn from_pairs(size: usize, mut pairs: Vec<(usize, f64)>) -> Result<Self> {
        pairs.sort_by_key(|(i, _)| *i);
        let mut indices = Vec::with_capacity(pairs.len());
        let mut values: Vec<f64> = Vec::with_capacity(pairs.len());
        for (i, v) in pairs {
            if i >= size {
                return Err(Error::InvalidData(format!(
                    "vector index {i} out of bounds for size {size}"
                )));
            }
            if indices.last() == Some(&i) {
                if let Some(last) = values.last_mut() {
                    *last += v;
                }
            } else {
                indices.push(i);
                values.push(v);
            }
        }
        let (indices, values) = indices
            .into_iter()
            .zip(values)
            .filter(|(_, v)| *v != 0.0)
            .unzip();
        Ok(Self {
            size,
            indices,
            values,
        })
    }

    /// Value at `index` (zero when not stored).
    pub fn get(&self, index: usize) -> f64 {
        self.indices
            .binary_search(&index)
            .map_or(0.0, |pos| self.values[pos])
    }

    /// Iterate stored `(index, value)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    fn validate(&self) -> Result<()> {
        if self.indices.len() != self.values.len() {
            return Err(Error::InvalidData(
                "vector indices and values differ in length".into(),
            ));
        }
        if self.indices.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidData(
                "vector indices must be strictly increasing".into(),
            ));
        }
        if self.indices.last().is_some_and(|&i| i >= self.size) {
            return Err(Error::InvalidData(format!(
                "vector index out of bounds for size {}",
                self.size
            )));
        }
        Ok(())
    }
}

/// A single cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
    Vector(SparseVector),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value may be stored in a column of `data_type`.
    /// `Null` conforms to every type; nullability is checked by the schema.
    pub fn conforms_to(&self, data_type: DataType) -> bool {
        matches!(
            (self, data_type),
            (Self::Null, _)
                | (Self::Bool(_), DataType::Boolean)
                | (Self::Int(_), DataType::Int64)
                | (Self::Float(_), DataType::Float64)
                | (Self::Str(_), DataType::Utf8)
                | (Self::List(_), DataType::StringList)
                | (Self::Vector(_), DataType::Vector)
        )
    }

    /// Short type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "int64",
            Self::Float(_) => "float64",
            Self::Str(_) => "utf8",
            Self::List(_) => "string_list",
            Self::Vector(_) => "vector",
        }
    }

    /// Numeric view of `Int` and `Float` values.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&SparseVector> {
        match self {
            Self::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// JSON rendering used by JSON Lines output.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => json!(b),
            Self::Int(i) => json!(i),
            Self::Float(f) => json!(f),
            Self::Str(s) => json!(s),
            Self::List(l) => json!(l),
            Self::Vector(v) => {
                let mut m = Map::new();
                m.insert("size".into(), json!(v.size));
                m.insert("indices".into(), json!(v.indices));
                m.insert("values".into(), json!(v.values));
                Json::Object(m)
            }
        }
    }

    /// Parse a JSON value as a cell of `data_type`.
    ///
    /// Integral JSON numbers are accepted for `float64`; numbers written as
    /// strings are accepted for numeric columns (CSV-style sources).
    #[allow(clippy::cast_precision_loss)]
    pub fn from_json(json: &Json, data_type: DataType) -> Result<Self> {
        let mismatch = || {
            Error::InvalidData(format!("cannot read {json} as {}", data_type.name()))
        };
        Ok(match (json, data_type) {
            (Json::Null, _) => Self::Null,
            (Json::Bool(b), DataType::Boolean) => Self::Bool(*b),
            (Json::Number(n), DataType::Int64) => Self::Int(n.as_i64().ok_or_else(mismatch)?),
            (Json::Number(n), DataType::Float64) => Self::Float(n.as_f64().ok_or_else(mismatch)?),
            (Json::String(s), DataType::Utf8) => Self::Str(s.clone()),
            (Json::String(s), _) => Self::parse_text(s, data_type)?,
            (Json::Array(items), DataType::StringList) => Self::List(
                items
                    .iter()
                    .map(|i| i.as_str().map(str::to_string).ok_or_else(mismatch))
                    .collect::<Result<_>>()?,
            ),
            (Json::Object(_), DataType::Vector) => {
                let v: SparseVector = serde_json::from_value(json.clone())?;
                v.validate()?;
                Self::Vector(v)
            }
            _ => return Err(mismatch()),
        })
    }

    /// Parse a textual field (CSV cell) as `data_type`. Empty text is null.
    pub fn parse_text(text: &str, data_type: DataType) -> Result<Self> {
        let t = text.trim();
        if t.is_empty() && data_type != DataType::Utf8 {
            return Ok(Self::Null);
        }
        let bad = || Error::InvalidData(format!("cannot parse `{text}` as {}", data_type.name()));
        Ok(match data_type {
            DataType::Boolean => match t.to_ascii_lowercase().as_str() {
                "true" | "1" => Self::Bool(true),
                "false" | "0" => Self::Bool(false),
                _ => return Err(bad()),
            },
            DataType::Int64 => Self::Int(t.parse().map_err(|_| bad())?),
            DataType::Float64 => Self::Float(t.parse().map_err(|_| bad())?),
            DataType::Utf8 => Self::Str(text.to_string()),
            DataType::StringList | DataType::Vector => {
                let json: Json = serde_json::from_str(t).map_err(|_| bad())?;
                if json.is_string() {
                    return Err(bad());
                }
                Self::from_json(&json, data_type)?
            }
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::List(l) => write!(f, "[{}]", l.join(", ")),
            Self::Vector(v) => {
                write!(f, "({}, [", v.size)?;
                for (n, (i, x)) in v.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{i}:{x}")?;
                }
                write!(f, "])")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

impl From<SparseVector> for Value {
    fn from(v: SparseVector) -> Self {
        Self::Vector(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_vector_merges_and_drops_zeros() {
        let v = SparseVector::from_pairs(5, vec![(3, 1.0), (1, 2.0), (3, 2.0), (4, 0.0)]).unwrap();
        assert_eq!(v.indices, vec![1, 3]);
        assert_eq!(v.values, vec![2.0, 3.0]);
        assert_eq!(v.get(3), 3.0);
        assert_eq!(v.get(0), 0.0);
    }

    #[test]
    fn sparse_vector_rejects_out_of_bounds() {
        assert!(SparseVector::from_pairs(2, vec![(2, 1.0)]).is_err());
    }

    #[test]
    fn parses_csv_style_numbers() {
        assert_eq!(Value::parse_text("5", DataType::Int64).unwrap(), Value::Int(5));
        assert_eq!(Value::parse_text("", DataType::Int64).unwrap(), Value::Null);
        assert_eq!(
            Value::from_json(&json!(3), DataType::Float64).unwrap(),
            Value::Float(3.0)
        );
        assert!(Value::parse_text("x", DataType::Float64).is_err());
    }
}
