use super::{map_column, require_non_empty, to_json, unexpected};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::schema::{DataType, Field, Schema};
use crate::stage::Transformer;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Thresholds a numeric column: `1.0` when the value is strictly greater than
/// `threshold`, `0.0` otherwise. Nulls stay null.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Binarizer {
    name: String,
    input_col: String,
    output_col: String,
    threshold: f64,
}

impl Binarizer {
    pub const KIND: &'static str = "binarizer";

    pub fn new(
        name: impl Into<String>,
        input_col: impl Into<String>,
        output_col: impl Into<String>,
        threshold: f64,
    ) -> Result<Self> {
        let b = Self {
            name: name.into(),
            input_col: input_col.into(),
            output_col: output_col.into(),
            threshold,
        };
        require_non_empty(&b.name, "output_col", &b.output_col)?;
        if !threshold.is_finite() {
            return Err(Error::invalid_parameter(&b.name, "threshold must be finite"));
        }
        Ok(b)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Transformer for Binarizer {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_columns(&self) -> Vec<String> {
        vec![self.input_col.clone()]
    }

    fn output_schema(&self, input: &Schema) -> Result<Schema> {
        input.require_type(&self.input_col, &[DataType::Int64, DataType::Float64])?;
        Ok(input.with_field(Field::new(&self.output_col, DataType::Float64)))
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        self.output_schema(dataset.schema())?;
        let out = Field::new(&self.output_col, DataType::Float64);
        map_column(dataset, &self.input_col, out, |v| {
            if v.is_null() {
                return Ok(Value::Null);
            }
            match v.as_f64() {
                Some(x) => Ok(Value::Float(if x > self.threshold { 1.0 } else { 0.0 })),
                None => Err(unexpected(&self.input_col, "a number", v)),
            }
        })
    }

    fn params(&self) -> Json {
        to_json(self)
    }

    fn artifact(&self) -> Result<Json> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_greater_is_positive() {
        let schema = Schema::new(vec![Field::new("Score", DataType::Int64)]).unwrap();
        let data = Dataset::new(
            schema,
            vec![vec![Value::Int(5), Value::Int(3), Value::Null, Value::Int(1)]],
        )
        .unwrap();
        let out = Binarizer::new("label", "Score", "label", 3.0)
            .unwrap()
            .transform(&data)
            .unwrap();
        assert_eq!(
            out.column("label").unwrap(),
            &[Value::Float(1.0), Value::Float(0.0), Value::Null, Value::Float(0.0)]
        );
    }

    #[test]
    fn rejects_text_input() {
        let schema = Schema::new(vec![Field::new("Score", DataType::Utf8)]).unwrap();
        let data = Dataset::empty(schema);
        let err = Binarizer::new("label", "Score", "label", 3.0)
            .unwrap()
            .transform(&data)
            .unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { ref column, .. } if column == "Score"));
    }
}
