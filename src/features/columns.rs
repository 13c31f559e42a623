use super::to_json;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::schema::Schema;
use crate::stage::Transformer;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashSet;

/// Projects a dataset onto a list of columns, in the listed order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSelector {
    name: String,
    columns: Vec<String>,
}

impl ColumnSelector {
    pub const KIND: &'static str = "column_selector";

    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(Error::invalid_parameter(&name, "select at least one column"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(Error::invalid_parameter(&name, format!("column `{dup}` is selected twice")));
        }
        Ok(Self { name, columns })
    }

    fn names(&self) -> Vec<&str> {
        self.columns.iter().map(String::as_str).collect()
    }
}

impl Transformer for ColumnSelector {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn output_schema(&self, input: &Schema) -> Result<Schema> {
        input.project(&self.names())
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        dataset.select(&self.names())
    }

    fn params(&self) -> Json {
        to_json(self)
    }

    fn artifact(&self) -> Result<Json> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Keeps rows whose predicate evaluates to true; null counts as false.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    name: String,
    predicate: Expr,
}

impl RowFilter {
    pub const KIND: &'static str = "row_filter";

    pub fn new(name: impl Into<String>, predicate: Expr) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }

    pub fn predicate(&self) -> &Expr {
        &self.predicate
    }
}

impl Transformer for RowFilter {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_columns(&self) -> Vec<String> {
        self.predicate.columns().into_iter().collect()
    }

    fn output_schema(&self, input: &Schema) -> Result<Schema> {
        self.predicate.validate_predicate(input)?;
        Ok(input.clone())
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        dataset.filter(&self.predicate)
    }

    fn params(&self) -> Json {
        serde_json::json!({ "predicate": self.predicate.to_string() })
    }

    fn artifact(&self) -> Result<Json> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit};
    use crate::schema::{DataType, Field};
    use crate::value::Value;

    fn reviews() -> Dataset {
        let schema = Schema::new(vec![
            Field::new("Score", DataType::Int64),
            Field::new("Summary", DataType::Utf8),
        ])
        .unwrap();
        Dataset::from_rows(
            schema,
            vec![
                vec![Value::Int(5), Value::from("great")],
                vec![Value::Int(3), Value::Null],
                vec![Value::Null, Value::from("meh")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn filter_drops_null_outcomes() {
        let f = RowFilter::new("neutral", col("Score").not_eq(lit(3)));
        let out = f.transform(&reviews()).unwrap();
        assert_eq!(out.num_rows(), 1);
        assert_eq!(f.input_columns(), vec!["Score".to_string()]);
    }

    #[test]
    fn selector_reorders_and_rejects_duplicates() {
        let s = ColumnSelector::new("pick", ["Summary", "Score"]).unwrap();
        let out = s.transform(&reviews()).unwrap();
        assert_eq!(out.schema().names().collect::<Vec<_>>(), vec!["Summary", "Score"]);
        assert!(ColumnSelector::new("pick", ["Score", "Score"]).is_err());
    }
}
