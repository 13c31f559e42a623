//! The immutable, columnar [`Dataset`].
//!
//! A dataset is a [`Schema`] plus one value vector per field. Datasets are
//! never mutated: projection, filtering and column replacement all return a new
//! value, sharing untouched columns through `Arc`.

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::schema::{Field, Schema};
use crate::utils::SplitMix64;
use crate::value::Value;
use comfy_table::{ContentArrangement, Table, presets::ASCII_MARKDOWN};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    schema: Arc<Schema>,
    columns: Vec<Arc<Vec<Value>>>,
    num_rows: usize,
}

/// A borrowed view of one row.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    dataset: &'a Dataset,
    index: usize,
}

impl<'a> Row<'a> {
    /// Value of the named column, `None` if the column does not exist.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        let i = self.dataset.schema.index_of(name)?;
        Some(&self.dataset.columns[i][self.index])
    }

    /// Value at a column position.
    pub fn value(&self, column: usize) -> &'a Value {
        &self.dataset.columns[column][self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn values(&self) -> Vec<Value> {
        self.dataset
            .columns
            .iter()
            .map(|c| c[self.index].clone())
            .collect()
    }
}

impl Dataset {
    /// Build a dataset from columns laid out in schema order.
    pub fn new(schema: Schema, columns: Vec<Vec<Value>>) -> Result<Self> {
        if columns.len() != schema.len() {
            return Err(Error::InvalidData(format!(
                "schema declares {} columns, got {}",
                schema.len(),
                columns.len()
            )));
        }
        let num_rows = columns.first().map_or(0, Vec::len);
        for (field, values) in schema.fields().iter().zip(&columns) {
            check_column(field, values, num_rows)?;
        }
        Ok(Self {
            schema: Arc::new(schema),
            columns: columns.into_iter().map(Arc::new).collect(),
            num_rows,
        })
    }

    /// Build a dataset from row-major values.
    pub fn from_rows(schema: Schema, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); schema.len()];
        for (r, row) in rows.into_iter().enumerate() {
            if row.len() != schema.len() {
                return Err(Error::InvalidData(format!(
                    "row {r} has {} values, schema has {} columns",
                    row.len(),
                    schema.len()
                )));
            }
            for (c, v) in row.into_iter().enumerate() {
                columns[c].push(v);
            }
        }
        Self::new(schema, columns)
    }

    pub fn empty(schema: Schema) -> Self {
        let columns = (0..schema.len()).map(|_| Arc::new(Vec::new())).collect();
        Self {
            schema: Arc::new(schema),
            columns,
            num_rows: 0,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Values of a column that must exist.
    pub fn column(&self, name: &str) -> Result<&[Value]> {
        let i = self
            .schema
            .index_of(name)
            .ok_or_else(|| Error::missing_column(name))?;
        Ok(&self.columns[i])
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        (index < self.num_rows).then_some(Row {
            dataset: self,
            index,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.num_rows).map(move |index| Row {
            dataset: self,
            index,
        })
    }

    /// Row-major copy of the data.
    pub fn to_rows(&self) -> Vec<Vec<Value>> {
        self.rows().map(|r| r.values()).collect()
    }

    /// Projection onto `names`, in that order.
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        let schema = self.schema.project(names)?;
        let columns = names
            .iter()
            .map(|n| {
                let i = self.schema.index_of(n).ok_or_else(|| Error::missing_column(*n))?;
                Ok(Arc::clone(&self.columns[i]))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            schema: Arc::new(schema),
            columns,
            num_rows: self.num_rows,
        })
    }

    /// Rows for which `predicate` is true.
    pub fn filter(&self, predicate: &Expr) -> Result<Self> {
        predicate.validate_predicate(&self.schema)?;
        let mut keep = Vec::new();
        for row in self.rows() {
            if predicate.matches(&row)? {
                keep.push(row.index());
            }
        }
        Ok(self.take(&keep))
    }

    /// Replace the column named by `field`, or append it.
    pub fn with_column(&self, field: Field, values: Vec<Value>) -> Result<Self> {
        check_column(&field, &values, self.num_rows)?;
        let schema = self.schema.with_field(field.clone());
        let mut columns = self.columns.clone();
        let values = Arc::new(values);
        match self.schema.index_of(&field.name) {
            Some(i) => columns[i] = values,
            None => columns.push(values),
        }
        Ok(Self {
            schema: Arc::new(schema),
            columns,
            num_rows: self.num_rows,
        })
    }

    /// A copy without the named columns; unknown names are ignored.
    #[must_use]
    pub fn drop_columns(&self, names: &[&str]) -> Self {
        let schema = self.schema.without(names);
        let columns = self
            .schema
            .fields()
            .iter()
            .zip(&self.columns)
            .filter(|(f, _)| !names.contains(&f.name.as_str()))
            .map(|(_, c)| Arc::clone(c))
            .collect();
        Self {
            schema: Arc::new(schema),
            columns,
            num_rows: self.num_rows,
        }
    }

    /// Rows at the given positions, in the given order.
    #[must_use]
    pub fn take(&self, indices: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| Arc::new(indices.iter().map(|&i| c[i].clone()).collect()))
            .collect();
        Self {
            schema: Arc::clone(&self.schema),
            columns,
            num_rows: indices.len(),
        }
    }

    /// Rows `offset .. offset + len`, clamped to the dataset.
    #[must_use]
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        let start = offset.min(self.num_rows);
        let end = offset.saturating_add(len).min(self.num_rows);
        let indices: Vec<usize> = (start..end).collect();
        self.take(&indices)
    }

    /// Concatenate datasets that share one schema.
    pub fn concat(datasets: &[Self]) -> Result<Self> {
        let Some(first) = datasets.first() else {
            return Err(Error::InvalidData("cannot concatenate zero datasets".into()));
        };
        for (n, d) in datasets.iter().enumerate().skip(1) {
            if d.schema != first.schema {
                return Err(Error::InvalidData(format!(
                    "dataset #{n} has a different schema from dataset #0"
                )));
            }
        }
        let columns = (0..first.num_columns())
            .map(|c| {
                Arc::new(
                    datasets
                        .iter()
                        .flat_map(|d| d.columns[c].iter().cloned())
                        .collect::<Vec<_>>(),
                )
            })
            .collect();
        Ok(Self {
            schema: Arc::clone(&first.schema),
            columns,
            num_rows: datasets.iter().map(Self::num_rows).sum(),
        })
    }

    /// Randomly partition rows by normalized `weights`, reproducibly for a seed.
    pub fn random_split(&self, weights: &[f64], seed: u64) -> Result<Vec<Self>> {
        if weights.is_empty() || weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::InvalidData(
                "split weights must be non-negative and finite".into(),
            ));
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(Error::InvalidData("split weights sum to zero".into()));
        }
        let bounds: Vec<f64> = weights
            .iter()
            .scan(0.0, |acc, w| {
                *acc += w / total;
                Some(*acc)
            })
            .collect();
        let mut rng = SplitMix64::new(seed);
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); weights.len()];
        for i in 0..self.num_rows {
            let x = rng.next_f64();
            let b = bounds.iter().position(|&ub| x < ub).unwrap_or(weights.len() - 1);
            buckets[b].push(i);
        }
        Ok(buckets.iter().map(|idx| self.take(idx)).collect())
    }

    /// Render the first `n` rows as a text table.
    pub fn show(&self, n: usize) -> String {
        let mut table = Table::new();
        table
            .load_preset(ASCII_MARKDOWN)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(self.schema.names());
        for row in self.rows().take(n) {
            table.add_row(row.values().iter().map(ToString::to_string));
        }
        let mut out = table.to_string();
        if self.num_rows > n {
            out.push_str(&format!("\nonly showing top {n} of {} rows", self.num_rows));
        }
        out
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.show(20))
    }
}

fn check_column(field: &Field, values: &[Value], num_rows: usize) -> Result<()> {
    if values.len() != num_rows {
        return Err(Error::InvalidData(format!(
            "column `{}` has {} values, expected {num_rows}",
            field.name,
            values.len()
        )));
    }
    for (r, v) in values.iter().enumerate() {
        if v.is_null() && !field.nullable {
            return Err(Error::InvalidData(format!(
                "null in non-nullable column `{}` at row {r}",
                field.name
            )));
        }
        if !v.conforms_to(field.data_type) {
            return Err(Error::InvalidData(format!(
                "column `{}` is {} but row {r} holds {}",
                field.name,
                field.data_type,
                v.type_name()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataType;

    fn tiny() -> Dataset {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64),
            Field::new("text", DataType::Utf8),
        ])
        .unwrap();
        Dataset::from_rows(
            schema,
            vec![
                vec![1.into(), "a".into()],
                vec![2.into(), "b".into()],
                vec![3.into(), Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_mistyped_values() {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64)]).unwrap();
        let err = Dataset::from_rows(schema, vec![vec!["x".into()]]).unwrap_err();
        assert!(err.to_string().contains("column `id` is int64"));
    }

    #[test]
    fn slice_clamps() {
        let d = tiny();
        assert_eq!(d.slice(1, 10).num_rows(), 2);
        assert_eq!(d.slice(5, 1).num_rows(), 0);
    }

    #[test]
    fn show_mentions_truncation() {
        let out = tiny().show(1);
        assert!(out.contains("only showing top 1 of 3 rows"));
        assert!(out.contains("text"));
    }
}
