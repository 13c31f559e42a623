use super::{map_column, require_non_empty, to_json, unexpected};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::schema::{DataType, Field, Schema};
use crate::stage::{Estimator, Transformer};
use crate::value::{SparseVector, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Learns a vocabulary from a token column.
///
/// Terms are ranked by corpus frequency (descending, ties broken by term) and
/// the top `vocab_size` terms whose document frequency reaches `min_df` are
/// kept. `min_df` is an absolute document count when `>= 1.0` and a fraction
/// of the documents otherwise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CountVectorizer {
    name: String,
    input_col: String,
    output_col: String,
    vocab_size: usize,
    min_df: f64,
    min_tf: f64,
    binary: bool,
}

impl CountVectorizer {
    pub const KIND: &'static str = "count_vectorizer";

    pub fn new(name: impl Into<String>, input_col: impl Into<String>, output_col: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_col: input_col.into(),
            output_col: output_col.into(),
            vocab_size: 1 << 18,
            min_df: 1.0,
            min_tf: 1.0,
            binary: false,
        }
    }

    pub fn vocab_size(mut self, n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::invalid_parameter(&self.name, "vocab_size must be positive"));
        }
        self.vocab_size = n;
        Ok(self)
    }

    pub fn min_df(mut self, min_df: f64) -> Result<Self> {
        if !min_df.is_finite() || min_df < 0.0 {
            return Err(Error::invalid_parameter(&self.name, "min_df must be a non-negative number"));
        }
        self.min_df = min_df;
        Ok(self)
    }

    pub fn min_tf(mut self, min_tf: f64) -> Result<Self> {
        if !min_tf.is_finite() || min_tf < 0.0 {
            return Err(Error::invalid_parameter(&self.name, "min_tf must be a non-negative number"));
        }
        self.min_tf = min_tf;
        Ok(self)
    }

    #[must_use]
    pub fn binary(mut self, yes: bool) -> Self {
        self.binary = yes;
        self
    }
}

impl Estimator for CountVectorizer {
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
        input.require_type(&self.input_col, &[DataType::StringList])?;
        Ok(input.with_field(Field::new(&self.output_col, DataType::Vector)))
    }

    #[allow(clippy::cast_precision_loss)]
    fn fit(&self, dataset: &Dataset) -> Result<Arc<dyn Transformer>> {
        require_non_empty(&self.name, "output_col", &self.output_col)?;
        self.output_schema(dataset.schema())?;
        if dataset.is_empty() {
            return Err(Error::insufficient_data("cannot build a vocabulary from zero rows"));
        }

        let mut total: HashMap<&str, u64> = HashMap::new();
        let mut doc_freq: HashMap<&str, u64> = HashMap::new();
        let mut docs = 0u64;
        for v in dataset.column(&self.input_col)? {
            let tokens = match v {
                Value::Null => continue,
                Value::List(tokens) => tokens,
                other => return Err(unexpected(&self.input_col, "string_list", other)),
            };
            docs += 1;
            let mut seen: HashSet<&str> = HashSet::new();
            for t in tokens {
                *total.entry(t.as_str()).or_default() += 1;
                if seen.insert(t.as_str()) {
                    *doc_freq.entry(t.as_str()).or_default() += 1;
                }
            }
        }
        if docs == 0 {
            return Err(Error::insufficient_data("every document is null"));
        }

        let min_docs = if self.min_df >= 1.0 {
            self.min_df
        } else {
            self.min_df * docs as f64
        };
        let mut ranked: Vec<(&str, u64)> = total
            .into_iter()
            .filter(|(term, _)| doc_freq.get(term).copied().unwrap_or(0) as f64 >= min_docs)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.vocab_size);
        if ranked.is_empty() {
            return Err(Error::insufficient_data(format!(
                "no term reaches min_df = {} over {docs} documents",
                self.min_df
            )));
        }

        debug!(stage = %self.name, documents = docs, vocabulary = ranked.len(), "vocabulary built");
        Ok(Arc::new(CountVectorizerModel {
            name: self.name.clone(),
            input_col: self.input_col.clone(),
            output_col: self.output_col.clone(),
            vocabulary: ranked.into_iter().map(|(t, _)| t.to_string()).collect(),
            min_tf: self.min_tf,
            binary: self.binary,
        }))
    }

    fn params(&self) -> Json {
        to_json(self)
    }
}

/// Maps tokens onto a fitted vocabulary as term-count vectors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CountVectorizerModel {
    name: String,
    input_col: String,
    output_col: String,
    vocabulary: Vec<String>,
    min_tf: f64,
    binary: bool,
}

impl CountVectorizerModel {
    pub const KIND: &'static str = "count_vectorizer_model";

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    #[allow(clippy::cast_precision_loss)]
    fn vectorize(&self, index: &HashMap<&str, usize>, tokens: &[String]) -> Result<SparseVector> {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for t in tokens {
            if let Some(&i) = index.get(t.as_str()) {
                *counts.entry(i).or_default() += 1.0;
            }
        }
        let min_count = if self.min_tf >= 1.0 {
            self.min_tf
        } else {
            self.min_tf * tokens.len() as f64
        };
        let pairs = counts
            .into_iter()
            .filter(|(_, c)| *c >= min_count)
            .map(|(i, c)| (i, if self.binary { 1.0 } else { c }))
            .collect();
        SparseVector::from_pairs(self.vocabulary.len(), pairs)
    }
}

impl Transformer for CountVectorizerModel {
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
        input.require_type(&self.input_col, &[DataType::StringList])?;
        Ok(input.with_field(Field::new(&self.output_col, DataType::Vector)))
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        self.output_schema(dataset.schema())?;
        let index: HashMap<&str, usize> = self
            .vocabulary
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();
        let out = Field::new(&self.output_col, DataType::Vector);
        map_column(dataset, &self.input_col, out, |v| match v {
            Value::Null => Ok(Value::Null),
            Value::List(tokens) => Ok(Value::Vector(self.vectorize(&index, tokens)?)),
            other => Err(unexpected(&self.input_col, "string_list", other)),
        })
    }

    fn params(&self) -> Json {
        serde_json::json!({
            "input_col": self.input_col,
            "output_col": self.output_col,
            "vocab_size": self.vocabulary.len(),
            "min_tf": self.min_tf,
            "binary": self.binary,
        })
    }

    fn artifact(&self) -> Result<Json> {
        Ok(serde_json::to_value(self)?)
    }
}
