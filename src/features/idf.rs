use super::{map_column, to_json, unexpected};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::schema::{DataType, Field, Schema};
use crate::stage::{Estimator, Transformer};
use crate::value::{SparseVector, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::sync::Arc;
use tracing::debug;

/// Learns inverse document frequencies over a term-count vector column.
///
/// For `m` non-null documents and a term seen in `df` of them the weight is
/// `ln((m + 1) / (df + 1))`. Terms seen in fewer than `min_doc_freq`
/// documents get weight zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idf {
    name: String,
    input_col: String,
    output_col: String,
    #[serde(default)]
    min_doc_freq: u64,
}

impl Idf {
    pub const KIND: &'static str = "idf";

    pub fn new(name: impl Into<String>, input_col: impl Into<String>, output_col: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_col: input_col.into(),
            output_col: output_col.into(),
            min_doc_freq: 0,
        }
    }

    #[must_use]
    pub fn min_doc_freq(mut self, n: u64) -> Self {
        self.min_doc_freq = n;
        self
    }
}

impl Estimator for Idf {
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
        input.require_type(&self.input_col, &[DataType::Vector])?;
        Ok(input.with_field(Field::new(&self.output_col, DataType::Vector)))
    }

    #[allow(clippy::cast_precision_loss)]
    fn fit(&self, dataset: &Dataset) -> Result<Arc<dyn Transformer>> {
        self.output_schema(dataset.schema())?;

        let mut size: Option<usize> = None;
        let mut doc_freq: Vec<u64> = Vec::new();
        let mut num_docs = 0u64;
        for v in dataset.column(&self.input_col)? {
            let vector = match v {
                Value::Null => continue,
                Value::Vector(vector) => vector,
                other => return Err(unexpected(&self.input_col, "vector", other)),
            };
            match size {
                None => {
                    size = Some(vector.size);
                    doc_freq = vec![0; vector.size];
                }
                Some(n) if n != vector.size => {
                    return Err(Error::InvalidData(format!(
                        "column `{}` mixes vectors of size {n} and {}",
                        self.input_col, vector.size
                    )));
                }
                Some(_) => {}
            }
            num_docs += 1;
            for (i, x) in vector.iter() {
                if x > 0.0 {
                    doc_freq[i] += 1;
                }
            }
        }
        if num_docs == 0 {
            return Err(Error::insufficient_data("cannot compute document frequencies from zero documents"));
        }

        let m = num_docs as f64;
        let idf = doc_freq
            .iter()
            .map(|&df| {
                if df < self.min_doc_freq {
                    0.0
                } else {
                    ((m + 1.0) / (df as f64 + 1.0)).ln()
                }
            })
            .collect();
        debug!(stage = %self.name, documents = num_docs, terms = doc_freq.len(), "idf fitted");
        Ok(Arc::new(IdfModel {
            name: self.name.clone(),
            input_col: self.input_col.clone(),
            output_col: self.output_col.clone(),
            min_doc_freq: self.min_doc_freq,
            num_docs,
            doc_freq,
            idf,
        }))
    }

    fn params(&self) -> Json {
        to_json(self)
    }
}

/// Scales term counts by fitted inverse document frequencies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdfModel {
    name: String,
    input_col: String,
    output_col: String,
    min_doc_freq: u64,
    num_docs: u64,
    doc_freq: Vec<u64>,
    idf: Vec<f64>,
}

impl IdfModel {
    pub const KIND: &'static str = "idf_model";

    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    pub fn doc_freq(&self) -> &[u64] {
        &self.doc_freq
    }

    pub fn num_docs(&self) -> u64 {
        self.num_docs
    }

    fn scale(&self, vector: &SparseVector) -> Result<SparseVector> {
        if vector.size != self.idf.len() {
            return Err(Error::InvalidData(format!(
                "vector of size {} does not match the fitted size {}",
                vector.size,
                self.idf.len()
            )));
        }
        let pairs = vector.iter().map(|(i, x)| (i, x * self.idf[i])).collect();
        SparseVector::from_pairs(vector.size, pairs)
    }
}

impl Transformer for IdfModel {
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
        input.require_type(&self.input_col, &[DataType::Vector])?;
        Ok(input.with_field(Field::new(&self.output_col, DataType::Vector)))
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        self.output_schema(dataset.schema())?;
        let out = Field::new(&self.output_col, DataType::Vector);
        map_column(dataset, &self.input_col, out, |v| match v {
            Value::Null => Ok(Value::Null),
            Value::Vector(vector) => Ok(Value::Vector(self.scale(vector)?)),
            other => Err(unexpected(&self.input_col, "vector", other)),
        })
    }

    fn params(&self) -> Json {
        serde_json::json!({
            "input_col": self.input_col,
            "output_col": self.output_col,
            "min_doc_freq": self.min_doc_freq,
            "num_docs": self.num_docs,
        })
    }

    fn artifact(&self) -> Result<Json> {
        Ok(serde_json::to_value(self)?)
    }
}
