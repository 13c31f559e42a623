//! Stage capabilities: pure [`Transformer`]s and fittable [`Estimator`]s.
//!
//! A [`Pipeline`](crate::pipeline::Pipeline) is an ordered list of [`Stage`]s,
//! each of which is one of the two variants. Fitting an estimator yields a
//! transformer; fitting a pipeline yields only transformers.

use crate::dataset::Dataset;
use crate::error::Result;
use crate::schema::Schema;
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;

/// A pure, deterministic dataset-to-dataset function.
///
/// Implementations must not depend on rows other than the one being produced,
/// so that applying a transformer to micro-batches one at a time yields the
/// same rows as applying it to their concatenation.
pub trait Transformer: Send + Sync + fmt::Debug {
    /// Registry key used to decode the persisted artifact.
    fn kind(&self) -> &'static str;

    /// Stage name, unique within a pipeline by convention.
    fn name(&self) -> &str;

    /// Columns that must be present in the input.
    fn input_columns(&self) -> Vec<String>;

    /// Schema produced when applied to `input`.
    ///
    /// # Errors
    /// `SchemaMismatch` when an input column is absent or mistyped.
    fn output_schema(&self, input: &Schema) -> Result<Schema>;

    fn transform(&self, dataset: &Dataset) -> Result<Dataset>;

    /// Configuration parameters, listed in the bundle index.
    fn params(&self) -> Json;

    /// Full persisted state (parameters plus fitted statistics).
    fn artifact(&self) -> Result<Json>;
}

/// A stage that learns a [`Transformer`] from a full dataset.
pub trait Estimator: Send + Sync + fmt::Debug {
    fn kind(&self) -> &'static str;

    fn name(&self) -> &str;

    fn input_columns(&self) -> Vec<String>;

    /// Schema the fitted transformer will produce for `input`.
    fn output_schema(&self, input: &Schema) -> Result<Schema>;

    /// One-shot training over every row of `dataset`.
    ///
    /// # Errors
    /// `InsufficientData` when the statistic cannot be computed.
    fn fit(&self, dataset: &Dataset) -> Result<Arc<dyn Transformer>>;

    fn params(&self) -> Json;
}

/// One declared pipeline step.
#[derive(Clone, Debug)]
pub enum Stage {
    Transformer(Arc<dyn Transformer>),
    Estimator(Arc<dyn Estimator>),
}

impl Stage {
    pub fn transformer(t: impl Transformer + 'static) -> Self {
        Self::Transformer(Arc::new(t))
    }

    pub fn estimator(e: impl Estimator + 'static) -> Self {
        Self::Estimator(Arc::new(e))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Transformer(t) => t.name(),
            Self::Estimator(e) => e.name(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transformer(t) => t.kind(),
            Self::Estimator(e) => e.kind(),
        }
    }

    pub fn input_columns(&self) -> Vec<String> {
        match self {
            Self::Transformer(t) => t.input_columns(),
            Self::Estimator(e) => e.input_columns(),
        }
    }

    pub fn output_schema(&self, input: &Schema) -> Result<Schema> {
        match self {
            Self::Transformer(t) => t.output_schema(input),
            Self::Estimator(e) => e.output_schema(input),
        }
    }

    pub fn is_estimator(&self) -> bool {
        matches!(self, Self::Estimator(_))
    }
}

/// Check that every declared input column of a stage is present.
pub(crate) fn check_inputs(columns: &[String], schema: &Schema) -> Result<()> {
    schema.require_all(columns.iter().map(String::as_str))
}
