//! Declared, not-yet-fitted pipelines.
//!
//! ```
//! use stagewise::features::{StopWordsRemover, Tokenizer};
//! use stagewise::{Pipeline, Stage};
//!
//! let pipeline = Pipeline::new()
//!     .stage(Stage::transformer(Tokenizer::new("tokenizer", "Summary", "words")))
//!     .stage(Stage::transformer(StopWordsRemover::new("stop_words", "words", "filtered")));
//! assert_eq!(pipeline.len(), 2);
//! ```

use crate::dataset::Dataset;
use crate::error::Result;
use crate::model::PipelineModel;
use crate::schema::Schema;
use crate::stage::{Stage, Transformer, check_inputs};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span};

/// An ordered sequence of stages.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stages(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Append a stage.
    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Validate the declared stages against `input` without touching data,
    /// returning the final output schema.
    ///
    /// # Errors
    /// `SchemaMismatch` attributed to the first stage whose inputs are missing.
    pub fn output_schema(&self, input: &Schema) -> Result<Schema> {
        let mut schema = input.clone();
        for (i, stage) in self.stages.iter().enumerate() {
            check_inputs(&stage.input_columns(), &schema)
                .and_then(|()| stage.output_schema(&schema))
                .map(|next| schema = next)
                .map_err(|e| e.at_stage(i, stage.name()))?;
        }
        Ok(schema)
    }

    /// Fit every stage in order over `dataset`.
    ///
    /// Each estimator sees the output of all stages before it. The first
    /// failing stage aborts the whole fit; no partial model is returned.
    pub fn fit(&self, dataset: &Dataset) -> Result<PipelineModel> {
        let span = info_span!("pipeline_fit", stages = self.stages.len(), rows = dataset.num_rows());
        let _guard = span.enter();
        let started = Instant::now();

        let mut current = dataset.clone();
        let mut fitted: Vec<Arc<dyn Transformer>> = Vec::with_capacity(self.stages.len());
        let mut boundaries = Vec::with_capacity(self.stages.len());

        for (i, stage) in self.stages.iter().enumerate() {
            let attribute = |e: crate::Error| e.at_stage(i, stage.name());
            check_inputs(&stage.input_columns(), current.schema()).map_err(attribute)?;

            let transformer = match stage {
                Stage::Estimator(estimator) => {
                    debug!(stage = i, name = estimator.name(), kind = estimator.kind(), "fitting estimator");
                    estimator.fit(&current).map_err(attribute)?
                }
                Stage::Transformer(t) => Arc::clone(t),
            };

            let is_last = i + 1 == self.stages.len();
            if is_last {
                // The last stage's output is not needed to fit anything else.
                boundaries.push(transformer.output_schema(current.schema()).map_err(attribute)?);
            } else {
                current = transformer.transform(&current).map_err(attribute)?;
                debug!(stage = i, name = transformer.name(), rows = current.num_rows(), "applied stage");
                boundaries.push(current.schema().clone());
            }
            fitted.push(transformer);
        }

        info!(
            stages = fitted.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "pipeline fitted"
        );
        Ok(PipelineModel::from_parts(
            fitted,
            dataset.schema().clone(),
            boundaries,
        ))
    }

    /// Human-readable description of the declared stages.
    pub fn explain(&self) -> String {
        let mut out = String::from("Pipeline\n");
        for (i, stage) in self.stages.iter().enumerate() {
            let role = if stage.is_estimator() { "estimator" } else { "transformer" };
            let _ = writeln!(
                out,
                "  [{i}] {} ({}, {role}) <- {}",
                stage.name(),
                stage.kind(),
                stage.input_columns().join(", ")
            );
        }
        out
    }
}
