//! # Stagewise
//!
//! Declarative **fit/transform pipelines** over in-memory tabular datasets.
//! A [`Pipeline`] is an ordered list of stages; fitting it on a training
//! [`Dataset`] produces an immutable [`PipelineModel`] that can be applied to
//! new data, saved to a bundle directory, loaded back, and replayed over a
//! stream of micro-batches.
//!
//! ## Key Features
//!
//! - **Typed, columnar datasets** - schemas with nullable fields, immutable data
//! - **Transformers and estimators** - stateless stages and one-shot aggregations
//! - **Text features** - tokenizers, stop words, term counts, inverse document frequency
//! - **Classification** - gradient-boosted trees with a binary evaluator
//! - **Persistence** - checksummed model bundles with a pluggable stage registry
//! - **Streaming replay** - file and in-memory sources, resumable offset log
//!
//! ## Quick Start
//!
//! ```no_run
//! use stagewise::features::{Binarizer, Tokenizer};
//! use stagewise::io::{FileFormat, read_dataset};
//! use stagewise::{Pipeline, PipelineModel, Schema, Stage};
//!
//! # fn main() -> stagewise::Result<()> {
//! let schema = Schema::load("reviews.schema.json")?;
//! let training = read_dataset("reviews.jsonl", FileFormat::Jsonl, &schema)?;
//!
//! let pipeline = Pipeline::new()
//!     .stage(Stage::transformer(Binarizer::new("label", "Score", "label", 3.0)?))
//!     .stage(Stage::transformer(Tokenizer::new("words", "Summary", "words")));
//!
//! let model = pipeline.fit(&training)?;
//! model.save("model")?;
//!
//! let reloaded = PipelineModel::load("model")?;
//! let scored = reloaded.transform(&training)?;
//! println!("{}", scored.show(5));
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Stages
//!
//! A [`Transformer`] maps a dataset to a dataset, row by row, without state.
//! An [`Estimator`] reads a whole dataset once and returns a fitted
//! transformer. Both declare the columns they consume and the schema they
//! produce, so a pipeline can reject a dataset before doing any work.
//!
//! ### Pipeline and model
//!
//! [`Pipeline::fit`] runs stages strictly in order. Each estimator is fitted on
//! the output of the stages before it, then applied before the next stage
//! runs. The result records one fitted transformer per stage. Missing input
//! columns fail with [`Error::SchemaMismatch`] naming the column and the stage.
//!
//! ### Streaming
//!
//! The [`streaming`] module applies an unmodified model to micro-batches in
//! arrival order. The output for consecutive batches equals the output for
//! their concatenation.
//!
//! ## Feature Flags
//!
//! - `io-csv` - CSV ingestion (default)
//! - `compression-gzip` - transparent `.gz` reading and writing (default)
//! - `compression-zstd` - transparent `.zst` reading and writing (default)
//!
//! ## Module Overview
//!
//! - [`dataset`], [`schema`], [`value`], [`expr`] - data model
//! - [`stage`], [`pipeline`], [`model`], [`registry`] - fit, apply, persist
//! - [`features`], [`classification`], [`evaluation`] - built-in stages and metrics
//! - [`io`] - JSON Lines and CSV reading, compression, globbing
//! - [`streaming`] - micro-batch replay
//! - [`config`], [`logging`] - run-time settings and `tracing` setup
//! - [`testing`] - fixtures and assertions

pub mod classification;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod expr;
pub mod features;
pub mod io;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod schema;
pub mod stage;
pub mod streaming;
pub mod testing;
pub mod value;

mod utils;

pub use dataset::{Dataset, Row};
pub use error::{Error, Result, StageRef};
pub use expr::{Expr, col, lit};
pub use model::{PipelineModel, SaveMode};
pub use pipeline::Pipeline;
pub use registry::StageRegistry;
pub use schema::{DataType, Field, Schema};
pub use stage::{Estimator, Stage, Transformer};
pub use value::{SparseVector, Value};
