//! Streaming replay of a fitted model over micro-batches.
//!
//! A [`StreamingQuery`] pulls micro-batches from a [`Source`], applies an
//! unmodified [`PipelineModel`](crate::model::PipelineModel) to each one and
//! hands the result to a [`Sink`]. The model carries no state between
//! batches, so the output for batches `B1, B2, B3` equals the output for
//! their concatenation, row for row.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stagewise::PipelineModel;
//! use stagewise::streaming::{FileStreamSource, MemorySink, StreamingQuery};
//! # fn main() -> stagewise::Result<()> {
//! let model = Arc::new(PipelineModel::load("model")?);
//! let source = FileStreamSource::new("incoming", model.input_schema().clone())
//!     .max_files_per_trigger(1)?;
//! let sink = MemorySink::new("predictions");
//! let table = sink.table();
//! let mut query = StreamingQuery::new("reviews", model, source, sink)?
//!     .with_checkpoint("checkpoints/reviews")?;
//! query.process_available()?;
//! println!("{} rows so far", table.num_rows());
//! # Ok(())
//! # }
//! ```

mod offset_log;
mod query;
mod sink;
mod source;

pub use offset_log::{CommitRecord, OffsetLog};
pub use query::{QueryMetrics, QueryProgress, StopHandle, StreamingQuery};
pub use sink::{JsonlSink, MemorySink, MemoryTable, Sink};
pub use source::{FileStreamSource, MemoryStream, MemoryStreamHandle, Source, SourceBatch};
