//! Run-time settings for streaming replay.
//!
//! [`StreamingConfig`] can be read from a JSON file; every field has a
//! default, so a file only lists what it changes:
//!
//! ```json
//! { "source_dir": "incoming", "pattern": "*.jsonl.gz", "max_files_per_trigger": 2 }
//! ```
//!
//! [`StreamingConfig::build_query`] turns a config into a ready
//! [`StreamingQuery`]: the model comes from `model_dir`, results go to
//! `output_dir` (or to memory), and progress is checkpointed under
//! `checkpoint_dir` when it is set.

use crate::error::{Error, Result};
use crate::io::FileFormat;
use crate::model::PipelineModel;
use crate::schema::Schema;
use crate::streaming::{FileStreamSource, JsonlSink, MemorySink, MemoryTable, StreamingQuery};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// How [`StreamingQuery::run`](crate::streaming::StreamingQuery::run) polls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOptions {
    /// Pause between polls that found nothing.
    pub trigger_interval: Duration,
    pub max_batches: Option<u64>,
    /// Return as soon as a poll finds nothing instead of waiting.
    pub stop_when_idle: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            trigger_interval: Duration::from_millis(500),
            max_batches: None,
            stop_when_idle: false,
        }
    }
}

impl RunOptions {
    #[must_use]
    pub fn trigger_interval(mut self, interval: Duration) -> Self {
        self.trigger_interval = interval;
        self
    }

    #[must_use]
    pub fn max_batches(mut self, n: u64) -> Self {
        self.max_batches = Some(n);
        self
    }

    #[must_use]
    pub fn stop_when_idle(mut self, yes: bool) -> Self {
        self.stop_when_idle = yes;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamingConfig {
    pub source_dir: PathBuf,
    pub pattern: String,
    pub format: FileFormat,
    pub max_files_per_trigger: Option<usize>,
    /// Offset log location; `None` runs without a checkpoint.
    pub checkpoint_dir: Option<PathBuf>,
    /// Where a [`JsonlSink`] writes; `None` keeps results in a [`MemorySink`].
    pub output_dir: Option<PathBuf>,
    /// Saved model bundle read by [`StreamingConfig::build_query`].
    pub model_dir: Option<PathBuf>,
    pub trigger_interval_ms: u64,
    pub max_batches: Option<u64>,
    pub stop_when_idle: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("incoming"),
            pattern: "*.jsonl".to_string(),
            format: FileFormat::Jsonl,
            max_files_per_trigger: None,
            checkpoint_dir: None,
            output_dir: None,
            model_dir: None,
            trigger_interval_ms: 500,
            max_batches: None,
            stop_when_idle: false,
        }
    }
}

impl StreamingConfig {
    /// # Errors
    /// `Serialization` when the file is unreadable or not a valid config.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::serialization(path, e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| Error::serialization(path, e.to_string()))
    }

    /// A file source over `source_dir` for rows of `schema`.
    pub fn source(&self, schema: Schema) -> Result<FileStreamSource> {
        let source = FileStreamSource::new(&self.source_dir, schema)
            .pattern(self.pattern.clone())
            .format(self.format);
        match self.max_files_per_trigger {
            Some(n) => source.max_files_per_trigger(n),
            None => Ok(source),
        }
    }

    /// Load the bundle at `model_dir` and build a query over it.
    ///
    /// # Errors
    /// `InvalidParameter` when `model_dir` is unset, `Serialization` when the
    /// bundle does not load, plus anything [`StreamingConfig::query_for`] reports.
    pub fn build_query(&self, name: &str) -> Result<ConfiguredQuery> {
        let model_dir = self
            .model_dir
            .as_ref()
            .ok_or_else(|| Error::invalid_parameter("streaming config", "model_dir is not set"))?;
        self.query_for(name, Arc::new(PipelineModel::load(model_dir)?))
    }

    /// Build a query that replays `model` over `source_dir`.
    ///
    /// The source reads rows of the model's training input schema.
    pub fn query_for(&self, name: &str, model: Arc<PipelineModel>) -> Result<ConfiguredQuery> {
        let source = self.source(model.input_schema().clone())?;
        let (query, table) = match &self.output_dir {
            Some(dir) => (StreamingQuery::new(name, model, source, JsonlSink::new(dir))?, None),
            None => {
                let sink = MemorySink::new(name);
                let table = sink.table();
                (StreamingQuery::new(name, model, source, sink)?, Some(table))
            }
        };
        let query = match &self.checkpoint_dir {
            Some(dir) => query.with_checkpoint(dir)?,
            None => query,
        };
        Ok(ConfiguredQuery { query, table })
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            trigger_interval: Duration::from_millis(self.trigger_interval_ms),
            max_batches: self.max_batches,
            stop_when_idle: self.stop_when_idle,
        }
    }
}

/// A query built from a [`StreamingConfig`].
#[derive(Debug)]
pub struct ConfiguredQuery {
    pub query: StreamingQuery,
    /// Results table when no `output_dir` was configured.
    pub table: Option<MemoryTable>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.json");
        std::fs::write(&path, r#"{"source_dir": "in", "format": "csv", "max_batches": 3}"#).unwrap();

        let config = StreamingConfig::from_file(&path).unwrap();
        assert_eq!(config.source_dir, PathBuf::from("in"));
        assert_eq!(config.format, FileFormat::Csv);
        assert_eq!(config.pattern, "*.jsonl");
        let options = config.run_options();
        assert_eq!(options.max_batches, Some(3));
        assert_eq!(options.trigger_interval, Duration::from_millis(500));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.json");
        std::fs::write(&path, r#"{"sourcedir": "in"}"#).unwrap();
        assert!(matches!(
            StreamingConfig::from_file(&path),
            Err(Error::Serialization { .. })
        ));
    }

    #[test]
    fn zero_files_per_trigger_is_invalid() {
        let config = StreamingConfig {
            max_files_per_trigger: Some(0),
            ..Default::default()
        };
        let schema = Schema::new(Vec::new()).unwrap();
        assert!(matches!(config.source(schema), Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn build_query_needs_a_model_dir() {
        assert!(matches!(
            StreamingConfig::default().build_query("reviews"),
            Err(Error::InvalidParameter { .. })
        ));
    }
}
