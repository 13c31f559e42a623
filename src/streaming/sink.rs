//! Micro-batch sinks.
//!
//! Both built-in sinks are idempotent per batch id: replaying a batch after a
//! crash between the sink write and the commit replaces the earlier output
//! instead of duplicating it.

use crate::dataset::Dataset;
use crate::error::Result;
use crate::io::jsonl::write_jsonl_dataset;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Receives the transformed rows of each micro-batch.
pub trait Sink: Send + fmt::Debug {
    fn name(&self) -> &str;

    fn add_batch(&mut self, batch_id: u64, data: &Dataset) -> Result<()>;
}

/// Keeps every batch in memory under a name; query it through a
/// [`MemoryTable`] handle while the stream runs.
#[derive(Debug)]
pub struct MemorySink {
    table: MemoryTable,
}

/// Shared, read-only view of a [`MemorySink`].
#[derive(Clone, Debug)]
pub struct MemoryTable {
    name: String,
    batches: Arc<RwLock<Vec<(u64, Dataset)>>>,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: MemoryTable {
                name: name.into(),
                batches: Arc::new(RwLock::new(Vec::new())),
            },
        }
    }

    pub fn table(&self) -> MemoryTable {
        self.table.clone()
    }
}

impl Sink for MemorySink {
    fn name(&self) -> &str {
        &self.table.name
    }

    fn add_batch(&mut self, batch_id: u64, data: &Dataset) -> Result<()> {
        let mut batches = self.table.batches.write().unwrap_or_else(PoisonError::into_inner);
        match batches.iter_mut().find(|(id, _)| *id == batch_id) {
            Some(slot) => slot.1 = data.clone(),
            None => batches.push((batch_id, data.clone())),
        }
        Ok(())
    }
}

impl MemoryTable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_batches(&self) -> usize {
        self.batches.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn num_rows(&self) -> usize {
        self.batches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, d)| d.num_rows())
            .sum()
    }

    /// One batch's rows.
    pub fn batch(&self, batch_id: u64) -> Option<Dataset> {
        self.batches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(id, _)| *id == batch_id)
            .map(|(_, d)| d.clone())
    }

    /// All rows so far, in batch order; `None` before the first batch.
    pub fn snapshot(&self) -> Result<Option<Dataset>> {
        let mut batches = self.batches.read().unwrap_or_else(PoisonError::into_inner).clone();
        if batches.is_empty() {
            return Ok(None);
        }
        batches.sort_by_key(|(id, _)| *id);
        let parts: Vec<Dataset> = batches.into_iter().map(|(_, d)| d).collect();
        Dataset::concat(&parts).map(Some)
    }
}

/// Writes each batch to `<dir>/part-<batch_id>.jsonl`.
#[derive(Debug)]
pub struct JsonlSink {
    dir: PathBuf,
}

impl JsonlSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn part_path(&self, batch_id: u64) -> PathBuf {
        self.dir.join(format!("part-{batch_id:05}.jsonl"))
    }
}

impl Sink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn add_batch(&mut self, batch_id: u64, data: &Dataset) -> Result<()> {
        let path = self.part_path(batch_id);
        let rows = write_jsonl_dataset(&path, data)?;
        debug!(batch_id, rows, path = %path.display(), "batch written");
        Ok(())
    }
}
