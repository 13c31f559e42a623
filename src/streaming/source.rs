//! Micro-batch sources.

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::io::glob::{dir_pattern, expand_glob};
use crate::io::{FileFormat, read_datasets};
use crate::model::current_timestamp_ms;
use crate::schema::Schema;
use anyhow::Context;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// The rows of one micro-batch and the source inputs they came from.
#[derive(Clone, Debug)]
pub struct SourceBatch {
    pub inputs: Vec<String>,
    pub data: Dataset,
}

/// Produces micro-batches in arrival order.
///
/// `next_batch` must not hand out an input again once it has been
/// acknowledged with `commit` or `skip`.
pub trait Source: Send + fmt::Debug {
    fn schema(&self) -> &Schema;

    /// The next micro-batch, or `None` when nothing new has arrived.
    fn next_batch(&mut self) -> Result<Option<SourceBatch>>;

    /// Acknowledge a batch returned by `next_batch`.
    fn commit(&mut self, batch: &SourceBatch);

    /// Mark inputs consumed by an earlier run as done.
    fn skip(&mut self, inputs: &[String]);
}

/// Watches a directory for new files.
///
/// Files matching `pattern` are taken oldest first (modification time, then
/// path), at most `max_files_per_trigger` per batch. Names starting with `.`
/// or `_` are ignored, which leaves room for writers to stage files under a
/// temporary name and rename them into place.
#[derive(Debug)]
pub struct FileStreamSource {
    dir: PathBuf,
    pattern: String,
    format: FileFormat,
    schema: Schema,
    max_files_per_trigger: Option<usize>,
    seen: HashSet<String>,
}

impl FileStreamSource {
    /// A JSON Lines source over `*.jsonl` files in `dir`.
    pub fn new(dir: impl Into<PathBuf>, schema: Schema) -> Self {
        Self {
            dir: dir.into(),
            pattern: "*.jsonl".to_string(),
            format: FileFormat::Jsonl,
            schema,
            max_files_per_trigger: None,
            seen: HashSet::new(),
        }
    }

    #[must_use]
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    #[must_use]
    pub fn format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn max_files_per_trigger(mut self, n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::invalid_parameter("file source", "max_files_per_trigger must be positive"));
        }
        self.max_files_per_trigger = Some(n);
        Ok(self)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Unconsumed files in the order they will be processed.
    pub fn pending(&self) -> Result<Vec<PathBuf>> {
        let files = expand_glob(&dir_pattern(&self.dir, &self.pattern))?;
        let mut pending = Vec::with_capacity(files.len());
        for path in files {
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_none_or(|n| n.starts_with('.') || n.starts_with('_'));
            if hidden || self.seen.contains(&key(&path)) {
                continue;
            }
            let modified = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .with_context(|| format!("stat {}", path.display()))?;
            pending.push((modified, path));
        }
        pending.sort();
        Ok(pending.into_iter().map(|(_, p)| p).collect())
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Source for FileStreamSource {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_batch(&mut self) -> Result<Option<SourceBatch>> {
        let mut files = self.pending()?;
        if files.is_empty() {
            return Ok(None);
        }
        if let Some(n) = self.max_files_per_trigger {
            files.truncate(n);
        }
        if files.iter().any(|f| FileFormat::from_path(f).is_some_and(|f| f != self.format)) {
            warn!(dir = %self.dir.display(), format = self.format.name(), "reading files whose extension suggests another format");
        }
        let data = read_datasets(&files, self.format, &self.schema)?;
        debug!(files = files.len(), rows = data.num_rows(), "file batch read");
        Ok(Some(SourceBatch {
            inputs: files.iter().map(|p| key(p)).collect(),
            data,
        }))
    }

    fn commit(&mut self, batch: &SourceBatch) {
        self.seen.extend(batch.inputs.iter().cloned());
    }

    fn skip(&mut self, inputs: &[String]) {
        self.seen.extend(inputs.iter().cloned());
    }
}

/// An in-process source fed through [`MemoryStreamHandle::push`].
///
/// Each pushed dataset becomes one micro-batch named
/// `memory-<stream>-<n>`, where `<stream>` differs between streams and between
/// processes, so a checkpoint written by an earlier stream never marks new
/// data as consumed.
#[derive(Debug)]
pub struct MemoryStream {
    schema: Schema,
    stream_id: String,
    queue: Arc<Mutex<VecDeque<(u64, Dataset)>>>,
    next_offset: Arc<Mutex<u64>>,
    done: HashSet<String>,
}

/// Cloneable producer side of a [`MemoryStream`].
#[derive(Clone, Debug)]
pub struct MemoryStreamHandle {
    schema: Schema,
    queue: Arc<Mutex<VecDeque<(u64, Dataset)>>>,
    next_offset: Arc<Mutex<u64>>,
}

impl MemoryStream {
    pub fn new(schema: Schema) -> Self {
        static STREAMS: AtomicU64 = AtomicU64::new(0);
        let stream_id = format!(
            "{:x}.{:x}.{}",
            current_timestamp_ms(),
            std::process::id(),
            STREAMS.fetch_add(1, Ordering::Relaxed)
        );
        Self {
            schema,
            stream_id,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            next_offset: Arc::new(Mutex::new(0)),
            done: HashSet::new(),
        }
    }

    pub fn handle(&self) -> MemoryStreamHandle {
        MemoryStreamHandle {
            schema: self.schema.clone(),
            queue: Arc::clone(&self.queue),
            next_offset: Arc::clone(&self.next_offset),
        }
    }
}

impl MemoryStreamHandle {
    /// Queue `data` as the next micro-batch.
    ///
    /// # Errors
    /// `SchemaMismatch` when `data` does not have the stream's schema.
    pub fn push(&self, data: Dataset) -> Result<u64> {
        if data.schema() != &self.schema {
            let column = self
                .schema
                .fields()
                .iter()
                .find(|f| data.schema().field(&f.name) != Some(*f))
                .or_else(|| data.schema().fields().iter().find(|f| !self.schema.contains(&f.name)))
                .map_or_else(|| "<column order>".to_string(), |f| f.name.clone());
            return Err(Error::schema_mismatch(column, "differs from the stream schema"));
        }
        let mut next = self.next_offset.lock().unwrap_or_else(PoisonError::into_inner);
        let offset = *next;
        *next += 1;
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back((offset, data));
        Ok(offset)
    }
}

fn memory_input(stream_id: &str, offset: u64) -> String {
    format!("memory-{stream_id}-{offset}")
}

impl Source for MemoryStream {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_batch(&mut self) -> Result<Option<SourceBatch>> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.retain(|(offset, _)| !self.done.contains(&memory_input(&self.stream_id, *offset)));
        Ok(queue.front().map(|(offset, data)| SourceBatch {
            inputs: vec![memory_input(&self.stream_id, *offset)],
            data: data.clone(),
        }))
    }

    fn commit(&mut self, batch: &SourceBatch) {
        self.done.extend(batch.inputs.iter().cloned());
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(offset, _)| !self.done.contains(&memory_input(&self.stream_id, *offset)));
    }

    fn skip(&mut self, inputs: &[String]) {
        self.done.extend(inputs.iter().cloned());
    }
}
