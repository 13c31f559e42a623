use super::offset_log::{CommitRecord, OffsetLog};
use super::sink::Sink;
use super::source::Source;
use crate::config::RunOptions;
use crate::error::Result;
use crate::model::{PipelineModel, current_timestamp_ms};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, info_span};

const PROGRESS_HISTORY: usize = 100;

/// What one micro-batch did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryProgress {
    pub batch_id: u64,
    pub num_inputs: usize,
    pub num_input_rows: usize,
    pub num_output_rows: usize,
    pub duration_ms: u64,
    pub timestamp_ms: u64,
}

/// Running totals since the query was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub batches: u64,
    pub input_rows: u64,
    pub output_rows: u64,
    pub recovered_batches: u64,
}

/// Asks a running [`StreamingQuery::run`] loop to return after the current batch.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Replays a fitted model over a source, one micro-batch at a time.
///
/// Batches are processed strictly in arrival order. A batch is committed to
/// the offset log (when one is configured) only after the sink accepted its
/// output, and a failed batch is not acknowledged, so the next call retries it.
#[derive(Debug)]
pub struct StreamingQuery {
    name: String,
    model: Arc<PipelineModel>,
    source: Box<dyn Source>,
    sink: Box<dyn Sink>,
    log: Option<OffsetLog>,
    next_batch_id: u64,
    progress: VecDeque<QueryProgress>,
    metrics: QueryMetrics,
    stop: StopHandle,
}

impl StreamingQuery {
    /// # Errors
    /// `SchemaMismatch` when the model cannot consume the source schema.
    pub fn new(
        name: impl Into<String>,
        model: Arc<PipelineModel>,
        source: impl Source + 'static,
        sink: impl Sink + 'static,
    ) -> Result<Self> {
        model.transform_schema(source.schema())?;
        Ok(Self {
            name: name.into(),
            model,
            source: Box::new(source),
            sink: Box::new(sink),
            log: None,
            next_batch_id: 0,
            progress: VecDeque::new(),
            metrics: QueryMetrics::default(),
            stop: StopHandle::default(),
        })
    }

    /// Record progress under `dir` and resume after its last committed batch.
    pub fn with_checkpoint(mut self, dir: impl AsRef<Path>) -> Result<Self> {
        let log = OffsetLog::open(dir.as_ref())?;
        let records = log.records()?;
        for record in &records {
            self.source.skip(&record.inputs);
        }
        if let Some(last) = records.last() {
            self.next_batch_id = last.batch_id + 1;
            info!(
                query = %self.name,
                committed = records.len(),
                next_batch = self.next_batch_id,
                "resuming from checkpoint"
            );
        }
        self.metrics.recovered_batches = records.len() as u64;
        self.log = Some(log);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &PipelineModel {
        &self.model
    }

    /// Id the next micro-batch will get.
    pub fn next_batch_id(&self) -> u64 {
        self.next_batch_id
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Progress of the most recent batches, oldest first.
    pub fn recent_progress(&self) -> Vec<QueryProgress> {
        self.progress.iter().cloned().collect()
    }

    pub fn last_progress(&self) -> Option<&QueryProgress> {
        self.progress.back()
    }

    pub fn metrics(&self) -> QueryMetrics {
        self.metrics
    }

    /// Process one micro-batch if the source has one.
    pub fn process_next(&mut self) -> Result<Option<QueryProgress>> {
        let Some(batch) = self.source.next_batch()? else {
            return Ok(None);
        };
        let batch_id = self.next_batch_id;
        let _span = info_span!("micro_batch", query = %self.name, batch_id).entered();
        let started = Instant::now();

        let output = self.model.transform(&batch.data)?;
        self.sink.add_batch(batch_id, &output)?;
        if let Some(log) = &self.log {
            log.commit(&CommitRecord::new(
                batch_id,
                batch.inputs.clone(),
                batch.data.num_rows(),
                output.num_rows(),
            ))?;
        }
        self.source.commit(&batch);
        self.next_batch_id += 1;

        let progress = QueryProgress {
            batch_id,
            num_inputs: batch.inputs.len(),
            num_input_rows: batch.data.num_rows(),
            num_output_rows: output.num_rows(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            timestamp_ms: current_timestamp_ms(),
        };
        self.metrics.batches += 1;
        self.metrics.input_rows += progress.num_input_rows as u64;
        self.metrics.output_rows += progress.num_output_rows as u64;
        if self.progress.len() == PROGRESS_HISTORY {
            self.progress.pop_front();
        }
        self.progress.push_back(progress.clone());
        info!(
            inputs = progress.num_inputs,
            input_rows = progress.num_input_rows,
            output_rows = progress.num_output_rows,
            duration_ms = progress.duration_ms,
            "micro-batch done"
        );
        Ok(Some(progress))
    }

    /// Process batches until the source has nothing new.
    pub fn process_available(&mut self) -> Result<Vec<QueryProgress>> {
        let mut done = Vec::new();
        while let Some(p) = self.process_next()? {
            done.push(p);
        }
        Ok(done)
    }

    /// Poll the source every `trigger_interval` until stopped, idle (when
    /// `stop_when_idle`), or `max_batches` have run. Returns the batch count.
    pub fn run(&mut self, options: &RunOptions) -> Result<u64> {
        let mut processed = 0u64;
        info!(query = %self.name, sink = self.sink.name(), "streaming query started");
        loop {
            if self.stop.is_stopped() {
                debug!(query = %self.name, "stop requested");
                break;
            }
            if options.max_batches.is_some_and(|max| processed >= max) {
                break;
            }
            if self.process_next()?.is_some() {
                processed += 1;
                continue;
            }
            if options.stop_when_idle {
                break;
            }
            std::thread::sleep(options.trigger_interval);
        }
        info!(query = %self.name, batches = processed, "streaming query stopped");
        Ok(processed)
    }
}
