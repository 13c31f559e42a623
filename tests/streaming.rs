//! Replaying a fitted model over micro-batches.

use anyhow::Result;
use stagewise::config::{RunOptions, StreamingConfig};
use stagewise::streaming::*;
use stagewise::testing::*;
use stagewise::*;
use std::fs;
use std::sync::Arc;

fn trained() -> Result<Arc<PipelineModel>> {
    Ok(Arc::new(sentiment_pipeline()?.fit(&sample_reviews(60))?))
}

fn idle() -> RunOptions {
    RunOptions::default().stop_when_idle(true)
}

#[test]
fn test_batches_match_their_concatenation() -> Result<()> {
    let model = trained()?;
    let incoming = sample_reviews(30);
    let batches = micro_batches(&incoming, 10);
    assert_eq!(batches.len(), 3);

    let source = MemoryStream::new(review_schema());
    let handle = source.handle();
    for batch in &batches {
        handle.push(batch.clone())?;
    }
    let sink = MemorySink::new("scored");
    let table = sink.table();
    let mut query = StreamingQuery::new("reviews", Arc::clone(&model), source, sink)?;

    let progress = query.process_available()?;
    assert_eq!(progress.iter().map(|p| p.batch_id).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(table.num_batches(), 3);

    let streamed = table.snapshot()?.expect("three batches were written");
    assert_datasets_equal(&streamed, &model.transform(&Dataset::concat(&batches)?)?);
    for (i, batch) in batches.iter().enumerate() {
        let out = table.batch(i as u64).expect("batch present");
        assert_datasets_equal(&out, &model.transform(batch)?);
    }
    Ok(())
}

#[test]
fn test_file_source_takes_one_file_per_trigger() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("incoming");
    let model = trained()?;
    let incoming = sample_reviews(30);
    let batches = micro_batches(&incoming, 10);
    write_batch_files(&dir, &batches)?;

    let source = FileStreamSource::new(&dir, review_schema()).max_files_per_trigger(1)?;
    let sink = MemorySink::new("scored");
    let table = sink.table();
    let mut query = StreamingQuery::new("reviews", Arc::clone(&model), source, sink)?;

    assert_eq!(query.run(&idle())?, 3);
    let rows: Vec<usize> = query.recent_progress().iter().map(|p| p.num_input_rows).collect();
    assert_eq!(rows, vec![10, 10, 10]);
    let streamed = table.snapshot()?.expect("batches were written");
    assert_datasets_equal(&streamed, &model.transform(&incoming)?);
    Ok(())
}

#[test]
fn test_file_source_groups_files_up_to_the_limit() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("incoming");
    let batches = micro_batches(&sample_reviews(15), 5);
    write_batch_files(&dir, &batches)?;

    let source = FileStreamSource::new(&dir, review_schema()).max_files_per_trigger(2)?;
    let mut query = StreamingQuery::new("reviews", trained()?, source, MemorySink::new("scored"))?;
    let progress = query.process_available()?;
    let inputs: Vec<usize> = progress.iter().map(|p| p.num_inputs).collect();
    assert_eq!(inputs, vec![2, 1]);
    assert_eq!(query.metrics().input_rows, 15);
    Ok(())
}

#[test]
fn test_new_files_are_picked_up_later() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("incoming");
    fs::create_dir_all(&dir)?;
    let source = FileStreamSource::new(&dir, review_schema());
    let sink = MemorySink::new("scored");
    let table = sink.table();
    let mut query = StreamingQuery::new("reviews", trained()?, source, sink)?;

    assert!(query.process_next()?.is_none());
    write_batch_files(&dir, &[sample_reviews(4)])?;
    assert!(query.process_next()?.is_some());
    assert!(query.process_next()?.is_none());
    assert_eq!(table.num_rows(), 4);
    Ok(())
}

#[test]
fn test_hidden_and_staging_files_are_ignored() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("incoming");
    write_batch_files(&dir, &[sample_reviews(3)])?;
    fs::copy(dir.join("batch-000.jsonl"), dir.join("_staging.jsonl"))?;
    fs::copy(dir.join("batch-000.jsonl"), dir.join(".hidden.jsonl"))?;

    let source = FileStreamSource::new(&dir, review_schema());
    assert_eq!(source.pending()?, vec![dir.join("batch-000.jsonl")]);
    Ok(())
}

#[test]
fn test_checkpoint_resumes_after_last_commit() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("incoming");
    let out = tmp.path().join("out");
    let checkpoint = tmp.path().join("checkpoint");
    let model = trained()?;
    write_batch_files(&dir, &micro_batches(&sample_reviews(30), 10))?;

    let first = || -> Result<StreamingQuery> {
        let source = FileStreamSource::new(&dir, review_schema()).max_files_per_trigger(1)?;
        Ok(StreamingQuery::new("reviews", Arc::clone(&model), source, JsonlSink::new(&out))?
            .with_checkpoint(&checkpoint)?)
    };

    let mut query = first()?;
    assert_eq!(query.run(&RunOptions::default().max_batches(2))?, 2);
    drop(query);

    let log = OffsetLog::open(&checkpoint)?;
    assert_eq!(log.records()?.len(), 2);

    let mut resumed = first()?;
    assert_eq!(resumed.next_batch_id(), 2);
    assert_eq!(resumed.metrics().recovered_batches, 2);
    let progress = resumed.process_available()?;
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].batch_id, 2);

    let latest = log.latest()?.expect("three commits");
    assert_eq!(latest.batch_id, 2);
    assert!(latest.inputs[0].ends_with("batch-002.jsonl"));
    for id in 0..3 {
        assert!(out.join(format!("part-{id:05}.jsonl")).is_file());
    }
    Ok(())
}

#[test]
fn test_corrupt_commit_is_reported() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let checkpoint = tmp.path().join("checkpoint");
    fs::create_dir_all(checkpoint.join("commits"))?;
    fs::write(checkpoint.join("commits/0.json"), "{ not json")?;

    let source = MemoryStream::new(review_schema());
    let query = StreamingQuery::new("reviews", trained()?, source, MemorySink::new("scored"))?;
    match query.with_checkpoint(&checkpoint) {
        Err(Error::Serialization { .. }) => Ok(()),
        other => panic!("expected Serialization, got {other:?}"),
    }
}

#[test]
fn test_query_rejects_incompatible_source() -> Result<()> {
    let source = MemoryStream::new(review_schema().without(&["Summary"]));
    match StreamingQuery::new("reviews", trained()?, source, MemorySink::new("scored")) {
        Err(Error::SchemaMismatch { column, .. }) => assert_eq!(column, "Summary"),
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_push_checks_the_stream_schema() -> Result<()> {
    let source = MemoryStream::new(review_schema());
    let handle = source.handle();
    let wrong = sample_reviews(2).drop_columns(&["Text"]);
    assert!(matches!(handle.push(wrong), Err(Error::SchemaMismatch { .. })));
    assert_eq!(handle.push(sample_reviews(2))?, 0);
    Ok(())
}

#[test]
fn test_stop_handle_ends_run() -> Result<()> {
    let source = MemoryStream::new(review_schema());
    source.handle().push(sample_reviews(3))?;
    let mut query = StreamingQuery::new("reviews", trained()?, source, MemorySink::new("scored"))?;
    query.stop_handle().stop();
    assert_eq!(query.run(&RunOptions::default())?, 0);
    assert_eq!(query.next_batch_id(), 0);
    Ok(())
}

#[test]
fn test_new_memory_stream_is_not_skipped_after_resume() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let checkpoint = tmp.path().join("checkpoint");
    let model = trained()?;

    let first = MemoryStream::new(review_schema());
    first.handle().push(sample_reviews(3))?;
    let mut query = StreamingQuery::new("reviews", Arc::clone(&model), first, MemorySink::new("scored"))?
        .with_checkpoint(&checkpoint)?;
    assert_eq!(query.process_available()?.len(), 1);
    drop(query);

    let second = MemoryStream::new(review_schema());
    second.handle().push(sample_reviews(7))?;
    let sink = MemorySink::new("scored");
    let table = sink.table();
    let mut resumed = StreamingQuery::new("reviews", model, second, sink)?.with_checkpoint(&checkpoint)?;
    let progress = resumed.process_available()?;
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].batch_id, 1);
    assert_eq!(table.num_rows(), 7);
    Ok(())
}

/// Hands each batch to `inner`, then reports a failure `failures` times, as if
/// the process died between the sink write and the commit.
#[derive(Debug)]
struct FailAfterWrite<S> {
    inner: S,
    failures: usize,
}

impl<S: Sink> Sink for FailAfterWrite<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn add_batch(&mut self, batch_id: u64, data: &Dataset) -> stagewise::Result<()> {
        self.inner.add_batch(batch_id, data)?;
        if self.failures > 0 {
            self.failures -= 1;
            return Err(Error::Other(anyhow::anyhow!("connection lost after write")));
        }
        Ok(())
    }
}

#[test]
fn test_failed_commit_is_retried_under_the_same_batch_id() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("incoming");
    let out = tmp.path().join("out");
    let checkpoint = tmp.path().join("checkpoint");
    write_batch_files(&dir, &micro_batches(&sample_reviews(20), 10))?;

    let source = FileStreamSource::new(&dir, review_schema()).max_files_per_trigger(1)?;
    let sink = FailAfterWrite {
        inner: JsonlSink::new(&out),
        failures: 1,
    };
    let mut query = StreamingQuery::new("reviews", trained()?, source, sink)?.with_checkpoint(&checkpoint)?;

    assert!(query.process_next().is_err());
    assert_eq!(query.next_batch_id(), 0);
    assert_eq!(query.metrics().batches, 0);
    let log = OffsetLog::open(&checkpoint)?;
    assert!(log.records()?.is_empty());

    let retried = query.process_next()?.expect("the failed batch is offered again");
    assert_eq!((retried.batch_id, retried.num_input_rows), (0, 10));
    let commit = log.latest()?.expect("retry was committed");
    assert!(commit.inputs[0].ends_with("batch-000.jsonl"));

    assert_eq!(query.process_available()?.len(), 1);
    let parts: Vec<_> = fs::read_dir(&out)?.collect::<std::io::Result<_>>()?;
    assert_eq!(parts.len(), 2);
    assert_eq!(fs::read_to_string(out.join("part-00000.jsonl"))?.lines().count(), 10);
    Ok(())
}

#[test]
fn test_memory_sink_keeps_one_copy_of_a_retried_batch() -> Result<()> {
    let source = MemoryStream::new(review_schema());
    source.handle().push(sample_reviews(6))?;
    let memory = MemorySink::new("scored");
    let table = memory.table();
    let sink = FailAfterWrite {
        inner: memory,
        failures: 1,
    };
    let mut query = StreamingQuery::new("reviews", trained()?, source, sink)?;

    assert!(query.process_next().is_err());
    assert_eq!(query.next_batch_id(), 0);
    assert_eq!(query.process_next()?.map(|p| p.batch_id), Some(0));
    assert!(query.process_next()?.is_none());
    assert_eq!(table.num_batches(), 1);
    assert_eq!(table.num_rows(), 6);
    Ok(())
}

#[test]
fn test_config_builds_a_checkpointed_file_query() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let bundle = tmp.path().join("model");
    trained()?.save(&bundle)?;
    let incoming = tmp.path().join("incoming");
    write_batch_files(&incoming, &micro_batches(&sample_reviews(30), 10))?;

    let config = StreamingConfig {
        source_dir: incoming,
        max_files_per_trigger: Some(1),
        checkpoint_dir: Some(tmp.path().join("checkpoint")),
        output_dir: Some(tmp.path().join("out")),
        model_dir: Some(bundle),
        stop_when_idle: true,
        ..Default::default()
    };
    let mut built = config.build_query("reviews")?;
    assert!(built.table.is_none());
    assert_eq!(built.query.run(&config.run_options())?, 3);
    assert!(tmp.path().join("out/part-00002.jsonl").is_file());
    drop(built);

    let mut again = config.build_query("reviews")?;
    assert_eq!(again.query.next_batch_id(), 3);
    assert_eq!(again.query.run(&config.run_options())?, 0);
    Ok(())
}

#[test]
fn test_config_without_output_dir_collects_in_memory() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let incoming = tmp.path().join("incoming");
    write_batch_files(&incoming, &micro_batches(&sample_reviews(12), 5))?;

    let config = StreamingConfig {
        source_dir: incoming,
        stop_when_idle: true,
        ..Default::default()
    };
    let mut built = config.query_for("reviews", trained()?)?;
    let table = built.table.clone().expect("memory sink without output_dir");
    assert_eq!(table.name(), "reviews");
    assert_eq!(built.query.run(&config.run_options())?, 1);
    assert_eq!(table.num_rows(), 12);
    Ok(())
}
