//! Review sentiment end to end.
//!
//! Demonstrates:
//! - Fitting the sentiment pipeline on sample reviews
//! - Evaluating it on a held-out split
//! - Saving and reloading the fitted model
//! - Replaying the model over files dropped into a watched directory
//!
//! Run with: cargo run --example sentiment_stream
//!
//! Set `STAGEWISE_LOG_FILE` to append the log to a file instead of stderr.

use anyhow::Result;
use stagewise::config::RunOptions;
use stagewise::evaluation::BinaryClassificationEvaluator;
use stagewise::logging::{LogConfig, init_logging};
use stagewise::model::bundle_schema_path;
use stagewise::streaming::{FileStreamSource, MemorySink, StreamingQuery};
use stagewise::testing::{micro_batches, sample_reviews, sentiment_pipeline, write_batch_files};
use stagewise::{PipelineModel, SaveMode, Schema};
use std::sync::Arc;

fn main() -> Result<()> {
    let log_config = match std::env::var_os("STAGEWISE_LOG_FILE") {
        Some(path) => LogConfig::default().with_log_file(path),
        None => LogConfig::default(),
    };
    init_logging(&log_config)?;
    println!("Review Sentiment Pipeline\n");

    let reviews = sample_reviews(240);
    let mut parts = reviews.random_split(&[0.8, 0.2], 42)?.into_iter();
    let (train, test) = match (parts.next(), parts.next()) {
        (Some(train), Some(test)) => (train, test),
        _ => anyhow::bail!("split returned fewer than two parts"),
    };
    println!("training on {} rows, holding out {}", train.num_rows(), test.num_rows());

    // =============================================================================
    // Fit and evaluate
    // =============================================================================
    let pipeline = sentiment_pipeline()?;
    println!("\n{}", pipeline.explain());
    let model = pipeline.fit(&train)?;

    let scored = model.transform(&test)?;
    let metrics = BinaryClassificationEvaluator::default().evaluate(&scored)?;
    println!("held-out metrics: {metrics}");
    println!(
        "{}",
        scored
            .select(&["Summary", "Season", "label", "probability", "prediction"])?
            .show(5)
    );

    // =============================================================================
    // Save and reload
    // =============================================================================
    let workspace = tempfile::tempdir()?;
    let bundle = workspace.path().join("model");
    model.save_with(&bundle, SaveMode::Overwrite)?;
    let model = Arc::new(PipelineModel::load(&bundle)?);
    println!("\nreloaded model from {}", bundle.display());

    // =============================================================================
    // Stream new reviews
    // =============================================================================
    let incoming = workspace.path().join("incoming");
    let batches = micro_batches(&test, 10);
    write_batch_files(&incoming, &batches)?;

    // The stream reads rows of the schema the bundle was trained on.
    let schema = Schema::load(bundle_schema_path(&bundle))?;
    let source = FileStreamSource::new(&incoming, schema).max_files_per_trigger(1)?;
    let sink = MemorySink::new("scored_reviews");
    let table = sink.table();
    let mut query = StreamingQuery::new("reviews", Arc::clone(&model), source, sink)?
        .with_checkpoint(workspace.path().join("checkpoint"))?;

    let processed = query.run(&RunOptions::default().stop_when_idle(true))?;
    println!("processed {processed} micro-batches, {} rows", table.num_rows());
    for progress in query.recent_progress() {
        println!(
            "  batch {:>2}: {} rows in {} ms",
            progress.batch_id, progress.num_output_rows, progress.duration_ms
        );
    }

    if let Some(all) = table.snapshot()? {
        let streamed = BinaryClassificationEvaluator::default().evaluate(&all)?;
        println!("streamed metrics:  {streamed}");
    }
    Ok(())
}
