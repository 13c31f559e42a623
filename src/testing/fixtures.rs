//! Sample review data and a ready-made sentiment pipeline.

use crate::classification::{GradientBoostedClassifier, GradientBoostedParams};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::features::{
    Binarizer, CountVectorizer, Idf, RegexTokenizer, RegexTokenizerParams, SeasonBucketizer, StopWordsRemover,
};
use crate::io::jsonl::write_jsonl_dataset;
use crate::pipeline::Pipeline;
use crate::schema::{DataType, Field, Schema};
use crate::stage::Stage;
use crate::value::Value;
use std::path::{Path, PathBuf};

const POSITIVE: &[&str] = &[
    "Great taste",
    "Delicious and fresh",
    "Love this coffee",
    "Best snack ever",
    "Great value, will buy again",
    "My dog loves these treats",
    "Excellent tea, smooth flavor",
    "Perfect for breakfast",
];

const NEGATIVE: &[&str] = &[
    "Stale and awful",
    "Disappointed with the taste",
    "Arrived broken",
    "Too salty, not good",
    "Awful smell, threw it away",
    "Not worth the price",
    "Bland and stale crackers",
    "Never buying this again",
];

/// 2011-01-01T00:00:00Z
const FIRST_REVIEW_TIME: i64 = 1_293_840_000;
const SECONDS_PER_DAY: i64 = 86_400;

/// Columns of a food review export.
///
/// ```
/// use stagewise::testing::review_schema;
///
/// let schema = review_schema();
/// assert!(schema.contains("Summary"));
/// ```
#[must_use]
pub fn review_schema() -> Schema {
    Schema::new(vec![
        Field::new("Id", DataType::Int64).non_null(),
        Field::new("ProductId", DataType::Utf8),
        Field::new("Score", DataType::Int64),
        Field::new("Time", DataType::Int64),
        Field::new("Summary", DataType::Utf8),
        Field::new("Text", DataType::Utf8),
    ])
    .expect("static review schema is valid")
}

/// One review row in [`review_schema`] order.
#[must_use]
pub fn review_row(id: i64, product: &str, score: i64, time: i64, summary: &str, text: Option<&str>) -> Vec<Value> {
    vec![
        Value::Int(id),
        Value::from(product),
        Value::Int(score),
        Value::Int(time),
        Value::from(summary),
        Value::from(text),
    ]
}

/// `n` reviews alternating between positive (score 4 or 5) and negative
/// (score 1, 2 or 3) summaries, spread over a year about eleven days apart.
///
/// ```
/// use stagewise::testing::sample_reviews;
///
/// let reviews = sample_reviews(40);
/// assert_eq!(reviews.num_rows(), 40);
/// ```
#[must_use]
pub fn sample_reviews(n: usize) -> Dataset {
    let rows = (0..n)
        .map(|i| {
            let id = i as i64 + 1;
            let positive = i % 2 == 0;
            let pick = (i / 2) % POSITIVE.len();
            let (score, summary) = if positive {
                (if i % 4 == 0 { 5 } else { 4 }, POSITIVE[pick])
            } else {
                (if i % 6 == 1 { 3 } else { 1 + (i % 4 == 3) as i64 }, NEGATIVE[pick])
            };
            let time = FIRST_REVIEW_TIME + (i as i64 % 33) * 11 * SECONDS_PER_DAY;
            let product = format!("B00{:04}", i % 7);
            let text = (i % 9 != 8).then(|| format!("{summary}. Review number {id}."));
            review_row(id, &product, score, time, summary, text.as_deref())
        })
        .collect();
    Dataset::from_rows(review_schema(), rows).unwrap_or_else(|_| Dataset::empty(review_schema()))
}

/// The review sentiment workflow:
///
/// 1. `Score > 3` becomes the 0/1 `label`
/// 2. `Time` becomes a `Season` label
/// 3. `Summary` is tokenized into `words`, stop words removed into `filtered`
/// 4. term counts (`tf`) are rescaled by inverse document frequency into `features`
/// 5. a small gradient-boosted classifier adds `probability` and `prediction`
pub fn sentiment_pipeline() -> Result<Pipeline> {
    Ok(Pipeline::new()
        .stage(Stage::transformer(Binarizer::new("label_binarizer", "Score", "label", 3.0)?))
        .stage(Stage::transformer(SeasonBucketizer::new("season", "Time", "Season")))
        .stage(Stage::transformer(RegexTokenizer::new(
            RegexTokenizerParams::new("summary_tokenizer", "Summary", "words").pattern(r"\W+"),
        )?))
        .stage(Stage::transformer(StopWordsRemover::new("stop_words", "words", "filtered")))
        .stage(Stage::estimator(CountVectorizer::new("term_counts", "filtered", "tf").vocab_size(200)?))
        .stage(Stage::estimator(Idf::new("idf", "tf", "features")))
        .stage(Stage::estimator(GradientBoostedClassifier::new(
            GradientBoostedParams::new("gbt", "features", "label")
                .num_trees(10)
                .max_depth(3),
        )?)))
}

/// Cut `dataset` into consecutive batches of at most `rows` rows.
#[must_use]
pub fn micro_batches(dataset: &Dataset, rows: usize) -> Vec<Dataset> {
    let rows = rows.max(1);
    (0..dataset.num_rows())
        .step_by(rows)
        .map(|offset| dataset.slice(offset, rows))
        .collect()
}

/// Write each batch to `dir/batch-NNN.jsonl`, in order.
pub fn write_batch_files(dir: impl AsRef<Path>, batches: &[Dataset]) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    batches
        .iter()
        .enumerate()
        .map(|(i, batch)| {
            let path = dir.join(format!("batch-{i:03}.jsonl"));
            write_jsonl_dataset(&path, batch)?;
            Ok(path)
        })
        .collect()
}
