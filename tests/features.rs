//! Built-in feature stages, exercised through pipelines.

use anyhow::Result;
use stagewise::features::*;
use stagewise::testing::*;
use stagewise::*;

fn texts(lines: &[Option<&str>]) -> Result<Dataset> {
    let schema = Schema::new(vec![Field::new("text", DataType::Utf8)])?;
    Ok(Dataset::new(schema, vec![lines.iter().map(|l| Value::from(*l)).collect()])?)
}

fn tokens(words: &[&str]) -> Value {
    Value::List(words.iter().map(|w| (*w).to_string()).collect())
}

fn vector(size: usize, pairs: &[(usize, f64)]) -> Result<Value> {
    Ok(Value::Vector(SparseVector::from_pairs(size, pairs.to_vec())?))
}

#[test]
fn test_tokenizer_lowercases_and_keeps_nulls() -> Result<()> {
    let data = texts(&[Some("Hello  World"), None, Some("")])?;
    let out = Tokenizer::new("t", "text", "words").transform(&data)?;
    assert_column_equals(&out, "words", &[tokens(&["hello", "world"]), Value::Null, tokens(&[])]);
    Ok(())
}

#[test]
fn test_stop_words_are_case_insensitive_by_default() -> Result<()> {
    let data = texts(&[Some("The coffee IS great")])?;
    let model = Pipeline::new()
        .stage(Stage::transformer(RegexTokenizer::new(
            RegexTokenizerParams::new("t", "text", "words").to_lowercase(false),
        )?))
        .stage(Stage::transformer(StopWordsRemover::new("sw", "words", "filtered")))
        .fit(&data)?;
    let out = model.transform(&data)?;
    assert_column_equals(&out, "filtered", &[tokens(&["coffee", "great"])]);

    let strict = StopWordsRemover::new("sw", "words", "filtered").case_sensitive(true);
    let out = strict.transform(&out)?;
    assert_column_equals(&out, "filtered", &[tokens(&["The", "coffee", "IS", "great"])]);
    Ok(())
}

#[test]
fn test_custom_stop_words() -> Result<()> {
    let data = Tokenizer::new("t", "text", "words").transform(&texts(&[Some("good bad ugly")])?)?;
    let out = StopWordsRemover::new("sw", "words", "kept")
        .with_stop_words(vec!["BAD".to_string()])
        .transform(&data)?;
    assert_column_equals(&out, "kept", &[tokens(&["good", "ugly"])]);
    Ok(())
}

fn counted(lines: &[&str], vectorizer: CountVectorizer) -> Result<(Dataset, PipelineModel)> {
    let data = texts(&lines.iter().map(|l| Some(*l)).collect::<Vec<_>>())?;
    let model = Pipeline::new()
        .stage(Stage::transformer(Tokenizer::new("t", "text", "words")))
        .stage(Stage::estimator(vectorizer))
        .fit(&data)?;
    Ok((data, model))
}

fn vocabulary(model: &PipelineModel) -> Vec<String> {
    let artifact = model.stages()[1].artifact().expect("artifact");
    serde_json::from_value(artifact["vocabulary"].clone()).expect("vocabulary list")
}

#[test]
fn test_vocabulary_is_ordered_by_frequency_then_term() -> Result<()> {
    let (data, model) = counted(&["b a c", "a b", "a d"], CountVectorizer::new("cv", "words", "tf"))?;
    assert_eq!(vocabulary(&model), vec!["a", "b", "c", "d"]);

    let out = model.transform(&data)?;
    assert_column_equals(
        &out,
        "tf",
        &[
            vector(4, &[(0, 1.0), (1, 1.0), (2, 1.0)])?,
            vector(4, &[(0, 1.0), (1, 1.0)])?,
            vector(4, &[(0, 1.0), (3, 1.0)])?,
        ],
    );
    Ok(())
}

#[test]
fn test_vocab_size_and_min_df_prune_terms() -> Result<()> {
    let lines = ["a a b", "a c", "a b d"];
    let (_, capped) = counted(&lines, CountVectorizer::new("cv", "words", "tf").vocab_size(2)?)?;
    assert_eq!(vocabulary(&capped), vec!["a", "b"]);

    let (_, fraction) = counted(&lines, CountVectorizer::new("cv", "words", "tf").min_df(0.5)?)?;
    assert_eq!(vocabulary(&fraction), vec!["a", "b"]);

    let (_, absolute) = counted(&lines, CountVectorizer::new("cv", "words", "tf").min_df(3.0)?)?;
    assert_eq!(vocabulary(&absolute), vec!["a"]);
    Ok(())
}

#[test]
fn test_binary_and_min_tf_counts() -> Result<()> {
    let lines = ["x x y"];
    let (data, binary) = counted(&lines, CountVectorizer::new("cv", "words", "tf").binary(true))?;
    assert_column_equals(&binary.transform(&data)?, "tf", &[vector(2, &[(0, 1.0), (1, 1.0)])?]);

    let (data, min_tf) = counted(&lines, CountVectorizer::new("cv", "words", "tf").min_tf(2.0)?)?;
    assert_column_equals(&min_tf.transform(&data)?, "tf", &[vector(2, &[(0, 2.0)])?]);
    Ok(())
}

#[test]
fn test_vectorizer_rejects_bad_parameters() {
    assert!(matches!(
        CountVectorizer::new("cv", "words", "tf").vocab_size(0),
        Err(Error::InvalidParameter { .. })
    ));
    assert!(matches!(
        CountVectorizer::new("cv", "words", "tf").min_df(-1.0),
        Err(Error::InvalidParameter { .. })
    ));
}

#[test]
fn test_idf_downweights_common_terms() -> Result<()> {
    let data = texts(&[Some("a b"), Some("a c"), Some("a b")])?;
    let model = Pipeline::new()
        .stage(Stage::transformer(Tokenizer::new("t", "text", "words")))
        .stage(Stage::estimator(CountVectorizer::new("cv", "words", "tf")))
        .stage(Stage::estimator(Idf::new("idf", "tf", "tfidf")))
        .fit(&data)?;
    let out = model.transform(&data)?;
    let first = out.column("tfidf")?[0].as_vector().expect("vector").clone();
    // a in 3/3 docs, b in 2/3
    assert_eq!(first.get(0), 0.0);
    assert!((first.get(1) - (4.0f64 / 3.0).ln()).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_season_labels_follow_first_matching_rule() -> Result<()> {
    let reviews = sample_reviews(33);
    let out = SeasonBucketizer::new("season", "Time", "Season").transform(&reviews)?;
    let labels: Vec<&str> = out.column("Season")?.iter().filter_map(Value::as_str).collect();
    assert_eq!(labels.len(), 33);
    for season in ["Winter", "Spring", "Summer", "Fall"] {
        assert!(labels.contains(&season), "no {season} review");
    }

    let custom = SeasonBucketizer::new("season", "Time", "Half")
        .with_rules(vec![MonthRange::new("H1", 1, 6), MonthRange::new("H2", 7, 12)])?;
    assert_eq!(custom.label_for_month(6), Some("H1"));
    assert_eq!(custom.label_for_month(7), Some("H2"));
    Ok(())
}

#[test]
fn test_binarizer_labels_reviews() -> Result<()> {
    let reviews = sample_reviews(6);
    let out = Binarizer::new("label", "Score", "label", 3.0)?.transform(&reviews)?;
    let expected: Vec<Value> = reviews
        .column("Score")?
        .iter()
        .map(|s| Value::Float(if s.as_f64().is_some_and(|v| v > 3.0) { 1.0 } else { 0.0 }))
        .collect();
    assert_column_equals(&out, "label", &expected);
    Ok(())
}

#[test]
fn test_row_filter_uses_three_valued_logic() -> Result<()> {
    let schema = Schema::new(vec![Field::new("n", DataType::Int64)])?;
    let data = Dataset::new(
        schema,
        vec![vec![Value::Int(1), Value::Null, Value::Int(5)]],
    )?;

    let gt = RowFilter::new("f", col("n").gt(lit(2))).transform(&data)?;
    assert_column_equals(&gt, "n", &[Value::Int(5)]);

    let not_gt = RowFilter::new("f", !col("n").gt(lit(2))).transform(&data)?;
    assert_column_equals(&not_gt, "n", &[Value::Int(1)]);

    let nulls = RowFilter::new("f", col("n").is_null().or(col("n").lt(lit(2)))).transform(&data)?;
    assert_column_equals(&nulls, "n", &[Value::Int(1), Value::Null]);
    Ok(())
}

#[test]
fn test_row_filter_rejects_unknown_columns() -> Result<()> {
    let data = sample_reviews(3);
    let filter = RowFilter::new("f", col("Rating").gt(lit(3)));
    match filter.transform(&data) {
        Err(Error::SchemaMismatch { column, .. }) => assert_eq!(column, "Rating"),
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_stage_artifacts_decode_through_the_registry() -> Result<()> {
    let registry = StageRegistry::builtin();
    let stage = SeasonBucketizer::new("season", "Time", "Season").with_default_label("Unknown");
    let decoded = registry.decode(SeasonBucketizer::KIND, stage.artifact()?)?;
    let reviews = sample_reviews(8);
    assert_datasets_equal(&decoded.transform(&reviews)?, &stage.transform(&reviews)?);
    Ok(())
}
