//! Saving and loading model bundles.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use stagewise::features::Tokenizer;
use stagewise::testing::*;
use stagewise::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn fitted() -> Result<(Dataset, PipelineModel)> {
    let reviews = sample_reviews(40);
    let model = sentiment_pipeline()?.fit(&reviews)?;
    Ok((reviews, model))
}

fn assert_serialization_error<T: std::fmt::Debug>(result: stagewise::Result<T>) {
    match result {
        Err(Error::Serialization { .. }) => {}
        other => panic!("expected a Serialization error, got {other:?}"),
    }
}

#[test]
fn test_round_trip_reproduces_transform() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let bundle = tmp.path().join("model");
    let (reviews, model) = fitted()?;

    model.save(&bundle)?;
    let loaded = PipelineModel::load(&bundle)?;

    assert_eq!(loaded.len(), model.len());
    assert_eq!(loaded.input_schema(), model.input_schema());
    assert_eq!(loaded.output_schema(), model.output_schema());

    let fresh = sample_reviews(57);
    assert_datasets_equal(&loaded.transform(&reviews)?, &model.transform(&reviews)?);
    assert_datasets_equal(&loaded.transform(&fresh)?, &model.transform(&fresh)?);
    Ok(())
}

#[test]
fn test_bundle_layout() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let bundle = tmp.path().join("model");
    let (_, model) = fitted()?;
    model.save(&bundle)?;

    assert!(bundle.join("index.json").is_file());
    assert!(bundle.join("input_schema.json").is_file());
    assert!(bundle.join("stages/000-label_binarizer.json").is_file());
    assert!(bundle.join("stages/006-gbt.json").is_file());

    let index: Json = serde_json::from_slice(&fs::read(bundle.join("index.json"))?)?;
    assert_eq!(index["format"], "stagewise.pipeline-model");
    assert_eq!(index["version"], 1);
    let stages = index["stages"].as_array().expect("stages array");
    assert_eq!(stages.len(), 7);
    assert_eq!(stages[4]["kind"], "count_vectorizer_model");
    assert_eq!(stages[6]["kind"], "gradient_boosted_model");

    let schema_path = stagewise::model::bundle_schema_path(&bundle);
    assert_eq!(schema_path, bundle.join("input_schema.json"));
    assert_eq!(Schema::load(schema_path)?, review_schema());
    Ok(())
}

#[test]
fn test_save_refuses_existing_bundle_unless_overwriting() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let bundle = tmp.path().join("model");
    let (_, model) = fitted()?;

    model.save(&bundle)?;
    assert_serialization_error(model.save(&bundle));
    model.save_with(&bundle, SaveMode::Overwrite)?;
    PipelineModel::load(&bundle)?;
    Ok(())
}

#[test]
fn test_save_never_clobbers_a_foreign_directory() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("data");
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("keep.txt"), "important")?;
    let (_, model) = fitted()?;

    assert_serialization_error(model.save_with(&dir, SaveMode::Overwrite));
    assert_eq!(fs::read_to_string(dir.join("keep.txt"))?, "important");
    Ok(())
}

fn saved_bundle(tmp: &Path) -> Result<std::path::PathBuf> {
    let bundle = tmp.join("model");
    fitted()?.1.save(&bundle)?;
    Ok(bundle)
}

#[test]
fn test_load_rejects_tampered_artifact() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let bundle = saved_bundle(tmp.path())?;
    let artifact = bundle.join("stages/005-idf.json");
    let mut body = fs::read_to_string(&artifact)?;
    body.push(' ');
    fs::write(&artifact, body)?;
    assert_serialization_error(PipelineModel::load(&bundle));
    Ok(())
}

#[test]
fn test_load_rejects_missing_index() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let bundle = saved_bundle(tmp.path())?;
    fs::remove_file(bundle.join("index.json"))?;
    assert_serialization_error(PipelineModel::load(&bundle));
    Ok(())
}

#[test]
fn test_load_rejects_missing_artifact() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let bundle = saved_bundle(tmp.path())?;
    fs::remove_file(bundle.join("stages/002-summary_tokenizer.json"))?;
    assert_serialization_error(PipelineModel::load(&bundle));
    Ok(())
}

#[test]
fn test_load_rejects_other_versions() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let bundle = saved_bundle(tmp.path())?;
    let path = bundle.join("index.json");
    let mut index: Json = serde_json::from_slice(&fs::read(&path)?)?;
    index["version"] = Json::from(2);
    fs::write(&path, serde_json::to_vec_pretty(&index)?)?;

    let err = PipelineModel::load(&bundle).unwrap_err();
    assert!(err.to_string().contains("version 2"), "{err}");
    Ok(())
}

#[test]
fn test_load_rejects_artifacts_outside_the_bundle() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let bundle = saved_bundle(tmp.path())?;
    let index_path = bundle.join("index.json");
    let original: Json = serde_json::from_slice(&fs::read(&index_path)?)?;

    // a byte-identical copy outside the bundle still passes the checksum
    let outside = tmp.path().join("outside.json");
    fs::copy(bundle.join("stages/000-label_binarizer.json"), &outside)?;

    for artifact in ["../outside.json".to_string(), outside.display().to_string()] {
        let mut index = original.clone();
        index["stages"][0]["artifact"] = Json::from(artifact.clone());
        fs::write(&index_path, serde_json::to_vec_pretty(&index)?)?;
        match PipelineModel::load(&bundle) {
            Err(Error::Serialization { reason, .. }) => assert!(reason.contains("leaves the bundle"), "{reason}"),
            other => panic!("expected Serialization for `{artifact}`, got {other:?}"),
        }
    }
    Ok(())
}

#[test]
fn test_load_rejects_unknown_stage_kind() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let bundle = saved_bundle(tmp.path())?;
    assert_serialization_error(PipelineModel::load_with(&bundle, &StageRegistry::empty()));
    Ok(())
}

/// Reverses a text column; registered by hand to exercise custom decoders.
#[derive(Debug, Serialize, Deserialize)]
struct Reverse {
    name: String,
    column: String,
}

impl Transformer for Reverse {
    fn kind(&self) -> &'static str {
        "reverse"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_columns(&self) -> Vec<String> {
        vec![self.column.clone()]
    }

    fn output_schema(&self, input: &Schema) -> stagewise::Result<Schema> {
        input.require_type(&self.column, &[DataType::Utf8])?;
        Ok(input.clone())
    }

    fn transform(&self, dataset: &Dataset) -> stagewise::Result<Dataset> {
        self.output_schema(dataset.schema())?;
        let values = dataset
            .column(&self.column)?
            .iter()
            .map(|v| match v.as_str() {
                Some(s) => Value::from(s.chars().rev().collect::<String>()),
                None => Value::Null,
            })
            .collect();
        dataset.with_column(Field::new(&self.column, DataType::Utf8), values)
    }

    fn params(&self) -> Json {
        serde_json::json!({ "column": self.column })
    }

    fn artifact(&self) -> stagewise::Result<Json> {
        Ok(serde_json::to_value(self)?)
    }
}

#[test]
fn test_custom_stage_needs_a_registered_decoder() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let bundle = tmp.path().join("model");
    let reviews = sample_reviews(6);
    let model = Pipeline::new()
        .stage(Stage::transformer(Reverse {
            name: "reverse".into(),
            column: "Summary".into(),
        }))
        .stage(Stage::transformer(Tokenizer::new("tokenizer", "Summary", "words")))
        .fit(&reviews)?;
    model.save(&bundle)?;

    assert_serialization_error(PipelineModel::load(&bundle));

    let mut registry = StageRegistry::builtin();
    registry.register::<Reverse>("reverse");
    let loaded = PipelineModel::load_with(&bundle, &registry)?;
    assert_datasets_equal(&loaded.transform(&reviews)?, &model.transform(&reviews)?);
    Ok(())
}

#[test]
fn test_loaded_model_is_shared_by_streams() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let bundle = saved_bundle(tmp.path())?;
    let model = Arc::new(PipelineModel::load(&bundle)?);
    let other = Arc::clone(&model);
    let batch = sample_reviews(5);
    assert_datasets_equal(&model.transform(&batch)?, &other.transform(&batch)?);
    Ok(())
}
