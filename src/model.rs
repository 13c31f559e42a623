//! Fitted, immutable pipeline models and their on-disk bundle.
//!
//! A [`PipelineModel`] is the ordered list of fitted transformers captured by
//! [`Pipeline::fit`](crate::pipeline::Pipeline::fit), plus the schema at every
//! stage boundary. It holds no mutable state and can be shared across threads
//! behind an `Arc`.
//!
//! # Bundle layout
//!
//! ```text
//! model/
//!   index.json            format, version, and one entry per stage
//!   input_schema.json     training input schema (a regular schema file)
//!   stages/000-tokenizer.json
//!   stages/001-stop_words.json
//!   ...
//! ```
//!
//! `index.json` is written last, so an interrupted save leaves a directory that
//! [`PipelineModel::load`] rejects. Every artifact is checksummed with SHA-256.

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::registry::StageRegistry;
use crate::schema::Schema;
use crate::stage::{Transformer, check_inputs};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Identifies a model bundle index.
pub const BUNDLE_FORMAT: &str = "stagewise.pipeline-model";
/// Current bundle layout version.
pub const BUNDLE_VERSION: u32 = 1;

const INDEX_FILE: &str = "index.json";
const INPUT_SCHEMA_FILE: &str = "input_schema.json";
const STAGES_DIR: &str = "stages";

/// What to do when a bundle already exists at the target path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SaveMode {
    #[default]
    ErrorIfExists,
    /// Replace an existing bundle. Directories that are not bundles are never removed.
    Overwrite,
}

#[derive(Clone, Debug)]
pub struct PipelineModel {
    stages: Vec<Arc<dyn Transformer>>,
    input_schema: Schema,
    boundaries: Vec<Schema>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BundleIndex {
    format: String,
    version: u32,
    created_at_ms: u64,
    stages: Vec<IndexEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    index: usize,
    kind: String,
    name: String,
    params: Json,
    artifact: String,
    sha256: String,
    output_schema: Schema,
}

impl PipelineModel {
    pub(crate) fn from_parts(
        stages: Vec<Arc<dyn Transformer>>,
        input_schema: Schema,
        boundaries: Vec<Schema>,
    ) -> Self {
        Self {
            stages,
            input_schema,
            boundaries,
        }
    }

    pub fn stages(&self) -> &[Arc<dyn Transformer>] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Schema of the dataset the model was fitted on.
    pub fn input_schema(&self) -> &Schema {
        &self.input_schema
    }

    /// Schema produced by the last stage.
    pub fn output_schema(&self) -> &Schema {
        self.boundaries.last().unwrap_or(&self.input_schema)
    }

    /// Schema after stage `index`.
    pub fn boundary(&self, index: usize) -> Option<&Schema> {
        self.boundaries.get(index)
    }

    /// Apply every fitted stage in captured order.
    ///
    /// # Errors
    /// `SchemaMismatch` naming the stage and column when an input is missing.
    pub fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        let mut current = dataset.clone();
        for (i, stage) in self.stages.iter().enumerate() {
            check_inputs(&stage.input_columns(), current.schema())
                .and_then(|()| stage.transform(&current))
                .map(|next| current = next)
                .map_err(|e| e.at_stage(i, stage.name()))?;
        }
        debug!(stages = self.stages.len(), rows = current.num_rows(), "model applied");
        Ok(current)
    }

    /// Output schema for an arbitrary input schema, without data.
    pub fn transform_schema(&self, input: &Schema) -> Result<Schema> {
        let mut schema = input.clone();
        for (i, stage) in self.stages.iter().enumerate() {
            check_inputs(&stage.input_columns(), &schema)
                .and_then(|()| stage.output_schema(&schema))
                .map(|next| schema = next)
                .map_err(|e| e.at_stage(i, stage.name()))?;
        }
        Ok(schema)
    }

    /// Save as a bundle directory, failing if one already exists.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.save_with(path, SaveMode::ErrorIfExists)
    }

    pub fn save_with(&self, path: impl AsRef<Path>, mode: SaveMode) -> Result<()> {
        let dir = path.as_ref();
        prepare_bundle_dir(dir, mode)?;

        Schema::save(&self.input_schema, dir.join(INPUT_SCHEMA_FILE))?;

        let stages_dir = dir.join(STAGES_DIR);
        fs::create_dir_all(&stages_dir)
            .with_context(|| format!("mkdir -p {}", stages_dir.display()))?;

        let mut entries = Vec::with_capacity(self.stages.len());
        for (i, stage) in self.stages.iter().enumerate() {
            let file_name = format!("{i:03}-{}.json", sanitize(stage.name()));
            let body = serde_json::to_vec_pretty(&stage.artifact()?)?;
            write_synced(&stages_dir.join(&file_name), &body)?;
            entries.push(IndexEntry {
                index: i,
                kind: stage.kind().to_string(),
                name: stage.name().to_string(),
                params: stage.params(),
                artifact: format!("{STAGES_DIR}/{file_name}"),
                sha256: compute_checksum(&body),
                output_schema: self.output_schema_at(i).clone(),
            });
        }

        let index = BundleIndex {
            format: BUNDLE_FORMAT.to_string(),
            version: BUNDLE_VERSION,
            created_at_ms: current_timestamp_ms(),
            stages: entries,
        };
        write_synced(&dir.join(INDEX_FILE), &serde_json::to_vec_pretty(&index)?)?;
        info!(path = %dir.display(), stages = self.stages.len(), "model saved");
        Ok(())
    }

    /// Load a bundle using the built-in stage decoders.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path, &StageRegistry::builtin())
    }

    /// Load a bundle, resolving stage kinds through `registry`.
    ///
    /// # Errors
    /// `Serialization` on any malformed, tampered or incompatible content.
    pub fn load_with(path: impl AsRef<Path>, registry: &StageRegistry) -> Result<Self> {
        let dir = path.as_ref();
        let index_path = dir.join(INDEX_FILE);
        let raw = fs::read(&index_path)
            .map_err(|e| Error::serialization(&index_path, format!("cannot read bundle index: {e}")))?;
        let index: BundleIndex = serde_json::from_slice(&raw)
            .map_err(|e| Error::serialization(&index_path, format!("malformed bundle index: {e}")))?;
        if index.format != BUNDLE_FORMAT {
            return Err(Error::serialization(
                &index_path,
                format!("unknown bundle format `{}`", index.format),
            ));
        }
        if index.version != BUNDLE_VERSION {
            return Err(Error::serialization(
                &index_path,
                format!(
                    "unsupported bundle version {} (expected {BUNDLE_VERSION})",
                    index.version
                ),
            ));
        }

        let input_schema = Schema::load(dir.join(INPUT_SCHEMA_FILE))?;
        let mut stages = Vec::with_capacity(index.stages.len());
        let mut boundaries = Vec::with_capacity(index.stages.len());
        let mut schema = input_schema.clone();

        for (position, entry) in index.stages.into_iter().enumerate() {
            let artifact_path = resolve_artifact(dir, &entry.artifact)?;
            let bad = |reason: String| Error::serialization(&artifact_path, reason);
            if entry.index != position {
                return Err(bad(format!(
                    "stage listed at position {position} claims index {}",
                    entry.index
                )));
            }
            let body = fs::read(&artifact_path).map_err(|e| bad(format!("cannot read artifact: {e}")))?;
            if compute_checksum(&body) != entry.sha256 {
                return Err(bad(format!("checksum mismatch for stage `{}`", entry.name)));
            }
            let artifact: Json =
                serde_json::from_slice(&body).map_err(|e| bad(format!("malformed artifact: {e}")))?;
            let stage = registry
                .decode(&entry.kind, artifact)
                .map_err(|e| bad(format!("cannot decode stage `{}`: {e}", entry.name)))?;
            if stage.name() != entry.name || stage.kind() != entry.kind {
                return Err(bad(format!(
                    "artifact holds `{}` ({}), index expects `{}` ({})",
                    stage.name(),
                    stage.kind(),
                    entry.name,
                    entry.kind
                )));
            }
            let produced = stage
                .output_schema(&schema)
                .map_err(|e| bad(format!("stage `{}` does not accept its recorded input: {e}", entry.name)))?;
            if produced != entry.output_schema {
                return Err(bad(format!(
                    "stage `{}` output schema differs from the recorded one",
                    entry.name
                )));
            }
            schema = produced;
            boundaries.push(entry.output_schema);
            stages.push(stage);
        }

        info!(path = %dir.display(), stages = stages.len(), "model loaded");
        Ok(Self::from_parts(stages, input_schema, boundaries))
    }

    /// Human-readable description of the fitted stages and their outputs.
    pub fn explain(&self) -> String {
        let mut out = String::from("PipelineModel\n");
        for (i, stage) in self.stages.iter().enumerate() {
            let cols: Vec<_> = self.output_schema_at(i).names().collect();
            let _ = writeln!(
                out,
                "  [{i}] {} ({}) -> [{}]",
                stage.name(),
                stage.kind(),
                cols.join(", ")
            );
        }
        out
    }

    fn output_schema_at(&self, index: usize) -> &Schema {
        self.boundaries.get(index).unwrap_or(&self.input_schema)
    }
}

fn prepare_bundle_dir(dir: &Path, mode: SaveMode) -> Result<()> {
    if dir.exists() {
        let is_bundle = dir.join(INDEX_FILE).is_file();
        let is_empty = fs::read_dir(dir)
            .with_context(|| format!("read {}", dir.display()))?
            .next()
            .is_none();
        match (is_bundle, is_empty, mode) {
            (_, true, _) => {}
            (true, false, SaveMode::Overwrite) => {
                fs::remove_dir_all(dir).with_context(|| format!("remove {}", dir.display()))?;
            }
            (true, false, SaveMode::ErrorIfExists) => {
                return Err(Error::serialization(dir, "a model bundle already exists here"));
            }
            (false, false, _) => {
                return Err(Error::serialization(
                    dir,
                    "directory is not empty and is not a model bundle",
                ));
            }
        }
    }
    fs::create_dir_all(dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
    Ok(())
}

/// Resolve an index entry's artifact path, which must stay inside the bundle.
fn resolve_artifact(dir: &Path, artifact: &str) -> Result<PathBuf> {
    let relative = Path::new(artifact);
    let contained = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !contained || !relative.starts_with(STAGES_DIR) {
        return Err(Error::serialization(
            dir.join(INDEX_FILE),
            format!("artifact path `{artifact}` leaves the bundle's {STAGES_DIR}/ directory"),
        ));
    }
    Ok(dir.join(relative))
}

fn write_synced(path: &Path, body: &[u8]) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    file.write_all(body)
        .with_context(|| format!("write {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("sync {}", path.display()))?;
    Ok(())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Compute SHA-256 checksum of data.
#[must_use]
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Get current timestamp in milliseconds since epoch.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Path of the training input schema inside a bundle.
pub fn bundle_schema_path(bundle: impl AsRef<Path>) -> PathBuf {
    bundle.as_ref().join(INPUT_SCHEMA_FILE)
}
