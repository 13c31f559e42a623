//! Durable record of completed micro-batches.
//!
//! Every batch whose output reached the sink is committed as
//! `<checkpoint>/commits/<batch_id>.json`. A restarted query reads the log,
//! skips the inputs already committed and continues with the next batch id.
//! Each record carries a SHA-256 checksum of its contents; a record that fails
//! to parse or verify is reported as a `Serialization` error, never skipped.

use crate::error::{Error, Result};
use crate::model::{compute_checksum, current_timestamp_ms};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const COMMITS_DIR: &str = "commits";

/// One committed micro-batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub batch_id: u64,
    /// Source inputs consumed by the batch (file paths for file sources).
    pub inputs: Vec<String>,
    pub num_input_rows: usize,
    pub num_output_rows: usize,
    pub committed_at_ms: u64,
    pub checksum: String,
}

impl CommitRecord {
    pub fn new(batch_id: u64, inputs: Vec<String>, num_input_rows: usize, num_output_rows: usize) -> Self {
        let mut record = Self {
            batch_id,
            inputs,
            num_input_rows,
            num_output_rows,
            committed_at_ms: current_timestamp_ms(),
            checksum: String::new(),
        };
        record.checksum = record.expected_checksum();
        record
    }

    fn expected_checksum(&self) -> String {
        let body = format!(
            "{}:{}:{}:{}:{}",
            self.batch_id,
            self.inputs.join("\n"),
            self.num_input_rows,
            self.num_output_rows,
            self.committed_at_ms
        );
        compute_checksum(body.as_bytes())
    }

    pub fn is_intact(&self) -> bool {
        self.checksum == self.expected_checksum()
    }
}

/// The commit directory of one streaming query.
#[derive(Clone, Debug)]
pub struct OffsetLog {
    dir: PathBuf,
}

impl OffsetLog {
    /// Open (creating if needed) the log under `checkpoint_dir`.
    pub fn open(checkpoint_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = checkpoint_dir.as_ref().join(COMMITS_DIR);
        fs::create_dir_all(&dir).with_context(|| format!("create checkpoint directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, batch_id: u64) -> PathBuf {
        self.dir.join(format!("{batch_id}.json"))
    }

    /// Durably write `record`. The file appears atomically under its final name.
    ///
    /// # Errors
    /// `Serialization` when the batch id is already committed.
    pub fn commit(&self, record: &CommitRecord) -> Result<PathBuf> {
        let path = self.path_of(record.batch_id);
        if path.exists() {
            return Err(Error::serialization(&path, "batch is already committed"));
        }
        let tmp = self.dir.join(format!(".{}.json.tmp", record.batch_id));
        let bytes = serde_json::to_vec_pretty(record)?;
        let mut file = File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        file.write_all(&bytes).with_context(|| format!("write {}", tmp.display()))?;
        file.sync_all().with_context(|| format!("sync {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("rename {} into place", tmp.display()))?;
        debug!(batch_id = record.batch_id, path = %path.display(), "batch committed");
        Ok(path)
    }

    /// Every committed record, in batch order, each verified.
    pub fn records(&self) -> Result<Vec<CommitRecord>> {
        let mut records = Vec::new();
        let entries = fs::read_dir(&self.dir).with_context(|| format!("read {}", self.dir.display()))?;
        for entry in entries {
            let path = entry.with_context(|| format!("read {}", self.dir.display()))?.path();
            let Some(stem) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            let Ok(batch_id) = stem.parse::<u64>() else {
                continue;
            };
            let record = read_record(&path)?;
            if record.batch_id != batch_id {
                return Err(Error::serialization(
                    &path,
                    format!("file names batch {batch_id} but records batch {}", record.batch_id),
                ));
            }
            records.push(record);
        }
        records.sort_by_key(|r| r.batch_id);
        Ok(records)
    }

    /// The most recent commit, if any.
    pub fn latest(&self) -> Result<Option<CommitRecord>> {
        Ok(self.records()?.pop())
    }
}

fn read_record(path: &Path) -> Result<CommitRecord> {
    let bytes = fs::read(path).map_err(|e| Error::serialization(path, e.to_string()))?;
    let record: CommitRecord =
        serde_json::from_slice(&bytes).map_err(|e| Error::serialization(path, e.to_string()))?;
    if !record.is_intact() {
        return Err(Error::serialization(path, "checksum mismatch"));
    }
    Ok(record)
}
