//! File I/O for datasets: JSON Lines, CSV, transparent compression, globbing.

pub mod compression;
pub mod glob;
pub mod jsonl;

#[cfg_attr(docsrs, doc(cfg(feature = "io-csv")))]
#[cfg(feature = "io-csv")]
pub mod csv;

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk row format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    #[default]
    Jsonl,
    /// CSV with a header row.
    Csv,
}

impl FileFormat {
    /// Guess the format from the extension, looking past a compression suffix.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let name = path.as_ref().file_name()?.to_string_lossy().to_lowercase();
        let name = [".gz", ".gzip", ".zst", ".zstd"]
            .iter()
            .find_map(|ext| name.strip_suffix(ext))
            .unwrap_or(&name);
        if name.ends_with(".jsonl") || name.ends_with(".json") || name.ends_with(".ndjson") {
            Some(Self::Jsonl)
        } else if name.ends_with(".csv") {
            Some(Self::Csv)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Csv => "csv",
        }
    }
}

/// Read one file of `format` as a dataset with `schema`.
pub fn read_dataset(path: impl AsRef<Path>, format: FileFormat, schema: &Schema) -> Result<Dataset> {
    match format {
        FileFormat::Jsonl => jsonl::read_jsonl_dataset(path, schema),
        #[cfg(feature = "io-csv")]
        FileFormat::Csv => csv::read_csv_dataset(path, schema, true),
        #[cfg(not(feature = "io-csv"))]
        FileFormat::Csv => Err(Error::InvalidParameter {
            stage: "io".to_string(),
            reason: format!("cannot read {}: built without the `io-csv` feature", path.as_ref().display()),
        }),
    }
}

/// Read several files of one format and concatenate them in the given order.
pub fn read_datasets<P: AsRef<Path>>(paths: &[P], format: FileFormat, schema: &Schema) -> Result<Dataset> {
    let parts = paths
        .iter()
        .map(|p| read_dataset(p, format, schema))
        .collect::<Result<Vec<_>>>()?;
    if parts.is_empty() {
        return Ok(Dataset::empty(schema.clone()));
    }
    Dataset::concat(&parts)
}

/// Read every file matching `pattern`, in path order.
///
/// # Errors
/// `InvalidData` when nothing matches.
pub fn read_glob(pattern: &str, format: FileFormat, schema: &Schema) -> Result<Dataset> {
    let files = glob::expand_glob(pattern)?;
    if files.is_empty() {
        return Err(Error::InvalidData(format!("no files found matching pattern: {pattern}")));
    }
    read_datasets(&files, format, schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_detection_skips_compression_suffix() {
        assert_eq!(FileFormat::from_path("a/batch-1.jsonl.gz"), Some(FileFormat::Jsonl));
        assert_eq!(FileFormat::from_path("reviews.CSV"), Some(FileFormat::Csv));
        assert_eq!(FileFormat::from_path("notes.txt"), None);
    }
}
