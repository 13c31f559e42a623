//! File globbing for directory-backed sources.
//!
//! ```no_run
//! use stagewise::io::glob::expand_glob;
//!
//! let batches = expand_glob("incoming/*.jsonl")?;
//! # use anyhow::Error; Ok::<(), Error>(())
//! ```

use anyhow::{Context, Result};
use glob::glob;
use std::path::{Path, PathBuf};

/// Expand `pattern` into the regular files it matches, sorted by path.
///
/// Zero matches is an empty vector, not an error.
///
/// # Errors
/// An invalid pattern or an unreadable directory entry.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut result = Vec::new();
    for entry in paths {
        let path = entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            result.push(path);
        }
    }
    result.sort();
    Ok(result)
}

/// Join a directory and a file pattern into one glob pattern.
///
/// Glob metacharacters in `dir` are escaped so that only `file_pattern` is
/// interpreted.
pub fn dir_pattern(dir: impl AsRef<Path>, file_pattern: &str) -> String {
    let dir = glob::Pattern::escape(&dir.as_ref().to_string_lossy());
    format!("{}/{file_pattern}", dir.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn matches_are_sorted_and_skip_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.jsonl"), "").unwrap();
        fs::write(dir.path().join("a.jsonl"), "").unwrap();
        fs::write(dir.path().join("c.csv"), "").unwrap();
        fs::create_dir(dir.path().join("d.jsonl")).unwrap();

        let files = expand_glob(&dir_pattern(dir.path(), "*.jsonl")).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jsonl", "b.jsonl"]);
    }

    #[test]
    fn bad_pattern_is_an_error() {
        assert!(expand_glob("[").is_err());
    }
}
