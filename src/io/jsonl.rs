//! JSON Lines reading and writing.
//!
//! - Typed I/O with serde: [`read_jsonl_vec`] and [`write_jsonl_vec`]
//! - Schema-driven dataset I/O: [`read_jsonl_dataset`] and [`write_jsonl_dataset`]
//!
//! Empty and whitespace-only lines are skipped on read. Compressed files are
//! handled transparently (see [`compression`](super::compression)).

use crate::dataset::Dataset;
use crate::io::compression::{auto_detect_reader, auto_detect_writer};
use crate::schema::Schema;
use crate::value::Value;
use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value as Json};
use std::fs::{File, create_dir_all};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Read a JSONL file into a typed `Vec<T>`.
///
/// # Errors
/// The file cannot be opened or read, or a line does not parse into `T`.
/// Errors carry the line number.
pub fn read_jsonl_vec<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let rdr = auto_detect_reader(f, path).with_context(|| format!("setup decompression for {}", path.display()))?;
    let rdr = BufReader::new(rdr);
    let mut out = Vec::<T>::new();
    for (i, line) in rdr.lines().enumerate() {
        let line = line.with_context(|| format!("read line {} in {}", i + 1, path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let v: T = serde_json::from_str(&line)
            .with_context(|| format!("parse JSONL line {} in {}: {}", i + 1, path.display(), line))?;
        out.push(v);
    }
    Ok(out)
}

/// Write a typed slice as JSONL, one value per line. Parent directories are
/// created as needed.
///
/// # Returns
/// The number of items written.
pub fn write_jsonl_vec<T: Serialize>(path: impl AsRef<Path>, data: &[T]) -> Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = auto_detect_writer(f, path).with_context(|| format!("setup compression for {}", path.display()))?;
    for (i, item) in data.iter().enumerate() {
        serde_json::to_writer(&mut w, item).with_context(|| format!("serialize item #{} to {}", i, path.display()))?;
        w.write_all(b"\n")?;
    }
    w.flush()?;
    Ok(data.len())
}

/// Read a JSONL file of objects as a dataset with `schema`.
///
/// Each line must be a JSON object; keys not in the schema are ignored and
/// absent keys read as null.
///
/// # Errors
/// `InvalidData` for a non-object line or a value that does not fit its column,
/// `Other` for I/O and JSON syntax failures.
pub fn read_jsonl_dataset(path: impl AsRef<Path>, schema: &Schema) -> crate::Result<Dataset> {
    let path = path.as_ref();
    let records: Vec<Json> = read_jsonl_vec(path)?;
    let mut rows = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let Json::Object(object) = record else {
            return Err(crate::Error::InvalidData(format!(
                "{}: record #{} is not a JSON object",
                path.display(),
                i + 1
            )));
        };
        rows.push(row_from_object(object, schema).map_err(|e| {
            crate::Error::InvalidData(format!("{}: record #{}: {e}", path.display(), i + 1))
        })?);
    }
    Dataset::from_rows(schema.clone(), rows)
}

pub(crate) fn row_from_object(object: &Map<String, Json>, schema: &Schema) -> crate::Result<Vec<Value>> {
    schema
        .fields()
        .iter()
        .map(|f| object.get(&f.name).map_or(Ok(Value::Null), |j| Value::from_json(j, f.data_type)))
        .collect()
}

/// One JSON object per row, keyed by column name.
pub fn dataset_records(dataset: &Dataset) -> Vec<Json> {
    let names: Vec<&str> = dataset.schema().names().collect();
    dataset
        .rows()
        .map(|row| {
            let object: Map<String, Json> = names
                .iter()
                .enumerate()
                .map(|(i, n)| ((*n).to_string(), row.value(i).to_json()))
                .collect();
            Json::Object(object)
        })
        .collect()
}

/// Write every row of `dataset` as a JSON object per line.
pub fn write_jsonl_dataset(path: impl AsRef<Path>, dataset: &Dataset) -> crate::Result<usize> {
    Ok(write_jsonl_vec(path, &dataset_records(dataset))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, Field};

    #[test]
    fn dataset_round_trip_through_jsonl() {
        let schema = Schema::new(vec![
            Field::new("Id", DataType::Int64),
            Field::new("Summary", DataType::Utf8),
        ])
        .unwrap();
        let data = Dataset::from_rows(
            schema.clone(),
            vec![
                vec![Value::Int(1), Value::from("tasty")],
                vec![Value::Int(2), Value::Null],
            ],
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/part.jsonl");
        assert_eq!(write_jsonl_dataset(&path, &data).unwrap(), 2);
        assert_eq!(read_jsonl_dataset(&path, &schema).unwrap(), data);
    }

    #[test]
    fn missing_keys_read_as_null_and_arrays_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.jsonl");
        std::fs::write(&path, "{\"Id\": 7}\n\n[1, 2]\n").unwrap();
        let schema = Schema::new(vec![
            Field::new("Id", DataType::Int64),
            Field::new("Summary", DataType::Utf8),
        ])
        .unwrap();
        let err = read_jsonl_dataset(&path, &schema).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidData(_)));

        std::fs::write(&path, "{\"Id\": 7}\n").unwrap();
        let data = read_jsonl_dataset(&path, &schema).unwrap();
        assert_eq!(data.column("Summary").unwrap(), &[Value::Null]);
    }
}
