//! CSV ingestion against a declared schema.
//!
//! With headers, columns are matched by name and extra CSV columns are
//! ignored; without headers they are taken by position. Cells are parsed with
//! [`Value::parse_text`], so an empty non-text cell reads as null.

use crate::dataset::Dataset;
use crate::error::Error;
use crate::io::compression::auto_detect_reader;
use crate::schema::Schema;
use crate::value::Value;
use anyhow::Context;
use std::fs::File;
use std::path::Path;

/// Read a CSV file as a dataset with `schema`.
///
/// # Errors
/// `SchemaMismatch` when a header row lacks a schema column, `InvalidData`
/// for cells that do not parse, `Other` for I/O failures.
pub fn read_csv_dataset(path: impl AsRef<Path>, schema: &Schema, has_headers: bool) -> crate::Result<Dataset> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let rdr = auto_detect_reader(f, path).with_context(|| format!("setup decompression for {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .from_reader(rdr);

    let positions: Vec<usize> = if has_headers {
        let headers = rdr
            .headers()
            .with_context(|| format!("read CSV header of {}", path.display()))?
            .clone();
        schema
            .names()
            .map(|name| {
                headers
                    .iter()
                    .position(|h| h.trim() == name)
                    .ok_or_else(|| Error::schema_mismatch(name, format!("is not a column of {}", path.display())))
            })
            .collect::<crate::Result<_>>()?
    } else {
        (0..schema.len()).collect()
    };

    let mut rows = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| format!("parse CSV record #{} in {}", i + 1, path.display()))?;
        let row = schema
            .fields()
            .iter()
            .zip(&positions)
            .map(|(field, &pos)| match rec.get(pos) {
                Some(cell) => Value::parse_text(cell, field.data_type),
                None => Ok(Value::Null),
            })
            .collect::<crate::Result<Vec<_>>>()
            .map_err(|e| Error::InvalidData(format!("{}: record #{}: {e}", path.display(), i + 1)))?;
        rows.push(row);
    }
    Dataset::from_rows(schema.clone(), rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, Field};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("Score", DataType::Int64),
            Field::new("Summary", DataType::Utf8),
        ])
        .unwrap()
    }

    #[test]
    fn headers_are_matched_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.csv");
        std::fs::write(&path, "Summary,Extra,Score\n\"Great, really\",x,5\nmeh,y,\n").unwrap();
        let data = read_csv_dataset(&path, &schema(), true).unwrap();
        assert_eq!(data.column("Score").unwrap(), &[Value::Int(5), Value::Null]);
        assert_eq!(data.column("Summary").unwrap()[0], Value::from("Great, really"));
    }

    #[test]
    fn missing_header_names_the_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.csv");
        std::fs::write(&path, "Score\n5\n").unwrap();
        let err = read_csv_dataset(&path, &schema(), true).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { ref column, .. } if column == "Summary"));
    }
}
