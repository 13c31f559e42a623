//! Assertions for comparing datasets in tests.
//!
//! Each function panics with the first differing row or column, which is far
//! easier to read than `assert_eq!` over two whole datasets.

use crate::dataset::Dataset;
use crate::value::Value;

/// Assert that two datasets have the same schema and the same rows in the
/// same order.
///
/// # Panics
///
/// Panics on the first schema, row count or cell difference.
///
/// # Example
///
/// ```
/// use stagewise::testing::{assert_datasets_equal, sample_reviews};
///
/// let a = sample_reviews(4);
/// assert_datasets_equal(&a, &a.clone());
/// ```
pub fn assert_datasets_equal(actual: &Dataset, expected: &Dataset) {
    assert_eq!(
        actual.schema(),
        expected.schema(),
        "Schema mismatch:\n  Expected: {}\n  Actual: {}",
        expected.schema(),
        actual.schema()
    );
    assert_eq!(
        actual.num_rows(),
        expected.num_rows(),
        "Row count mismatch:\n  Expected: {}\n  Actual: {}",
        expected.num_rows(),
        actual.num_rows()
    );
    for (i, (a, e)) in actual.rows().zip(expected.rows()).enumerate() {
        let (a, e) = (a.values(), e.values());
        if a != e {
            let column = actual
                .schema()
                .names()
                .zip(a.iter().zip(&e))
                .find(|(_, (x, y))| x != y)
                .map_or("?", |(name, _)| name);
            panic!(
                "Row mismatch at index {i} (first differing column `{column}`):\n  Expected: {e:?}\n  Actual: {a:?}"
            );
        }
    }
}

/// Assert that `actual` has exactly these values in column `name`.
///
/// # Panics
///
/// Panics if the column is missing or any value differs.
pub fn assert_column_equals(actual: &Dataset, name: &str, expected: &[Value]) {
    let values = match actual.column(name) {
        Ok(values) => values,
        Err(e) => panic!("Column `{name}` not available: {e}"),
    };
    assert_eq!(
        values.len(),
        expected.len(),
        "Column `{name}` length mismatch:\n  Expected: {expected:?}\n  Actual: {values:?}"
    );
    for (i, (a, e)) in values.iter().zip(expected).enumerate() {
        assert_eq!(
            a, e,
            "Column `{name}` mismatch at row {i}:\n  Expected: {e:?}\n  Actual: {a:?}"
        );
    }
}

/// Assert that the dataset has exactly these column names, in order.
///
/// # Panics
///
/// Panics if the names differ.
pub fn assert_columns(actual: &Dataset, expected: &[&str]) {
    let names: Vec<&str> = actual.schema().names().collect();
    assert_eq!(names, expected, "Column names mismatch");
}

/// Assert that every value of a numeric column lies within `[low, high]`.
///
/// # Panics
///
/// Panics on a null, non-numeric or out-of-range value.
pub fn assert_column_in_range(actual: &Dataset, name: &str, low: f64, high: f64) {
    let values = match actual.column(name) {
        Ok(values) => values,
        Err(e) => panic!("Column `{name}` not available: {e}"),
    };
    for (i, v) in values.iter().enumerate() {
        match v.as_f64() {
            Some(x) if (low..=high).contains(&x) => {}
            _ => panic!("Column `{name}` row {i}: {v:?} not in [{low}, {high}]"),
        }
    }
}
