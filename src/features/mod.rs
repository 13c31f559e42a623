//! Built-in feature stages for text and tabular data.
//!
//! - [`Tokenizer`] / [`RegexTokenizer`] split text into tokens
//! - [`StopWordsRemover`] drops common words
//! - [`CountVectorizer`] learns a vocabulary and produces term-count vectors
//! - [`Idf`] learns inverse document frequencies and rescales term counts
//! - [`Binarizer`] thresholds a numeric column into a 0/1 label
//! - [`SeasonBucketizer`] maps a unix timestamp to a season label
//! - [`ColumnSelector`] and [`RowFilter`] project and filter

mod binarizer;
mod columns;
mod count_vectorizer;
mod idf;
mod season;
mod stop_words;
mod tokenizer;

pub use binarizer::Binarizer;
pub use columns::{ColumnSelector, RowFilter};
pub use count_vectorizer::{CountVectorizer, CountVectorizerModel};
pub use idf::{Idf, IdfModel};
pub use season::{MonthRange, SeasonBucketizer};
pub use stop_words::{StopWordsRemover, english_stop_words};
pub use tokenizer::{RegexTokenizer, RegexTokenizerParams, Tokenizer};

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::schema::Field;
use crate::utils::par_map_values;
use crate::value::Value;
use serde::Serialize;
use serde_json::Value as Json;

/// Replace or append `output` with `f` applied to every value of `input`.
pub(crate) fn map_column<F>(dataset: &Dataset, input: &str, output: Field, f: F) -> Result<Dataset>
where
    F: Fn(&Value) -> Result<Value> + Sync + Send,
{
    let values = par_map_values(dataset.column(input)?, f)?;
    dataset.with_column(output, values)
}

/// Serialize a stage to JSON for the bundle index or artifact.
pub(crate) fn to_json<T: Serialize>(value: &T) -> Json {
    serde_json::to_value(value).unwrap_or(Json::Null)
}

pub(crate) fn require_non_empty(stage: &str, what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::invalid_parameter(stage, format!("{what} must not be empty")));
    }
    Ok(())
}

/// Error for a value whose type disagrees with its (already checked) column.
pub(crate) fn unexpected(column: &str, expected: &str, found: &Value) -> Error {
    Error::schema_mismatch(
        column,
        format!("holds {} where {expected} was expected", found.type_name()),
    )
}
