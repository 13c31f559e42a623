use super::{map_column, to_json, unexpected};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::schema::{DataType, Field, Schema};
use crate::stage::Transformer;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashSet;

const ENGLISH: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by",
    "for", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
    "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
    "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can", "will",
    "just", "don", "should", "now", "i'll", "you'll", "he'll", "she'll", "we'll", "they'll",
    "i'd", "you'd", "he'd", "she'd", "we'd", "they'd", "i'm", "you're", "he's", "she's",
    "it's", "we're", "they're", "i've", "we've", "you've", "they've", "isn't", "aren't",
    "wasn't", "weren't", "haven't", "hasn't", "hadn't", "don't", "doesn't", "didn't",
    "won't", "wouldn't", "shan't", "shouldn't", "mustn't", "can't", "couldn't", "cannot",
    "could", "here's", "how's", "let's", "ought", "that's", "there's", "what's", "when's",
    "where's", "who's", "why's", "would",
];

/// The default English stop word list.
pub fn english_stop_words() -> Vec<String> {
    ENGLISH.iter().map(|w| (*w).to_string()).collect()
}

/// Removes stop words from a token column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopWordsRemover {
    name: String,
    input_col: String,
    output_col: String,
    stop_words: Vec<String>,
    #[serde(default)]
    case_sensitive: bool,
}

impl StopWordsRemover {
    pub const KIND: &'static str = "stop_words_remover";

    /// A case-insensitive remover using the English list.
    pub fn new(name: impl Into<String>, input_col: impl Into<String>, output_col: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_col: input_col.into(),
            output_col: output_col.into(),
            stop_words: english_stop_words(),
            case_sensitive: false,
        }
    }

    #[must_use]
    pub fn with_stop_words(mut self, words: Vec<String>) -> Self {
        self.stop_words = words;
        self
    }

    #[must_use]
    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    fn lookup(&self) -> HashSet<String> {
        self.stop_words
            .iter()
            .map(|w| if self.case_sensitive { w.clone() } else { w.to_lowercase() })
            .collect()
    }
}

impl Transformer for StopWordsRemover {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_columns(&self) -> Vec<String> {
        vec![self.input_col.clone()]
    }

    fn output_schema(&self, input: &Schema) -> Result<Schema> {
        input.require_type(&self.input_col, &[DataType::StringList])?;
        Ok(input.with_field(Field::new(&self.output_col, DataType::StringList)))
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        self.output_schema(dataset.schema())?;
        let stop = self.lookup();
        let out = Field::new(&self.output_col, DataType::StringList);
        map_column(dataset, &self.input_col, out, |v| match v {
            Value::Null => Ok(Value::Null),
            Value::List(tokens) => Ok(Value::List(
                tokens
                    .iter()
                    .filter(|t| {
                        if self.case_sensitive {
                            !stop.contains(t.as_str())
                        } else {
                            !stop.contains(&t.to_lowercase())
                        }
                    })
                    .cloned()
                    .collect(),
            )),
            other => Err(unexpected(&self.input_col, "string_list", other)),
        })
    }

    fn params(&self) -> Json {
        to_json(self)
    }

    fn artifact(&self) -> Result<Json> {
        Ok(serde_json::to_value(self)?)
    }
}
