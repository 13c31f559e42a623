use super::{map_column, require_non_empty, to_json, unexpected};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::schema::{DataType, Field, Schema};
use crate::stage::Transformer;
use crate::value::Value;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Lowercases text and splits it on whitespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokenizer {
    name: String,
    input_col: String,
    output_col: String,
}

impl Tokenizer {
    pub const KIND: &'static str = "tokenizer";

    pub fn new(name: impl Into<String>, input_col: impl Into<String>, output_col: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_col: input_col.into(),
            output_col: output_col.into(),
        }
    }
}

impl Transformer for Tokenizer {
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
        input.require_type(&self.input_col, &[DataType::Utf8])?;
        Ok(input.with_field(Field::new(&self.output_col, DataType::StringList)))
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        self.output_schema(dataset.schema())?;
        let out = Field::new(&self.output_col, DataType::StringList);
        map_column(dataset, &self.input_col, out, |v| match v {
            Value::Null => Ok(Value::Null),
            Value::Str(s) => Ok(Value::List(
                s.to_lowercase().split_whitespace().map(str::to_string).collect(),
            )),
            other => Err(unexpected(&self.input_col, "utf8", other)),
        })
    }

    fn params(&self) -> Json {
        to_json(self)
    }

    fn artifact(&self) -> Result<Json> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Configuration of a [`RegexTokenizer`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexTokenizerParams {
    pub name: String,
    pub input_col: String,
    pub output_col: String,
    /// Delimiter pattern when `gaps`, token pattern otherwise.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default = "default_true")]
    pub gaps: bool,
    #[serde(default = "default_min_token_length")]
    pub min_token_length: usize,
    #[serde(default = "default_true")]
    pub to_lowercase: bool,
}

fn default_pattern() -> String {
    r"\s+".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_min_token_length() -> usize {
    1
}

impl RegexTokenizerParams {
    pub fn new(name: impl Into<String>, input_col: impl Into<String>, output_col: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_col: input_col.into(),
            output_col: output_col.into(),
            pattern: default_pattern(),
            gaps: true,
            min_token_length: default_min_token_length(),
            to_lowercase: true,
        }
    }

    #[must_use]
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    #[must_use]
    pub fn gaps(mut self, gaps: bool) -> Self {
        self.gaps = gaps;
        self
    }

    #[must_use]
    pub fn min_token_length(mut self, n: usize) -> Self {
        self.min_token_length = n;
        self
    }

    #[must_use]
    pub fn to_lowercase(mut self, lowercase: bool) -> Self {
        self.to_lowercase = lowercase;
        self
    }
}

/// Splits text with a regular expression.
///
/// With `gaps = true` the pattern matches separators; with `gaps = false` it
/// matches the tokens themselves. Tokens shorter than `min_token_length`
/// characters are dropped.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "RegexTokenizerParams", into = "RegexTokenizerParams")]
pub struct RegexTokenizer {
    params: RegexTokenizerParams,
    regex: Regex,
}

impl RegexTokenizer {
    pub const KIND: &'static str = "regex_tokenizer";

    /// Validate `params` and compile the pattern.
    pub fn new(params: RegexTokenizerParams) -> Result<Self> {
        Self::try_from(params)
    }

    pub fn params_ref(&self) -> &RegexTokenizerParams {
        &self.params
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        let text = if self.params.to_lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        let keep = |t: &&str| t.chars().count() >= self.params.min_token_length;
        if self.params.gaps {
            self.regex.split(&text).filter(keep).map(str::to_string).collect()
        } else {
            self.regex
                .find_iter(&text)
                .map(|m| m.as_str())
                .filter(keep)
                .map(str::to_string)
                .collect()
        }
    }
}

impl TryFrom<RegexTokenizerParams> for RegexTokenizer {
    type Error = Error;

    fn try_from(params: RegexTokenizerParams) -> Result<Self> {
        require_non_empty(&params.name, "input_col", &params.input_col)?;
        require_non_empty(&params.name, "output_col", &params.output_col)?;
        let regex = Regex::new(&params.pattern)
            .map_err(|e| Error::invalid_parameter(&params.name, format!("bad pattern: {e}")))?;
        Ok(Self { params, regex })
    }
}

impl From<RegexTokenizer> for RegexTokenizerParams {
    fn from(t: RegexTokenizer) -> Self {
        t.params
    }
}

impl Transformer for RegexTokenizer {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn name(&self) -> &str {
        &self.params.name
    }

    fn input_columns(&self) -> Vec<String> {
        vec![self.params.input_col.clone()]
    }

    fn output_schema(&self, input: &Schema) -> Result<Schema> {
        input.require_type(&self.params.input_col, &[DataType::Utf8])?;
        Ok(input.with_field(Field::new(&self.params.output_col, DataType::StringList)))
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        self.output_schema(dataset.schema())?;
        let out = Field::new(&self.params.output_col, DataType::StringList);
        map_column(dataset, &self.params.input_col, out, |v| match v {
            Value::Null => Ok(Value::Null),
            Value::Str(s) => Ok(Value::List(self.tokenize(s))),
            other => Err(unexpected(&self.params.input_col, "utf8", other)),
        })
    }

    fn params(&self) -> Json {
        to_json(&self.params)
    }

    fn artifact(&self) -> Result<Json> {
        Ok(serde_json::to_value(&self.params)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_tokenizer_match_mode() {
        let t = RegexTokenizer::new(
            RegexTokenizerParams::new("t", "text", "tokens")
                .pattern(r"[a-z']+")
                .gaps(false)
                .min_token_length(2),
        )
        .unwrap();
        assert_eq!(t.tokenize("I LOVE it, don't you?"), vec!["love", "it", "don't", "you"]);
    }

    #[test]
    fn regex_tokenizer_rejects_bad_pattern() {
        let err = RegexTokenizer::new(RegexTokenizerParams::new("t", "a", "b").pattern("(")).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn artifact_round_trips_through_serde() {
        let t = RegexTokenizer::new(RegexTokenizerParams::new("t", "a", "b").pattern(r"\W+")).unwrap();
        let back: RegexTokenizer = serde_json::from_value(t.artifact().unwrap()).unwrap();
        assert_eq!(back.params_ref(), t.params_ref());
    }
}
