use super::{map_column, require_non_empty, to_json, unexpected};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::schema::{DataType, Field, Schema};
use crate::stage::Transformer;
use crate::value::Value;
use chrono::{DateTime, Datelike};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// An inclusive range of calendar months (1 = January) mapped to a label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthRange {
    pub label: String,
    pub first_month: u32,
    pub last_month: u32,
}

impl MonthRange {
    pub fn new(label: impl Into<String>, first_month: u32, last_month: u32) -> Self {
        Self {
            label: label.into(),
            first_month,
            last_month,
        }
    }

    pub fn contains(&self, month: u32) -> bool {
        (self.first_month..=self.last_month).contains(&month)
    }
}

/// Maps a unix-seconds timestamp to a label by the UTC month it falls in.
///
/// Rules are tried in order and the first one whose range contains the month
/// wins, so overlapping boundaries resolve to the earlier rule. A month no rule
/// covers yields `default_label`, or null when none is set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SeasonParams", into = "SeasonParams")]
pub struct SeasonBucketizer {
    name: String,
    input_col: String,
    output_col: String,
    rules: Vec<MonthRange>,
    default_label: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct SeasonParams {
    name: String,
    input_col: String,
    output_col: String,
    rules: Vec<MonthRange>,
    #[serde(default)]
    default_label: Option<String>,
}

impl SeasonBucketizer {
    pub const KIND: &'static str = "season_bucketizer";

    /// Winter 1-3, Spring 3-6, Summer 6-9, Fall 9-12.
    ///
    /// March, June and September sit on two ranges and go to the earlier one.
    pub fn default_rules() -> Vec<MonthRange> {
        vec![
            MonthRange::new("Winter", 1, 3),
            MonthRange::new("Spring", 3, 6),
            MonthRange::new("Summer", 6, 9),
            MonthRange::new("Fall", 9, 12),
        ]
    }

    pub fn new(name: impl Into<String>, input_col: impl Into<String>, output_col: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_col: input_col.into(),
            output_col: output_col.into(),
            rules: Self::default_rules(),
            default_label: None,
        }
    }

    /// Replace the rule list.
    pub fn with_rules(mut self, rules: Vec<MonthRange>) -> Result<Self> {
        validate_rules(&self.name, &rules)?;
        self.rules = rules;
        Ok(self)
    }

    #[must_use]
    pub fn with_default_label(mut self, label: impl Into<String>) -> Self {
        self.default_label = Some(label.into());
        self
    }

    pub fn rules(&self) -> &[MonthRange] {
        &self.rules
    }

    /// Label for a month, `None` when nothing matches and no default is set.
    pub fn label_for_month(&self, month: u32) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| r.contains(month))
            .map(|r| r.label.as_str())
            .or(self.default_label.as_deref())
    }

    fn bucket(&self, seconds: i64) -> Result<Value> {
        let when = DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
            Error::InvalidData(format!("timestamp {seconds} is out of range"))
        })?;
        Ok(self
            .label_for_month(when.month())
            .map_or(Value::Null, |l| Value::Str(l.to_string())))
    }
}

fn validate_rules(stage: &str, rules: &[MonthRange]) -> Result<()> {
    if rules.is_empty() {
        return Err(Error::invalid_parameter(stage, "at least one month range is required"));
    }
    for r in rules {
        require_non_empty(stage, "range label", &r.label)?;
        let valid = (1..=12).contains(&r.first_month)
            && (1..=12).contains(&r.last_month)
            && r.first_month <= r.last_month;
        if !valid {
            return Err(Error::invalid_parameter(
                stage,
                format!(
                    "range `{}` ({}..={}) must lie within 1..=12 in ascending order",
                    r.label, r.first_month, r.last_month
                ),
            ));
        }
    }
    Ok(())
}

impl TryFrom<SeasonParams> for SeasonBucketizer {
    type Error = Error;

    fn try_from(p: SeasonParams) -> Result<Self> {
        validate_rules(&p.name, &p.rules)?;
        Ok(Self {
            name: p.name,
            input_col: p.input_col,
            output_col: p.output_col,
            rules: p.rules,
            default_label: p.default_label,
        })
    }
}

impl From<SeasonBucketizer> for SeasonParams {
    fn from(s: SeasonBucketizer) -> Self {
        Self {
            name: s.name,
            input_col: s.input_col,
            output_col: s.output_col,
            rules: s.rules,
            default_label: s.default_label,
        }
    }
}

impl Transformer for SeasonBucketizer {
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
        input.require_type(&self.input_col, &[DataType::Int64])?;
        Ok(input.with_field(Field::new(&self.output_col, DataType::Utf8)))
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        self.output_schema(dataset.schema())?;
        let out = Field::new(&self.output_col, DataType::Utf8);
        map_column(dataset, &self.input_col, out, |v| match v {
            Value::Null => Ok(Value::Null),
            Value::Int(seconds) => self.bucket(*seconds),
            other => Err(unexpected(&self.input_col, "int64", other)),
        })
    }

    fn params(&self) -> Json {
        to_json(self)
    }

    fn artifact(&self) -> Result<Json> {
        Ok(serde_json::to_value(self)?)
    }
}
