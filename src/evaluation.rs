//! Metrics for binary classifiers.

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::schema::DataType;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scores a dataset that carries a 0/1 label, a positive-class score and a
/// 0/1 prediction. Rows whose label or score is null are skipped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryClassificationEvaluator {
    pub label_col: String,
    pub score_col: String,
    pub prediction_col: String,
}

impl Default for BinaryClassificationEvaluator {
    fn default() -> Self {
        Self {
            label_col: "label".to_string(),
            score_col: "probability".to_string(),
            prediction_col: "prediction".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinaryMetrics {
    pub area_under_roc: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub count: usize,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl fmt::Display for BinaryMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows={} auc={:.4} accuracy={:.4} precision={:.4} recall={:.4}",
            self.count, self.area_under_roc, self.accuracy, self.precision, self.recall
        )
    }
}

impl BinaryClassificationEvaluator {
    pub fn new(
        label_col: impl Into<String>,
        score_col: impl Into<String>,
        prediction_col: impl Into<String>,
    ) -> Self {
        Self {
            label_col: label_col.into(),
            score_col: score_col.into(),
            prediction_col: prediction_col.into(),
        }
    }

    /// # Errors
    /// `SchemaMismatch` for missing or non-numeric columns, `InsufficientData`
    /// when no row is usable or only one class is present.
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluate(&self, dataset: &Dataset) -> Result<BinaryMetrics> {
        let numeric = [DataType::Float64, DataType::Int64];
        let schema = dataset.schema();
        schema.require_type(&self.label_col, &numeric)?;
        schema.require_type(&self.score_col, &numeric)?;
        schema.require_type(&self.prediction_col, &numeric)?;

        let labels = dataset.column(&self.label_col)?;
        let scores = dataset.column(&self.score_col)?;
        let predictions = dataset.column(&self.prediction_col)?;

        let mut scored: Vec<(OrderedFloat<f64>, bool)> = Vec::with_capacity(dataset.num_rows());
        let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
        for ((label, score), prediction) in labels.iter().zip(scores).zip(predictions) {
            let (Some(label), Some(score)) = (label.as_f64(), score.as_f64()) else {
                continue;
            };
            let positive = label == 1.0;
            if !positive && label != 0.0 {
                return Err(Error::InvalidData(format!(
                    "label column `{}` holds {label}; labels must be 0 or 1",
                    self.label_col
                )));
            }
            scored.push((OrderedFloat(score), positive));
            let predicted = prediction.as_f64().is_some_and(|p| p == 1.0);
            match (predicted, positive) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, false) => tn += 1,
                (false, true) => fn_ += 1,
            }
        }

        let count = scored.len();
        if count == 0 {
            return Err(Error::insufficient_data("no rows with both a label and a score"));
        }
        let positives = tp + fn_;
        if positives == 0 || positives == count {
            return Err(Error::insufficient_data(
                "area under ROC needs both positive and negative labels",
            ));
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        Ok(BinaryMetrics {
            area_under_roc: area_under_roc(&mut scored, positives),
            accuracy: ratio(tp + tn, count),
            precision: ratio(tp, tp + fp),
            recall: ratio(tp, positives),
            count,
            true_positives: tp,
            false_positives: fp,
            true_negatives: tn,
            false_negatives: fn_,
        })
    }
}

/// Mann-Whitney estimate of the area under the ROC curve; tied scores share
/// the average of their ranks.
#[allow(clippy::cast_precision_loss)]
fn area_under_roc(scored: &mut [(OrderedFloat<f64>, bool)], positives: usize) -> f64 {
    scored.sort_by_key(|(s, _)| *s);
    let negatives = scored.len() - positives;
    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < scored.len() {
        let mut end = start;
        while end < scored.len() && scored[end].0 == scored[start].0 {
            end += 1;
        }
        // ranks start..end (1-based start+1..=end)
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        let tied_positives = scored[start..end].iter().filter(|(_, p)| *p).count();
        positive_rank_sum += avg_rank * tied_positives as f64;
        start = end;
    }
    let p = positives as f64;
    (positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auc(pairs: &[(f64, bool)]) -> f64 {
        let mut scored: Vec<_> = pairs.iter().map(|&(s, p)| (OrderedFloat(s), p)).collect();
        let positives = pairs.iter().filter(|(_, p)| *p).count();
        area_under_roc(&mut scored, positives)
    }

    #[test]
    fn perfect_and_inverted_rankings() {
        assert_eq!(auc(&[(0.1, false), (0.4, false), (0.6, true), (0.9, true)]), 1.0);
        assert_eq!(auc(&[(0.1, true), (0.9, false)]), 0.0);
    }

    #[test]
    fn ties_count_half() {
        assert_eq!(auc(&[(0.5, true), (0.5, false)]), 0.5);
        // one clean win, one tie out of two pairs
        assert_eq!(auc(&[(0.2, false), (0.5, false), (0.5, true)]), 0.75);
    }
}
