use super::tree::{FeatureColumns, RegressionTree, TreeParams, fit_tree};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::features::{require_non_empty, to_json};
use crate::schema::{DataType, Field, Schema};
use crate::stage::{Estimator, Transformer};
use crate::value::{SparseVector, Value};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::sync::Arc;
use tracing::{debug, info};

/// Parameters of [`GradientBoostedClassifier`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedParams {
    pub name: String,
    pub features_col: String,
    pub label_col: String,
    #[serde(default = "default_probability_col")]
    pub probability_col: String,
    #[serde(default = "default_prediction_col")]
    pub prediction_col: String,
    #[serde(default = "default_num_trees")]
    pub num_trees: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Minimum rows on each side of a split.
    #[serde(default = "default_min_rows")]
    pub min_rows: usize,
}

fn default_probability_col() -> String {
    "probability".to_string()
}

fn default_prediction_col() -> String {
    "prediction".to_string()
}

const fn default_num_trees() -> usize {
    20
}

const fn default_max_depth() -> usize {
    5
}

const fn default_learning_rate() -> f64 {
    0.1
}

const fn default_min_rows() -> usize {
    1
}

impl GradientBoostedParams {
    pub fn new(name: impl Into<String>, features_col: impl Into<String>, label_col: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features_col: features_col.into(),
            label_col: label_col.into(),
            probability_col: default_probability_col(),
            prediction_col: default_prediction_col(),
            num_trees: default_num_trees(),
            max_depth: default_max_depth(),
            learning_rate: default_learning_rate(),
            min_rows: default_min_rows(),
        }
    }

    #[must_use]
    pub fn num_trees(mut self, n: usize) -> Self {
        self.num_trees = n;
        self
    }

    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    #[must_use]
    pub fn learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = rate;
        self
    }

    #[must_use]
    pub fn min_rows(mut self, n: usize) -> Self {
        self.min_rows = n;
        self
    }

    #[must_use]
    pub fn output_cols(mut self, probability: impl Into<String>, prediction: impl Into<String>) -> Self {
        self.probability_col = probability.into();
        self.prediction_col = prediction.into();
        self
    }

    fn validate(&self) -> Result<()> {
        require_non_empty(&self.name, "features_col", &self.features_col)?;
        require_non_empty(&self.name, "label_col", &self.label_col)?;
        require_non_empty(&self.name, "probability_col", &self.probability_col)?;
        require_non_empty(&self.name, "prediction_col", &self.prediction_col)?;
        if self.probability_col == self.prediction_col {
            return Err(Error::invalid_parameter(
                &self.name,
                "probability_col and prediction_col must differ",
            ));
        }
        if self.num_trees == 0 {
            return Err(Error::invalid_parameter(&self.name, "num_trees must be positive"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(Error::invalid_parameter(&self.name, "learning_rate must lie in (0, 1]"));
        }
        if self.min_rows == 0 {
            return Err(Error::invalid_parameter(&self.name, "min_rows must be positive"));
        }
        Ok(())
    }
}

/// Binary classifier trained by gradient boosting on logistic loss.
///
/// Training starts from the log-odds of the positive rate and adds
/// `num_trees` regression trees, each fitted to the current residuals
/// `y - p` with Newton-step leaves. Rows with a null label or null features
/// are ignored. Labels must be 0 or 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GradientBoostedParams", into = "GradientBoostedParams")]
pub struct GradientBoostedClassifier {
    params: GradientBoostedParams,
}

impl GradientBoostedClassifier {
    pub const KIND: &'static str = "gradient_boosted_classifier";

    pub fn new(params: GradientBoostedParams) -> Result<Self> {
        Self::try_from(params)
    }

    pub fn params_ref(&self) -> &GradientBoostedParams {
        &self.params
    }

    /// Feature vectors and 0/1 labels of the usable training rows.
    fn training_rows<'a>(&self, dataset: &'a Dataset) -> Result<(Vec<&'a SparseVector>, Vec<f64>)> {
        let features = dataset.column(&self.params.features_col)?;
        let labels = dataset.column(&self.params.label_col)?;
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        let mut size = None;
        for (x, y) in features.iter().zip(labels) {
            let (Value::Vector(x), Some(y)) = (x, y.as_f64()) else {
                continue;
            };
            if y != 0.0 && y != 1.0 {
                return Err(Error::InvalidData(format!(
                    "label column `{}` holds {y}; labels must be 0 or 1",
                    self.params.label_col
                )));
            }
            match size {
                None => size = Some(x.size),
                Some(n) if n != x.size => {
                    return Err(Error::InvalidData(format!(
                        "column `{}` mixes vectors of size {n} and {}",
                        self.params.features_col, x.size
                    )));
                }
                Some(_) => {}
            }
            xs.push(x);
            ys.push(y);
        }
        Ok((xs, ys))
    }
}

impl TryFrom<GradientBoostedParams> for GradientBoostedClassifier {
    type Error = Error;

    fn try_from(params: GradientBoostedParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl From<GradientBoostedClassifier> for GradientBoostedParams {
    fn from(c: GradientBoostedClassifier) -> Self {
        c.params
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn with_outputs(input: &Schema, probability_col: &str, prediction_col: &str) -> Schema {
    input
        .with_field(Field::new(probability_col, DataType::Float64))
        .with_field(Field::new(prediction_col, DataType::Float64))
}

impl Estimator for GradientBoostedClassifier {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn name(&self) -> &str {
        &self.params.name
    }

    fn input_columns(&self) -> Vec<String> {
        vec![self.params.features_col.clone(), self.params.label_col.clone()]
    }

    fn output_schema(&self, input: &Schema) -> Result<Schema> {
        input.require_type(&self.params.features_col, &[DataType::Vector])?;
        input.require_type(&self.params.label_col, &[DataType::Float64, DataType::Int64])?;
        Ok(with_outputs(input, &self.params.probability_col, &self.params.prediction_col))
    }

    #[allow(clippy::cast_precision_loss)]
    fn fit(&self, dataset: &Dataset) -> Result<Arc<dyn Transformer>> {
        self.output_schema(dataset.schema())?;
        let p = &self.params;
        let (xs, ys) = self.training_rows(dataset)?;
        if xs.is_empty() {
            return Err(Error::insufficient_data("no rows with both features and a label"));
        }
        let positives = ys.iter().filter(|&&y| y == 1.0).count();
        if positives == 0 || positives == ys.len() {
            return Err(Error::insufficient_data(format!(
                "label column `{}` has a single class",
                p.label_col
            )));
        }

        let rate = positives as f64 / ys.len() as f64;
        let base_score = (rate / (1.0 - rate)).ln();
        let num_features = xs[0].size;
        let columns = FeatureColumns::new(&xs);
        let tree_params = TreeParams {
            max_depth: p.max_depth,
            min_rows: p.min_rows,
        };

        let mut margin = vec![base_score; xs.len()];
        let mut trees = Vec::with_capacity(p.num_trees);
        for t in 0..p.num_trees {
            let probs: Vec<f64> = margin.iter().map(|&m| sigmoid(m)).collect();
            let residual: Vec<f64> = ys.iter().zip(&probs).map(|(y, q)| y - q).collect();
            let hessian: Vec<f64> = probs.iter().map(|q| q * (1.0 - q)).collect();
            let tree = fit_tree(&columns, &residual, &hessian, &tree_params);
            let step: Vec<f64> = xs.par_iter().map(|x| tree.predict(x)).collect();
            for (m, s) in margin.iter_mut().zip(step) {
                *m += p.learning_rate * s;
            }
            debug!(stage = %p.name, tree = t, nodes = tree.nodes().len(), "tree fitted");
            trees.push(tree);
        }

        info!(
            stage = %p.name,
            rows = xs.len(),
            positives,
            features = num_features,
            trees = trees.len(),
            "gradient boosted model trained"
        );
        Ok(Arc::new(GradientBoostedModel {
            name: p.name.clone(),
            features_col: p.features_col.clone(),
            probability_col: p.probability_col.clone(),
            prediction_col: p.prediction_col.clone(),
            num_features,
            base_score,
            learning_rate: p.learning_rate,
            trees,
        }))
    }

    fn params(&self) -> Json {
        to_json(&self.params)
    }
}

/// Fitted ensemble: `P(label = 1) = sigmoid(base_score + learning_rate * sum(trees))`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelRepr", into = "ModelRepr")]
pub struct GradientBoostedModel {
    name: String,
    features_col: String,
    probability_col: String,
    prediction_col: String,
    num_features: usize,
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

#[derive(Serialize, Deserialize)]
struct ModelRepr {
    name: String,
    features_col: String,
    probability_col: String,
    prediction_col: String,
    num_features: usize,
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl TryFrom<ModelRepr> for GradientBoostedModel {
    type Error = Error;

    fn try_from(r: ModelRepr) -> Result<Self> {
        if !r.base_score.is_finite() || !r.learning_rate.is_finite() {
            return Err(Error::InvalidData("model coefficients must be finite".into()));
        }
        for tree in &r.trees {
            tree.validate(r.num_features)?;
        }
        Ok(Self {
            name: r.name,
            features_col: r.features_col,
            probability_col: r.probability_col,
            prediction_col: r.prediction_col,
            num_features: r.num_features,
            base_score: r.base_score,
            learning_rate: r.learning_rate,
            trees: r.trees,
        })
    }
}

impl From<GradientBoostedModel> for ModelRepr {
    fn from(m: GradientBoostedModel) -> Self {
        Self {
            name: m.name,
            features_col: m.features_col,
            probability_col: m.probability_col,
            prediction_col: m.prediction_col,
            num_features: m.num_features,
            base_score: m.base_score,
            learning_rate: m.learning_rate,
            trees: m.trees,
        }
    }
}

impl GradientBoostedModel {
    pub const KIND: &'static str = "gradient_boosted_model";

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Probability of the positive class.
    pub fn predict_probability(&self, x: &SparseVector) -> Result<f64> {
        if x.size != self.num_features {
            return Err(Error::InvalidData(format!(
                "feature vector of size {} does not match the trained size {}",
                x.size, self.num_features
            )));
        }
        let margin: f64 = self.trees.iter().map(|t| t.predict(x)).sum();
        Ok(sigmoid(self.base_score + self.learning_rate * margin))
    }
}

impl Transformer for GradientBoostedModel {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_columns(&self) -> Vec<String> {
        vec![self.features_col.clone()]
    }

    fn output_schema(&self, input: &Schema) -> Result<Schema> {
        input.require_type(&self.features_col, &[DataType::Vector])?;
        Ok(with_outputs(input, &self.probability_col, &self.prediction_col))
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        self.output_schema(dataset.schema())?;
        let probability: Vec<Value> = dataset
            .column(&self.features_col)?
            .par_iter()
            .map(|v| match v {
                Value::Null => Ok(Value::Null),
                Value::Vector(x) => self.predict_probability(x).map(Value::Float),
                other => Err(crate::features::unexpected(&self.features_col, "vector", other)),
            })
            .collect::<Result<_>>()?;
        let prediction = probability
            .iter()
            .map(|p| match p {
                Value::Float(q) => Value::Float(if *q > 0.5 { 1.0 } else { 0.0 }),
                _ => Value::Null,
            })
            .collect();
        dataset
            .with_column(Field::new(&self.probability_col, DataType::Float64), probability)?
            .with_column(Field::new(&self.prediction_col, DataType::Float64), prediction)
    }

    fn params(&self) -> Json {
        serde_json::json!({
            "features_col": self.features_col,
            "probability_col": self.probability_col,
            "prediction_col": self.prediction_col,
            "num_features": self.num_features,
            "num_trees": self.trees.len(),
            "learning_rate": self.learning_rate,
        })
    }

    fn artifact(&self) -> Result<Json> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> Dataset {
        let schema = Schema::new(vec![
            Field::new("features", DataType::Vector),
            Field::new("label", DataType::Float64),
        ])
        .unwrap();
        let mut rows = Vec::new();
        for i in 0..20 {
            let positive = i % 2 == 0;
            let x = if positive {
                SparseVector::from_pairs(2, vec![(0, 1.0 + f64::from(i % 3))]).unwrap()
            } else {
                SparseVector::from_pairs(2, vec![(1, 1.0)]).unwrap()
            };
            rows.push(vec![Value::from(x), Value::Float(if positive { 1.0 } else { 0.0 })]);
        }
        Dataset::from_rows(schema, rows).unwrap()
    }

    #[test]
    fn separable_data_is_learned() {
        let clf = GradientBoostedClassifier::new(
            GradientBoostedParams::new("gbt", "features", "label").num_trees(10).max_depth(2),
        )
        .unwrap();
        let data = toy();
        let out = clf.fit(&data).unwrap().transform(&data).unwrap();
        assert_eq!(out.column("prediction").unwrap(), data.column("label").unwrap());
    }

    #[test]
    fn single_class_is_insufficient() {
        let data = toy();
        let positives = data.filter(&crate::expr::col("label").eq(crate::expr::lit(1.0))).unwrap();
        let clf = GradientBoostedClassifier::new(GradientBoostedParams::new("gbt", "features", "label")).unwrap();
        assert!(matches!(clf.fit(&positives).unwrap_err(), Error::InsufficientData { .. }));
    }

    #[test]
    fn invalid_params_are_rejected() {
        let p = GradientBoostedParams::new("gbt", "features", "label").learning_rate(0.0);
        assert!(matches!(
            GradientBoostedClassifier::new(p).unwrap_err(),
            Error::InvalidParameter { .. }
        ));
    }

    #[test]
    fn artifact_is_validated_on_decode() {
        let data = toy();
        let clf = GradientBoostedClassifier::new(GradientBoostedParams::new("gbt", "features", "label").num_trees(2))
            .unwrap();
        let mut artifact = clf.fit(&data).unwrap().artifact().unwrap();
        let back: GradientBoostedModel = serde_json::from_value(artifact.clone()).unwrap();
        assert_eq!(back.trees().len(), 2);
        artifact["num_features"] = serde_json::json!(0);
        assert!(serde_json::from_value::<GradientBoostedModel>(artifact).is_err());
    }
}
