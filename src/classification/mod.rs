//! Binary classification by gradient-boosted regression trees.

mod gbt;
pub mod tree;

pub use gbt::{GradientBoostedClassifier, GradientBoostedModel, GradientBoostedParams};
pub use tree::{Node, RegressionTree};
