//! Depth-limited regression trees over sparse feature vectors.

use crate::error::{Error, Result};
use crate::value::SparseVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Gains at or below this are treated as no improvement.
const MIN_GAIN: f64 = 1e-12;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
    },
    /// Rows with `x[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A binary tree stored as a node arena; node 0 is the root and every child
/// index is greater than its parent's.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], i: usize) -> usize {
            match nodes[i] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }

    pub fn predict(&self, x: &SparseVector) -> f64 {
        let mut i = 0;
        loop {
            match self.nodes[i] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => i = if x.get(feature) <= threshold { left } else { right },
            }
        }
    }

    /// Check the arena shape so that `predict` always terminates in bounds.
    pub(crate) fn validate(&self, num_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::InvalidData("tree has no nodes".into()));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Leaf { value } if !value.is_finite() => {
                    return Err(Error::InvalidData(format!("leaf {i} is not finite")));
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let in_order = |c: usize| c > i && c < self.nodes.len();
                    if !in_order(left) || !in_order(right) || left == right {
                        return Err(Error::InvalidData(format!("split {i} has invalid children")));
                    }
                    if feature >= num_features || !threshold.is_finite() {
                        return Err(Error::InvalidData(format!("split {i} is out of range")));
                    }
                }
                Node::Leaf { .. } => {}
            }
        }
        Ok(())
    }
}

/// Training rows in feature-major form: for every feature that is non-zero
/// somewhere, the `(row, value)` pairs that carry it.
pub(crate) struct FeatureColumns {
    columns: Vec<(usize, Vec<(usize, f64)>)>,
}

impl FeatureColumns {
    pub(crate) fn new(rows: &[&SparseVector]) -> Self {
        let mut by_feature: std::collections::BTreeMap<usize, Vec<(usize, f64)>> =
            std::collections::BTreeMap::new();
        for (r, x) in rows.iter().enumerate() {
            for (j, v) in x.iter() {
                by_feature.entry(j).or_default().push((r, v));
            }
        }
        Self {
            columns: by_feature.into_iter().collect(),
        }
    }
}

pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub min_rows: usize,
}

#[derive(Clone, Copy)]
struct Candidate {
    gain: f64,
    feature: usize,
    threshold: f64,
}

impl Candidate {
    /// Higher gain wins; ties go to the lower feature, then lower threshold.
    fn better(self, other: Self) -> Self {
        let ord = self
            .gain
            .total_cmp(&other.gain)
            .then_with(|| other.feature.cmp(&self.feature))
            .then_with(|| other.threshold.total_cmp(&self.threshold));
        if ord == Ordering::Less { other } else { self }
    }
}

/// Fit a tree to `target` by squared-error splits. Leaves hold
/// `sum(target) / sum(weight)` over their rows, the Newton step when
/// `target` is a gradient and `weight` the matching hessian.
pub(crate) fn fit_tree(
    data: &FeatureColumns,
    target: &[f64],
    weight: &[f64],
    params: &TreeParams,
) -> RegressionTree {
    let mut nodes = Vec::new();
    let rows: Vec<usize> = (0..target.len()).collect();
    grow(data, target, weight, params, &rows, 0, &mut nodes);
    RegressionTree { nodes }
}

fn grow(
    data: &FeatureColumns,
    target: &[f64],
    weight: &[f64],
    params: &TreeParams,
    rows: &[usize],
    depth: usize,
    nodes: &mut Vec<Node>,
) -> usize {
    let id = nodes.len();
    nodes.push(Node::Leaf {
        value: leaf_value(rows, target, weight),
    });
    if depth >= params.max_depth || rows.len() < 2 * params.min_rows.max(1) {
        return id;
    }
    let Some(best) = best_split(data, target, rows, params.min_rows.max(1)) else {
        return id;
    };

    let mut in_node = vec![None; target.len()];
    for &r in rows {
        in_node[r] = Some(0.0);
    }
    if let Some((_, column)) = data.columns.iter().find(|(j, _)| *j == best.feature) {
        for &(r, v) in column {
            if in_node[r].is_some() {
                in_node[r] = Some(v);
            }
        }
    }
    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
        .iter()
        .partition(|&&r| in_node[r].unwrap_or(0.0) <= best.threshold);

    let left = grow(data, target, weight, params, &left_rows, depth + 1, nodes);
    let right = grow(data, target, weight, params, &right_rows, depth + 1, nodes);
    nodes[id] = Node::Split {
        feature: best.feature,
        threshold: best.threshold,
        left,
        right,
    };
    id
}

fn leaf_value(rows: &[usize], target: &[f64], weight: &[f64]) -> f64 {
    let num: f64 = rows.iter().map(|&r| target[r]).sum();
    let den: f64 = rows.iter().map(|&r| weight[r]).sum();
    if den.abs() < 1e-12 { 0.0 } else { num / den }
}

#[allow(clippy::cast_precision_loss)]
fn best_split(data: &FeatureColumns, target: &[f64], rows: &[usize], min_rows: usize) -> Option<Candidate> {
    let mut member = vec![false; target.len()];
    for &r in rows {
        member[r] = true;
    }
    let n = rows.len();
    let total: f64 = rows.iter().map(|&r| target[r]).sum();
    let parent = total * total / n as f64;

    data.columns
        .par_iter()
        .filter_map(|(feature, column)| {
            // (value, count, sum of target)
            let mut groups: Vec<(f64, usize, f64)> = column
                .iter()
                .filter(|(r, _)| member[*r])
                .map(|&(r, v)| (v, 1, target[r]))
                .collect();
            let nonzero = groups.len();
            if nonzero == 0 {
                return None;
            }
            let nonzero_sum: f64 = groups.iter().map(|g| g.2).sum();
            if nonzero < n {
                groups.push((0.0, n - nonzero, total - nonzero_sum));
            }
            groups.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut merged: Vec<(f64, usize, f64)> = Vec::with_capacity(groups.len());
            for g in groups {
                match merged.last_mut() {
                    Some(last) if last.0 == g.0 => {
                        last.1 += g.1;
                        last.2 += g.2;
                    }
                    _ => merged.push(g),
                }
            }

            let mut best: Option<Candidate> = None;
            let (mut left_n, mut left_sum) = (0usize, 0.0f64);
            for pair in merged.windows(2) {
                left_n += pair[0].1;
                left_sum += pair[0].2;
                let right_n = n - left_n;
                if left_n < min_rows || right_n < min_rows {
                    continue;
                }
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / left_n as f64
                    + right_sum * right_sum / right_n as f64
                    - parent;
                if gain <= MIN_GAIN {
                    continue;
                }
                let c = Candidate {
                    gain,
                    feature: *feature,
                    threshold: (pair[0].0 + pair[1].0) / 2.0,
                };
                best = Some(best.map_or(c, |b| b.better(c)));
            }
            best
        })
        .reduce_with(Candidate::better)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(pairs: Vec<(usize, f64)>) -> SparseVector {
        SparseVector::from_pairs(3, pairs).unwrap()
    }

    #[test]
    fn splits_on_the_separating_feature() {
        let xs = [
            vector(vec![(1, 1.0)]),
            vector(vec![(1, 2.0)]),
            vector(vec![(0, 1.0)]),
            vector(vec![(0, 3.0)]),
        ];
        let refs: Vec<&SparseVector> = xs.iter().collect();
        let data = FeatureColumns::new(&refs);
        let target = [1.0, 1.0, -1.0, -1.0];
        let weight = [1.0; 4];
        let tree = fit_tree(&data, &target, &weight, &TreeParams { max_depth: 2, min_rows: 1 });
        tree.validate(3).unwrap();
        assert_eq!(tree.depth(), 1);
        for (x, y) in xs.iter().zip(target) {
            assert_eq!(tree.predict(x), y);
        }
    }

    #[test]
    fn validate_rejects_backward_children() {
        let tree = RegressionTree {
            nodes: vec![
                Node::Split {
                    feature: 0,
                    threshold: 0.5,
                    left: 0,
                    right: 1,
                },
                Node::Leaf { value: 1.0 },
            ],
        };
        assert!(tree.validate(1).is_err());
    }

    #[test]
    fn depth_zero_is_a_single_leaf() {
        let xs = [vector(vec![(0, 1.0)]), vector(vec![])];
        let refs: Vec<&SparseVector> = xs.iter().collect();
        let tree = fit_tree(
            &FeatureColumns::new(&refs),
            &[2.0, 4.0],
            &[1.0, 1.0],
            &TreeParams { max_depth: 0, min_rows: 1 },
        );
        assert_eq!(tree.nodes(), &[Node::Leaf { value: 3.0 }]);
    }
}
