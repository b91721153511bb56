//! Random forest of CART regression trees over sparse non-negative rows.
//!
//! Each tree is fitted on a bootstrap sample drawn with seed `seed + i`,
//! so a fit is reproducible regardless of how rayon schedules the trees.
//! Splits minimise the summed squared error of the two children; a row
//! goes left when its feature value is `<= threshold`, absent features
//! reading as 0.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::BTreeMap;

use super::tfidf::SparseRow;

/// Smallest error reduction that still justifies a split.
const MIN_GAIN: f64 = 1e-9;

#[derive(Debug, thiserror::Error)]
pub enum FitError {
    #[error("cannot fit with zero samples")]
    NoSamples,

    #[error("{rows} rows but {targets} targets")]
    LengthMismatch { rows: usize, targets: usize },
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

fn feature_value(row: &SparseRow, feature: usize) -> f64 {
    row.binary_search_by_key(&feature, |(col, _)| *col)
        .map(|idx| row[idx].1)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone)]
pub struct RegressionTree {
    root: Node,
}

impl RegressionTree {
    /// Fit on the rows named by `samples`; an index may repeat.
    fn fit(rows: &[SparseRow], y: &[f64], samples: Vec<usize>, max_depth: Option<usize>) -> Self {
        Self {
            root: build_node(rows, y, samples, 0, max_depth),
        }
    }

    pub fn predict(&self, row: &SparseRow) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if feature_value(row, *feature) <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf(_) => 0,
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    n: f64,
    sum: f64,
    sum_sq: f64,
}

impl Moments {
    fn add(&mut self, y: f64) {
        self.n += 1.0;
        self.sum += y;
        self.sum_sq += y * y;
    }

    fn minus(&self, other: &Moments) -> Moments {
        Moments {
            n: self.n - other.n,
            sum: self.sum - other.sum,
            sum_sq: self.sum_sq - other.sum_sq,
        }
    }

    /// Sum of squared deviations from the mean.
    fn sse(&self) -> f64 {
        if self.n == 0.0 {
            return 0.0;
        }
        (self.sum_sq - self.sum * self.sum / self.n).max(0.0)
    }

    fn mean(&self) -> f64 {
        if self.n == 0.0 {
            0.0
        } else {
            self.sum / self.n
        }
    }
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

fn build_node(
    rows: &[SparseRow],
    y: &[f64],
    samples: Vec<usize>,
    depth: usize,
    max_depth: Option<usize>,
) -> Node {
    let mut total = Moments::default();
    for &s in &samples {
        total.add(y[s]);
    }

    let at_max_depth = max_depth.is_some_and(|max| depth >= max);
    if samples.len() < 2 || at_max_depth || total.sse() < 1e-10 {
        return Node::Leaf(total.mean());
    }

    let Some(split) = best_split(rows, y, &samples, &total) else {
        return Node::Leaf(total.mean());
    };
    log::trace!(
        "depth {depth}: split feature {} at {:.4} (gain {:.3})",
        split.feature,
        split.threshold,
        split.gain
    );

    let (left, right): (Vec<usize>, Vec<usize>) = samples
        .into_iter()
        .partition(|&s| feature_value(&rows[s], split.feature) <= split.threshold);

    Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left: Box::new(build_node(rows, y, left, depth + 1, max_depth)),
        right: Box::new(build_node(rows, y, right, depth + 1, max_depth)),
    }
}

/// Best split over every feature present in `samples`. Ties keep the
/// lower feature index and the lower threshold.
fn best_split(rows: &[SparseRow], y: &[f64], samples: &[usize], total: &Moments) -> Option<Split> {
    let mut nonzero: BTreeMap<usize, Vec<(f64, f64)>> = BTreeMap::new();
    for &s in samples {
        for &(feature, value) in &rows[s] {
            nonzero.entry(feature).or_default().push((value, y[s]));
        }
    }

    let parent_sse = total.sse();
    let mut best: Option<Split> = None;

    for (feature, mut entries) in nonzero {
        entries.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut present = Moments::default();
        for &(_, target) in &entries {
            present.add(target);
        }
        // rows without the feature read as 0 and sort first
        let mut left = total.minus(&present);
        let mut prev_value = 0.0;

        let mut i = 0;
        while i < entries.len() {
            let value = entries[i].0;
            if left.n > 0.0 && value > prev_value {
                let right = total.minus(&left);
                let gain = parent_sse - left.sse() - right.sse();
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(Split {
                        feature,
                        threshold: (prev_value + value) / 2.0,
                        gain,
                    });
                }
            }

            while i < entries.len() && entries[i].0 == value {
                left.add(entries[i].1);
                i += 1;
            }
            prev_value = value;
        }
    }

    best
}

/// Bootstrap sample of `n` indices, drawn with replacement.
fn bootstrap_sample(n: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.random_range(0..n)).collect()
}

#[derive(Debug, Clone)]
pub struct RandomForestRegressor {
    n_estimators: usize,
    max_depth: Option<usize>,
    seed: u64,
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            n_estimators,
            max_depth: None,
            seed: 42,
            trees: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn fit(&mut self, rows: &[SparseRow], y: &[f64]) -> Result<(), FitError> {
        if rows.len() != y.len() {
            return Err(FitError::LengthMismatch {
                rows: rows.len(),
                targets: y.len(),
            });
        }
        if rows.is_empty() {
            return Err(FitError::NoSamples);
        }

        let n = rows.len();
        let max_depth = self.max_depth;
        let seed = self.seed;
        self.trees = (0..self.n_estimators.max(1))
            .into_par_iter()
            .map(|i| {
                let samples = bootstrap_sample(n, seed.wrapping_add(i as u64));
                RegressionTree::fit(rows, y, samples, max_depth)
            })
            .collect();

        log::debug!(
            "fitted {} trees on {} rows, deepest {}",
            self.trees.len(),
            n,
            self.trees.iter().map(RegressionTree::depth).max().unwrap_or(0)
        );
        Ok(())
    }

    /// Mean of the tree predictions; 0.0 before `fit`.
    pub fn predict(&self, row: &SparseRow) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        sum / self.trees.len() as f64
    }

    pub fn predict_all(&self, rows: &[SparseRow]) -> Vec<f64> {
        rows.iter().map(|r| self.predict(r)).collect()
    }
}

/// Coefficient of determination. 0.0 when the targets have no variance.
pub fn r_squared(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return 0.0;
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_tot: f64 = y_true.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(y, p)| (y - p).powi(2))
        .sum();

    if ss_tot == 0.0 {
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}
