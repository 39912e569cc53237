//! Unsupervised anomaly scorer
//!
//! Isolation forest fit on benign rows only: anomalies isolate in fewer
//! random splits, so shorter mean path length means more anomalous. Raw
//! scores are calibrated to [0, 1] with the min/max observed on the
//! training rows and the range is stored in the artifact, so scoring one
//! record needs no batch context. A degenerate training range (all rows
//! identical) calibrates everything to 0.0.

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
const RANGE_EPSILON: f64 = 1e-12;

// ============================================================================
// HYPERPARAMETERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyHyperparams {
    /// Number of isolation trees.
    pub n_trees: usize,
    /// Per-tree subsample size cap.
    pub max_samples: usize,
}

impl Default for AnomalyHyperparams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
        }
    }
}

// ============================================================================
// TREE STRUCTURE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum IsoNode {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<IsoNode>,
}

impl IsolationTree {
    fn path_length(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[idx] {
                IsoNode::Leaf { size } => return depth + average_path(*size),
                IsoNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    depth += 1.0;
                    idx = if row[*feature] < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Average unsuccessful-search path length in a tree of `n` points.
fn average_path(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

// ============================================================================
// FITTED PARAMETERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyParams {
    pub hyperparams: AnomalyHyperparams,
    pub n_features: usize,
    /// Path-length normalizer for the per-tree subsample size.
    pub expected_depth: f64,
    /// Raw score range observed on the training rows.
    pub score_min: f64,
    pub score_max: f64,
    trees: Vec<IsolationTree>,
}

impl AnomalyParams {
    /// Raw isolation score in (0, 1): `2^(-mean_path / expected_depth)`.
    fn raw_score(&self, row: ArrayView1<'_, f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let mean_path: f64 = self
            .trees
            .iter()
            .map(|t| t.path_length(row))
            .sum::<f64>()
            / self.trees.len() as f64;
        (2.0f64).powf(-mean_path / self.expected_depth)
    }

    /// Calibrated anomaly score in [0, 1], higher = more anomalous.
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let range = self.score_max - self.score_min;
        if range <= RANGE_EPSILON {
            return 0.0;
        }
        ((self.raw_score(row) - self.score_min) / range).clamp(0.0, 1.0)
    }

    /// Post-load structural check.
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("isolation forest has no trees".to_string());
        }
        if self.n_features != n_features {
            return Err(format!(
                "isolation forest expects {} features, schema has {}",
                self.n_features, n_features
            ));
        }
        if !self.expected_depth.is_finite() || self.expected_depth <= 0.0 {
            return Err(format!("bad expected depth {}", self.expected_depth));
        }
        if !self.score_min.is_finite()
            || !self.score_max.is_finite()
            || self.score_min > self.score_max
        {
            return Err("bad calibration range".to_string());
        }
        for tree in &self.trees {
            for node in &tree.nodes {
                if let IsoNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } = node
                {
                    if *feature >= n_features {
                        return Err(format!("split on unknown feature index {}", feature));
                    }
                    if !threshold.is_finite() {
                        return Err("non-finite split threshold".to_string());
                    }
                    if *left >= tree.nodes.len() || *right >= tree.nodes.len() {
                        return Err("split child index out of bounds".to_string());
                    }
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// TRAINING
// ============================================================================

/// Fit on benign rows only. Calibration range comes from the same rows.
pub fn fit(x: &Array2<f64>, hyperparams: &AnomalyHyperparams, seed: u64) -> AnomalyParams {
    let n = x.nrows();
    let mut rng = StdRng::seed_from_u64(seed);

    let sample_size = hyperparams.max_samples.min(n).max(1);
    let max_depth = (sample_size as f64).log2().ceil().max(1.0) as usize;
    let all: Vec<usize> = (0..n).collect();

    let mut trees = Vec::with_capacity(hyperparams.n_trees);
    for _ in 0..hyperparams.n_trees {
        let sample: Vec<usize> = all.choose_multiple(&mut rng, sample_size).copied().collect();
        let mut builder = IsoBuilder {
            x,
            max_depth,
            nodes: Vec::new(),
        };
        builder.grow(sample, 0, &mut rng);
        trees.push(IsolationTree {
            nodes: builder.nodes,
        });
    }

    let expected_depth = average_path(sample_size).max(1.0);
    let mut params = AnomalyParams {
        hyperparams: hyperparams.clone(),
        n_features: x.ncols(),
        expected_depth,
        score_min: 0.0,
        score_max: 0.0,
        trees,
    };

    // Calibrate against the rows the forest was grown on.
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for i in 0..n {
        let s = params.raw_score(x.row(i));
        min = min.min(s);
        max = max.max(s);
    }
    if min.is_finite() && max.is_finite() {
        params.score_min = min;
        params.score_max = max;
    }
    params
}

struct IsoBuilder<'a> {
    x: &'a Array2<f64>,
    max_depth: usize,
    nodes: Vec<IsoNode>,
}

impl IsoBuilder<'_> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        if depth >= self.max_depth || indices.len() <= 1 {
            return self.push(IsoNode::Leaf {
                size: indices.len(),
            });
        }

        // Features that still vary inside this node.
        let splittable: Vec<(usize, f64, f64)> = (0..self.x.ncols())
            .filter_map(|f| {
                let mut lo = f64::INFINITY;
                let mut hi = f64::NEG_INFINITY;
                for &i in &indices {
                    let v = self.x[[i, f]];
                    lo = lo.min(v);
                    hi = hi.max(v);
                }
                (hi - lo > RANGE_EPSILON).then_some((f, lo, hi))
            })
            .collect();

        let Some(&(feature, lo, hi)) = splittable.choose(rng) else {
            return self.push(IsoNode::Leaf {
                size: indices.len(),
            });
        };
        let threshold = rng.gen_range(lo..hi);

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| self.x[[i, feature]] < threshold);

        let node = self.push(IsoNode::Leaf { size: 0 }); // placeholder
        let left = self.grow(left_idx, depth + 1, rng);
        let right = self.grow(right_idx, depth + 1, rng);
        self.nodes[node] = IsoNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        node
    }

    fn push(&mut self, node: IsoNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}
