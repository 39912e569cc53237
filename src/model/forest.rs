//! Supervised tree ensemble
//!
//! Bagged decision trees with gini splits. Each tree fits a bootstrap sample
//! and considers a random sqrt-sized feature subset at every split; the
//! ensemble probability is the mean of the leaf class fractions. All
//! randomness flows from one seeded generator so training reproduces.

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Split gains below this are noise; the node becomes a leaf.
const MIN_GAIN: f64 = 1e-12;

// ============================================================================
// HYPERPARAMETERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestHyperparams {
    /// Number of bagged trees.
    pub n_trees: usize,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Minimum samples a leaf may hold.
    pub min_leaf: usize,
}

impl Default for ForestHyperparams {
    fn default() -> Self {
        Self {
            n_trees: 25,
            max_depth: 8,
            min_leaf: 2,
        }
    }
}

// ============================================================================
// TREE STRUCTURE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        prob: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One fitted tree, nodes in an arena with the root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { prob } => return *prob,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

// ============================================================================
// FITTED PARAMETERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub hyperparams: ForestHyperparams,
    pub n_features: usize,
    /// Normalized mean impurity decrease per feature.
    pub feature_importances: Vec<f64>,
    trees: Vec<DecisionTree>,
}

impl ForestParams {
    /// Mean attack probability over all trees, in [0, 1].
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        sum / self.trees.len() as f64
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Post-load structural check.
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        if self.n_features != n_features {
            return Err(format!(
                "forest expects {} features, schema has {}",
                self.n_features, n_features
            ));
        }
        for tree in &self.trees {
            for node in &tree.nodes {
                match node {
                    TreeNode::Leaf { prob } => {
                        if !prob.is_finite() || !(0.0..=1.0).contains(prob) {
                            return Err(format!("leaf probability {} out of range", prob));
                        }
                    }
                    TreeNode::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
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
        }
        Ok(())
    }
}

// ============================================================================
// TRAINING
// ============================================================================

/// Fit the ensemble on a standardized matrix and 0/1 labels.
pub fn fit(x: &Array2<f64>, y: &[u8], hyperparams: &ForestHyperparams, seed: u64) -> ForestParams {
    let n = x.nrows();
    let d = x.ncols();
    let mut rng = StdRng::seed_from_u64(seed);

    let features_per_split = (d as f64).sqrt().ceil().max(1.0) as usize;
    let mut importances = vec![0.0; d];
    let mut trees = Vec::with_capacity(hyperparams.n_trees);

    for _ in 0..hyperparams.n_trees {
        let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
        let mut builder = TreeBuilder {
            x,
            y,
            hyperparams,
            features_per_split,
            total: sample.len().max(1) as f64,
            nodes: Vec::new(),
            importances: &mut importances,
        };
        builder.grow(sample, 0, &mut rng);
        trees.push(DecisionTree {
            nodes: builder.nodes,
        });
    }

    let total_importance: f64 = importances.iter().sum();
    if total_importance > 0.0 {
        for v in importances.iter_mut() {
            *v /= total_importance;
        }
    }

    ForestParams {
        hyperparams: hyperparams.clone(),
        n_features: d,
        feature_importances: importances,
        trees,
    }
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a [u8],
    hyperparams: &'a ForestHyperparams,
    features_per_split: usize,
    total: f64,
    nodes: Vec<TreeNode>,
    importances: &'a mut Vec<f64>,
}

impl TreeBuilder<'_> {
    /// Grow the subtree for `indices`, returning its node index.
    fn grow(&mut self, indices: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let positives = indices.iter().filter(|&&i| self.y[i] == 1).count();
        let prob = if indices.is_empty() {
            0.0
        } else {
            positives as f64 / indices.len() as f64
        };

        let pure = positives == 0 || positives == indices.len();
        let too_small = indices.len() < self.hyperparams.min_leaf * 2;
        if depth >= self.hyperparams.max_depth || pure || too_small {
            return self.push(TreeNode::Leaf { prob });
        }

        let split = self.best_split(&indices, rng);
        let (feature, threshold, gain) = match split {
            Some(s) if s.2 > MIN_GAIN => s,
            _ => return self.push(TreeNode::Leaf { prob }),
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| self.x[[i, feature]] <= threshold);
        if left_idx.len() < self.hyperparams.min_leaf
            || right_idx.len() < self.hyperparams.min_leaf
        {
            return self.push(TreeNode::Leaf { prob });
        }

        self.importances[feature] += gain * indices.len() as f64 / self.total;

        let node = self.push(TreeNode::Leaf { prob }); // placeholder
        let left = self.grow(left_idx, depth + 1, rng);
        let right = self.grow(right_idx, depth + 1, rng);
        self.nodes[node] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        node
    }

    fn push(&mut self, node: TreeNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Best gini split over a random feature subset.
    fn best_split(&self, indices: &[usize], rng: &mut StdRng) -> Option<(usize, f64, f64)> {
        let d = self.x.ncols();
        let all: Vec<usize> = (0..d).collect();
        let candidates: Vec<usize> = all
            .choose_multiple(rng, self.features_per_split.min(d))
            .copied()
            .collect();

        let n = indices.len() as f64;
        let positives = indices.iter().filter(|&&i| self.y[i] == 1).count() as f64;
        let parent_gini = gini(positives, n);

        let mut best: Option<(usize, f64, f64)> = None;
        for &feature in &candidates {
            let mut sorted: Vec<(f64, u8)> = indices
                .iter()
                .map(|&i| (self.x[[i, feature]], self.y[i]))
                .collect();
            sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let mut left_n = 0.0;
            let mut left_pos = 0.0;
            for w in 0..sorted.len() - 1 {
                left_n += 1.0;
                if sorted[w].1 == 1 {
                    left_pos += 1.0;
                }
                // Only split between distinct values.
                if sorted[w].0 == sorted[w + 1].0 {
                    continue;
                }
                let right_n = n - left_n;
                let right_pos = positives - left_pos;
                let weighted = (left_n / n) * gini(left_pos, left_n)
                    + (right_n / n) * gini(right_pos, right_n);
                let gain = parent_gini - weighted;
                let threshold = (sorted[w].0 + sorted[w + 1].0) / 2.0;
                if best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, threshold, gain));
                }
            }
        }
        best
    }
}

fn gini(positives: f64, n: f64) -> f64 {
    if n <= 0.0 {
        return 0.0;
    }
    let p = positives / n;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}
