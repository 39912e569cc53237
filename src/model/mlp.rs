//! Supervised multi-layer perceptron
//!
//! Dense feed-forward network: ReLU hidden layers, sigmoid output, trained
//! with mini-batch gradient descent plus momentum on binary cross-entropy.
//! Weight init and batch shuffling are seeded, so a fit reproduces exactly.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

// ============================================================================
// HYPERPARAMETERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpHyperparams {
    /// Hidden layer widths, input to output.
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub momentum: f64,
}

impl Default for MlpHyperparams {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64, 32],
            learning_rate: 0.01,
            epochs: 200,
            batch_size: 32,
            momentum: 0.9,
        }
    }
}

// ============================================================================
// FITTED PARAMETERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpParams {
    pub hyperparams: MlpHyperparams,
    pub n_features: usize,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
}

impl MlpParams {
    /// Attack probability for one standardized row, in [0, 1].
    pub fn predict_row(&self, row: ndarray::ArrayView1<'_, f64>) -> f64 {
        let mut activation = row.to_owned();
        let last = self.weights.len() - 1;
        for (i, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let z = activation.dot(w) + b;
            activation = if i == last {
                z.mapv(sigmoid)
            } else {
                z.mapv(relu)
            };
        }
        activation[0]
    }

    /// Post-load structural check: layer shapes chain, everything finite.
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.weights.is_empty() || self.weights.len() != self.biases.len() {
            return Err("mlp has no layers".to_string());
        }
        let mut expect = n_features;
        for (i, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            if w.nrows() != expect {
                return Err(format!(
                    "layer {} expects {} inputs, got weights for {}",
                    i,
                    expect,
                    w.nrows()
                ));
            }
            if b.len() != w.ncols() {
                return Err(format!("layer {} bias length mismatch", i));
            }
            if w.iter().chain(b.iter()).any(|v| !v.is_finite()) {
                return Err(format!("layer {} has non-finite parameters", i));
            }
            expect = w.ncols();
        }
        if expect != 1 {
            return Err(format!("output layer width {} (want 1)", expect));
        }
        Ok(())
    }
}

// ============================================================================
// TRAINING
// ============================================================================

/// Fit on a standardized matrix and 0/1 labels.
pub fn fit(x: &Array2<f64>, y: &[u8], hyperparams: &MlpHyperparams, seed: u64) -> MlpParams {
    let n = x.nrows();
    let d = x.ncols();
    let mut rng = StdRng::seed_from_u64(seed);

    let mut sizes = vec![d];
    sizes.extend(&hyperparams.hidden_layers);
    sizes.push(1);

    // Xavier-uniform init.
    let mut weights: Vec<Array2<f64>> = Vec::new();
    let mut biases: Vec<Array1<f64>> = Vec::new();
    for pair in sizes.windows(2) {
        let (fan_in, fan_out) = (pair[0], pair[1]);
        let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
        weights.push(Array2::from_shape_fn((fan_in, fan_out), |_| {
            rng.gen_range(-limit..=limit)
        }));
        biases.push(Array1::zeros(fan_out));
    }

    let mut w_velocity: Vec<Array2<f64>> =
        weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect();
    let mut b_velocity: Vec<Array1<f64>> =
        biases.iter().map(|b| Array1::zeros(b.raw_dim())).collect();

    let targets = Array2::from_shape_fn((n, 1), |(i, _)| y[i] as f64);
    let mut order: Vec<usize> = (0..n).collect();
    let batch_size = hyperparams.batch_size.max(1);

    for _ in 0..hyperparams.epochs {
        order.shuffle(&mut rng);
        for batch in order.chunks(batch_size) {
            let xb = x.select(Axis(0), batch);
            let yb = targets.select(Axis(0), batch);
            let rows = batch.len() as f64;

            // Forward, keeping pre-activations for backprop.
            let mut activations = vec![xb];
            let mut pre: Vec<Array2<f64>> = Vec::new();
            let last = weights.len() - 1;
            for (i, (w, b)) in weights.iter().zip(&biases).enumerate() {
                let z = activations[i].dot(w) + b;
                let a = if i == last {
                    z.mapv(sigmoid)
                } else {
                    z.mapv(relu)
                };
                pre.push(z);
                activations.push(a);
            }

            // Sigmoid + cross-entropy collapses to (p - y) at the output.
            let mut delta = (&activations[last + 1] - &yb) / rows;

            for i in (0..weights.len()).rev() {
                let grad_w = activations[i].t().dot(&delta);
                let grad_b = delta.sum_axis(Axis(0));

                if i > 0 {
                    let mask = pre[i - 1].mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
                    delta = delta.dot(&weights[i].t()) * mask;
                }

                w_velocity[i] =
                    &w_velocity[i] * hyperparams.momentum - &(grad_w * hyperparams.learning_rate);
                b_velocity[i] =
                    &b_velocity[i] * hyperparams.momentum - &(grad_b * hyperparams.learning_rate);
                weights[i] += &w_velocity[i];
                biases[i] += &b_velocity[i];
            }
        }
    }

    MlpParams {
        hyperparams: hyperparams.clone(),
        n_features: d,
        weights,
        biases,
    }
}

fn relu(v: f64) -> f64 {
    v.max(0.0)
}

/// Numerically stable logistic.
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
