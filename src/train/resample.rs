//! Minority-class oversampling
//!
//! Synthetic minority rows are interpolated between a minority sample and
//! one of its nearest minority neighbors; generation is capped at 10x the
//! original minority count so extreme imbalance cannot blow up the training
//! set. Neighbor search is brute force over the minority class, which stays
//! cheap because only the minority is searched.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Cap on synthetic growth of the minority class.
const MAX_MULTIPLIER: usize = 10;

/// Oversample the minority class toward balance. Returns the input unchanged
/// when there is nothing to do: one class, already balanced, or a minority
/// too small to interpolate.
pub fn oversample(
    x: &Array2<f64>,
    y: &[u8],
    k_neighbors: usize,
    seed: u64,
) -> (Array2<f64>, Vec<u8>) {
    let n_pos = y.iter().filter(|&&l| l == 1).count();
    let n_neg = y.len() - n_pos;
    let (minority_label, n_min, n_maj) = if n_pos < n_neg {
        (1u8, n_pos, n_neg)
    } else {
        (0u8, n_neg, n_pos)
    };

    if n_min < 2 || n_min == n_maj {
        return (x.clone(), y.to_vec());
    }

    let minority_rows: Vec<usize> = y
        .iter()
        .enumerate()
        .filter(|(_, &l)| l == minority_label)
        .map(|(i, _)| i)
        .collect();

    let target = n_maj.min(n_min * MAX_MULTIPLIER);
    let n_new = target - n_min;
    if n_new == 0 {
        return (x.clone(), y.to_vec());
    }

    let k = k_neighbors.clamp(1, n_min - 1);
    let neighbors = nearest_neighbors(x, &minority_rows, k);

    let mut rng = StdRng::seed_from_u64(seed);
    let d = x.ncols();
    let mut out = Array2::zeros((y.len() + n_new, d));
    for (i, row) in x.outer_iter().enumerate() {
        out.row_mut(i).assign(&row);
    }

    let mut labels = y.to_vec();
    for s in 0..n_new {
        let pick = rng.gen_range(0..minority_rows.len());
        let base = minority_rows[pick];
        let neighbor = neighbors[pick][rng.gen_range(0..k)];
        let alpha: f64 = rng.gen();
        for j in 0..d {
            let a = x[[base, j]];
            let b = x[[neighbor, j]];
            out[[y.len() + s, j]] = a + alpha * (b - a);
        }
        labels.push(minority_label);
    }

    (out, labels)
}

/// For each minority row, the indices (into `x`) of its `k` nearest minority
/// neighbors, excluding itself.
fn nearest_neighbors(x: &Array2<f64>, rows: &[usize], k: usize) -> Vec<Vec<usize>> {
    rows.iter()
        .map(|&a| {
            let mut dists: Vec<(f64, usize)> = rows
                .iter()
                .filter(|&&b| b != a)
                .map(|&b| (squared_distance(x, a, b), b))
                .collect();
            dists.sort_by(|l, r| l.0.partial_cmp(&r.0).unwrap_or(std::cmp::Ordering::Equal));
            dists.truncate(k);
            dists.into_iter().map(|(_, b)| b).collect()
        })
        .collect()
}

fn squared_distance(x: &Array2<f64>, a: usize, b: usize) -> f64 {
    (0..x.ncols())
        .map(|j| {
            let diff = x[[a, j]] - x[[b, j]];
            diff * diff
        })
        .sum()
}
