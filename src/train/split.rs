//! Seeded sampling and stratified splitting
//!
//! Both operations draw from the caller's generator so one training seed
//! reproduces the whole run: the downsample, the split, and every fit.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{CoreError, CoreResult};

/// Minimum rows a class must keep on the training side of the split.
pub const MIN_CLASS_ROWS: usize = 2;

/// Row indices for the two sides of the holdout split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Cap the working set: a seeded shuffle, truncated to `max_rows`.
pub fn sample_rows(n: usize, max_rows: Option<usize>, rng: &mut StdRng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    if let Some(cap) = max_rows {
        if cap < n {
            indices.shuffle(rng);
            indices.truncate(cap);
            indices.sort_unstable();
        }
    }
    indices
}

/// Split by binarized label (0 = benign, 1 = attack), keeping each class's
/// proportion on both sides.
///
/// Per class, the holdout takes `round(count * test_fraction)` rows, at
/// least one; the remainder must keep [`MIN_CLASS_ROWS`] or the split fails
/// with the offending class named.
pub fn stratified_split(
    labels: &[u8],
    test_fraction: f64,
    rng: &mut StdRng,
) -> CoreResult<Split> {
    let mut split = Split {
        train: Vec::new(),
        test: Vec::new(),
    };

    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == class)
            .map(|(i, _)| i)
            .collect();
        let count = members.len();
        if count < MIN_CLASS_ROWS + 1 {
            return Err(CoreError::InsufficientData {
                class: class_name(class).to_string(),
                count,
                min: MIN_CLASS_ROWS + 1,
            });
        }

        members.shuffle(rng);
        let wanted = (count as f64 * test_fraction).round() as usize;
        let n_test = wanted.clamp(1, count - MIN_CLASS_ROWS);
        if count - n_test < MIN_CLASS_ROWS {
            return Err(CoreError::InsufficientData {
                class: class_name(class).to_string(),
                count,
                min: MIN_CLASS_ROWS,
            });
        }

        split.test.extend(members.drain(..n_test));
        split.train.extend(members);
    }

    split.train.sort_unstable();
    split.test.sort_unstable();
    Ok(split)
}

fn class_name(class: u8) -> &'static str {
    if class == 0 {
        "BENIGN"
    } else {
        "ATTACK"
    }
}
