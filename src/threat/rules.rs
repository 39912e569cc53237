//! Fusion Rules & Thresholds
//!
//! Default weights and bands for the ensemble. No fusion logic here, only
//! constants and the runtime-tunable configuration.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// ============================================================================
// WEIGHTS (How much each model contributes to the fused probability)
// ============================================================================

/// Weight of the supervised tree ensemble (40%)
pub const FOREST_WEIGHT: f64 = 0.4;

/// Weight of the supervised MLP (40%)
pub const MLP_WEIGHT: f64 = 0.4;

/// Weight of the unsupervised anomaly scorer (20%)
///
/// The supervised pair is precise on attack types it has seen; the anomaly
/// model buys recall against attack types it has not. The 40/40/20 split is
/// a precision/recall trade, not a vote.
pub const ANOMALY_WEIGHT: f64 = 0.2;

// ============================================================================
// THRESHOLDS
// ============================================================================

/// Fused probability at or above this = Attack
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Fused probabilities within this distance of the threshold are flagged
/// low-confidence for triage
pub const LOW_CONFIDENCE_BAND: f64 = 0.1;

/// Fused probability at or above this = High severity
pub const HIGH_SEVERITY_MIN: f64 = 0.9;

/// Fused probability at or above this = Medium severity
pub const MEDIUM_SEVERITY_MIN: f64 = 0.7;

// ============================================================================
// CONFIGURABLE WEIGHTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub forest: f64,
    pub mlp: f64,
    pub anomaly: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            forest: FOREST_WEIGHT,
            mlp: MLP_WEIGHT,
            anomaly: ANOMALY_WEIGHT,
        }
    }
}

impl EnsembleWeights {
    pub fn sum(&self) -> f64 {
        self.forest + self.mlp + self.anomaly
    }

    /// Derive supervised weights from holdout F1, keeping the anomaly share
    /// fixed. Falls back to the defaults when both supervised models scored
    /// zero (nothing to apportion by).
    pub fn from_holdout_metrics(forest_f1: f64, mlp_f1: f64) -> Self {
        let supervised_share = 1.0 - ANOMALY_WEIGHT;
        let total = forest_f1 + mlp_f1;
        if !(total > 0.0) || !forest_f1.is_finite() || !mlp_f1.is_finite() {
            return Self::default();
        }
        Self {
            forest: supervised_share * forest_f1 / total,
            mlp: supervised_share * mlp_f1 / total,
            anomaly: ANOMALY_WEIGHT,
        }
    }
}

// ============================================================================
// CONFIGURABLE ENSEMBLE SETTINGS
// ============================================================================

/// Runtime-tunable fusion settings. Every default is enumerated here; the
/// core never reads thresholds from ambient environment state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    pub weights: EnsembleWeights,
    /// Fused probability at or above this = Attack
    pub decision_threshold: f64,
    /// Half-width of the low-confidence band around the threshold
    pub low_confidence_band: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            weights: EnsembleWeights::default(),
            decision_threshold: DECISION_THRESHOLD,
            low_confidence_band: LOW_CONFIDENCE_BAND,
        }
    }
}

impl EnsembleConfig {
    pub fn validate(&self) -> CoreResult<()> {
        let w = &self.weights;
        for (name, value) in [
            ("forest", w.forest),
            ("mlp", w.mlp),
            ("anomaly", w.anomaly),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CoreError::Config(format!(
                    "{} weight {} must be finite and non-negative",
                    name, value
                )));
            }
        }
        if w.sum() <= 0.0 {
            return Err(CoreError::Config(
                "ensemble weights sum to zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.decision_threshold) {
            return Err(CoreError::Config(format!(
                "decision threshold {} outside [0, 1]",
                self.decision_threshold
            )));
        }
        if !(0.0..=0.5).contains(&self.low_confidence_band) {
            return Err(CoreError::Config(format!(
                "low-confidence band {} outside [0, 0.5]",
                self.low_confidence_band
            )));
        }
        Ok(())
    }
}
