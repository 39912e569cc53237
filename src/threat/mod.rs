//! Threat Verdicts - Ensemble Fusion
//!
//! Turns the three per-model scores into one explained verdict per flow:
//! fused probability, attack/benign call, severity band, low-confidence
//! flag, and the per-model contributions behind all of it.

pub mod rules;
pub mod scorer;
pub mod types;

pub use rules::{EnsembleConfig, EnsembleWeights};
pub use scorer::{decide, fuse, EnsembleScorer};
pub use types::{EnsembleDecision, ModelContribution, ModelScores, Severity, Verdict};
