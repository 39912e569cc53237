//! Model Module - Constituent Estimators
//!
//! The three estimators behind the ensemble plus the artifact wrapper that
//! carries their parameters between training and scoring.

pub mod anomaly;
pub mod artifact;
pub mod forest;
pub mod mlp;

// Re-export common types
pub use artifact::{ModelArtifact, ModelKind, ModelParams, TrainingMetrics};
