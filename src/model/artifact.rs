//! Model artifacts
//!
//! A [`ModelArtifact`] is one trained model's parameters plus the metadata
//! needed to load it safely: kind, id, training timestamp, the schema it was
//! trained against, and its own holdout metrics. Artifacts are written once
//! and never mutated; retraining creates a new set.
//!
//! The three estimator kinds live behind the closed [`ModelParams`] enum so
//! everything downstream drives them through one `predict_row` capability
//! and never matches on a concrete estimator.

use std::fmt;

use chrono::{DateTime, Utc};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::features::schema::FeatureSchema;
use crate::model::anomaly::AnomalyParams;
use crate::model::forest::ForestParams;
use crate::model::mlp::MlpParams;

// ============================================================================
// MODEL KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    SupervisedForest,
    SupervisedMlp,
    UnsupervisedAnomaly,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::SupervisedForest => "supervised_forest",
            ModelKind::SupervisedMlp => "supervised_mlp",
            ModelKind::UnsupervisedAnomaly => "unsupervised_anomaly",
        }
    }

    pub const ALL: [ModelKind; 3] = [
        ModelKind::SupervisedForest,
        ModelKind::SupervisedMlp,
        ModelKind::UnsupervisedAnomaly,
    ];
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PARAMETERS
// ============================================================================

/// Closed set of estimator parameter blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model")]
pub enum ModelParams {
    Forest(ForestParams),
    Mlp(MlpParams),
    Anomaly(AnomalyParams),
}

impl ModelParams {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelParams::Forest(_) => ModelKind::SupervisedForest,
            ModelParams::Mlp(_) => ModelKind::SupervisedMlp,
            ModelParams::Anomaly(_) => ModelKind::UnsupervisedAnomaly,
        }
    }

    /// Score one reconciled, scaled row. Supervised kinds return an attack
    /// probability; the anomaly kind returns its calibrated anomaly score.
    /// Either way the result is in [0, 1] with higher meaning more hostile.
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        match self {
            ModelParams::Forest(p) => p.predict_row(row),
            ModelParams::Mlp(p) => p.predict_row(row),
            ModelParams::Anomaly(p) => p.predict_row(row),
        }
    }

    fn validate(&self, n_features: usize) -> Result<(), String> {
        match self {
            ModelParams::Forest(p) => p.validate(n_features),
            ModelParams::Mlp(p) => p.validate(n_features),
            ModelParams::Anomaly(p) => p.validate(n_features),
        }
    }
}

// ============================================================================
// TRAINING METRICS
// ============================================================================

/// The model's own holdout performance, recorded at fit time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub training_rows: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

// ============================================================================
// ARTIFACT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub id: String,
    pub kind: ModelKind,
    pub created_at: DateTime<Utc>,
    pub schema: FeatureSchema,
    pub metrics: TrainingMetrics,
    pub params: ModelParams,
}

impl ModelArtifact {
    pub fn new(params: ModelParams, schema: FeatureSchema, metrics: TrainingMetrics) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: params.kind(),
            created_at: chrono::Utc::now(),
            schema,
            metrics,
            params,
        }
    }

    /// Full post-load check: schema self-consistency, declared kind matches
    /// the parameter blob, parameters fit the schema.
    pub fn validate(&self) -> CoreResult<()> {
        self.schema.validate()?;
        if self.kind != self.params.kind() {
            return Err(CoreError::InvalidModel {
                kind: self.kind,
                reason: format!("parameter blob is {}", self.params.kind()),
            });
        }
        self.params
            .validate(self.schema.len())
            .map_err(|reason| CoreError::InvalidModel {
                kind: self.kind,
                reason,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::record::{FlowKey, FlowRecord};
    use crate::features::schema::FillPolicy;
    use crate::model::forest::{self, ForestHyperparams};
    use ndarray::{Array1, Array2};

    fn schema() -> FeatureSchema {
        let key = FlowKey::new("10.0.0.1", "10.0.0.2", 1, 2, 6);
        let (record, _) = FlowRecord::from_pairs(
            key,
            vec![
                ("a".to_string(), Some(1.0)),
                ("b".to_string(), Some(2.0)),
            ],
        );
        FeatureSchema::derive(&[record], FillPolicy::Zero)
    }

    fn forest_artifact() -> ModelArtifact {
        let x = Array2::from_shape_fn((8, 2), |(i, _)| if i < 4 { -1.0 } else { 1.0 });
        let y = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let params = forest::fit(&x, &y, &ForestHyperparams::default(), 5);
        ModelArtifact::new(
            ModelParams::Forest(params),
            schema(),
            TrainingMetrics::default(),
        )
    }

    #[test]
    fn test_new_sets_kind_from_params() {
        let artifact = forest_artifact();
        assert_eq!(artifact.kind, ModelKind::SupervisedForest);
        assert!(artifact.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_kind_mismatch() {
        let mut artifact = forest_artifact();
        artifact.kind = ModelKind::SupervisedMlp;
        let err = artifact.validate().unwrap_err();
        assert!(err.to_string().contains("supervised_mlp"));
    }

    #[test]
    fn test_predict_dispatch_matches_inner_model() {
        let artifact = forest_artifact();
        let row = Array1::from(vec![1.0, 0.0]);
        let via_enum = artifact.params.predict_row(row.view());
        let direct = match &artifact.params {
            ModelParams::Forest(p) => p.predict_row(row.view()),
            _ => unreachable!(),
        };
        assert_eq!(via_enum, direct);
    }

    #[test]
    fn test_serde_round_trip() {
        let artifact = forest_artifact();
        let bytes = serde_json::to_vec(&artifact).unwrap();
        let restored: ModelArtifact = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored.id, artifact.id);
        assert_eq!(restored.kind, artifact.kind);
        assert_eq!(restored.params, artifact.params);
        assert!(restored.validate().is_ok());
    }
}
