//! Ensemble Scorer
//!
//! Fuses the three per-model scores into one verdict per flow. The fusion
//! is a weighted mean normalized by the weight sum, compared against the
//! decision threshold; everything an operator needs to audit the verdict
//! (raw scores, weights, the fused probability) rides along on the
//! decision itself.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult, RowError};
use crate::features::extract::{self, ExtractOptions, RawTable};
use crate::features::pipeline;
use crate::features::record::{FlowKey, FlowRecord};
use crate::features::schema::FeatureSchema;
use crate::model::artifact::{ModelKind, ModelParams};
use crate::store::{ArtifactHandle, ArtifactSet};
use crate::threat::rules::{self, EnsembleConfig};
use crate::threat::types::{
    EnsembleDecision, ModelContribution, ModelScores, Severity, Verdict,
};

// ============================================================================
// FUSION
// ============================================================================

/// Weighted mean of the three model scores, normalized by the weight sum.
/// Monotone in every individual score.
pub fn fuse(scores: &ModelScores, config: &EnsembleConfig) -> f64 {
    let w = &config.weights;
    let weighted =
        scores.forest * w.forest + scores.mlp * w.mlp + scores.anomaly * w.anomaly;
    weighted / w.sum()
}

/// Severity bands over the fused probability. Benign flows are always Low.
fn severity_for(verdict: Verdict, fused: f64) -> Severity {
    if !verdict.is_attack() {
        return Severity::Low;
    }
    if fused >= rules::HIGH_SEVERITY_MIN {
        Severity::High
    } else if fused >= rules::MEDIUM_SEVERITY_MIN {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Turn one flow's three raw scores into a full decision. Fused probability
/// at or exactly on the threshold counts as Attack.
pub fn decide(key: FlowKey, scores: ModelScores, config: &EnsembleConfig) -> EnsembleDecision {
    let fused = fuse(&scores, config);
    let verdict = if fused >= config.decision_threshold {
        Verdict::Attack
    } else {
        Verdict::Benign
    };
    let low_confidence = (fused - config.decision_threshold).abs() <= config.low_confidence_band;

    EnsembleDecision {
        key,
        verdict,
        confidence: fused,
        severity: severity_for(verdict, fused),
        low_confidence,
        contributions: vec![
            ModelContribution {
                kind: ModelKind::SupervisedForest,
                score: scores.forest,
                weight: config.weights.forest,
            },
            ModelContribution {
                kind: ModelKind::SupervisedMlp,
                score: scores.mlp,
                weight: config.weights.mlp,
            },
            ModelContribution {
                kind: ModelKind::UnsupervisedAnomaly,
                score: scores.anomaly,
                weight: config.weights.anomaly,
            },
        ],
    }
}

// ============================================================================
// SCORER
// ============================================================================

/// Batch scorer bound to one artifact set snapshot. Construction validates
/// the set, the config, and that the schema is scalable; after that, every
/// batch scored through this instance sees the same models and thresholds.
#[derive(Debug)]
pub struct EnsembleScorer {
    artifacts: Arc<ArtifactSet>,
    config: EnsembleConfig,
}

impl EnsembleScorer {
    pub fn new(artifacts: Arc<ArtifactSet>, config: EnsembleConfig) -> CoreResult<Self> {
        config.validate()?;
        artifacts.validate()?;
        artifacts.schema.ensure_scalable()?;
        Ok(Self { artifacts, config })
    }

    /// Bind to whatever set the handle currently publishes. A later install
    /// on the handle does not affect this scorer.
    pub fn from_handle(handle: &ArtifactHandle, config: EnsembleConfig) -> CoreResult<Self> {
        let artifacts = handle.current().ok_or(CoreError::NotInitialized)?;
        Self::new(artifacts, config)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.artifacts.schema
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    fn params(&self, kind: ModelKind) -> CoreResult<&ModelParams> {
        self.artifacts
            .artifact(kind)
            .map(|a| &a.params)
            .ok_or(CoreError::MissingModel { kind })
    }

    /// Score already-extracted records. Reconciliation and scaling against
    /// the set's schema happen here; callers hand records over exactly as
    /// extraction produced them.
    pub fn score_records(&self, records: Vec<FlowRecord>) -> CoreResult<Vec<EnsembleDecision>> {
        let forest = self.params(ModelKind::SupervisedForest)?;
        let mlp = self.params(ModelKind::SupervisedMlp)?;
        let anomaly = self.params(ModelKind::UnsupervisedAnomaly)?;

        let (records, matrix) = pipeline::prepare(records, &self.artifacts.schema)?;

        let mut decisions = Vec::with_capacity(records.len());
        for (record, row) in records.iter().zip(matrix.outer_iter()) {
            let scores = ModelScores {
                forest: forest.predict_row(row),
                mlp: mlp.predict_row(row),
                anomaly: anomaly.predict_row(row),
            };
            decisions.push(decide(record.key.clone(), scores, &self.config));
        }

        let flagged = decisions.iter().filter(|d| d.verdict.is_attack()).count();
        log::debug!("scored {} flows, {} flagged", decisions.len(), flagged);
        Ok(decisions)
    }

    /// Extract a raw table and score it in one call. Row-level extraction
    /// errors ride along next to the decisions.
    pub fn score_table(
        &self,
        table: &RawTable,
        options: &ExtractOptions,
    ) -> CoreResult<(Vec<EnsembleDecision>, Vec<RowError>)> {
        let (records, row_errors) = extract::extract(table, options)?;
        let decisions = self.score_records(records)?;
        Ok((decisions, row_errors))
    }
}
