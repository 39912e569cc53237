//! Model Training Subsystem
//!
//! One seeded run fits all three models: derive the schema from the
//! training split, prepare both splits against it, fit the supervised pair
//! on labeled rows and the anomaly scorer on the benign subset, then score
//! the holdout once and bundle the evaluation into the outcome. Everything
//! random (downsample, split, inits, oversampling) draws from the single
//! run seed, so a seed reproduces the run end to end.

pub mod resample;
pub mod split;

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{CoreError, CoreResult, RowError};
use crate::eval::{self, ConfusionCounts, EvaluationReport, Metrics};
use crate::features::extract::{self, ExtractOptions, RawTable};
use crate::features::pipeline;
use crate::features::record::FlowRecord;
use crate::features::schema::{FeatureSchema, FillPolicy};
use crate::model::anomaly::{self, AnomalyHyperparams};
use crate::model::artifact::{ModelArtifact, ModelParams, TrainingMetrics};
use crate::model::forest::{self, ForestHyperparams};
use crate::model::mlp::{self, MlpHyperparams};
use crate::store::ArtifactSet;
use crate::threat::rules::{self, EnsembleConfig, EnsembleWeights};
use crate::threat::scorer::decide;
use crate::threat::types::ModelScores;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Everything one training run needs, enumerated. No ambient state is read.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    /// Cap on labeled rows used for the run; the cap is applied by a seeded
    /// downsample before splitting.
    pub max_rows: Option<usize>,
    /// Holdout fraction per class.
    pub test_fraction: f64,
    /// Seed for the whole run.
    pub random_seed: u64,
    /// Interpolate synthetic minority rows into the supervised training set.
    pub oversample: bool,
    /// Neighbor pool size for oversampling.
    pub oversample_neighbors: usize,
    /// How the derived schema fills absent features.
    pub fill_policy: FillPolicy,
    pub forest: ForestHyperparams,
    pub mlp: MlpHyperparams,
    pub anomaly: AnomalyHyperparams,
    /// Fusion settings used for the bundled holdout evaluation.
    pub ensemble: EnsembleConfig,
    /// Reapportion the supervised weights by holdout F1 before fusing.
    pub tune_weights: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            max_rows: None,
            test_fraction: 0.2,
            random_seed: 42,
            oversample: false,
            oversample_neighbors: 5,
            fill_policy: FillPolicy::default(),
            forest: ForestHyperparams::default(),
            mlp: MlpHyperparams::default(),
            anomaly: AnomalyHyperparams::default(),
            ensemble: EnsembleConfig::default(),
            tune_weights: false,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if !self.test_fraction.is_finite()
            || self.test_fraction <= 0.0
            || self.test_fraction >= 1.0
        {
            return Err(CoreError::Config(format!(
                "test fraction {} outside (0, 1)",
                self.test_fraction
            )));
        }
        if self.oversample_neighbors == 0 {
            return Err(CoreError::Config(
                "oversample neighbor count must be at least 1".to_string(),
            ));
        }
        if self.forest.n_trees == 0 || self.forest.max_depth == 0 {
            return Err(CoreError::Config(
                "forest needs at least one tree and depth 1".to_string(),
            ));
        }
        if self.mlp.epochs == 0 || self.mlp.batch_size == 0 {
            return Err(CoreError::Config(
                "mlp needs at least one epoch and batch size 1".to_string(),
            ));
        }
        if !(self.mlp.learning_rate.is_finite() && self.mlp.learning_rate > 0.0) {
            return Err(CoreError::Config(format!(
                "mlp learning rate {} must be finite and positive",
                self.mlp.learning_rate
            )));
        }
        if self.anomaly.n_trees == 0 || self.anomaly.max_samples < 2 {
            return Err(CoreError::Config(
                "anomaly forest needs at least one tree and two samples per tree".to_string(),
            ));
        }
        self.ensemble.validate()
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// Result of one training run. The holdout's decisions and ground truth are
/// inside the report, so evaluation needs no second scoring pass.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub artifacts: ArtifactSet,
    pub report: EvaluationReport,
    /// The fusion settings the holdout was scored with; differs from the
    /// configured ones only when weight tuning is on.
    pub ensemble: EnsembleConfig,
    /// Rows excluded from the run: unlabeled input, plus any extraction
    /// errors when training started from a raw table.
    pub row_errors: Vec<RowError>,
}

// ============================================================================
// TRAINING
// ============================================================================

/// Extract a raw table and train on the result. Extraction row errors are
/// merged into the outcome's row errors.
pub fn train(
    table: &RawTable,
    options: &ExtractOptions,
    config: &TrainConfig,
) -> CoreResult<TrainOutcome> {
    let (records, mut row_errors) = extract::extract(table, options)?;
    let mut outcome = train_records(records, config)?;
    row_errors.append(&mut outcome.row_errors);
    outcome.row_errors = row_errors;
    Ok(outcome)
}

/// Train the three models on already-extracted records.
pub fn train_records(records: Vec<FlowRecord>, config: &TrainConfig) -> CoreResult<TrainOutcome> {
    config.validate()?;
    let total_input = records.len();

    // Unlabeled rows cannot train or evaluate; collect and drop them.
    let mut labeled = Vec::with_capacity(records.len());
    let mut row_errors = Vec::new();
    for (idx, record) in records.into_iter().enumerate() {
        if record.label.is_some() {
            labeled.push(record);
        } else {
            row_errors.push(RowError::malformed(idx, "missing ground-truth label"));
        }
    }
    log::info!(
        "training on {} labeled rows ({} unlabeled dropped)",
        labeled.len(),
        total_input - labeled.len()
    );

    let mut rng = StdRng::seed_from_u64(config.random_seed);

    // Seeded downsample, then a stratified split over what is left.
    let kept = split::sample_rows(labeled.len(), config.max_rows, &mut rng);
    let pool: Vec<FlowRecord> = {
        let mut labeled = labeled;
        let mut pool = Vec::with_capacity(kept.len());
        // kept is sorted ascending; drain from the back to keep indices valid.
        for &idx in kept.iter().rev() {
            pool.push(labeled.swap_remove(idx));
        }
        pool.reverse();
        pool
    };
    let labels: Vec<u8> = pool
        .iter()
        .map(|r| r.label.as_ref().map(|l| l.is_attack() as u8).unwrap_or(0))
        .collect();

    let split = split::stratified_split(&labels, config.test_fraction, &mut rng)?;
    let train_recs: Vec<FlowRecord> = split.train.iter().map(|&i| pool[i].clone()).collect();
    let test_recs: Vec<FlowRecord> = split.test.iter().map(|&i| pool[i].clone()).collect();
    log::info!(
        "split {} rows into {} train / {} holdout",
        pool.len(),
        train_recs.len(),
        test_recs.len()
    );

    // The schema comes from the training split only; the holdout is
    // reconciled against it like any future inference batch.
    let schema = FeatureSchema::derive(&train_recs, config.fill_policy);
    let (train_recs, x_train) = pipeline::prepare(train_recs, &schema)?;
    let y_train: Vec<u8> = train_recs
        .iter()
        .map(|r| r.label.as_ref().map(|l| l.is_attack() as u8).unwrap_or(0))
        .collect();

    let (x_train, y_train) = if config.oversample {
        let (x, y) = resample::oversample(
            &x_train,
            &y_train,
            config.oversample_neighbors,
            rng.gen(),
        );
        if y.len() > y_train.len() {
            log::info!(
                "oversampled minority class: {} -> {} training rows",
                y_train.len(),
                y.len()
            );
        }
        (x, y)
    } else {
        (x_train, y_train)
    };

    let (test_recs, x_test) = pipeline::prepare(test_recs, &schema)?;
    let y_test: Vec<u8> = test_recs
        .iter()
        .map(|r| r.label.as_ref().map(|l| l.is_attack() as u8).unwrap_or(0))
        .collect();

    // Supervised pair sees every training row.
    let forest_params = ModelParams::Forest(forest::fit(
        &x_train,
        &y_train,
        &config.forest,
        rng.gen(),
    ));
    let forest_metrics = holdout_metrics(&forest_params, &x_test, &y_test, x_train.nrows());
    log::info!("forest fit: holdout f1 {:.3}", forest_metrics.f1);

    let mlp_params = ModelParams::Mlp(mlp::fit(&x_train, &y_train, &config.mlp, rng.gen()));
    let mlp_metrics = holdout_metrics(&mlp_params, &x_test, &y_test, x_train.nrows());
    log::info!("mlp fit: holdout f1 {:.3}", mlp_metrics.f1);

    // The anomaly model trains only on benign rows; attack shapes must stay
    // unseen so novel ones still register as anomalous.
    let benign_rows: Vec<usize> = y_train
        .iter()
        .enumerate()
        .filter(|(_, &label)| label == 0)
        .map(|(i, _)| i)
        .collect();
    let x_benign = x_train.select(Axis(0), &benign_rows);
    let anomaly_params =
        ModelParams::Anomaly(anomaly::fit(&x_benign, &config.anomaly, rng.gen()));
    let anomaly_metrics = holdout_metrics(&anomaly_params, &x_test, &y_test, x_benign.nrows());
    log::info!(
        "anomaly fit on {} benign rows: holdout f1 {:.3}",
        x_benign.nrows(),
        anomaly_metrics.f1
    );

    let mut ensemble = config.ensemble;
    if config.tune_weights {
        ensemble.weights = EnsembleWeights::from_holdout_metrics(forest_metrics.f1, mlp_metrics.f1);
        log::info!(
            "tuned weights from holdout f1: forest {:.3}, mlp {:.3}, anomaly {:.3}",
            ensemble.weights.forest,
            ensemble.weights.mlp,
            ensemble.weights.anomaly
        );
    }

    // Score the holdout once, straight off the prepared matrix.
    let mut decisions = Vec::with_capacity(test_recs.len());
    for (record, row) in test_recs.iter().zip(x_test.outer_iter()) {
        let scores = ModelScores {
            forest: forest_params.predict_row(row),
            mlp: mlp_params.predict_row(row),
            anomaly: anomaly_params.predict_row(row),
        };
        decisions.push(decide(record.key.clone(), scores, &ensemble));
    }
    let report = eval::evaluate(&decisions, &test_recs);

    let artifacts = ArtifactSet::from_artifacts(vec![
        ModelArtifact::new(forest_params, schema.clone(), forest_metrics),
        ModelArtifact::new(mlp_params, schema.clone(), mlp_metrics),
        ModelArtifact::new(anomaly_params, schema, anomaly_metrics),
    ])?;
    log::info!(
        "training complete: set {} (ensemble accuracy {:.3})",
        artifacts.set_id,
        report.metrics.accuracy
    );

    Ok(TrainOutcome {
        artifacts,
        report,
        ensemble,
        row_errors,
    })
}

/// One model's own holdout quality at the conventional 0.5 cut.
fn holdout_metrics(
    params: &ModelParams,
    x_test: &Array2<f64>,
    y_test: &[u8],
    training_rows: usize,
) -> TrainingMetrics {
    let mut counts = ConfusionCounts::default();
    for (row, &label) in x_test.outer_iter().zip(y_test) {
        let predicted = params.predict_row(row) >= rules::DECISION_THRESHOLD;
        counts.record(predicted, label == 1);
    }
    let metrics = Metrics::from_counts(&counts);
    TrainingMetrics {
        training_rows,
        accuracy: metrics.accuracy,
        precision: metrics.precision,
        recall: metrics.recall,
        f1: metrics.f1,
    }
}
