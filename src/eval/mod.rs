//! Evaluation Engine
//!
//! Pairs ensemble decisions with ground-truth labels and aggregates the
//! confusion matrix, derived metrics, and a queryable per-flow result set.
//! A report is built once per run and never mutated; filtering works off
//! the stored decisions, never by re-scoring.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RowError;
use crate::features::record::{FlowKey, FlowLabel, FlowRecord};
use crate::threat::types::EnsembleDecision;

// ============================================================================
// TAGS
// ============================================================================

/// Views the dashboard can ask a report for. Positive = Attack throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportTag {
    ActualAttack,
    PredictedAttack,
    FalsePositive,
    FalseNegative,
    LowConfidence,
}

// ============================================================================
// COUNTS AND METRICS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,
}

impl ConfusionCounts {
    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.false_negatives + self.true_negatives
    }

    pub fn record(&mut self, predicted_attack: bool, actual_attack: bool) {
        match (predicted_attack, actual_attack) {
            (true, true) => self.true_positives += 1,
            (true, false) => self.false_positives += 1,
            (false, true) => self.false_negatives += 1,
            (false, false) => self.true_negatives += 1,
        }
    }
}

/// Metrics derived from the confusion counts. Every ratio with a zero
/// denominator is reported as 0 rather than NaN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Metrics {
    pub fn from_counts(counts: &ConfusionCounts) -> Self {
        let tp = counts.true_positives as f64;
        let tn = counts.true_negatives as f64;
        let accuracy = ratio(tp + tn, counts.total() as f64);
        let precision = ratio(tp, tp + counts.false_positives as f64);
        let recall = ratio(tp, tp + counts.false_negatives as f64);
        let f1 = ratio(2.0 * precision * recall, precision + recall);
        Self {
            accuracy,
            precision,
            recall,
            f1,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

// ============================================================================
// REPORT
// ============================================================================

/// One decision paired with its ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedFlow {
    pub decision: EnsembleDecision,
    pub actual: FlowLabel,
}

impl EvaluatedFlow {
    pub fn actual_attack(&self) -> bool {
        self.actual.is_attack()
    }

    pub fn predicted_attack(&self) -> bool {
        self.decision.verdict.is_attack()
    }

    pub fn matches_tag(&self, tag: ReportTag) -> bool {
        match tag {
            ReportTag::ActualAttack => self.actual_attack(),
            ReportTag::PredictedAttack => self.predicted_attack(),
            ReportTag::FalsePositive => self.predicted_attack() && !self.actual_attack(),
            ReportTag::FalseNegative => !self.predicted_attack() && self.actual_attack(),
            ReportTag::LowConfidence => self.decision.low_confidence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub created_at: DateTime<Utc>,
    pub counts: ConfusionCounts,
    pub metrics: Metrics,
    rows: Vec<EvaluatedFlow>,
    row_errors: Vec<RowError>,
}

impl EvaluationReport {
    /// Every paired flow, in decision order.
    pub fn rows(&self) -> &[EvaluatedFlow] {
        &self.rows
    }

    /// Decisions that could not be paired with a ground-truth label. These
    /// are excluded from the counts and metrics.
    pub fn row_errors(&self) -> &[RowError] {
        &self.row_errors
    }

    /// Paired rows matching one tag, straight from the stored decisions.
    pub fn filter(&self, tag: ReportTag) -> Vec<&EvaluatedFlow> {
        self.rows.iter().filter(|row| row.matches_tag(tag)).collect()
    }

    pub fn total(&self) -> usize {
        self.counts.total()
    }
}

// ============================================================================
// EVALUATION
// ============================================================================

/// Pair each decision with the ground-truth label for its flow key and
/// aggregate. Decisions whose key has no labeled ground-truth record become
/// row errors and stay out of the aggregates; when a key appears more than
/// once in the ground truth, the first labeled occurrence wins.
pub fn evaluate(decisions: &[EnsembleDecision], ground_truth: &[FlowRecord]) -> EvaluationReport {
    let mut truth: HashMap<&FlowKey, &FlowLabel> = HashMap::with_capacity(ground_truth.len());
    for record in ground_truth {
        if let Some(label) = &record.label {
            truth.entry(&record.key).or_insert(label);
        }
    }

    let mut counts = ConfusionCounts::default();
    let mut rows = Vec::with_capacity(decisions.len());
    let mut row_errors = Vec::new();

    for decision in decisions {
        match truth.get(&decision.key) {
            Some(label) => {
                counts.record(decision.verdict.is_attack(), label.is_attack());
                rows.push(EvaluatedFlow {
                    decision: decision.clone(),
                    actual: (*label).clone(),
                });
            }
            None => row_errors.push(RowError::UnmatchedRecord {
                key: decision.key.clone(),
            }),
        }
    }

    let metrics = Metrics::from_counts(&counts);
    log::info!(
        "evaluated {} flows ({} unmatched): accuracy {:.3}, precision {:.3}, recall {:.3}, f1 {:.3}",
        counts.total(),
        row_errors.len(),
        metrics.accuracy,
        metrics.precision,
        metrics.recall,
        metrics.f1
    );

    EvaluationReport {
        created_at: chrono::Utc::now(),
        counts,
        metrics,
        rows,
        row_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::record::FlowRecord;
    use crate::threat::rules::EnsembleConfig;
    use crate::threat::scorer::decide;
    use crate::threat::types::ModelScores;

    fn key(n: u16) -> FlowKey {
        FlowKey::new("10.0.0.1", "10.0.0.2", n, 443, 6)
    }

    fn decision(n: u16, score: f64) -> EnsembleDecision {
        let scores = ModelScores {
            forest: score,
            mlp: score,
            anomaly: score,
        };
        decide(key(n), scores, &EnsembleConfig::default())
    }

    fn truth(n: u16, attack: bool) -> FlowRecord {
        let mut record = FlowRecord::new(key(n));
        record.label = Some(if attack {
            FlowLabel::Attack("portscan".to_string())
        } else {
            FlowLabel::Benign
        });
        record
    }

    #[test]
    fn test_counts_one_of_each_outcome() {
        let decisions = vec![
            decision(1, 0.9), // predicted attack, actual attack: TP
            decision(2, 0.9), // predicted attack, actual benign: FP
            decision(3, 0.1), // predicted benign, actual attack: FN
            decision(4, 0.1), // predicted benign, actual benign: TN
        ];
        let ground_truth = vec![truth(1, true), truth(2, false), truth(3, true), truth(4, false)];
        let report = evaluate(&decisions, &ground_truth);

        assert_eq!(report.counts.true_positives, 1);
        assert_eq!(report.counts.false_positives, 1);
        assert_eq!(report.counts.false_negatives, 1);
        assert_eq!(report.counts.true_negatives, 1);
        assert!((report.metrics.accuracy - 0.5).abs() < 1e-12);
        assert!((report.metrics.precision - 0.5).abs() < 1e-12);
        assert!((report.metrics.recall - 0.5).abs() < 1e-12);
        assert!((report.metrics.f1 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_identity_holds() {
        let decisions: Vec<EnsembleDecision> = (0..30u16)
            .map(|n| decision(n, if n % 3 == 0 { 0.8 } else { 0.2 }))
            .collect();
        let ground_truth: Vec<FlowRecord> = (0..30u16).map(|n| truth(n, n % 2 == 0)).collect();
        let report = evaluate(&decisions, &ground_truth);
        assert_eq!(report.total(), 30);
        assert_eq!(report.rows().len(), 30);
    }

    #[test]
    fn test_zero_denominator_metrics_are_zero() {
        // All benign, all predicted benign: no positives anywhere.
        let decisions = vec![decision(1, 0.1), decision(2, 0.2)];
        let ground_truth = vec![truth(1, false), truth(2, false)];
        let report = evaluate(&decisions, &ground_truth);

        assert_eq!(report.metrics.precision, 0.0);
        assert_eq!(report.metrics.recall, 0.0);
        assert_eq!(report.metrics.f1, 0.0);
        assert!((report.metrics.accuracy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unmatched_decision_becomes_row_error() {
        let decisions = vec![decision(1, 0.9), decision(99, 0.9)];
        let ground_truth = vec![truth(1, true)];
        let report = evaluate(&decisions, &ground_truth);

        assert_eq!(report.total(), 1);
        assert_eq!(report.row_errors().len(), 1);
        let expected = key(99);
        assert!(matches!(
            &report.row_errors()[0],
            RowError::UnmatchedRecord { key } if *key == expected
        ));
    }

    #[test]
    fn test_unlabeled_ground_truth_cannot_pair() {
        let decisions = vec![decision(1, 0.9)];
        let ground_truth = vec![FlowRecord::new(key(1))]; // no label
        let report = evaluate(&decisions, &ground_truth);

        assert_eq!(report.total(), 0);
        assert_eq!(report.row_errors().len(), 1);
    }

    #[test]
    fn test_duplicate_ground_truth_first_wins() {
        let decisions = vec![decision(1, 0.9)];
        let ground_truth = vec![truth(1, true), truth(1, false)];
        let report = evaluate(&decisions, &ground_truth);

        assert_eq!(report.counts.true_positives, 1);
        assert_eq!(report.counts.false_positives, 0);
    }

    #[test]
    fn test_filter_tags() {
        let decisions = vec![
            decision(1, 0.9),  // TP, not low confidence
            decision(2, 0.9),  // FP
            decision(3, 0.1),  // FN
            decision(4, 0.52), // TP, low confidence
        ];
        let ground_truth = vec![truth(1, true), truth(2, false), truth(3, true), truth(4, true)];
        let report = evaluate(&decisions, &ground_truth);

        assert_eq!(report.filter(ReportTag::ActualAttack).len(), 3);
        assert_eq!(report.filter(ReportTag::PredictedAttack).len(), 3);
        assert_eq!(report.filter(ReportTag::FalsePositive).len(), 1);
        assert_eq!(report.filter(ReportTag::FalseNegative).len(), 1);

        let low = report.filter(ReportTag::LowConfidence);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].decision.key.src_port, 4);
    }

    #[test]
    fn test_empty_inputs_produce_empty_report() {
        let report = evaluate(&[], &[]);
        assert_eq!(report.total(), 0);
        assert_eq!(report.metrics.accuracy, 0.0);
        assert!(report.rows().is_empty());
        assert!(report.row_errors().is_empty());
    }
}
