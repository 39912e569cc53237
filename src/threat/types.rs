//! Threat Types
//!
//! Data structures for ensemble verdicts. No fusion logic here.

use serde::{Deserialize, Serialize};

use crate::features::record::FlowKey;
use crate::model::artifact::ModelKind;

// ============================================================================
// VERDICT
// ============================================================================

/// Binary ensemble verdict for one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Benign,
    Attack,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Benign => "benign",
            Verdict::Attack => "attack",
        }
    }

    pub fn is_attack(&self) -> bool {
        matches!(self, Verdict::Attack)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SEVERITY
// ============================================================================

/// Alert severity derived from the fused probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CONTRIBUTIONS
// ============================================================================

/// The three raw model scores for one row, before fusion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelScores {
    pub forest: f64,
    pub mlp: f64,
    pub anomaly: f64,
}

/// One model's part in a decision: raw score and the weight it carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelContribution {
    pub kind: ModelKind,
    pub score: f64,
    pub weight: f64,
}

// ============================================================================
// DECISION
// ============================================================================

/// The fused verdict for one flow. `confidence` is the fused probability
/// itself and stays recomputable from the contributions, so explanations
/// never drift from the decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleDecision {
    pub key: FlowKey,
    pub verdict: Verdict,
    pub confidence: f64,
    pub severity: Severity,
    pub low_confidence: bool,
    pub contributions: Vec<ModelContribution>,
}

impl EnsembleDecision {
    /// Re-derive the fused probability from the stored contributions.
    pub fn recompute_confidence(&self) -> f64 {
        let weight_sum: f64 = self.contributions.iter().map(|c| c.weight).sum();
        if weight_sum <= 0.0 {
            return 0.0;
        }
        self.contributions
            .iter()
            .map(|c| c.score * c.weight)
            .sum::<f64>()
            / weight_sum
    }

    pub fn contribution(&self, kind: ModelKind) -> Option<&ModelContribution> {
        self.contributions.iter().find(|c| c.kind == kind)
    }
}
