//! Error types for the classifier core.
//!
//! Two tiers, matching how failures propagate:
//! - [`CoreError`]: fatal to the operation in progress (training run,
//!   artifact load, scoring against a degenerate schema).
//! - [`RowError`]: scoped to one input row, collected and returned next to
//!   partial results so the caller decides whether to proceed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::record::FlowKey;
use crate::model::artifact::ModelKind;

pub type CoreResult<T> = Result<T, CoreError>;

/// Fatal error kinds. Each carries enough context to diagnose without
/// re-running the operation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A schema scale parameter is zero or non-finite. Scoring against this
    /// schema is blocked until retraining produces a usable one.
    #[error("degenerate scale {scale} for feature '{feature}'; retrain before scoring")]
    Scaling { feature: String, scale: f64 },

    /// A label class is too small to split and fit.
    #[error("class '{class}' has {count} rows, need at least {min}")]
    InsufficientData {
        class: String,
        count: usize,
        min: usize,
    },

    /// Artifacts trained against different schemas were loaded together.
    #[error(
        "schema mismatch ({context}): expected v{expected_version} (hash {expected_hash:08x}), \
         got v{actual_version} (hash {actual_hash:08x})"
    )]
    SchemaMismatch {
        context: String,
        expected_version: u8,
        expected_hash: u32,
        actual_version: u8,
        actual_hash: u32,
    },

    /// An artifact set is missing one of the three required model kinds.
    #[error("artifact set is missing the {kind} model")]
    MissingModel { kind: ModelKind },

    /// A scorer was requested before any artifact set was installed.
    #[error("no artifact set installed")]
    NotInitialized,

    /// A model's stored parameters failed post-load validation.
    #[error("invalid {kind} parameters: {reason}")]
    InvalidModel { kind: ModelKind, reason: String },

    /// An identity column the extractor needs is not in the input header.
    #[error("required column '{column}' not found in input header")]
    MissingColumn { column: String },

    /// A configuration value is outside its usable range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Every input row was malformed; there is nothing to proceed with.
    #[error("all {rows} input rows were malformed")]
    AllRowsMalformed { rows: usize },

    /// Persisted payload does not match its recorded digest.
    #[error("artifact digest mismatch: recorded {recorded}, computed {computed}")]
    Integrity { recorded: String, computed: String },

    #[error("artifact io: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Row-scoped problem. Never aborts the batch on its own. Serializable so
/// reports that embed row errors round-trip with the rest of the payload.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum RowError {
    /// The row could not be turned into a usable record.
    #[error("row {row}: {reason}")]
    MalformedInput { row: usize, reason: String },

    /// A decision had no ground-truth partner during evaluation.
    #[error("no ground truth for flow {key}")]
    UnmatchedRecord { key: FlowKey },
}

impl RowError {
    pub fn malformed(row: usize, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            row,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling_error_names_feature() {
        let err = CoreError::Scaling {
            feature: "flow_duration".to_string(),
            scale: 0.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("flow_duration"));
        assert!(msg.contains("retrain"));
    }

    #[test]
    fn test_schema_mismatch_formats_hashes_hex() {
        let err = CoreError::SchemaMismatch {
            context: "load".to_string(),
            expected_version: 1,
            expected_hash: 0xdeadbeef,
            actual_version: 1,
            actual_hash: 0x0badf00d,
        };
        let msg = err.to_string();
        assert!(msg.contains("deadbeef"));
        assert!(msg.contains("0badf00d"));
    }

    #[test]
    fn test_row_error_display() {
        let err = RowError::malformed(3, "missing source address");
        assert_eq!(err.to_string(), "row 3: missing source address");
    }
}
