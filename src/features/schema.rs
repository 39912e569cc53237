//! Feature schema - the trained feature contract
//!
//! A [`FeatureSchema`] fixes the feature order, scaling parameters, and fill
//! values at training time. Every record scored afterwards is reconciled
//! against this exact schema, so the schema carries a version byte and a
//! CRC32 layout hash to detect drift at load time instead of at predict time.
//!
//! ## Rules (NEVER break these):
//! 1. Schemas are immutable once derived
//! 2. Retraining derives a new schema, never edits one
//! 3. Artifacts are only loaded together when version AND hash agree

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::features::record::FlowRecord;

// ============================================================================
// SCHEMA VERSION
// ============================================================================

/// Current schema encoding version.
/// MUST be incremented when the derivation or hash rules change.
pub const SCHEMA_VERSION: u8 = 1;

/// Scale parameters this close to zero are treated as constant features.
const SCALE_EPSILON: f64 = 1e-12;

// ============================================================================
// FILL POLICY
// ============================================================================

/// How reconciliation fills a feature that the schema expects but a record
/// lacks. Chosen at training time and stored with the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillPolicy {
    /// Absent features become 0.0.
    Zero,
    /// Absent features become the training-set median for that feature.
    TrainingMedian,
}

impl Default for FillPolicy {
    fn default() -> Self {
        FillPolicy::TrainingMedian
    }
}

// ============================================================================
// PER-FEATURE PARAMETERS
// ============================================================================

/// One feature's trained parameters: standard-scaling mean/scale plus the
/// stored fill value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub mean: f64,
    pub scale: f64,
    pub fill: f64,
}

// ============================================================================
// SCHEMA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u8,
    pub fill_policy: FillPolicy,
    features: Vec<FeatureSpec>,
    layout_hash: u32,
}

/// Compute the CRC32 layout hash over the version byte and ordered names.
pub fn compute_layout_hash(version: u8, names: &[String]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[version]);
    for name in names {
        hasher.update(name.as_bytes());
        hasher.update(&[0]); // Separator
    }
    hasher.finalize()
}

impl FeatureSchema {
    /// Assemble a schema from explicit per-feature parameters.
    pub fn new(features: Vec<FeatureSpec>, fill_policy: FillPolicy) -> Self {
        let names: Vec<String> = features.iter().map(|f| f.name.clone()).collect();
        let layout_hash = compute_layout_hash(SCHEMA_VERSION, &names);
        Self {
            version: SCHEMA_VERSION,
            fill_policy,
            features,
            layout_hash,
        }
    }

    /// Derive a schema from the training split.
    ///
    /// Feature order is first-seen order across the records. Fill values are
    /// computed first (median of present finite values, or zero per policy),
    /// then mean/scale are computed over the filled matrix so scaling matches
    /// what the models were actually fit on. Constant features keep a scale
    /// of 1.0 so scaling stays defined everywhere.
    pub fn derive(records: &[FlowRecord], fill_policy: FillPolicy) -> Self {
        let mut names: Vec<String> = Vec::new();
        for record in records {
            for (name, _) in record.features() {
                if !names.iter().any(|n| n == name) {
                    names.push(name.clone());
                }
            }
        }

        let mut features = Vec::with_capacity(names.len());
        for name in &names {
            let mut present: Vec<f64> = records
                .iter()
                .filter_map(|r| r.feature(name).flatten())
                .filter(|v| v.is_finite())
                .collect();

            let fill = match fill_policy {
                FillPolicy::Zero => 0.0,
                FillPolicy::TrainingMedian => median(&mut present).unwrap_or(0.0),
            };

            let filled: Vec<f64> = records
                .iter()
                .map(|r| match r.feature(name).flatten() {
                    Some(v) if v.is_finite() => v,
                    _ => fill,
                })
                .collect();

            let n = filled.len().max(1) as f64;
            let mean = filled.iter().sum::<f64>() / n;
            let variance = filled.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            let scale = if std > SCALE_EPSILON { std } else { 1.0 };

            features.push(FeatureSpec {
                name: name.clone(),
                mean,
                scale,
                fill,
            });
        }

        Self::new(features, fill_policy)
    }

    pub fn layout_hash(&self) -> u32 {
        self.layout_hash
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature_specs(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    /// Get feature index by name (O(n) but features are few).
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }

    /// True when two schemas were derived identically.
    pub fn matches(&self, other: &FeatureSchema) -> bool {
        self.version == other.version && self.layout_hash == other.layout_hash
    }

    /// Fail with full context when `other` does not match.
    pub fn ensure_matches(&self, other: &FeatureSchema, context: &str) -> CoreResult<()> {
        if self.matches(other) {
            return Ok(());
        }
        Err(CoreError::SchemaMismatch {
            context: context.to_string(),
            expected_version: self.version,
            expected_hash: self.layout_hash,
            actual_version: other.version,
            actual_hash: other.layout_hash,
        })
    }

    /// Post-load self check: the stored hash must match a recomputation over
    /// the stored names.
    pub fn validate(&self) -> CoreResult<()> {
        let names: Vec<String> = self.features.iter().map(|f| f.name.clone()).collect();
        let recomputed = compute_layout_hash(self.version, &names);
        if recomputed != self.layout_hash {
            return Err(CoreError::SchemaMismatch {
                context: "schema self-check".to_string(),
                expected_version: self.version,
                expected_hash: recomputed,
                actual_version: self.version,
                actual_hash: self.layout_hash,
            });
        }
        Ok(())
    }

    /// Guard against degenerate scale parameters before any scoring.
    pub fn ensure_scalable(&self) -> CoreResult<()> {
        for spec in &self.features {
            if !spec.scale.is_finite() || spec.scale.abs() <= SCALE_EPSILON {
                return Err(CoreError::Scaling {
                    feature: spec.name.clone(),
                    scale: spec.scale,
                });
            }
        }
        Ok(())
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::record::FlowKey;

    fn record(id: u16, pairs: &[(&str, Option<f64>)]) -> FlowRecord {
        let key = FlowKey::new("10.0.0.1", "10.0.0.2", id, 80, 6);
        let (record, _) = FlowRecord::from_pairs(
            key,
            pairs.iter().map(|(n, v)| (n.to_string(), *v)),
        );
        record
    }

    #[test]
    fn test_layout_hash_consistency() {
        let names = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            compute_layout_hash(SCHEMA_VERSION, &names),
            compute_layout_hash(SCHEMA_VERSION, &names)
        );
    }

    #[test]
    fn test_layout_hash_order_sensitive() {
        let ab = vec!["a".to_string(), "b".to_string()];
        let ba = vec!["b".to_string(), "a".to_string()];
        assert_ne!(
            compute_layout_hash(SCHEMA_VERSION, &ab),
            compute_layout_hash(SCHEMA_VERSION, &ba)
        );
    }

    #[test]
    fn test_derive_keeps_first_seen_order() {
        let records = vec![
            record(1, &[("flow_duration", Some(1.0)), ("fwd_packets", Some(2.0))]),
            record(2, &[("bwd_packets", Some(3.0)), ("flow_duration", Some(4.0))]),
        ];
        let schema = FeatureSchema::derive(&records, FillPolicy::TrainingMedian);
        let names: Vec<&str> = schema.names().collect();
        assert_eq!(names, vec!["flow_duration", "fwd_packets", "bwd_packets"]);
    }

    #[test]
    fn test_derive_median_fill() {
        let records = vec![
            record(1, &[("x", Some(1.0))]),
            record(2, &[("x", Some(3.0))]),
            record(3, &[("x", Some(100.0))]),
            record(4, &[("x", None)]),
        ];
        let schema = FeatureSchema::derive(&records, FillPolicy::TrainingMedian);
        assert_eq!(schema.get("x").unwrap().fill, 3.0);

        let zeros = FeatureSchema::derive(&records, FillPolicy::Zero);
        assert_eq!(zeros.get("x").unwrap().fill, 0.0);
    }

    #[test]
    fn test_derive_constant_feature_scale_is_one() {
        let records = vec![
            record(1, &[("c", Some(5.0))]),
            record(2, &[("c", Some(5.0))]),
        ];
        let schema = FeatureSchema::derive(&records, FillPolicy::TrainingMedian);
        let spec = schema.get("c").unwrap();
        assert_eq!(spec.mean, 5.0);
        assert_eq!(spec.scale, 1.0);
        assert!(schema.ensure_scalable().is_ok());
    }

    #[test]
    fn test_matches_and_mismatch_context() {
        let a = FeatureSchema::derive(
            &[record(1, &[("x", Some(1.0)), ("y", Some(2.0))])],
            FillPolicy::Zero,
        );
        let b = FeatureSchema::derive(
            &[record(1, &[("x", Some(9.0)), ("y", Some(9.0))])],
            FillPolicy::Zero,
        );
        // Same names, different values: still the same layout.
        assert!(a.matches(&b));

        let c = FeatureSchema::derive(&[record(1, &[("x", Some(1.0))])], FillPolicy::Zero);
        assert!(!a.matches(&c));
        let err = a.ensure_matches(&c, "load").unwrap_err();
        assert!(err.to_string().contains("load"));
    }

    #[test]
    fn test_validate_detects_tampered_hash() {
        let schema = FeatureSchema::derive(
            &[record(1, &[("x", Some(1.0))])],
            FillPolicy::Zero,
        );
        let mut json = serde_json::to_value(&schema).unwrap();
        json["layout_hash"] = serde_json::Value::from(12345u32);
        let tampered: FeatureSchema = serde_json::from_value(json).unwrap();
        assert!(tampered.validate().is_err());
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_ensure_scalable_rejects_zero_scale() {
        let schema = FeatureSchema::new(
            vec![FeatureSpec {
                name: "broken".to_string(),
                mean: 0.0,
                scale: 0.0,
                fill: 0.0,
            }],
            FillPolicy::Zero,
        );
        let err = schema.ensure_scalable().unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
