//! Schema reconciliation and scaling
//!
//! The single choke point between arbitrary input and the models: after
//! [`reconcile`] every record carries exactly the schema's features, in
//! schema order, fully populated; after [`scale`] values are standardized
//! with the schema's trained parameters. Models never see anything else.

use ndarray::Array2;

use crate::error::CoreResult;
use crate::features::record::FlowRecord;
use crate::features::schema::FeatureSchema;

/// Align records to the schema: impute missing features from the stored fill
/// values, drop features the schema does not know, rewrite order to match.
///
/// Idempotent: reconciling an already-reconciled record is a no-op.
pub fn reconcile(records: Vec<FlowRecord>, schema: &FeatureSchema) -> Vec<FlowRecord> {
    records
        .into_iter()
        .map(|mut record| {
            let aligned = schema
                .feature_specs()
                .iter()
                .map(|spec| {
                    let value = record
                        .feature(&spec.name)
                        .flatten()
                        .unwrap_or(spec.fill);
                    (spec.name.clone(), Some(value))
                })
                .collect();
            record.replace_features(aligned);
            record
        })
        .collect()
}

/// Standard-scale every feature in place: `(v - mean) / scale`.
///
/// Expects reconciled records; features still carrying the absent marker are
/// left absent rather than invented. Fails before touching any record if the
/// schema carries a degenerate scale parameter.
pub fn scale(records: Vec<FlowRecord>, schema: &FeatureSchema) -> CoreResult<Vec<FlowRecord>> {
    schema.ensure_scalable()?;
    Ok(records
        .into_iter()
        .map(|mut record| {
            let scaled = record
                .features()
                .iter()
                .map(|(name, value)| {
                    let transformed = match (value, schema.get(name)) {
                        (Some(v), Some(spec)) => Some((v - spec.mean) / spec.scale),
                        (v, _) => *v,
                    };
                    (name.clone(), transformed)
                })
                .collect();
            record.replace_features(scaled);
            record
        })
        .collect())
}

/// Reconcile, scale, and densify into a rows x features matrix. This is the
/// only path records take into the models.
pub fn prepare(
    records: Vec<FlowRecord>,
    schema: &FeatureSchema,
) -> CoreResult<(Vec<FlowRecord>, Array2<f64>)> {
    let records = scale(reconcile(records, schema), schema)?;
    let matrix = to_matrix(&records, schema);
    Ok((records, matrix))
}

fn to_matrix(records: &[FlowRecord], schema: &FeatureSchema) -> Array2<f64> {
    let mut matrix = Array2::zeros((records.len(), schema.len()));
    for (i, record) in records.iter().enumerate() {
        for (j, (_, value)) in record.features().iter().enumerate() {
            // Reconciliation guarantees a value for every schema feature.
            matrix[[i, j]] = value.unwrap_or(0.0);
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::record::FlowKey;
    use crate::features::schema::{FeatureSchema, FeatureSpec, FillPolicy};

    fn schema() -> FeatureSchema {
        FeatureSchema::new(
            vec![
                FeatureSpec {
                    name: "flow_duration".to_string(),
                    mean: 10.0,
                    scale: 2.0,
                    fill: 8.0,
                },
                FeatureSpec {
                    name: "fwd_packets".to_string(),
                    mean: 0.0,
                    scale: 1.0,
                    fill: 0.0,
                },
            ],
            FillPolicy::TrainingMedian,
        )
    }

    fn record(pairs: &[(&str, Option<f64>)]) -> FlowRecord {
        let key = FlowKey::new("10.0.0.1", "10.0.0.2", 1, 2, 6);
        let (record, _) =
            FlowRecord::from_pairs(key, pairs.iter().map(|(n, v)| (n.to_string(), *v)));
        record
    }

    #[test]
    fn test_reconcile_fills_missing_feature() {
        let records = vec![record(&[("fwd_packets", Some(3.0))])];
        let out = reconcile(records, &schema());
        assert_eq!(out[0].feature("flow_duration"), Some(Some(8.0)));
        assert_eq!(out[0].feature("fwd_packets"), Some(Some(3.0)));
    }

    #[test]
    fn test_reconcile_fills_absent_marker() {
        let records = vec![record(&[("flow_duration", None), ("fwd_packets", Some(1.0))])];
        let out = reconcile(records, &schema());
        assert_eq!(out[0].feature("flow_duration"), Some(Some(8.0)));
    }

    #[test]
    fn test_reconcile_drops_unknown_and_reorders() {
        let records = vec![record(&[
            ("unknown_col", Some(99.0)),
            ("fwd_packets", Some(1.0)),
            ("flow_duration", Some(2.0)),
        ])];
        let out = reconcile(records, &schema());
        let names: Vec<&str> = out[0].features().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["flow_duration", "fwd_packets"]);
        assert_eq!(out[0].feature("unknown_col"), None);
    }

    #[test]
    fn test_reconcile_idempotent() {
        let records = vec![record(&[("fwd_packets", Some(3.0)), ("extra", Some(1.0))])];
        let once = reconcile(records, &schema());
        let twice = reconcile(once.clone(), &schema());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_reconcile_keeps_other_features_unchanged() {
        let records = vec![record(&[("fwd_packets", Some(42.0))])];
        let out = reconcile(records, &schema());
        // The filled feature appears, the existing one is untouched.
        assert_eq!(out[0].feature("fwd_packets"), Some(Some(42.0)));
        assert_eq!(out[0].feature_count(), 2);
    }

    #[test]
    fn test_scale_applies_standardization() {
        let records = reconcile(
            vec![record(&[("flow_duration", Some(14.0)), ("fwd_packets", Some(2.0))])],
            &schema(),
        );
        let out = scale(records, &schema()).unwrap();
        assert_eq!(out[0].feature("flow_duration"), Some(Some(2.0)));
        assert_eq!(out[0].feature("fwd_packets"), Some(Some(2.0)));
    }

    #[test]
    fn test_scale_rejects_degenerate_schema() {
        let bad = FeatureSchema::new(
            vec![FeatureSpec {
                name: "x".to_string(),
                mean: 0.0,
                scale: f64::NAN,
                fill: 0.0,
            }],
            FillPolicy::Zero,
        );
        let records = vec![record(&[("x", Some(1.0))])];
        assert!(scale(records, &bad).is_err());
    }

    #[test]
    fn test_prepare_builds_matrix_in_schema_order() {
        let records = vec![
            record(&[("fwd_packets", Some(1.0)), ("flow_duration", Some(12.0))]),
            record(&[("flow_duration", Some(8.0))]),
        ];
        let (out, matrix) = prepare(records, &schema()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(matrix.shape(), &[2, 2]);
        // (12 - 10) / 2 = 1.0; fill 8 -> (8 - 10) / 2 = -1.0
        assert_eq!(matrix[[0, 0]], 1.0);
        assert_eq!(matrix[[1, 0]], -1.0);
        assert_eq!(matrix[[1, 1]], 0.0);
    }

    #[test]
    fn test_prepare_empty_input() {
        let (out, matrix) = prepare(Vec::new(), &schema()).unwrap();
        assert!(out.is_empty());
        assert_eq!(matrix.shape(), &[0, 2]);
    }
}
