//! Artifact Store - Persisted Model Sets
//!
//! The three trained models travel as one [`ArtifactSet`]: a shared schema,
//! one artifact per model kind, a set id, and the training timestamp. Sets
//! are saved as a single JSON document carrying a SHA-256 digest of the
//! payload; the digest and every artifact are re-validated on load, so a
//! mismatched or corrupted set never reaches a scorer.

pub mod handle;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};
use crate::features::schema::FeatureSchema;
use crate::model::artifact::{ModelArtifact, ModelKind};

pub use handle::ArtifactHandle;

/// Bump when the on-disk document layout changes.
pub const STORE_FORMAT_VERSION: u8 = 1;

// ============================================================================
// ARTIFACT SET
// ============================================================================

/// A matched set: one schema, exactly one artifact of each kind, always
/// persisted and loaded together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub set_id: String,
    pub created_at: DateTime<Utc>,
    pub schema: FeatureSchema,
    artifacts: Vec<ModelArtifact>,
}

impl ArtifactSet {
    /// Assemble and validate a set from freshly trained artifacts. The
    /// shared schema is taken from the first artifact; every other artifact
    /// must match it exactly.
    pub fn from_artifacts(artifacts: Vec<ModelArtifact>) -> CoreResult<Self> {
        let schema = artifacts
            .first()
            .map(|a| a.schema.clone())
            .ok_or(CoreError::MissingModel {
                kind: ModelKind::SupervisedForest,
            })?;
        let set = Self {
            set_id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now(),
            schema,
            artifacts,
        };
        set.validate()?;
        Ok(set)
    }

    pub fn artifacts(&self) -> &[ModelArtifact] {
        &self.artifacts
    }

    pub fn artifact(&self, kind: ModelKind) -> Option<&ModelArtifact> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }

    /// Full set validation: every kind present exactly once, every artifact
    /// internally valid, every schema identical to the set schema.
    pub fn validate(&self) -> CoreResult<()> {
        self.schema.validate()?;
        for kind in ModelKind::ALL {
            match self.artifacts.iter().filter(|a| a.kind == kind).count() {
                0 => return Err(CoreError::MissingModel { kind }),
                1 => {}
                _ => {
                    return Err(CoreError::InvalidModel {
                        kind,
                        reason: "duplicate artifact in set".to_string(),
                    })
                }
            }
        }
        for artifact in &self.artifacts {
            artifact.validate()?;
            self.schema
                .ensure_matches(&artifact.schema, artifact.kind.as_str())?;
        }
        Ok(())
    }
}

// ============================================================================
// ON-DISK DOCUMENT
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactDocument {
    format_version: u8,
    sha256: String,
    set: ArtifactSet,
}

fn payload_digest(set: &ArtifactSet) -> CoreResult<String> {
    let payload = serde_json::to_vec(set)?;
    let mut hasher = Sha256::new();
    hasher.update(&payload);
    Ok(hex::encode(hasher.finalize()))
}

/// Save a validated set as one JSON document.
pub fn save_artifacts(set: &ArtifactSet, path: &Path) -> CoreResult<()> {
    set.validate()?;

    // Ensure directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let document = ArtifactDocument {
        format_version: STORE_FORMAT_VERSION,
        sha256: payload_digest(set)?,
        set: set.clone(),
    };
    let json = serde_json::to_vec_pretty(&document)?;
    fs::write(path, json)?;

    log::info!(
        "saved artifact set {} ({} models, schema hash {:08x}) to {}",
        set.set_id,
        set.artifacts.len(),
        set.schema.layout_hash(),
        path.display()
    );
    Ok(())
}

/// Load a set with digest and consistency checks.
pub fn load_artifacts(path: &Path) -> CoreResult<ArtifactSet> {
    if !path.exists() {
        return Err(CoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("artifact set not found at {}", path.display()),
        )));
    }

    let data = fs::read(path)?;
    let document: ArtifactDocument = serde_json::from_slice(&data)?;

    if document.format_version != STORE_FORMAT_VERSION {
        return Err(CoreError::Config(format!(
            "unsupported artifact format version {}",
            document.format_version
        )));
    }

    let computed = payload_digest(&document.set)?;
    if computed != document.sha256 {
        return Err(CoreError::Integrity {
            recorded: document.sha256,
            computed,
        });
    }

    document.set.validate()?;

    log::info!(
        "loaded artifact set {} (schema hash {:08x}) from {}",
        document.set.set_id,
        document.set.schema.layout_hash(),
        path.display()
    );
    Ok(document.set)
}

/// Conventional file name for a set, versioned by its training timestamp.
pub fn artifact_file_name(set: &ArtifactSet) -> PathBuf {
    PathBuf::from(format!(
        "artifacts_{}.json",
        set.created_at.format("%Y%m%dT%H%M%SZ")
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::features::record::{FlowKey, FlowRecord};
    use crate::features::schema::FillPolicy;
    use crate::model::anomaly::{self, AnomalyHyperparams};
    use crate::model::artifact::{ModelParams, TrainingMetrics};
    use crate::model::forest::{self, ForestHyperparams};
    use crate::model::mlp::{self, MlpHyperparams};
    use ndarray::Array2;

    fn schema_for(names: &[&str]) -> FeatureSchema {
        let key = FlowKey::new("10.0.0.1", "10.0.0.2", 1, 2, 6);
        let (record, _) = FlowRecord::from_pairs(
            key,
            names.iter().map(|n| (n.to_string(), Some(1.0))),
        );
        FeatureSchema::derive(&[record], FillPolicy::Zero)
    }

    fn training_data() -> (Array2<f64>, Vec<u8>) {
        let x = Array2::from_shape_fn((12, 2), |(i, j)| {
            if i < 6 {
                -1.0 - j as f64 * 0.1
            } else {
                1.0 + i as f64 * 0.05
            }
        });
        let y = (0..12).map(|i| if i < 6 { 0 } else { 1 }).collect();
        (x, y)
    }

    pub(crate) fn full_set() -> ArtifactSet {
        let schema = schema_for(&["a", "b"]);
        let (x, y) = training_data();
        let mlp_hp = MlpHyperparams {
            hidden_layers: vec![4],
            epochs: 10,
            ..Default::default()
        };
        let anomaly_hp = AnomalyHyperparams {
            n_trees: 10,
            ..Default::default()
        };
        let artifacts = vec![
            ModelArtifact::new(
                ModelParams::Forest(forest::fit(&x, &y, &ForestHyperparams::default(), 1)),
                schema.clone(),
                TrainingMetrics::default(),
            ),
            ModelArtifact::new(
                ModelParams::Mlp(mlp::fit(&x, &y, &mlp_hp, 2)),
                schema.clone(),
                TrainingMetrics::default(),
            ),
            ModelArtifact::new(
                ModelParams::Anomaly(anomaly::fit(&x, &anomaly_hp, 3)),
                schema.clone(),
                TrainingMetrics::default(),
            ),
        ];
        ArtifactSet::from_artifacts(artifacts).unwrap()
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifacts.json");
        let set = full_set();
        save_artifacts(&set, &path).unwrap();

        let loaded = load_artifacts(&path).unwrap();
        assert_eq!(loaded.set_id, set.set_id);
        assert_eq!(loaded.schema.layout_hash(), set.schema.layout_hash());
        assert_eq!(loaded.artifacts().len(), 3);
        for kind in ModelKind::ALL {
            assert!(loaded.artifact(kind).is_some());
        }
    }

    #[test]
    fn test_round_trip_preserves_exact_float_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifacts.json");
        let mut set = full_set();
        // 17 significant digits: the shortest decimal form a naive parser
        // reads back one ULP off. The digest must survive the reparse and
        // the loaded value must be bit-identical.
        let importance = 0.45042492917847027_f64;
        for artifact in &mut set.artifacts {
            if let ModelParams::Forest(params) = &mut artifact.params {
                params.feature_importances[0] = importance;
            }
        }
        save_artifacts(&set, &path).unwrap();

        let loaded = load_artifacts(&path).unwrap();
        let forest = loaded.artifact(ModelKind::SupervisedForest).unwrap();
        match &forest.params {
            ModelParams::Forest(params) => {
                assert_eq!(params.feature_importances[0].to_bits(), importance.to_bits());
            }
            _ => panic!("forest artifact carries non-forest params"),
        }
    }

    #[test]
    fn test_load_rejects_tampered_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifacts.json");
        let set = full_set();
        save_artifacts(&set, &path).unwrap();

        let mut document: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        document["set"]["set_id"] = serde_json::Value::from("forged");
        fs::write(&path, serde_json::to_vec(&document).unwrap()).unwrap();

        let err = load_artifacts(&path).unwrap_err();
        assert!(matches!(err, CoreError::Integrity { .. }));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_artifacts(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }

    #[test]
    fn test_from_artifacts_rejects_schema_mismatch() {
        let set = full_set();
        let other_schema = schema_for(&["a", "b", "c"]);
        let (x, y) = training_data();
        // Forest trained for a different layout.
        let x3 = Array2::from_shape_fn((12, 3), |(i, j)| x[[i, j.min(1)]]);
        let foreign = ModelArtifact::new(
            ModelParams::Forest(forest::fit(&x3, &y, &ForestHyperparams::default(), 9)),
            other_schema,
            TrainingMetrics::default(),
        );

        let mut artifacts = set.artifacts().to_vec();
        artifacts.retain(|a| a.kind != ModelKind::SupervisedForest);
        artifacts.push(foreign);
        let err = ArtifactSet::from_artifacts(artifacts).unwrap_err();
        assert!(matches!(err, CoreError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_from_artifacts_rejects_missing_kind() {
        let set = full_set();
        let mut artifacts = set.artifacts().to_vec();
        artifacts.retain(|a| a.kind != ModelKind::UnsupervisedAnomaly);
        let err = ArtifactSet::from_artifacts(artifacts).unwrap_err();
        assert!(
            matches!(err, CoreError::MissingModel { kind } if kind == ModelKind::UnsupervisedAnomaly)
        );
    }

    #[test]
    fn test_from_artifacts_rejects_duplicate_kind() {
        let set = full_set();
        let mut artifacts = set.artifacts().to_vec();
        let dup = artifacts[0].clone();
        artifacts.push(dup);
        let err = ArtifactSet::from_artifacts(artifacts).unwrap_err();
        assert!(matches!(err, CoreError::InvalidModel { .. }));
    }

    #[test]
    fn test_artifact_file_name_uses_timestamp() {
        let set = full_set();
        let name = artifact_file_name(&set);
        let name = name.to_string_lossy();
        assert!(name.starts_with("artifacts_"));
        assert!(name.ends_with("Z.json"));
    }
}
