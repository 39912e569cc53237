//! FlowGuard Core - Hybrid Network Flow Threat Classification
//!
//! Classifies bidirectional network flows as benign or hostile with a
//! three-model ensemble: a bagged decision-tree classifier and an MLP
//! trained on labeled flows, plus an isolation-forest anomaly scorer
//! trained only on benign traffic so unseen attack shapes still register.
//! The three scores fuse into one weighted probability per flow, and every
//! decision carries its per-model contributions for audit.
//!
//! ## Modules
//! - `features` - extraction, schema derivation, reconciliation, scaling
//! - `model` - the three estimators and their serialized artifacts
//! - `train` - seeded training runs with a bundled holdout evaluation
//! - `threat` - score fusion, verdicts, severity
//! - `eval` - confusion counts, metrics, filterable reports
//! - `store` - artifact-set persistence and the install handle
//!
//! ## Typical flow
//! Train once, persist, install, score forever:
//!
//! ```no_run
//! use flowguard_core::{train, ExtractOptions, RawTable, TrainConfig};
//! use flowguard_core::{save_artifacts, ArtifactHandle, EnsembleConfig, EnsembleScorer};
//!
//! # fn run(csv: &str, live: &str) -> flowguard_core::CoreResult<()> {
//! let table = RawTable::from_csv(csv);
//! let outcome = train::train(&table, &ExtractOptions::default(), &TrainConfig::default())?;
//! save_artifacts(&outcome.artifacts, "artifacts.json".as_ref())?;
//!
//! let handle = ArtifactHandle::empty();
//! handle.install(outcome.artifacts)?;
//! let scorer = EnsembleScorer::from_handle(&handle, EnsembleConfig::default())?;
//! let (decisions, _row_errors) =
//!     scorer.score_table(&RawTable::from_csv(live), &ExtractOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod eval;
pub mod features;
pub mod model;
pub mod store;
pub mod threat;
pub mod train;

pub use error::{CoreError, CoreResult, RowError};
pub use eval::{evaluate, EvaluationReport, ReportTag};
pub use features::{ExtractOptions, FeatureSchema, FlowKey, FlowLabel, FlowRecord, RawTable};
pub use model::{ModelArtifact, ModelKind};
pub use store::{load_artifacts, save_artifacts, ArtifactHandle, ArtifactSet};
pub use threat::{EnsembleConfig, EnsembleDecision, EnsembleScorer, Verdict};
pub use train::{TrainConfig, TrainOutcome};
