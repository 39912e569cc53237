//! Features Module - Flow Feature Pipeline
//!
//! Everything between raw tabular input and model-ready matrices: record
//! types, the trained schema contract, extraction, reconciliation, scaling.

pub mod extract;
pub mod pipeline;
pub mod record;
pub mod schema;

// Re-export common types
pub use extract::{extract, ExtractOptions, RawTable};
pub use record::{FlowKey, FlowLabel, FlowRecord};
pub use schema::{FeatureSchema, FeatureSpec, FillPolicy, SCHEMA_VERSION};
