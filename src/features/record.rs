//! Flow records - the unit of classification
//!
//! A [`FlowRecord`] is one bidirectional network flow: a 5-tuple identity,
//! an ordered list of named numeric features, and an optional ground-truth
//! label. Feature values are `Option<f64>` so "not computed" stays distinct
//! from "computed as zero" until reconciliation fills it deliberately.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// FLOW IDENTITY
// ============================================================================

/// 5-tuple identity of a flow. Evaluation pairs decisions with ground truth
/// by this key, so it must hash and compare exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub src_addr: String,
    pub dst_addr: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
}

impl FlowKey {
    pub fn new(
        src_addr: impl Into<String>,
        dst_addr: impl Into<String>,
        src_port: u16,
        dst_port: u16,
        protocol: u8,
    ) -> Self {
        Self {
            src_addr: src_addr.into(),
            dst_addr: dst_addr.into(),
            src_port,
            dst_port,
            protocol,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} proto {}",
            self.src_addr, self.src_port, self.dst_addr, self.dst_port, self.protocol
        )
    }
}

// ============================================================================
// GROUND-TRUTH LABEL
// ============================================================================

/// Normalized flow label. Attack keeps the raw text so attack-type breakdowns
/// stay possible downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowLabel {
    Benign,
    Attack(String),
}

impl FlowLabel {
    /// Normalize a raw label cell. Benign spellings collapse to [`Benign`];
    /// anything else is an attack with the original text retained.
    ///
    /// [`Benign`]: FlowLabel::Benign
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lowered = trimmed.to_lowercase();
        match lowered.as_str() {
            "benign" | "normal" | "0" | "false" => FlowLabel::Benign,
            _ => FlowLabel::Attack(trimmed.to_string()),
        }
    }

    pub fn is_attack(&self) -> bool {
        matches!(self, FlowLabel::Attack(_))
    }
}

impl fmt::Display for FlowLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowLabel::Benign => write!(f, "BENIGN"),
            FlowLabel::Attack(name) => write!(f, "{}", name),
        }
    }
}

// ============================================================================
// FLOW RECORD
// ============================================================================

/// One flow with its feature mapping. Feature names are unique; inserting an
/// existing name replaces the value (last write wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub key: FlowKey,
    pub label: Option<FlowLabel>,
    features: Vec<(String, Option<f64>)>,
}

impl FlowRecord {
    pub fn new(key: FlowKey) -> Self {
        Self {
            key,
            label: None,
            features: Vec::new(),
        }
    }

    /// Build from name/value pairs, keeping first-seen order. Duplicate names
    /// overwrite in place and report how many were collapsed.
    pub fn from_pairs(
        key: FlowKey,
        pairs: impl IntoIterator<Item = (String, Option<f64>)>,
    ) -> (Self, usize) {
        let mut record = Self::new(key);
        let mut collapsed = 0;
        for (name, value) in pairs {
            if record.set_feature(name, value) {
                collapsed += 1;
            }
        }
        (record, collapsed)
    }

    pub fn with_label(mut self, label: FlowLabel) -> Self {
        self.label = Some(label);
        self
    }

    /// Insert or replace a feature. Returns true when an existing name was
    /// replaced.
    pub fn set_feature(&mut self, name: impl Into<String>, value: Option<f64>) -> bool {
        let name = name.into();
        if let Some(slot) = self.features.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
            true
        } else {
            self.features.push((name, value));
            false
        }
    }

    /// Look up a feature by name. Outer `None` means the name is not present
    /// at all; `Some(None)` means present but absent-valued.
    pub fn feature(&self, name: &str) -> Option<Option<f64>> {
        self.features
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// Features in record order.
    pub fn features(&self) -> &[(String, Option<f64>)] {
        &self.features
    }

    /// Replace the whole feature mapping. Used by reconciliation, which owns
    /// the ordering invariant.
    pub(crate) fn replace_features(&mut self, features: Vec<(String, Option<f64>)>) {
        self.features = features;
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }
}
