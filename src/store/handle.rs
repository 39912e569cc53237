//! Shared handle for the currently installed artifact set.
//!
//! Scoring paths hold an `Arc` snapshot of the set they started with, so a
//! retrain can install a replacement mid-flight without tearing schemas out
//! from under in-progress batches. There is no implicit global; the owner of
//! the handle decides its scope.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::CoreResult;
use crate::store::{load_artifacts, ArtifactSet};

#[derive(Debug, Default)]
pub struct ArtifactHandle {
    inner: RwLock<Option<Arc<ArtifactSet>>>,
}

impl ArtifactHandle {
    /// A handle with nothing installed. Scorers cannot be built from it
    /// until [`install`](Self::install) succeeds.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate and publish a set, replacing whatever was installed before.
    /// Returns the shared snapshot that readers from now on will see.
    pub fn install(&self, set: ArtifactSet) -> CoreResult<Arc<ArtifactSet>> {
        set.validate()?;
        let arc = Arc::new(set);
        *self.inner.write() = Some(arc.clone());
        log::info!(
            "installed artifact set {} (schema hash {:08x})",
            arc.set_id,
            arc.schema.layout_hash()
        );
        Ok(arc)
    }

    /// Load a set from disk and publish it. The write lock is held across
    /// the load so concurrent initializations serialize instead of racing.
    pub fn install_from_path(&self, path: &Path) -> CoreResult<Arc<ArtifactSet>> {
        let mut guard = self.inner.write();
        let set = load_artifacts(path)?;
        let arc = Arc::new(set);
        *guard = Some(arc.clone());
        log::info!(
            "installed artifact set {} from {}",
            arc.set_id,
            path.display()
        );
        Ok(arc)
    }

    /// Snapshot of the currently installed set, if any.
    pub fn current(&self) -> Option<Arc<ArtifactSet>> {
        self.inner.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.read().is_some()
    }
}
