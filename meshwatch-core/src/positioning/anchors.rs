//! Anchor registry

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::errors::{CoreError, CoreResult};
use crate::geometry::{Anchor, AnchorId};

/// Anchors with known coordinates, shared by estimators and calibration
#[derive(Debug, Default)]
pub struct AnchorRegistry {
    anchors: RwLock<BTreeMap<AnchorId, Anchor>>,
}

impl AnchorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an anchor; returns the previous entry
    pub fn register(&self, anchor: Anchor) -> CoreResult<Option<Anchor>> {
        if !anchor.position.is_finite() {
            return Err(CoreError::Parse {
                field: "position",
                reason: format!("anchor {} has non-finite coordinates", anchor.id),
            });
        }
        log::debug!("anchor registered id={} at {}", anchor.id, anchor.position);
        Ok(self.anchors.write().insert(anchor.id.clone(), anchor))
    }

    /// Remove an anchor
    pub fn remove(&self, id: &AnchorId) -> Option<Anchor> {
        self.anchors.write().remove(id)
    }

    /// Look up one anchor
    pub fn get(&self, id: &AnchorId) -> Option<Anchor> {
        self.anchors.read().get(id).cloned()
    }

    /// Copy of every anchor, in id order
    pub fn snapshot(&self) -> Vec<Anchor> {
        self.anchors.read().values().cloned().collect()
    }

    /// Number of anchors
    pub fn len(&self) -> usize {
        self.anchors.read().len()
    }

    /// True when no anchors are registered
    pub fn is_empty(&self) -> bool {
        self.anchors.read().is_empty()
    }
}
