//! Conflict detection and the per-cycle conflict ledger
//!
//! Provides:
//! - Three-way fingerprint comparison against the base snapshot
//! - A shared ledger of pending conflicts and user resolutions

mod detector;

pub use detector::ConflictDetector;

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::types::{ConflictEntry, ConflictResolution, SyncKey};

#[derive(Debug, Default)]
struct LedgerInner {
    pending: Vec<ConflictEntry>,
    resolutions: HashMap<SyncKey, ConflictResolution>,
    has_conflicts: bool,
}

/// Pending conflicts and their chosen resolutions for one detect→resolve→apply cycle
#[derive(Debug, Default)]
pub struct ConflictLedger {
    inner: Mutex<LedgerInner>,
}

impl ConflictLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending list with a fresh detection result.
    ///
    /// Resolutions survive only for keys that are still in conflict. A
    /// non-empty result raises the has-conflicts flag.
    pub fn record(&self, conflicts: &[ConflictEntry]) {
        let mut inner = self.inner.lock();
        inner
            .resolutions
            .retain(|key, _| conflicts.iter().any(|c| &c.key == key));
        inner.pending = conflicts.to_vec();
        if !conflicts.is_empty() {
            inner.has_conflicts = true;
        }
    }

    pub fn resolution_for(&self, key: &str) -> Option<ConflictResolution> {
        self.inner.lock().resolutions.get(key).copied()
    }

    /// Merge user decisions into the ledger
    pub fn set_resolutions(&self, resolutions: HashMap<SyncKey, ConflictResolution>) {
        self.inner.lock().resolutions.extend(resolutions);
    }

    /// Conflicts with no decision yet, or whose decision is `Skip`
    pub fn unresolved<'a>(&self, conflicts: &'a [ConflictEntry]) -> Vec<&'a ConflictEntry> {
        let inner = self.inner.lock();
        conflicts
            .iter()
            .filter(|c| {
                matches!(
                    inner.resolutions.get(&c.key),
                    None | Some(ConflictResolution::Skip)
                )
            })
            .collect()
    }

    pub fn pending(&self) -> Vec<ConflictEntry> {
        self.inner.lock().pending.clone()
    }

    pub fn has_conflicts(&self) -> bool {
        self.inner.lock().has_conflicts
    }

    /// Drop pending conflicts, resolutions and the flag
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.pending.clear();
        inner.resolutions.clear();
        inner.has_conflicts = false;
    }

    /// Drop pending conflicts and the flag, keeping resolutions for the next apply
    pub(crate) fn settle(&self) {
        let mut inner = self.inner.lock();
        inner.pending.clear();
        inner.has_conflicts = false;
    }
}
