//! Conflict detection against the base snapshot

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{ConflictEntry, Fingerprint, SyncKey, SyncState};

/// Three-way fingerprint comparison against the persisted base snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn new() -> Self {
        Self
    }

    /// Keys changed on both sides since the base, to different values.
    ///
    /// A key only participates when the base recorded it on both sides, so a
    /// first sync never conflicts. A missing current fingerprint counts as a
    /// change (deletion and modification look the same here).
    pub fn detect(
        &self,
        state: Option<&SyncState>,
        local: &BTreeMap<SyncKey, Fingerprint>,
        remote: &BTreeMap<SyncKey, Fingerprint>,
    ) -> Vec<ConflictEntry> {
        let Some(state) = state else {
            return Vec::new();
        };

        let keys: BTreeSet<&SyncKey> = local.keys().chain(remote.keys()).collect();
        let mut conflicts = Vec::new();

        for key in keys {
            let (Some(base_local), Some(base_remote)) = (
                state.local_fingerprints.get(key),
                state.remote_fingerprints.get(key),
            ) else {
                continue;
            };

            let current_local = local.get(key);
            let current_remote = remote.get(key);

            let local_changed = current_local != Some(base_local);
            let remote_changed = current_remote != Some(base_remote);

            if local_changed && remote_changed && current_local != current_remote {
                conflicts.push(ConflictEntry {
                    key: key.clone(),
                    local_fingerprint: current_local.cloned(),
                    remote_fingerprint: current_remote.cloned(),
                    base_fingerprint: base_local.clone(),
                });
            }
        }

        if !conflicts.is_empty() {
            tracing::info!("Detected {} conflict(s)", conflicts.len());
        }
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packaging::fingerprint;
    use crate::types::SyncDirection;
    use chrono::Utc;

    const KEY: &str = "cursor-user/settings.json";

    fn state_with(key: &str, base: &str) -> SyncState {
        let mut prints = BTreeMap::new();
        prints.insert(key.to_string(), base.to_string());
        SyncState {
            last_sync_timestamp: Utc::now(),
            last_sync_direction: SyncDirection::Push,
            remote_document_id: "doc".into(),
            local_fingerprints: prints.clone(),
            remote_fingerprints: prints,
        }
    }

    fn one(key: &str, value: &str) -> BTreeMap<SyncKey, Fingerprint> {
        let mut map = BTreeMap::new();
        map.insert(key.to_string(), value.to_string());
        map
    }

    #[test]
    fn test_no_state_means_no_conflicts() {
        let detector = ConflictDetector::new();
        let conflicts = detector.detect(None, &one(KEY, "a"), &one(KEY, "b"));
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_both_sides_changed() {
        let base = fingerprint(b"original");
        let local = fingerprint(b"local-changed");
        let remote = fingerprint(b"remote-changed");
        let state = state_with(KEY, &base);

        let conflicts = ConflictDetector::new().detect(Some(&state), &one(KEY, &local), &one(KEY, &remote));

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].key, KEY);
        assert_eq!(conflicts[0].local_fingerprint.as_deref(), Some(local.as_str()));
        assert_eq!(conflicts[0].remote_fingerprint.as_deref(), Some(remote.as_str()));
        assert_eq!(conflicts[0].base_fingerprint, base);
    }

    #[test]
    fn test_one_sided_changes_do_not_conflict() {
        let base = fingerprint(b"original");
        let changed = fingerprint(b"changed");
        let state = state_with(KEY, &base);
        let detector = ConflictDetector::new();

        assert!(detector
            .detect(Some(&state), &one(KEY, &changed), &one(KEY, &base))
            .is_empty());
        assert!(detector
            .detect(Some(&state), &one(KEY, &base), &one(KEY, &changed))
            .is_empty());
    }

    #[test]
    fn test_convergent_change_does_not_conflict() {
        let state = state_with(KEY, "base");
        let conflicts = ConflictDetector::new().detect(Some(&state), &one(KEY, "same"), &one(KEY, "same"));
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_deletion_counts_as_change() {
        let state = state_with(KEY, "base");
        let conflicts = ConflictDetector::new().detect(Some(&state), &BTreeMap::new(), &one(KEY, "edited"));

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].local_fingerprint, None);
        assert_eq!(conflicts[0].remote_fingerprint.as_deref(), Some("edited"));
    }

    #[test]
    fn test_untracked_keys_are_ignored() {
        let state = state_with(KEY, "base");
        let other = "dot-cursor/rules/new.mdc";
        let conflicts = ConflictDetector::new().detect(Some(&state), &one(other, "x"), &one(other, "y"));
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_key_tracked_on_one_side_only_is_ignored() {
        let mut state = state_with(KEY, "base");
        state.remote_fingerprints.clear();
        let conflicts = ConflictDetector::new().detect(Some(&state), &one(KEY, "x"), &one(KEY, "y"));
        assert!(conflicts.is_empty());
    }
}
