//! Property-based tests for cursor-sync
//!
//! These tests verify invariants that must hold for all inputs:
//! - Fingerprints depend only on raw bytes
//! - Packaging round-trips exactly
//! - Conflict detection follows the three-way rule
//! - Key escaping is reversible for keys without `--`
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

// ============================================================================
// PACKAGING TESTS
// ============================================================================

mod packaging_tests {
    use super::*;
    use cursor_sync::packaging::{decode_content, fingerprint, package_bytes};

    proptest! {
        /// Invariant: the fingerprint is stable and ignores the text/binary classification
        #[test]
        fn fingerprint_is_raw_bytes_only(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
            let packed = package_bytes(&bytes);
            prop_assert_eq!(&packed.fingerprint, &fingerprint(&bytes));
            prop_assert_eq!(fingerprint(&bytes), fingerprint(&bytes));
        }

        /// Invariant: decoding packaged content reproduces the original bytes
        #[test]
        fn binary_round_trip(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
            let packed = package_bytes(&bytes);
            let decoded = decode_content(&packed.content, packed.encoding).unwrap();
            prop_assert_eq!(decoded, bytes);
        }

        /// Invariant: valid UTF-8 always travels as plain text
        #[test]
        fn text_stays_plain(s in "\\PC{0,200}") {
            let packed = package_bytes(s.as_bytes());
            prop_assert!(packed.encoding.is_none());
            prop_assert_eq!(packed.content, s.clone());
            prop_assert_eq!(packed.size_bytes, s.len() as u64);
        }
    }
}

// ============================================================================
// CONFLICT DETECTION TESTS
// ============================================================================

mod conflict_tests {
    use super::*;
    use chrono::Utc;
    use cursor_sync::sync::ConflictDetector;
    use cursor_sync::types::{SyncDirection, SyncState};
    use std::collections::BTreeMap;

    const KEY: &str = "cursor-user/settings.json";

    fn map(value: Option<&str>) -> BTreeMap<String, String> {
        value
            .map(|v| BTreeMap::from([(KEY.to_string(), v.to_string())]))
            .unwrap_or_default()
    }

    fn state(base: &str) -> SyncState {
        SyncState {
            last_sync_timestamp: Utc::now(),
            last_sync_direction: SyncDirection::Push,
            remote_document_id: "doc".into(),
            local_fingerprints: map(Some(base)),
            remote_fingerprints: map(Some(base)),
        }
    }

    fn fingerprint_value() -> impl Strategy<Value = Option<String>> {
        prop::option::of(prop_oneof![Just("a"), Just("b"), Just("c")].prop_map(String::from))
    }

    proptest! {
        /// Invariant: without a base snapshot nothing conflicts
        #[test]
        fn no_state_no_conflicts(local in fingerprint_value(), remote in fingerprint_value()) {
            let conflicts = ConflictDetector::new().detect(None, &map(local.as_deref()), &map(remote.as_deref()));
            prop_assert!(conflicts.is_empty());
        }

        /// Invariant: conflict iff L != B and R != B and L != R
        #[test]
        fn three_way_rule(
            base in prop_oneof![Just("a"), Just("b")],
            local in fingerprint_value(),
            remote in fingerprint_value(),
        ) {
            let state = state(base);
            let conflicts = ConflictDetector::new().detect(
                Some(&state),
                &map(local.as_deref()),
                &map(remote.as_deref()),
            );

            let local_changed = local.as_deref() != Some(base);
            let remote_changed = remote.as_deref() != Some(base);
            let tracked = local.is_some() || remote.is_some();
            let expected = tracked && local_changed && remote_changed && local != remote;

            prop_assert_eq!(conflicts.len(), usize::from(expected));
        }
    }
}

// ============================================================================
// KEY ESCAPING TESTS
// ============================================================================

mod escaping_tests {
    use super::*;
    use cursor_sync::paths::{key_to_remote_name, remote_name_to_key};

    proptest! {
        /// Invariant: keys without a dash survive the round trip
        #[test]
        fn round_trip(segments in prop::collection::vec("[a-zA-Z0-9_.]{1,12}", 1..6)) {
            let key = segments.join("/");
            let name = key_to_remote_name(&key);
            prop_assert!(!name.contains('/'));
            prop_assert_eq!(remote_name_to_key(&name), key);
        }
    }
}
