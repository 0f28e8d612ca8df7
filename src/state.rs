//! Persisted base snapshot

use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::types::SyncState;

/// Reads and fully replaces the single sync-state JSON file
#[derive(Debug, Clone)]
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. A missing or unreadable document counts as "never synced".
    pub async fn load(&self) -> Result<Option<SyncState>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::fs(&self.path, e)),
        };

        match serde_json::from_str(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!(
                    "Ignoring unparsable sync state at {}: {}",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Replace the snapshot atomically (temp file + rename)
    pub async fn save(&self, state: &SyncState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::fs(parent, e))?;
        }

        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| SyncError::fs(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SyncError::fs(&self.path, e))?;

        tracing::debug!(
            "Saved sync state ({} local, {} remote fingerprints)",
            state.local_fingerprints.len(),
            state.remote_fingerprints.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SyncDirection;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn sample() -> SyncState {
        let mut prints = BTreeMap::new();
        prints.insert("cursor-user/settings.json".to_string(), "aa".to_string());
        SyncState {
            last_sync_timestamp: Utc::now(),
            last_sync_direction: SyncDirection::Pull,
            remote_document_id: "doc".into(),
            local_fingerprints: prints.clone(),
            remote_fingerprints: prints,
        }
    }

    #[tokio::test]
    async fn test_missing_state_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStateStore::new(dir.path().join("sync-state.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_entirely() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStateStore::new(dir.path().join("nested/sync-state.json"));

        let first = sample();
        store.save(&first).await.unwrap();

        let mut second = sample();
        second.local_fingerprints.clear();
        second.remote_document_id = "other".into();
        store.save(&second).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, second);
        assert!(!dir.path().join("nested/sync-state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync-state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(SyncStateStore::new(path).load().await.unwrap().is_none());
    }
}
