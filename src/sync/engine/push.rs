//! Push pipeline: local files → remote document

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use super::{SyncEngine, SyncSummary};
use crate::error::{Result, SyncError};
use crate::extensions::generate_extensions_json;
use crate::paths::{key_to_remote_name, EXTENSIONS_KEY};
use crate::remote::{FileUpdates, RemoteStore};
use crate::types::{
    RemoteDocument, SyncDirection, SyncState, DOCUMENT_DESCRIPTION, MANIFEST_FILE_NAME,
};

impl SyncEngine {
    pub(super) async fn run_push(&self) -> Result<SyncSummary> {
        let store = self.authenticate().await?;
        let state = self.state_store.load().await?;

        // Checked against the remote fingerprints recorded at the last sync,
        // not a fresh fetch.
        if let Some(state) = &state {
            let local = self.current_local_fingerprints().await?;
            let conflicts = self
                .detector
                .detect(Some(state), &local, &state.remote_fingerprints);
            self.check_conflicts(&conflicts)?;
        }

        self.write_extensions_listing().await?;

        let entries = self.discovery.enumerate()?;
        let package = self.packager.package(&entries).await?;

        let mut files = BTreeMap::new();
        files.insert(
            MANIFEST_FILE_NAME.to_string(),
            serde_json::to_string_pretty(&package.manifest)?,
        );
        for (key, file) in &package.files {
            files.insert(key_to_remote_name(key), file.content.clone());
        }

        let persisted_id = state
            .as_ref()
            .map(|s| s.remote_document_id.clone())
            .filter(|id| !id.is_empty());

        let (document_id, is_new_document) = match self.push_target(&store, persisted_id).await? {
            Some(existing) => {
                let updates = build_updates(&files, &existing);
                let deletions = updates.values().filter(|v| v.is_none()).count();
                tracing::debug!(
                    "Updating document with {} file(s), deleting {}",
                    files.len(),
                    deletions
                );
                let id = existing.id;
                self.retry.run(|| store.update(&id, &updates)).await?;
                (id, false)
            }
            None => {
                let created = self
                    .retry
                    .run(|| store.create(&files, DOCUMENT_DESCRIPTION))
                    .await?;
                tracing::info!("Created sync document");
                (created.id, true)
            }
        };

        let fingerprints = package.fingerprints();
        self.state_store
            .save(&SyncState {
                last_sync_timestamp: Utc::now(),
                last_sync_direction: SyncDirection::Push,
                remote_document_id: document_id.clone(),
                local_fingerprints: fingerprints.clone(),
                remote_fingerprints: fingerprints,
            })
            .await?;
        self.ledger.clear();

        Ok(SyncSummary {
            direction: SyncDirection::Push,
            file_count: package.files.len(),
            document_id,
            is_new_document,
            missing_extensions: Vec::new(),
        })
    }

    /// Existing document to update, or `None` to create one.
    ///
    /// A persisted id the remote no longer knows falls back to the
    /// description search.
    async fn push_target(
        &self,
        store: &Arc<dyn RemoteStore>,
        persisted_id: Option<String>,
    ) -> Result<Option<RemoteDocument>> {
        if let Some(id) = persisted_id {
            match self.retry.run(|| store.get(&id)).await {
                Ok(document) => return Ok(Some(document)),
                Err(e) if e.status_code == Some(404) => {
                    tracing::warn!("Sync document {} no longer exists; searching again", id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let found = self
            .retry
            .find_by_description(store.as_ref(), DOCUMENT_DESCRIPTION)
            .await?;
        match found {
            Some(id) => Ok(Some(self.retry.run(|| store.get(&id)).await?)),
            None => Ok(None),
        }
    }

    /// Regenerate `extensions.json` under the editor's user directory
    async fn write_extensions_listing(&self) -> Result<()> {
        let Some(path) = self.discovery.resolve_key(EXTENSIONS_KEY) else {
            tracing::debug!("No location for {}; skipping", EXTENSIONS_KEY);
            return Ok(());
        };

        let installed = match self.inventory.installed() {
            Ok(installed) => installed,
            Err(e) => {
                tracing::warn!("Could not list installed extensions: {}", e);
                return Ok(());
            }
        };
        let json = generate_extensions_json(&installed)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::fs(parent, e))?;
        }
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| SyncError::fs(&path, e))?;
        Ok(())
    }
}

/// Full update payload: every packaged file, plus a deletion for each remote
/// file that is no longer part of the set (the manifest is always rewritten)
fn build_updates(files: &BTreeMap<String, String>, existing: &RemoteDocument) -> FileUpdates {
    let mut updates: FileUpdates = files
        .iter()
        .map(|(name, content)| (name.clone(), Some(content.clone())))
        .collect();

    for name in existing.files.keys() {
        if name != MANIFEST_FILE_NAME && !files.contains_key(name) {
            updates.insert(name.clone(), None);
        }
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RemoteFile;

    #[test]
    fn test_build_updates_marks_stale_files() {
        let mut files = BTreeMap::new();
        files.insert(MANIFEST_FILE_NAME.to_string(), "{}".to_string());
        files.insert("cursor-user--settings.json".to_string(), "{}".to_string());

        let existing = RemoteDocument {
            id: "doc".into(),
            description: DOCUMENT_DESCRIPTION.into(),
            files: [
                (MANIFEST_FILE_NAME, "old"),
                ("cursor-user--settings.json", "old"),
                ("dot-cursor--rules--gone.mdc", "old"),
            ]
            .into_iter()
            .map(|(n, c)| (n.to_string(), RemoteFile::new(c)))
            .collect(),
            html_url: None,
        };

        let updates = build_updates(&files, &existing);
        assert_eq!(updates.len(), 3);
        assert_eq!(updates["dot-cursor--rules--gone.mdc"], None);
        assert_eq!(updates[MANIFEST_FILE_NAME].as_deref(), Some("{}"));
    }
}
