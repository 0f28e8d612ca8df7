//! Pull pipeline: remote document → local files
//!
//! Writes are all-or-nothing. Every target is backed up first, files are
//! written one at a time through a temp file and rename, and the first
//! failure restores what was already written before the error is returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use super::{SyncEngine, SyncSummary};
use crate::error::{Result, SyncError};
use crate::extensions::{find_missing, parse_extensions_json};
use crate::packaging::{decode_content, fingerprint};
use crate::paths::{key_to_remote_name, remote_name_to_key, EXTENSIONS_KEY};
use crate::port::SyncEvent;
use crate::remote::RemoteStore;
use crate::sync::backup::BackupEntry;
use crate::types::{
    ConflictResolution, Manifest, RemoteDocument, SyncDirection, SyncState, WriteCandidate,
    DOCUMENT_DESCRIPTION, MANIFEST_FILE_NAME,
};

impl SyncEngine {
    /// `Ok(None)` when there was nothing to write
    pub(super) async fn run_pull(&self) -> Result<Option<SyncSummary>> {
        let store = self.authenticate().await?;
        let state = self.state_store.load().await?;

        let persisted_id = state
            .as_ref()
            .map(|s| s.remote_document_id.clone())
            .filter(|id| !id.is_empty());
        let document_id = match persisted_id {
            Some(id) => id,
            None => self
                .retry
                .find_by_description(store.as_ref(), DOCUMENT_DESCRIPTION)
                .await?
                .ok_or_else(|| {
                    SyncError::NotConfigured("no sync document found; push first".to_string())
                })?,
        };

        let (document, manifest) = self.fetch_document(&store, &document_id).await?;
        let remote_fingerprints = manifest.fingerprints();

        let local = self.current_local_fingerprints().await?;
        let conflicts = self
            .detector
            .detect(state.as_ref(), &local, &remote_fingerprints);
        self.check_conflicts(&conflicts)?;

        let mut candidates = self.write_candidates(&document, &manifest, !conflicts.is_empty());

        if self.config.safe_mode && !candidates.is_empty() {
            let Some(selected) = self.port.choose_write_subset(&candidates).await else {
                return Err(SyncError::Cancelled);
            };
            candidates.retain(|c| selected.contains(&c.key));
        }

        if candidates.is_empty() {
            return Ok(None);
        }

        self.apply_writes(&candidates).await?;

        if let Err(e) = self.backups.prune().await {
            tracing::warn!("Backup pruning failed: {}", e);
        }

        let mut local_fingerprints = state
            .map(|s| s.local_fingerprints)
            .unwrap_or_default();
        for candidate in &candidates {
            local_fingerprints.insert(candidate.key.clone(), candidate.fingerprint.clone());
        }

        self.state_store
            .save(&SyncState {
                last_sync_timestamp: Utc::now(),
                last_sync_direction: SyncDirection::Pull,
                remote_document_id: document_id.clone(),
                local_fingerprints,
                remote_fingerprints,
            })
            .await?;
        self.ledger.clear();

        let missing_extensions = self.missing_extensions(&document);
        if !missing_extensions.is_empty() {
            self.port
                .notify(&SyncEvent::MissingExtensions(missing_extensions.clone()));
        }

        Ok(Some(SyncSummary {
            direction: SyncDirection::Pull,
            file_count: candidates.len(),
            document_id,
            is_new_document: false,
            missing_extensions,
        }))
    }

    /// Fetch a document and parse its embedded manifest
    pub(super) async fn fetch_document(
        &self,
        store: &Arc<dyn RemoteStore>,
        id: &str,
    ) -> Result<(RemoteDocument, Manifest)> {
        let document = self.retry.run(|| store.get(id)).await?;

        let raw = document
            .files
            .get(MANIFEST_FILE_NAME)
            .ok_or_else(|| SyncError::Manifest(format!("{} not found in document", MANIFEST_FILE_NAME)))?;
        let manifest: Manifest = serde_json::from_str(&raw.content)
            .map_err(|e| SyncError::Manifest(format!("invalid {}: {}", MANIFEST_FILE_NAME, e)))?;

        Ok((document, manifest))
    }

    /// Remote files that map to a local target and decode to the manifest fingerprint
    fn write_candidates(
        &self,
        document: &RemoteDocument,
        manifest: &Manifest,
        had_conflicts: bool,
    ) -> Vec<WriteCandidate> {
        let mut candidates = Vec::new();

        for (name, file) in &document.files {
            if name == MANIFEST_FILE_NAME {
                continue;
            }

            let key = remote_name_to_key(name);
            let Some(entry) = manifest.files.get(&key) else {
                tracing::debug!("Skipping {}: not in manifest", name);
                continue;
            };

            if had_conflicts && self.ledger.resolution_for(&key) == Some(ConflictResolution::KeepLocal) {
                tracing::debug!("Keeping local {}", key);
                continue;
            }

            let Some(target) = self.discovery.resolve_key(&key) else {
                tracing::debug!("Skipping {}: no local location", key);
                continue;
            };

            let content = match decode_content(&file.content, entry.encoding) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", key, e);
                    continue;
                }
            };

            let actual = fingerprint(&content);
            if actual != entry.fingerprint {
                tracing::warn!(
                    "Skipping {}: content does not match manifest fingerprint{}",
                    key,
                    if file.truncated { " (truncated)" } else { "" }
                );
                continue;
            }

            candidates.push(WriteCandidate {
                key,
                target,
                content,
                fingerprint: actual,
            });
        }

        candidates
    }

    /// Back up, then write every candidate; roll back on the first failure
    async fn apply_writes(&self, candidates: &[WriteCandidate]) -> Result<()> {
        let targets: Vec<PathBuf> = candidates.iter().map(|c| c.target.clone()).collect();
        let backup = self.backups.snapshot(&targets).await?;

        let mut written: Vec<BackupEntry> = Vec::new();
        let mut created: Vec<PathBuf> = Vec::new();

        for candidate in candidates {
            if let Err(source) = write_atomic(&candidate.target, &candidate.content).await {
                tracing::error!(
                    "Write failed for {}: {}; rolling back {} file(s)",
                    candidate.target.display(),
                    source,
                    written.len() + created.len()
                );

                self.backups.restore(&written).await;
                for path in &created {
                    if let Err(e) = tokio::fs::remove_file(path).await {
                        tracing::error!("Rollback failed for {}: {}", path.display(), e);
                    }
                }

                return Err(SyncError::RolledBack {
                    path: candidate.target.clone(),
                    source,
                });
            }

            match backup.entry_for(&candidate.target) {
                Some(entry) => written.push(entry.clone()),
                None => created.push(candidate.target.clone()),
            }
        }

        Ok(())
    }

    /// Extension ids in the remote listing that are not installed locally
    fn missing_extensions(&self, document: &RemoteDocument) -> Vec<String> {
        let Some(file) = document.files.get(&key_to_remote_name(EXTENSIONS_KEY)) else {
            return Vec::new();
        };

        let remote = match parse_extensions_json(&file.content) {
            Ok(remote) => remote,
            Err(e) => {
                tracing::debug!("Ignoring unreadable remote extensions listing: {}", e);
                return Vec::new();
            }
        };
        let installed = match self.inventory.installed() {
            Ok(installed) => installed,
            Err(e) => {
                tracing::warn!("Could not list installed extensions: {}", e);
                return Vec::new();
            }
        };

        find_missing(&remote, &installed)
            .into_iter()
            .map(|e| e.id)
            .collect()
    }
}

/// Write via `<name>.tmp` and rename into place
async fn write_atomic(target: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp_name = target.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = target.with_file_name(tmp_name);

    let result = match tokio::fs::write(&tmp, content).await {
        Ok(()) => tokio::fs::rename(&tmp, target).await,
        Err(e) => Err(e),
    };
    if result.is_err() {
        // a failed write can leave a partial temp file behind
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}
