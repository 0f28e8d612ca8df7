//! Sync engine
//!
//! One long-lived object owns every collaborator and a single operation lock.
//! Push and pull both take the lock with `try_lock`; a second operation while
//! one is running returns [`SyncOutcome::Busy`] instead of queueing.

mod pull;
mod push;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use super::backup::BackupManager;
use super::conflict::{ConflictDetector, ConflictLedger};
use super::retry::RetryPolicy;
use super::scheduler::ScheduledPush;
use crate::config::SyncConfig;
use crate::credentials::{CredentialStore, FileCredentialStore};
use crate::error::{FailureCategory, Result, SyncError};
use crate::extensions::{ExtensionInventory, ExtensionsDirInventory, StaticInventory};
use crate::packaging::{fingerprint_files, ContentPackager};
use crate::paths::{FileDiscovery, RootedDiscovery, SyncRoots};
use crate::port::{HeadlessPort, InteractionPort, SyncEvent};
use crate::remote::{Credential, RemoteConnector, RemoteStore};
use crate::state::SyncStateStore;
use crate::telemetry::{self, NoopTelemetry, TelemetryEvent, TelemetrySink};
use crate::types::{
    ConflictEntry, ConflictResolution, Fingerprint, SyncDirection, SyncKey, SyncState, Trigger,
};

/// Base URL of the web view of a sync document
const DOCUMENT_WEB_BASE: &str = "https://gist.github.com";

/// Result of a completed push or pull
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub direction: SyncDirection,
    pub file_count: usize,
    pub document_id: String,
    pub is_new_document: bool,
    /// Pull only: extension ids listed remotely but not installed here
    pub missing_extensions: Vec<String>,
}

/// How a push or pull ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncSummary),
    /// Pull found nothing to write
    UpToDate,
    /// Another operation holds the lock
    Busy,
    /// The user declined a prompt
    Cancelled,
    Failed {
        category: FailureCategory,
        message: String,
        rolled_back: bool,
    },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_) | SyncOutcome::UpToDate)
    }
}

/// Result of walking the pending conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    NothingPending,
    Cancelled,
    Resolved { decided: usize, skipped: usize },
}

/// Snapshot for `status` displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub last_sync: Option<DateTime<Utc>>,
    pub last_direction: Option<SyncDirection>,
    pub document_id: Option<String>,
    pub document_url: Option<String>,
    pub synced_files: usize,
    pub pending_conflicts: usize,
    pub has_conflicts: bool,
    pub busy: bool,
}

/// Owns the sync pipelines and their collaborators
pub struct SyncEngine {
    config: SyncConfig,
    state_store: SyncStateStore,
    connector: Arc<dyn RemoteConnector>,
    discovery: Arc<dyn FileDiscovery>,
    inventory: Arc<dyn ExtensionInventory>,
    credentials: Arc<dyn CredentialStore>,
    port: Arc<dyn InteractionPort>,
    telemetry: Arc<dyn TelemetrySink>,
    backups: BackupManager,
    retry: RetryPolicy,
    packager: ContentPackager,
    detector: ConflictDetector,
    ledger: ConflictLedger,
    op_lock: Mutex<()>,
}

impl SyncEngine {
    /// Engine with platform roots, file-backed credentials and a headless port
    pub fn new(config: SyncConfig, connector: Arc<dyn RemoteConnector>) -> Result<Self> {
        let discovery = RootedDiscovery::new(SyncRoots::resolve()?, &config)?;
        let inventory: Arc<dyn ExtensionInventory> = match ExtensionsDirInventory::default_location() {
            Some(inventory) => Arc::new(inventory),
            None => Arc::new(StaticInventory::default()),
        };

        Ok(Self {
            state_store: SyncStateStore::new(config.state_path()),
            credentials: Arc::new(FileCredentialStore::new(config.credential_path())),
            backups: BackupManager::new(config.backups_dir()),
            packager: ContentPackager::new(config.profile_name.clone()),
            connector,
            discovery: Arc::new(discovery),
            inventory,
            port: Arc::new(HeadlessPort),
            telemetry: Arc::new(NoopTelemetry),
            retry: RetryPolicy::default(),
            detector: ConflictDetector::new(),
            ledger: ConflictLedger::new(),
            op_lock: Mutex::new(()),
            config,
        })
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn FileDiscovery>) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_inventory(mut self, inventory: Arc<dyn ExtensionInventory>) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_port(mut self, port: Arc<dyn InteractionPort>) -> Self {
        self.port = port;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_packager(mut self, packager: ContentPackager) -> Self {
        self.packager = packager;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn ledger(&self) -> &ConflictLedger {
        &self.ledger
    }

    /// Whether a push or pull currently holds the operation lock
    pub fn is_busy(&self) -> bool {
        self.op_lock.try_lock().is_err()
    }

    /// Upload the local file set
    pub async fn push(&self, trigger: Trigger) -> SyncOutcome {
        let Ok(_guard) = self.op_lock.try_lock() else {
            tracing::info!("Push skipped: operation in progress");
            self.port.notify(&SyncEvent::Busy);
            return SyncOutcome::Busy;
        };

        tracing::info!("Push started ({})", trigger.as_str());
        self.port.notify(&SyncEvent::Started(SyncDirection::Push));
        let result = self.run_push().await.map(Some);
        self.finish(SyncDirection::Push, trigger, result)
    }

    /// Apply the remote file set locally
    pub async fn pull(&self) -> SyncOutcome {
        let Ok(_guard) = self.op_lock.try_lock() else {
            tracing::info!("Pull skipped: operation in progress");
            self.port.notify(&SyncEvent::Busy);
            return SyncOutcome::Busy;
        };

        tracing::info!("Pull started");
        self.port.notify(&SyncEvent::Started(SyncDirection::Pull));
        let result = self.run_pull().await;
        self.finish(SyncDirection::Pull, Trigger::Manual, result)
    }

    /// Ask the port for a decision on every pending conflict.
    ///
    /// Cancelling leaves earlier decisions untouched. When nothing was
    /// skipped, the pending list is cleared and the conflict flag dropped.
    pub async fn resolve_conflicts(&self) -> ResolveOutcome {
        let pending = self.ledger.pending();
        if pending.is_empty() {
            return ResolveOutcome::NothingPending;
        }

        let mut choices = HashMap::new();
        for entry in &pending {
            match self.port.choose_conflict_resolution(entry).await {
                Some(resolution) => {
                    choices.insert(entry.key.clone(), resolution);
                }
                None => {
                    tracing::info!("Conflict resolution cancelled at {}", entry.key);
                    return ResolveOutcome::Cancelled;
                }
            }
        }

        let decided = choices.len();
        let skipped = choices
            .values()
            .filter(|r| **r == ConflictResolution::Skip)
            .count();
        self.ledger.set_resolutions(choices);
        if skipped == 0 {
            self.ledger.settle();
        }

        tracing::info!("Conflicts resolved: {} decisions ({} skipped)", decided, skipped);
        self.port.notify(&SyncEvent::ConflictsResolved(decided));
        ResolveOutcome::Resolved { decided, skipped }
    }

    /// Re-run detection against the current remote manifest and record the result
    pub async fn refresh_conflicts(&self) -> Result<Vec<ConflictEntry>> {
        let Some(state) = self.state_store.load().await? else {
            self.ledger.clear();
            return Ok(Vec::new());
        };

        let store = self.authenticate().await?;
        let (_, manifest) = self.fetch_document(&store, &state.remote_document_id).await?;
        let local = self.current_local_fingerprints().await?;
        let conflicts = self
            .detector
            .detect(Some(&state), &local, &manifest.fingerprints());
        self.ledger.record(&conflicts);
        Ok(conflicts)
    }

    pub async fn status(&self) -> Result<StatusReport> {
        let state = self.state_store.load().await?;
        let document_id = state
            .as_ref()
            .map(|s| s.remote_document_id.clone())
            .filter(|id| !id.is_empty());

        Ok(StatusReport {
            last_sync: state.as_ref().map(|s| s.last_sync_timestamp),
            last_direction: state.as_ref().map(|s| s.last_sync_direction),
            document_url: document_id
                .as_ref()
                .map(|id| format!("{}/{}", DOCUMENT_WEB_BASE, id)),
            document_id,
            synced_files: state.as_ref().map_or(0, |s| s.local_fingerprints.len()),
            pending_conflicts: self.ledger.pending().len(),
            has_conflicts: self.ledger.has_conflicts(),
            busy: self.is_busy(),
        })
    }

    /// Validate `token` against the remote and store it
    pub async fn login(&self, token: &str) -> Result<()> {
        let credential = Credential::new(token);
        if credential.is_empty() {
            return Err(SyncError::Auth("token cannot be empty".to_string()));
        }
        self.validate(&credential).await?;
        self.credentials.store(&credential).await?;
        tracing::info!("Credential configured");
        Ok(())
    }

    pub async fn logout(&self) -> Result<()> {
        self.credentials.clear().await
    }

    /// Open a remote session with a valid credential.
    ///
    /// A stored credential the remote rejects is replaced by one requested
    /// through the port. Other failures are returned as-is.
    async fn authenticate(&self) -> Result<Arc<dyn RemoteStore>> {
        if let Some(credential) = self.credentials.get().await? {
            match self.validate(&credential).await {
                Ok(store) => return Ok(store),
                Err(SyncError::Auth(message)) => {
                    tracing::warn!("Stored credential is no longer valid: {}", message);
                }
                Err(e) => return Err(e),
            }
        }

        let Some(token) = self.port.request_credential().await else {
            return Err(SyncError::Auth("no credential configured".to_string()));
        };
        let credential = Credential::new(token);
        if credential.is_empty() {
            return Err(SyncError::Auth("token cannot be empty".to_string()));
        }

        let store = self.validate(&credential).await?;
        if let Err(e) = self.credentials.store(&credential).await {
            tracing::warn!("Credential accepted but not saved: {}", e);
        }
        Ok(store)
    }

    async fn validate(&self, credential: &Credential) -> Result<Arc<dyn RemoteStore>> {
        let store = self.connector.connect(credential);
        match self.retry.run(|| store.validate_credential()).await {
            Ok(()) => Ok(store),
            Err(e) if e.category == FailureCategory::AuthFailed => Err(SyncError::Auth(e.message)),
            Err(e) => Err(e.into()),
        }
    }

    async fn current_local_fingerprints(&self) -> Result<BTreeMap<SyncKey, Fingerprint>> {
        let entries = self.discovery.enumerate()?;
        Ok(fingerprint_files(&entries).await)
    }

    /// Record detection results and fail on anything left undecided
    fn check_conflicts(&self, conflicts: &[ConflictEntry]) -> Result<()> {
        self.ledger.record(conflicts);
        let unresolved = self.ledger.unresolved(conflicts);
        if unresolved.is_empty() {
            return Ok(());
        }
        for entry in &unresolved {
            tracing::warn!("Unresolved conflict: {}", entry.key);
        }
        Err(SyncError::Conflict(unresolved.len()))
    }

    /// Map a pipeline result to an outcome and fan it out to port, log and telemetry
    fn finish(
        &self,
        direction: SyncDirection,
        trigger: Trigger,
        result: Result<Option<SyncSummary>>,
    ) -> SyncOutcome {
        match result {
            Ok(Some(summary)) => {
                tracing::info!("{} succeeded: {} files", direction, summary.file_count);
                self.port.notify(&SyncEvent::Completed {
                    direction,
                    file_count: summary.file_count,
                });
                telemetry::emit(
                    &self.telemetry,
                    TelemetryEvent::completed(
                        direction,
                        summary.file_count,
                        trigger,
                        summary.is_new_document,
                    ),
                );
                SyncOutcome::Completed(summary)
            }
            Ok(None) => {
                tracing::info!("{} complete: nothing to update", direction);
                self.port.notify(&SyncEvent::NothingToWrite);
                SyncOutcome::UpToDate
            }
            Err(SyncError::Cancelled) => {
                tracing::info!("{} cancelled by user", direction);
                SyncOutcome::Cancelled
            }
            Err(err) => {
                let category = err.category();
                tracing::error!("{} failed: {} - {}", direction, category, err);

                match &err {
                    SyncError::Conflict(count) => {
                        self.port.notify(&SyncEvent::ConflictsDetected(*count))
                    }
                    _ => self.port.notify(&SyncEvent::Failed {
                        direction,
                        category,
                        message: err.to_string(),
                    }),
                }
                telemetry::emit(
                    &self.telemetry,
                    TelemetryEvent::failed(direction, category, trigger, err.status_code()),
                );

                SyncOutcome::Failed {
                    category,
                    message: err.to_string(),
                    rolled_back: matches!(err, SyncError::RolledBack { .. }),
                }
            }
        }
    }
}

#[async_trait]
impl ScheduledPush for SyncEngine {
    fn is_busy(&self) -> bool {
        SyncEngine::is_busy(self)
    }

    async fn push_scheduled(&self) -> SyncOutcome {
        self.push(Trigger::Scheduled).await
    }
}
