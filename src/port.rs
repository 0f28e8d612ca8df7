//! User interaction port
//!
//! Every prompt the sync pipelines need goes through [`InteractionPort`], so
//! the engine runs unchanged in a terminal, a daemon, or a test.

use std::fmt;

use async_trait::async_trait;

use crate::error::FailureCategory;
use crate::types::{ConflictEntry, ConflictResolution, SyncDirection, SyncKey, WriteCandidate};

/// Status notification for the user-facing side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Started(SyncDirection),
    Completed {
        direction: SyncDirection,
        file_count: usize,
    },
    NothingToWrite,
    Busy,
    ConflictsDetected(usize),
    ConflictsResolved(usize),
    MissingExtensions(Vec<String>),
    Failed {
        direction: SyncDirection,
        category: FailureCategory,
        message: String,
    },
}

impl SyncEvent {
    pub fn is_failure(&self) -> bool {
        matches!(self, SyncEvent::Failed { .. } | SyncEvent::ConflictsDetected(_))
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::Started(direction) => write!(f, "{} started", direction),
            SyncEvent::Completed {
                direction: SyncDirection::Push,
                file_count,
            } => write!(f, "Push complete: {} file(s) synced.", file_count),
            SyncEvent::Completed {
                direction: SyncDirection::Pull,
                file_count,
            } => write!(f, "Pull complete: {} file(s) updated.", file_count),
            SyncEvent::NothingToWrite => f.write_str("Pull complete: no files to update."),
            SyncEvent::Busy => f.write_str("A sync operation is already in progress."),
            SyncEvent::ConflictsDetected(n) => {
                write!(f, "{} conflict(s) detected. Resolve them before syncing.", n)
            }
            SyncEvent::ConflictsResolved(n) => {
                write!(f, "Resolved {} conflict(s). You can now push or pull.", n)
            }
            SyncEvent::MissingExtensions(ids) => write!(
                f,
                "Extensions present remotely but not installed locally: {}",
                ids.join(", ")
            ),
            SyncEvent::Failed {
                direction,
                category,
                message,
            } => write!(f, "{} failed ({}): {}", direction, category, message),
        }
    }
}

/// Prompts and notifications consumed by the engine
#[async_trait]
pub trait InteractionPort: Send + Sync {
    /// Ask for a new access token. `None` means the user declined.
    async fn request_credential(&self) -> Option<String>;

    /// Pick a resolution for one conflict. `None` cancels the whole walk.
    async fn choose_conflict_resolution(&self, entry: &ConflictEntry) -> Option<ConflictResolution>;

    /// Narrow the pull write list. `None` cancels the pull.
    async fn choose_write_subset(&self, candidates: &[WriteCandidate]) -> Option<Vec<SyncKey>>;

    fn notify(&self, event: &SyncEvent);
}

/// Non-interactive port: no credential, no resolutions, writes everything
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessPort;

#[async_trait]
impl InteractionPort for HeadlessPort {
    async fn request_credential(&self) -> Option<String> {
        None
    }

    async fn choose_conflict_resolution(&self, _entry: &ConflictEntry) -> Option<ConflictResolution> {
        None
    }

    async fn choose_write_subset(&self, candidates: &[WriteCandidate]) -> Option<Vec<SyncKey>> {
        Some(candidates.iter().map(|c| c.key.clone()).collect())
    }

    fn notify(&self, event: &SyncEvent) {
        if event.is_failure() {
            tracing::warn!("{}", event);
        } else {
            tracing::info!("{}", event);
        }
    }
}
