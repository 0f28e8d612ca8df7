//! Sync pipelines
//!
//! Push and pull between the local sync roots and the remote document,
//! with conflict detection against the base snapshot, categorized retry,
//! pre-write backups and a timed background push.

pub mod backup;
pub mod conflict;
mod engine;
pub mod retry;
pub mod scheduler;

pub use backup::{BackupEntry, BackupManager, BackupSet, MAX_BACKUP_GENERATIONS};
pub use conflict::{ConflictDetector, ConflictLedger};
pub use engine::{ResolveOutcome, StatusReport, SyncEngine, SyncOutcome, SyncSummary};
pub use retry::RetryPolicy;
pub use scheduler::{ScheduledPush, Scheduler};
