//! Cursor Sync - editor settings synchronization
//!
//! Keeps editor configuration files (settings, keybindings, snippets, rules,
//! commands and skills) in step across machines through a private remote
//! document, with conflict detection and rollback-safe pulls.

pub mod config;
pub mod credentials;
pub mod error;
pub mod extensions;
pub mod packaging;
pub mod paths;
pub mod port;
pub mod remote;
pub mod state;
pub mod sync;
pub mod telemetry;
pub mod types;

pub use config::SyncConfig;
pub use error::{FailureCategory, RemoteError, Result, SyncError};
pub use sync::{SyncEngine, SyncOutcome};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
