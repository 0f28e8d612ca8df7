//! Error types for cursor-sync

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Coarse failure classes reported to the user and to telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCategory {
    AuthFailed,
    RateLimited,
    NetworkError,
    Conflict,
    FileSystemError,
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::AuthFailed => "AUTH_FAILED",
            FailureCategory::RateLimited => "RATE_LIMITED",
            FailureCategory::NetworkError => "NETWORK_ERROR",
            FailureCategory::Conflict => "CONFLICT",
            FailureCategory::FileSystemError => "FILE_SYSTEM_ERROR",
            FailureCategory::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status codes that describe an invalid request rather than a transient fault
pub const NON_RETRYABLE_STATUS: [u16; 4] = [401, 403, 404, 422];

/// Retry-After value assumed when a 429 response carries none
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Typed failure of a single remote store call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{category}: {message}")]
pub struct RemoteError {
    pub category: FailureCategory,
    pub message: String,
    pub status_code: Option<u16>,
    /// Server-provided wait hint in seconds
    pub retry_after: Option<u64>,
}

impl RemoteError {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            status_code: None,
            retry_after: None,
        }
    }

    /// Transport-level failure (connection refused, DNS, TLS, ...)
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::NetworkError, message)
    }

    /// Map a non-2xx HTTP status to a categorized error.
    ///
    /// `retry_after` is the raw `Retry-After` header, `body_message` the
    /// best-effort `message` field parsed from the error body.
    pub fn from_status(status: u16, retry_after: Option<&str>, body_message: Option<String>) -> Self {
        let (category, message, retry_after) = match status {
            429 => (
                FailureCategory::RateLimited,
                "GitHub API rate limit exceeded".to_string(),
                Some(
                    retry_after
                        .and_then(|v| v.trim().parse::<u64>().ok())
                        .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
                ),
            ),
            401 | 403 => (
                FailureCategory::AuthFailed,
                format!("Authentication failed ({})", status),
                None,
            ),
            s if s >= 500 => (
                FailureCategory::NetworkError,
                format!("Server error ({})", status),
                None,
            ),
            _ => (
                FailureCategory::Unknown,
                body_message.unwrap_or_else(|| format!("GitHub API error ({})", status)),
                None,
            ),
        };

        Self {
            category,
            message,
            status_code: Some(status),
            retry_after,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self.status_code, Some(code) if NON_RETRYABLE_STATUS.contains(&code))
    }
}

/// Main error type for cursor-sync
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("{0} unresolved conflict(s); resolve them before syncing")]
    Conflict(usize),

    #[error("File write failed for {path}: {source}; changes were rolled back")]
    RolledBack {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Filesystem error at {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid manifest: {0}")]
    Manifest(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("HTTP request error: {0}")]
    #[cfg(feature = "gist")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<toml::de::Error> for SyncError {
    fn from(e: toml::de::Error) -> Self {
        SyncError::Config(e.to_string())
    }
}

impl SyncError {
    /// Attach the offending path to an IO error
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Category reported to the user and to telemetry
    pub fn category(&self) -> FailureCategory {
        match self {
            SyncError::Remote(e) => e.category,
            SyncError::Auth(_) => FailureCategory::AuthFailed,
            SyncError::Conflict(_) => FailureCategory::Conflict,
            SyncError::RolledBack { .. } | SyncError::FileSystem { .. } | SyncError::Io(_) => {
                FailureCategory::FileSystemError
            }
            #[cfg(feature = "gist")]
            SyncError::Http(_) => FailureCategory::NetworkError,
            _ => FailureCategory::Unknown,
        }
    }

    /// HTTP status of the underlying remote failure, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SyncError::Remote(e) => e.status_code,
            _ => None,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_retryable(),
            #[cfg(feature = "gist")]
            SyncError::Http(_) => true,
            _ => false,
        }
    }
}
