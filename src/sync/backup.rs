//! Pre-write backups for pull rollback
//!
//! Each pull that writes files first copies the current versions into a
//! timestamp-named generation directory. Only the newest generations are kept.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{Result, SyncError};

/// Generations kept after pruning
pub const MAX_BACKUP_GENERATIONS: usize = 3;

/// One backed-up file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub original: PathBuf,
    pub backup: PathBuf,
}

/// A single backup generation
#[derive(Debug, Clone)]
pub struct BackupSet {
    pub generation_dir: PathBuf,
    pub entries: Vec<BackupEntry>,
}

impl BackupSet {
    /// Backup of `original`, if it existed when the snapshot was taken
    pub fn entry_for(&self, original: &Path) -> Option<&BackupEntry> {
        self.entries.iter().find(|e| e.original == original)
    }
}

/// Manages backup generations under one root directory
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
    retain: usize,
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retain: MAX_BACKUP_GENERATIONS,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy every existing path into a fresh generation. Missing paths are skipped.
    pub async fn snapshot(&self, paths: &[PathBuf]) -> Result<BackupSet> {
        let generation_dir = self.new_generation_dir().await?;
        let mut entries = Vec::new();

        for original in paths {
            match tokio::fs::metadata(original).await {
                Ok(meta) if meta.is_file() => {}
                _ => continue,
            }

            let backup = generation_dir.join(escape_path(original));
            tokio::fs::copy(original, &backup)
                .await
                .map_err(|e| SyncError::fs(original, e))?;
            entries.push(BackupEntry {
                original: original.clone(),
                backup,
            });
        }

        tracing::debug!(
            "Backed up {} of {} file(s) to {}",
            entries.len(),
            paths.len(),
            generation_dir.display()
        );

        Ok(BackupSet {
            generation_dir,
            entries,
        })
    }

    /// Copy backups over their originals. Failures are logged and skipped;
    /// returns how many files were restored.
    pub async fn restore(&self, entries: &[BackupEntry]) -> usize {
        let mut restored = 0;
        for entry in entries {
            match tokio::fs::copy(&entry.backup, &entry.original).await {
                Ok(_) => restored += 1,
                Err(e) => tracing::error!(
                    "Rollback failed for {}: {}",
                    entry.original.display(),
                    e
                ),
            }
        }
        restored
    }

    /// Delete all but the newest generations (lexicographic by name).
    /// Returns how many generations were removed.
    pub async fn prune(&self) -> Result<usize> {
        let mut names = match self.generations().await {
            Ok(names) => names,
            Err(SyncError::FileSystem { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                return Ok(0)
            }
            Err(e) => return Err(e),
        };

        if names.len() <= self.retain {
            return Ok(0);
        }

        names.sort();
        let excess = names.len() - self.retain;
        let mut removed = 0;
        for name in names.into_iter().take(excess) {
            let dir = self.root.join(&name);
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to prune backup {}: {}", dir.display(), e),
            }
        }
        Ok(removed)
    }

    /// Generation directory names, unsorted
    pub async fn generations(&self) -> Result<Vec<String>> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| SyncError::fs(&self.root, e))?;

        let mut names = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| SyncError::fs(&self.root, e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    async fn new_generation_dir(&self) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| SyncError::fs(&self.root, e))?;

        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string();
        let mut candidate = self.root.join(&stamp);
        let mut suffix = 1;
        loop {
            match tokio::fs::create_dir(&candidate).await {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    candidate = self.root.join(format!("{}-{}", stamp, suffix));
                    suffix += 1;
                }
                Err(e) => return Err(SyncError::fs(&candidate, e)),
            }
        }
    }
}

/// Flatten an absolute path into one file name
fn escape_path(path: &Path) -> String {
    let mut escaped = String::new();
    for c in path.to_string_lossy().chars() {
        match c {
            '/' | '\\' | ':' => escaped.push_str("--"),
            c => escaped.push(c),
        }
    }
    escaped
}
