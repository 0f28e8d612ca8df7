//! Installed-extensions listing
//!
//! Push publishes the local extension set as `extensions.json`; pull compares
//! the remote listing against what is installed and reports the difference.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Result, SyncError};

/// Built-in extensions are never listed
const BUILTIN_PREFIX: &str = "vscode.";

/// One installed extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionEntry {
    pub id: String,
    pub version: String,
}

impl ExtensionEntry {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }

    fn is_builtin(&self) -> bool {
        self.id.starts_with(BUILTIN_PREFIX)
    }
}

/// Source of the locally installed extension set
pub trait ExtensionInventory: Send + Sync {
    fn installed(&self) -> Result<Vec<ExtensionEntry>>;
}

/// Fixed extension list
#[derive(Debug, Clone, Default)]
pub struct StaticInventory(pub Vec<ExtensionEntry>);

impl ExtensionInventory for StaticInventory {
    fn installed(&self) -> Result<Vec<ExtensionEntry>> {
        Ok(self.0.clone())
    }
}

/// Reads `<publisher>.<name>-<version>` folder names from an extensions directory
#[derive(Debug, Clone)]
pub struct ExtensionsDirInventory {
    dir: PathBuf,
}

impl ExtensionsDirInventory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.cursor/extensions`
    pub fn default_location() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(".cursor").join("extensions")))
    }
}

impl ExtensionInventory for ExtensionsDirInventory {
    fn installed(&self) -> Result<Vec<ExtensionEntry>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| SyncError::Internal(e.to_string()))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            if let Some(parsed) = parse_folder_name(&name) {
                entries.push(parsed);
            }
        }
        Ok(entries)
    }
}

/// `ms-python.python-2024.1.0` → id `ms-python.python`, version `2024.1.0`.
/// The version starts at the first `-` followed by a digit.
fn parse_folder_name(name: &str) -> Option<ExtensionEntry> {
    let split = name
        .match_indices('-')
        .map(|(i, _)| i)
        .find(|&i| name[i + 1..].starts_with(|c: char| c.is_ascii_digit()));

    let (id, version) = match split {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => (name, "0.0.0"),
    };

    if !id.contains('.') {
        return None;
    }
    Some(ExtensionEntry::new(id, version))
}

/// Pretty JSON listing, sorted by id, without built-in extensions
pub fn generate_extensions_json(installed: &[ExtensionEntry]) -> Result<String> {
    let mut entries: Vec<&ExtensionEntry> = installed.iter().filter(|e| !e.is_builtin()).collect();
    entries.sort_by(|a, b| {
        a.id.to_lowercase()
            .cmp(&b.id.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(serde_json::to_string_pretty(&entries)?)
}

pub fn parse_extensions_json(content: &str) -> Result<Vec<ExtensionEntry>> {
    Ok(serde_json::from_str(content)?)
}

/// Remote entries with no installed counterpart (ids compared case-insensitively)
pub fn find_missing(remote: &[ExtensionEntry], installed: &[ExtensionEntry]) -> Vec<ExtensionEntry> {
    let installed_ids: HashSet<String> = installed
        .iter()
        .filter(|e| !e.is_builtin())
        .map(|e| e.id.to_lowercase())
        .collect();

    remote
        .iter()
        .filter(|e| !installed_ids.contains(&e.id.to_lowercase()))
        .cloned()
        .collect()
}
