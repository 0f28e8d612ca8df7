//! Core types for cursor-sync

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Slash-delimited logical identifier of a synchronized file,
/// e.g. `cursor-user/settings.json`
pub type SyncKey = String;

/// Lowercase hex SHA-256 of a file's raw bytes
pub type Fingerprint = String;

/// Name of the manifest entry inside the remote document
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Description used to find the sync document when no id is persisted
pub const DOCUMENT_DESCRIPTION: &str = "Cursor Sync - Settings Backup";

/// Current manifest schema
pub const SCHEMA_VERSION: u32 = 1;

/// A file selected for synchronization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFileEntry {
    pub absolute_path: PathBuf,
    pub key: SyncKey,
}

impl SyncFileEntry {
    pub fn new(absolute_path: impl Into<PathBuf>, key: impl Into<SyncKey>) -> Self {
        Self {
            absolute_path: absolute_path.into(),
            key: key.into(),
        }
    }
}

/// Transfer encoding of packaged content. Absent means raw UTF-8 text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    Base64,
}

/// File content ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedFile {
    pub content: String,
    pub fingerprint: Fingerprint,
    pub size_bytes: u64,
    pub encoding: Option<ContentEncoding>,
}

/// Per-file manifest record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFileEntry {
    #[serde(rename = "checksum", alias = "fingerprint")]
    pub fingerprint: Fingerprint,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<ContentEncoding>,
}

/// Operating system that produced a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceOs {
    Win32,
    Darwin,
    Linux,
}

impl SourceOs {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            SourceOs::Win32
        } else if cfg!(target_os = "macos") {
            SourceOs::Darwin
        } else {
            SourceOs::Linux
        }
    }
}

/// Packaging metadata transmitted alongside file content.
///
/// `files` is a `BTreeMap` so serialization is always key-sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    #[serde(rename = "syncProfileName", alias = "profileName")]
    pub profile_name: String,
    pub created_at: DateTime<Utc>,
    pub source_machine_id: String,
    #[serde(rename = "sourceOS")]
    pub source_os: SourceOs,
    pub files: BTreeMap<SyncKey, ManifestFileEntry>,
}

impl Manifest {
    /// Fingerprint per key as recorded by the producing machine
    pub fn fingerprints(&self) -> BTreeMap<SyncKey, Fingerprint> {
        self.files
            .iter()
            .map(|(k, e)| (k.clone(), e.fingerprint.clone()))
            .collect()
    }
}

/// Direction of a completed sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Push,
    Pull,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::Push => f.write_str("push"),
            SyncDirection::Pull => f.write_str("pull"),
        }
    }
}

/// The base snapshot: last point both sides were known to agree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub last_sync_timestamp: DateTime<Utc>,
    pub last_sync_direction: SyncDirection,
    #[serde(rename = "gistId", alias = "remoteDocumentId")]
    pub remote_document_id: String,
    #[serde(rename = "localChecksums", alias = "localFingerprints", default)]
    pub local_fingerprints: BTreeMap<SyncKey, Fingerprint>,
    #[serde(rename = "remoteChecksums", alias = "remoteFingerprints", default)]
    pub remote_fingerprints: BTreeMap<SyncKey, Fingerprint>,
}

/// A key both sides changed independently since the base snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictEntry {
    pub key: SyncKey,
    /// `None` when the file no longer exists locally
    pub local_fingerprint: Option<Fingerprint>,
    /// `None` when the file no longer exists remotely
    pub remote_fingerprint: Option<Fingerprint>,
    pub base_fingerprint: Fingerprint,
}

/// User decision for one conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictResolution {
    KeepLocal,
    KeepRemote,
    Skip,
}

impl ConflictResolution {
    pub fn label(&self) -> &'static str {
        match self {
            ConflictResolution::KeepLocal => "Keep Local",
            ConflictResolution::KeepRemote => "Keep Remote",
            ConflictResolution::Skip => "Skip (decide later)",
        }
    }
}

/// One file inside a remote document
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Listing endpoints omit content
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub truncated: bool,
}

impl RemoteFile {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            truncated: false,
        }
    }
}

/// Remote key→content document acting as source of truth
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: String,
    /// Gists without a description carry `null`
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default)]
    pub files: BTreeMap<String, RemoteFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A decoded remote file about to be written locally during pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCandidate {
    pub key: SyncKey,
    pub target: PathBuf,
    pub content: Vec<u8>,
    pub fingerprint: Fingerprint,
}

/// What triggered a push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Manual,
    Scheduled,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Scheduled => "scheduled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_keys_serialize_sorted() {
        let mut files = BTreeMap::new();
        for key in ["dot-cursor/rules/b.mdc", "cursor-user/settings.json", "cursor-user/a.json"] {
            files.insert(
                key.to_string(),
                ManifestFileEntry {
                    fingerprint: "00".into(),
                    size_bytes: 1,
                    encoding: None,
                },
            );
        }
        let manifest = Manifest {
            schema_version: SCHEMA_VERSION,
            profile_name: "default".into(),
            created_at: Utc::now(),
            source_machine_id: "m".into(),
            source_os: SourceOs::Linux,
            files,
        };

        let json = serde_json::to_string(&manifest).unwrap();
        let a = json.find("cursor-user/a.json").unwrap();
        let s = json.find("cursor-user/settings.json").unwrap();
        let r = json.find("dot-cursor/rules/b.mdc").unwrap();
        assert!(a < s && s < r);
        assert!(json.contains("\"sourceOS\":\"linux\""));
        assert!(json.contains("\"syncProfileName\":\"default\""));
        assert!(!json.contains("encoding"));
    }

    #[test]
    fn test_manifest_accepts_existing_documents() {
        let json = r#"{
            "schemaVersion": 1,
            "syncProfileName": "work",
            "createdAt": "2026-01-01T00:00:00.000Z",
            "sourceMachineId": "abc",
            "sourceOS": "darwin",
            "files": {
                "cursor-user/settings.json": {"checksum": "aa", "sizeBytes": 2},
                "dot-cursor/icon.png": {"checksum": "bb", "sizeBytes": 4, "encoding": "base64"}
            }
        }"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.profile_name, "work");
        assert_eq!(manifest.source_os, SourceOs::Darwin);
        assert_eq!(
            manifest.files["dot-cursor/icon.png"].encoding,
            Some(ContentEncoding::Base64)
        );
        assert_eq!(manifest.fingerprints()["cursor-user/settings.json"], "aa");
    }

    #[test]
    fn test_listing_with_undescribed_gist() {
        let json = r#"[
            {"id": "a1", "description": null, "files": {"x.txt": {"filename": "x.txt", "size": 3}}},
            {"id": "b2", "description": "Cursor Sync - Settings Backup", "files": {}},
            {"id": "c3", "files": {}}
        ]"#;
        let page: Vec<RemoteDocument> = serde_json::from_str(json).unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].description, "");
        assert_eq!(page[0].files["x.txt"].content, "");
        assert_eq!(page[1].description, DOCUMENT_DESCRIPTION);
        assert_eq!(page[2].description, "");
    }

    #[test]
    fn test_sync_state_wire_names() {
        let state = SyncState {
            last_sync_timestamp: Utc::now(),
            last_sync_direction: SyncDirection::Push,
            remote_document_id: "gist123".into(),
            local_fingerprints: BTreeMap::new(),
            remote_fingerprints: BTreeMap::new(),
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["gistId"], "gist123");
        assert_eq!(value["lastSyncDirection"], "push");
        assert!(value.get("localChecksums").is_some());

        let back: SyncState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }
}
