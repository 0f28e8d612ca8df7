//! Content fingerprinting and packaging
//!
//! Files are read as raw bytes and fingerprinted before any transform, so the
//! fingerprint never depends on whether the content travels as text or base64.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::{Result, SyncError};
use crate::types::{
    ContentEncoding, Fingerprint, Manifest, ManifestFileEntry, PackagedFile, SourceOs,
    SyncFileEntry, SyncKey, SCHEMA_VERSION,
};

/// SHA-256 hex digest of raw bytes
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    hex::encode(Sha256::digest(bytes))
}

/// Stable per-machine identifier. Metadata only, never a security boundary.
pub fn compute_machine_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default();
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    fingerprint(format!("{}:{}", host, user).as_bytes())
}

/// Package raw bytes: strict UTF-8 stays text, anything else becomes base64
pub fn package_bytes(bytes: &[u8]) -> PackagedFile {
    let fingerprint = fingerprint(bytes);
    let size_bytes = bytes.len() as u64;

    match std::str::from_utf8(bytes) {
        Ok(text) => PackagedFile {
            content: text.to_string(),
            fingerprint,
            size_bytes,
            encoding: None,
        },
        Err(_) => PackagedFile {
            content: BASE64.encode(bytes),
            fingerprint,
            size_bytes,
            encoding: Some(ContentEncoding::Base64),
        },
    }
}

/// Reverse of [`package_bytes`]
pub fn decode_content(content: &str, encoding: Option<ContentEncoding>) -> Result<Vec<u8>> {
    match encoding {
        None => Ok(content.as_bytes().to_vec()),
        Some(ContentEncoding::Base64) => BASE64
            .decode(content.trim())
            .map_err(|e| SyncError::Manifest(format!("invalid base64 content: {}", e))),
    }
}

/// Result of packaging a file set
#[derive(Debug, Clone)]
pub struct Package {
    pub files: BTreeMap<SyncKey, PackagedFile>,
    pub manifest: Manifest,
}

impl Package {
    pub fn fingerprints(&self) -> BTreeMap<SyncKey, Fingerprint> {
        self.files
            .iter()
            .map(|(k, f)| (k.clone(), f.fingerprint.clone()))
            .collect()
    }
}

/// Builds manifests for one machine and profile
#[derive(Debug, Clone)]
pub struct ContentPackager {
    profile_name: String,
    machine_id: String,
    source_os: SourceOs,
}

impl ContentPackager {
    pub fn new(profile_name: impl Into<String>) -> Self {
        Self {
            profile_name: profile_name.into(),
            machine_id: compute_machine_id(),
            source_os: SourceOs::current(),
        }
    }

    /// Override the machine id (tests, reproducible manifests)
    pub fn with_machine_id(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = machine_id.into();
        self
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Read and package every file. Any read failure fails the whole batch.
    pub async fn package(&self, files: &[SyncFileEntry]) -> Result<Package> {
        let mut sorted: Vec<&SyncFileEntry> = files.iter().collect();
        sorted.sort_by(|a, b| a.key.cmp(&b.key));

        let mut packaged = BTreeMap::new();
        let mut entries = BTreeMap::new();

        for file in sorted {
            let bytes = tokio::fs::read(&file.absolute_path)
                .await
                .map_err(|e| SyncError::fs(&file.absolute_path, e))?;
            let packed = package_bytes(&bytes);

            entries.insert(
                file.key.clone(),
                ManifestFileEntry {
                    fingerprint: packed.fingerprint.clone(),
                    size_bytes: packed.size_bytes,
                    encoding: packed.encoding,
                },
            );
            packaged.insert(file.key.clone(), packed);
        }

        tracing::debug!("Packaged {} files for profile {}", packaged.len(), self.profile_name);

        Ok(Package {
            files: packaged,
            manifest: Manifest {
                schema_version: SCHEMA_VERSION,
                profile_name: self.profile_name.clone(),
                created_at: Utc::now(),
                source_machine_id: self.machine_id.clone(),
                source_os: self.source_os,
                files: entries,
            },
        })
    }
}

/// Fingerprint each file that can currently be read; unreadable files are skipped
pub async fn fingerprint_files(files: &[SyncFileEntry]) -> BTreeMap<SyncKey, Fingerprint> {
    let mut out = BTreeMap::new();
    for file in files {
        match tokio::fs::read(&file.absolute_path).await {
            Ok(bytes) => {
                out.insert(file.key.clone(), fingerprint(&bytes));
            }
            Err(e) => {
                tracing::debug!("Skipping unreadable {}: {}", file.absolute_path.display(), e);
            }
        }
    }
    out
}
