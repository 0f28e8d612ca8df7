//! Access-token storage

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Result, SyncError};
use crate::remote::Credential;

/// Environment variable read by [`EnvCredentialStore`]
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Persists the remote access token
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self) -> Result<Option<Credential>>;

    async fn store(&self, credential: &Credential) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Token kept in a single owner-only file
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self) -> Result<Option<Credential>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => {
                let credential = Credential::new(raw);
                Ok((!credential.is_empty()).then_some(credential))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::fs(&self.path, e)),
        }
    }

    async fn store(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::fs(parent, e))?;
        }
        tokio::fs::write(&self.path, credential.expose())
            .await
            .map_err(|e| SyncError::fs(&self.path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| SyncError::fs(&self.path, e))?;
        }

        tracing::info!("Stored credential at {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::fs(&self.path, e)),
        }
    }
}

/// Read-only token from the environment
#[derive(Debug, Clone)]
pub struct EnvCredentialStore {
    var: String,
}

impl Default for EnvCredentialStore {
    fn default() -> Self {
        Self::new(TOKEN_ENV_VAR)
    }
}

impl EnvCredentialStore {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    /// Whether the variable is currently set to a non-empty value
    pub fn is_present(&self) -> bool {
        std::env::var(&self.var).map(|v| !v.trim().is_empty()).unwrap_or(false)
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get(&self) -> Result<Option<Credential>> {
        Ok(std::env::var(&self.var)
            .ok()
            .map(Credential::new)
            .filter(|c| !c.is_empty()))
    }

    async fn store(&self, _credential: &Credential) -> Result<()> {
        Err(SyncError::Config(format!(
            "credential comes from ${} and cannot be replaced",
            self.var
        )))
    }

    async fn clear(&self) -> Result<()> {
        Err(SyncError::Config(format!("unset ${} to log out", self.var)))
    }
}

/// In-process store for tests and one-shot runs
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(Credential::new(token))),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self) -> Result<Option<Credential>> {
        Ok(self.token.lock().clone())
    }

    async fn store(&self, credential: &Credential) -> Result<()> {
        *self.token.lock() = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.token.lock() = None;
        Ok(())
    }
}
