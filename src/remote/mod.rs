//! Remote document store
//!
//! Simple CRUD over key→content documents. Every call returns a typed
//! [`RemoteError`] so failures can be categorized and retried.
//!
//! # Feature Flags
//!
//! - `gist`: GitHub Gist backend ([`GistClient`])

#[cfg(feature = "gist")]
mod gist;
mod memory;

#[cfg(feature = "gist")]
pub use gist::{GistClient, GistConnector};
pub use memory::{CallCounts, MemoryRemoteStore};

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::types::RemoteDocument;

/// Documents requested per listing page
pub const PAGE_SIZE: u32 = 100;

/// Result of a remote call
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Update payload: `None` deletes the file from the document
pub type FileUpdates = BTreeMap<String, Option<String>>;

/// Access token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Key→content document store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Cheap authenticated call used to check the credential
    async fn validate_credential(&self) -> RemoteResult<()>;

    /// One page of the caller's documents (1-based)
    async fn list_page(&self, page: u32, per_page: u32) -> RemoteResult<Vec<RemoteDocument>>;

    async fn get(&self, id: &str) -> RemoteResult<RemoteDocument>;

    async fn create(
        &self,
        files: &BTreeMap<String, String>,
        description: &str,
    ) -> RemoteResult<RemoteDocument>;

    async fn update(&self, id: &str, files: &FileUpdates) -> RemoteResult<RemoteDocument>;

    /// Id of the first document whose description matches.
    ///
    /// Pages are requested in order and the walk stops at the first match,
    /// or at an empty or short page.
    async fn find_by_description(&self, description: &str) -> RemoteResult<Option<String>> {
        search_pages(description, |page| self.list_page(page, PAGE_SIZE)).await
    }
}

/// Walk listing pages from 1 until a document's description matches, or an
/// empty or short page ends the listing. `fetch_page` is called once per page.
pub async fn search_pages<F, Fut>(description: &str, mut fetch_page: F) -> RemoteResult<Option<String>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = RemoteResult<Vec<RemoteDocument>>>,
{
    let mut page = 1;
    loop {
        let documents = fetch_page(page).await?;
        if let Some(doc) = documents.iter().find(|d| d.description == description) {
            return Ok(Some(doc.id.clone()));
        }
        if documents.len() < PAGE_SIZE as usize {
            return Ok(None);
        }
        page += 1;
    }
}

/// Opens an authenticated [`RemoteStore`] session for a credential
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, credential: &Credential) -> Arc<dyn RemoteStore>;
}
