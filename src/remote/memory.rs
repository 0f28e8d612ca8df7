//! In-process remote store with call accounting and scripted failures

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Credential, FileUpdates, RemoteConnector, RemoteResult, RemoteStore};
use crate::error::{FailureCategory, RemoteError};
use crate::types::{RemoteDocument, RemoteFile};

/// Number of calls made per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub validate: usize,
    pub list_pages: usize,
    pub get: usize,
    pub create: usize,
    pub update: usize,
}

#[derive(Default)]
struct Inner {
    documents: Vec<RemoteDocument>,
    next_id: u64,
    accepted_token: Option<String>,
    failures: VecDeque<RemoteError>,
    page_failures: Vec<(u32, RemoteError)>,
    calls: CallCounts,
}

/// Shared-state store; clones see the same documents
#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    inner: Arc<Mutex<Inner>>,
    session_token: Option<String>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject sessions whose credential differs from `token` with a 401
    pub fn with_accepted_token(self, token: impl Into<String>) -> Self {
        self.inner.lock().accepted_token = Some(token.into());
        self
    }

    /// Fail the next `times` calls (of any kind) with `error`
    pub fn fail_next(&self, times: usize, error: RemoteError) {
        let mut inner = self.inner.lock();
        for _ in 0..times {
            inner.failures.push_back(error.clone());
        }
    }

    /// Fail the next listing request for `page` with `error`
    pub fn fail_page(&self, page: u32, error: RemoteError) {
        self.inner.lock().page_failures.push((page, error));
    }

    /// Add a document directly, returning its id
    pub fn insert_document(
        &self,
        description: impl Into<String>,
        files: BTreeMap<String, RemoteFile>,
    ) -> String {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = format!("doc{}", inner.next_id);
        inner.documents.push(RemoteDocument {
            id: id.clone(),
            description: description.into(),
            files,
            html_url: None,
        });
        id
    }

    /// Snapshot of a stored document
    pub fn document(&self, id: &str) -> Option<RemoteDocument> {
        self.inner.lock().documents.iter().find(|d| d.id == id).cloned()
    }

    /// Overwrite or insert one file of a stored document
    pub fn put_file(&self, id: &str, name: &str, content: impl Into<String>) {
        let mut inner = self.inner.lock();
        if let Some(doc) = inner.documents.iter_mut().find(|d| d.id == id) {
            doc.files.insert(name.to_string(), RemoteFile::new(content));
        }
    }

    pub fn document_count(&self) -> usize {
        self.inner.lock().documents.len()
    }

    pub fn calls(&self) -> CallCounts {
        self.inner.lock().calls
    }

    fn check(&self, inner: &mut Inner) -> RemoteResult<()> {
        if let Some(err) = inner.failures.pop_front() {
            return Err(err);
        }
        if let Some(accepted) = &inner.accepted_token {
            if self.session_token.as_deref() != Some(accepted.as_str()) {
                return Err(RemoteError::from_status(401, None, None));
            }
        }
        Ok(())
    }

    fn not_found(id: &str) -> RemoteError {
        RemoteError::new(FailureCategory::Unknown, format!("document {} not found", id)).with_status(404)
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn validate_credential(&self) -> RemoteResult<()> {
        let mut inner = self.inner.lock();
        inner.calls.validate += 1;
        self.check(&mut inner)
    }

    async fn list_page(&self, page: u32, per_page: u32) -> RemoteResult<Vec<RemoteDocument>> {
        let mut inner = self.inner.lock();
        inner.calls.list_pages += 1;
        self.check(&mut inner)?;
        if let Some(pos) = inner.page_failures.iter().position(|(p, _)| *p == page) {
            return Err(inner.page_failures.remove(pos).1);
        }

        let start = (page.saturating_sub(1) * per_page) as usize;
        Ok(inner
            .documents
            .iter()
            .skip(start)
            .take(per_page as usize)
            .map(|d| RemoteDocument {
                files: d
                    .files
                    .keys()
                    .map(|name| (name.clone(), RemoteFile::default()))
                    .collect(),
                ..d.clone()
            })
            .collect())
    }

    async fn get(&self, id: &str) -> RemoteResult<RemoteDocument> {
        let mut inner = self.inner.lock();
        inner.calls.get += 1;
        self.check(&mut inner)?;
        inner
            .documents
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    async fn create(
        &self,
        files: &BTreeMap<String, String>,
        description: &str,
    ) -> RemoteResult<RemoteDocument> {
        let mut inner = self.inner.lock();
        inner.calls.create += 1;
        self.check(&mut inner)?;

        inner.next_id += 1;
        let doc = RemoteDocument {
            id: format!("doc{}", inner.next_id),
            description: description.to_string(),
            files: files
                .iter()
                .map(|(name, content)| (name.clone(), RemoteFile::new(content.clone())))
                .collect(),
            html_url: None,
        };
        inner.documents.push(doc.clone());
        Ok(doc)
    }

    async fn update(&self, id: &str, files: &FileUpdates) -> RemoteResult<RemoteDocument> {
        let mut inner = self.inner.lock();
        inner.calls.update += 1;
        self.check(&mut inner)?;

        let doc = inner
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| Self::not_found(id))?;
        for (name, content) in files {
            match content {
                Some(content) => {
                    doc.files.insert(name.clone(), RemoteFile::new(content.clone()));
                }
                None => {
                    doc.files.remove(name);
                }
            }
        }
        Ok(doc.clone())
    }
}

impl RemoteConnector for MemoryRemoteStore {
    fn connect(&self, credential: &Credential) -> Arc<dyn RemoteStore> {
        Arc::new(Self {
            inner: Arc::clone(&self.inner),
            session_token: Some(credential.expose().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_deletes_null_entries() {
        let store = MemoryRemoteStore::new();
        let mut files = BTreeMap::new();
        files.insert("a".to_string(), "1".to_string());
        files.insert("b".to_string(), "2".to_string());
        let doc = store.create(&files, "desc").await.unwrap();

        let mut updates = FileUpdates::new();
        updates.insert("a".to_string(), Some("10".to_string()));
        updates.insert("b".to_string(), None);
        let updated = store.update(&doc.id, &updates).await.unwrap();

        assert_eq!(updated.files.len(), 1);
        assert_eq!(updated.files["a"].content, "10");
    }

    #[tokio::test]
    async fn test_token_check() {
        let store = MemoryRemoteStore::new().with_accepted_token("good");
        let good = store.connect(&Credential::new("good"));
        let bad = store.connect(&Credential::new("bad"));

        assert!(good.validate_credential().await.is_ok());
        let err = bad.validate_credential().await.unwrap_err();
        assert_eq!(err.category, FailureCategory::AuthFailed);
        assert_eq!(store.calls().validate, 2);
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed() {
        let store = MemoryRemoteStore::new();
        store.fail_next(1, RemoteError::from_status(500, None, None));
        assert!(store.get("x").await.is_err());
        let err = store.get("x").await.unwrap_err();
        assert_eq!(err.status_code, Some(404));
    }
}
