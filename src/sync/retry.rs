//! Categorized retry with exponential backoff

use std::future::Future;
use std::time::Duration;

use crate::error::RemoteError;
use crate::remote::{search_pages, RemoteResult, RemoteStore, PAGE_SIZE};

/// Retry policy for remote calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Growth factor per further failure
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 3,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no sleeping
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sleep before the next attempt after failure number `attempt` (0-indexed).
    /// A server `Retry-After` hint wins over the computed backoff.
    pub fn delay_for(&self, attempt: u32, error: &RemoteError) -> Duration {
        match error.retry_after {
            Some(secs) => Duration::from_secs(secs),
            None => self.base_delay * self.multiplier.saturating_pow(attempt),
        }
    }

    /// Run `call` until it succeeds, fails with a non-retryable status,
    /// or attempts run out. The last observed error is returned.
    pub async fn run<T, F, Fut>(&self, mut call: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                tracing::debug!("Not retrying {} (status {:?})", err.category, err.status_code);
                return Err(err);
            }

            if attempt + 1 >= attempts {
                tracing::warn!("Giving up after {} attempts: {}", attempts, err);
                return Err(err);
            }

            let delay = self.delay_for(attempt, &err);
            tracing::info!(
                "Remote call failed ({}), retrying in {:?} (attempt {}/{})",
                err.category,
                delay,
                attempt + 2,
                attempts
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Description search with each page request retried on its own, so a
    /// transient failure never refetches earlier pages
    pub async fn find_by_description(
        &self,
        store: &dyn RemoteStore,
        description: &str,
    ) -> RemoteResult<Option<String>> {
        search_pages(description, |page| self.run(move || store.list_page(page, PAGE_SIZE))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureCategory;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn failing(status: u16) -> RemoteError {
        RemoteError::from_status(status, None, None)
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        let err = failing(500);
        assert_eq!(policy.delay_for(0, &err), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1, &err), Duration::from_secs(3));

        let limited = RemoteError::from_status(429, Some("30"), None);
        assert_eq!(policy.delay_for(0, &limited), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();

        let result: Result<(), _> = RetryPolicy::default()
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(failing(401))
            })
            .await;

        assert_eq!(result.unwrap_err().category, FailureCategory::AuthFailed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();

        let result: Result<(), _> = RetryPolicy::default()
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(failing(500))
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.category, FailureCategory::NetworkError);
        assert_eq!(err.status_code, Some(500));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s then 3s
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4) && elapsed < Duration::from_millis(4100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_is_honored() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();

        let result = RetryPolicy::default()
            .run(move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RemoteError::from_status(429, Some("30"), None))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_millis(30100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_and_validation_are_final() {
        for status in [404, 422] {
            let calls = AtomicU32::new(0);
            let counter = &calls;
            let _: Result<(), _> = RetryPolicy::default()
                .run(move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(failing(status))
                })
                .await;
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_retries_only_the_failed_page() {
        use crate::remote::MemoryRemoteStore;
        use crate::types::DOCUMENT_DESCRIPTION;
        use std::collections::BTreeMap;

        let store = MemoryRemoteStore::new();
        for i in 0..120 {
            store.insert_document(format!("gist {}", i), BTreeMap::new());
        }
        let wanted = store.insert_document(DOCUMENT_DESCRIPTION, BTreeMap::new());
        store.fail_page(2, RemoteError::from_status(502, None, None));

        let found = RetryPolicy::default()
            .find_by_description(&store, DOCUMENT_DESCRIPTION)
            .await
            .unwrap();

        assert_eq!(found, Some(wanted));
        // page 1, failed page 2, retried page 2
        assert_eq!(store.calls().list_pages, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_stops_on_final_page_failure() {
        use crate::remote::MemoryRemoteStore;
        use std::collections::BTreeMap;

        let store = MemoryRemoteStore::new();
        store.insert_document("other", BTreeMap::new());
        store.fail_page(1, RemoteError::from_status(404, None, None));

        let err = RetryPolicy::default()
            .find_by_description(&store, "missing")
            .await
            .unwrap_err();
        assert_eq!(err.status_code, Some(404));
        assert_eq!(store.calls().list_pages, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_recovers() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = RetryPolicy::default()
            .run(move || async move {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(RemoteError::network("ECONNRESET")),
                    _ => Ok(7),
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
