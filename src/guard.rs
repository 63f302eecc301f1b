use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::store::{BlobStore, FetchedObject, StoreError};
use crate::{DeleteOutcome, MediaConfig, MediaError, MediaResult};

/// Consistency-tolerant wrapper over the blob store primitives.
///
/// The backing store has been observed to report `exists == true`
/// immediately before a delete returns 404, and to omit recent writes from
/// listings. The guard does not try to fix that; it maps the anomalies to
/// typed outcomes the rest of the pipeline can pattern-match:
///
/// - a 404 on read is a legitimate terminal result, never retried
/// - a 404 on delete is success (`AlreadyAbsent`); deletion is idempotent
/// - transient network failures are retried within a bounded budget
/// - writes are never silently retried; a first attempt that partially
///   succeeded must not be overwritten with different bytes, so callers
///   choose a fresh key per attempt instead
pub struct ConsistencyGuard {
    store: Arc<dyn BlobStore>,
    transient_retries: u32,
    backoff_base: Duration,
}

impl ConsistencyGuard {
    pub fn new(store: Arc<dyn BlobStore>, config: &MediaConfig) -> Self {
        Self {
            store,
            transient_retries: config.transient_retries,
            backoff_base: config.retry_backoff_base,
        }
    }

    /// Single advisory existence probe. Never retried, and never relied on
    /// for correctness elsewhere.
    pub async fn exists_consistent(&self, key: &str) -> bool {
        match self.store.exists(key).await {
            Ok(present) => present,
            Err(e) => {
                warn!(key, error = %e, "existence probe failed, reporting absent");
                false
            }
        }
    }

    /// Fetch an object; `None` is a true absence.
    pub async fn get_or_not_found(&self, key: &str) -> MediaResult<Option<FetchedObject>> {
        let mut attempt = 0;
        loop {
            match self.store.get(key).await {
                Ok(fetched) => return Ok(Some(fetched)),
                Err(StoreError::NotFound { .. }) => return Ok(None),
                Err(StoreError::Transient { reason, .. }) if attempt < self.transient_retries => {
                    self.backoff(key, attempt, &reason).await;
                    attempt += 1;
                }
                Err(e) => return Err(MediaError::backend(key, e.to_string())),
            }
        }
    }

    /// Delete an object, treating absence as success.
    pub async fn delete_idempotent(&self, key: &str) -> MediaResult<DeleteOutcome> {
        let mut attempt = 0;
        loop {
            match self.store.delete(key).await {
                Ok(()) => return Ok(DeleteOutcome::Deleted),
                Err(StoreError::NotFound { .. }) => return Ok(DeleteOutcome::AlreadyAbsent),
                Err(StoreError::Transient { reason, .. }) if attempt < self.transient_retries => {
                    self.backoff(key, attempt, &reason).await;
                    attempt += 1;
                }
                Err(e) => return Err(MediaError::backend(key, e.to_string())),
            }
        }
    }

    /// Durable single-attempt write. Any failure surfaces as
    /// [`MediaError::StoreWrite`]; there is no retry under the same key.
    pub async fn put_durable(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> MediaResult<()> {
        self.store
            .put(key, bytes, content_type)
            .await
            .map_err(|e| MediaError::store_write(key, e.to_string()))
    }

    async fn backoff(&self, key: &str, attempt: u32, reason: &str) {
        let delay = self.backoff_base * 2u32.pow(attempt);
        debug!(
            key,
            attempt,
            delay_ms = delay.as_millis() as u64,
            reason,
            "transient store failure, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBlobStore;

    fn guard_over(store: MemoryBlobStore) -> ConsistencyGuard {
        let mut guard = ConsistencyGuard::new(Arc::new(store), &MediaConfig::default());
        // keep test wall-clock short
        guard.backoff_base = Duration::from_millis(1);
        guard
    }

    #[tokio::test]
    async fn test_get_or_not_found_returns_none_without_retry() {
        let guard = guard_over(MemoryBlobStore::new());
        let result = guard.get_or_not_found("missing.jpg").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_get_retries_transient_failures() {
        let store = MemoryBlobStore::new();
        store
            .put("a.jpg", Bytes::from_static(b"abc"), "image/jpeg")
            .await
            .unwrap();
        store.fail_next_gets(2).await;

        let guard = guard_over(store);
        let fetched = guard.get_or_not_found("a.jpg").await.unwrap().unwrap();
        assert_eq!(&fetched.bytes[..], b"abc");
    }

    #[tokio::test]
    async fn test_get_surfaces_after_retry_budget() {
        let store = MemoryBlobStore::new();
        store
            .put("a.jpg", Bytes::from_static(b"abc"), "image/jpeg")
            .await
            .unwrap();
        store.fail_next_gets(5).await;

        let guard = guard_over(store);
        let err = guard.get_or_not_found("a.jpg").await;
        assert!(matches!(err, Err(MediaError::Backend { .. })));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryBlobStore::new();
        store
            .put("a.jpg", Bytes::from_static(b"abc"), "image/jpeg")
            .await
            .unwrap();

        let guard = guard_over(store);
        assert_eq!(
            guard.delete_idempotent("a.jpg").await.unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            guard.delete_idempotent("a.jpg").await.unwrap(),
            DeleteOutcome::AlreadyAbsent
        );
    }

    #[tokio::test]
    async fn test_phantom_delete_maps_to_already_absent() {
        let store = MemoryBlobStore::new();
        store
            .put("ghost.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap();
        store.mark_phantom_delete("ghost.jpg").await;

        let guard = guard_over(store.clone());
        assert!(guard.exists_consistent("ghost.jpg").await);
        assert_eq!(
            guard.delete_idempotent("ghost.jpg").await.unwrap(),
            DeleteOutcome::AlreadyAbsent
        );
    }

    #[tokio::test]
    async fn test_put_does_not_retry() {
        let store = MemoryBlobStore::new();
        store.fail_next_puts(1).await;

        let guard = guard_over(store.clone());
        let err = guard
            .put_durable("a.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await;
        assert!(matches!(err, Err(MediaError::StoreWrite { .. })));
        // The injected failure was consumed by the single attempt
        assert_eq!(store.object_count().await, 0);
    }
}
