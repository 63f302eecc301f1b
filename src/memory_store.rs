use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::store::{BlobStore, FetchedObject, ObjectInfo, StoreError, StoreResult};

/// In-memory storage backend for unit and integration tests.
///
/// Holds objects in a `HashMap` behind an `RwLock`. Fault-injection knobs
/// reproduce the production store's observed anomalies: bounded windows of
/// transient failures, and keys where an existence probe returns true right
/// before the delete reports 404.
#[derive(Clone)]
pub struct MemoryBlobStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<String, StoredObject>,
    transient_puts: u32,
    transient_gets: u32,
    transient_deletes: u32,
    phantom_deletes: HashSet<String>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Seed an object directly, bypassing the pipeline. For tests that need
    /// legacy keys the resolver no longer generates.
    pub async fn seed(&self, key: &str, bytes: Bytes, content_type: &str) {
        let mut inner = self.inner.write().await;
        inner.objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
    }

    /// Fail the next `n` puts with a transient error
    pub async fn fail_next_puts(&self, n: u32) {
        self.inner.write().await.transient_puts = n;
    }

    /// Fail the next `n` gets with a transient error
    pub async fn fail_next_gets(&self, n: u32) {
        self.inner.write().await.transient_gets = n;
    }

    /// Fail the next `n` deletes with a transient error
    pub async fn fail_next_deletes(&self, n: u32) {
        self.inner.write().await.transient_deletes = n;
    }

    /// Arrange for `key` to report exists == true and then 404 on delete,
    /// the anomaly observed in the production store
    pub async fn mark_phantom_delete(&self, key: &str) {
        self.inner.write().await.phantom_deletes.insert(key.to_string());
    }

    /// Number of stored objects
    pub async fn object_count(&self) -> usize {
        self.inner.read().await.objects.len()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.transient_puts > 0 {
            inner.transient_puts -= 1;
            return Err(StoreError::transient(key, "injected put failure"));
        }
        inner.objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<FetchedObject> {
        let mut inner = self.inner.write().await;
        if inner.transient_gets > 0 {
            inner.transient_gets -= 1;
            return Err(StoreError::transient(key, "injected get failure"));
        }
        let obj = inner
            .objects
            .get(key)
            .ok_or_else(|| StoreError::not_found(key))?;
        Ok(FetchedObject {
            bytes: obj.bytes.clone(),
            content_type: obj.content_type.clone(),
            etag: Some(format!("\"{}\"", obj.bytes.len())),
        })
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner.objects.contains_key(key))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.transient_deletes > 0 {
            inner.transient_deletes -= 1;
            return Err(StoreError::transient(key, "injected delete failure"));
        }
        if inner.phantom_deletes.remove(key) {
            // The store acknowledged existence moments ago but the delete
            // lands after propagation has removed the key
            inner.objects.remove(key);
            return Err(StoreError::not_found(key));
        }
        match inner.objects.remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found(key)),
        }
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectInfo>> {
        let inner = self.inner.read().await;
        let mut infos: Vec<ObjectInfo> = inner
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectInfo {
                key: key.clone(),
                size_bytes: obj.bytes.len() as u64,
                last_modified: obj.last_modified,
            })
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryBlobStore::new();
        store
            .put("media/uploads/a.jpg", Bytes::from_static(b"abc"), "image/jpeg")
            .await
            .unwrap();

        let fetched = store.get("media/uploads/a.jpg").await.unwrap();
        assert_eq!(&fetched.bytes[..], b"abc");
        assert_eq!(fetched.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryBlobStore::new();
        let err = store.get("nope").await;
        assert!(matches!(err, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_phantom_delete_reports_not_found_after_exists() {
        let store = MemoryBlobStore::new();
        store
            .put("ghost.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap();
        store.mark_phantom_delete("ghost.jpg").await;

        assert!(store.exists("ghost.jpg").await.unwrap());
        let err = store.delete("ghost.jpg").await;
        assert!(matches!(err, Err(StoreError::NotFound { .. })));
        // And the object really is gone afterwards
        assert!(!store.exists("ghost.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_injected_transient_failures_are_consumed() {
        let store = MemoryBlobStore::new();
        store.fail_next_puts(1).await;

        let err = store
            .put("a.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await;
        assert!(matches!(err, Err(StoreError::Transient { .. })));

        store
            .put("a.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let store = MemoryBlobStore::new();
        store
            .put("media/uploads/a.jpg", Bytes::from_static(b"a"), "image/jpeg")
            .await
            .unwrap();
        store
            .put("other/b.jpg", Bytes::from_static(b"b"), "image/jpeg")
            .await
            .unwrap();

        let listed = store.list("media/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "media/uploads/a.jpg");
    }
}
