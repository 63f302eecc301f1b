use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type for raw store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Closed error set for the blob store seam.
///
/// Backends classify every failure into one of these, so the layers above
/// pattern-match instead of inspecting error shapes or message strings.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend reported the object does not exist. Because the store is
    /// only eventually consistent this can follow a positive existence
    /// probe for the same key.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// A network-level failure where the request may never have reached the
    /// backend. Safe to retry.
    #[error("transient store failure for {key}: {reason}")]
    Transient { key: String, reason: String },

    /// The backend understood the request and refused it. Not retryable.
    #[error("store rejected request for {key}: {reason}")]
    Rejected { key: String, reason: String },
}

impl StoreError {
    pub fn not_found<K: Into<String>>(key: K) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn transient<K: Into<String>, R: Into<String>>(key: K, reason: R) -> Self {
        Self::Transient {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected<K: Into<String>, R: Into<String>>(key: K, reason: R) -> Self {
        Self::Rejected {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// An object fetched from the store
#[derive(Debug, Clone)]
pub struct FetchedObject {
    pub bytes: Bytes,
    pub content_type: String,
    pub etag: Option<String>,
}

/// Summary of an object from a LIST operation
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

/// Primitive operations every storage backend implements.
///
/// The backing service is a key/value blob store with weak consistency:
/// listings lag writes, and existence probes can disagree with deletes.
/// Nothing above this trait relies on the anomalies not happening; the
/// [`crate::ConsistencyGuard`] routes around them.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store an object under a key
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> StoreResult<()>;

    /// Fetch an object
    async fn get(&self, key: &str) -> StoreResult<FetchedObject>;

    /// Probe for existence. Advisory only.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Delete an object. Returns `NotFound` when the backend reports 404.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// List objects under a prefix. May omit very recent writes.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectInfo>>;
}

/// Determine content type from a key's extension
pub fn content_type_for_key(key: &str) -> &'static str {
    let ext = key.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for_key() {
        assert_eq!(content_type_for_key("media/uploads/a.jpg"), "image/jpeg");
        assert_eq!(content_type_for_key("media/uploads/a.JPEG"), "image/jpeg");
        assert_eq!(content_type_for_key("clip.mp4"), "video/mp4");
        assert_eq!(
            content_type_for_key("mystery"),
            "application/octet-stream"
        );
    }
}
