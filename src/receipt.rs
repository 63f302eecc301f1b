use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::MediaKind;

/// Receipt returned after media is durably stored.
///
/// Preview keys are present only when generation succeeded; their absence
/// never indicates a failed upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaReceipt {
    pub key: String,
    pub kind: MediaKind,
    pub size_bytes: u64,
    pub content_type: String,
    pub thumbnail_key: Option<String>,
    pub poster_key: Option<String>,
    pub created_at: i64,
}

impl MediaReceipt {
    pub fn new(key: String, kind: MediaKind, size_bytes: u64, content_type: String) -> Self {
        Self {
            key,
            kind,
            size_bytes,
            content_type,
            thumbnail_key: None,
            poster_key: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Set the thumbnail key
    pub fn with_thumbnail_key<S: Into<String>>(mut self, key: S) -> Self {
        self.thumbnail_key = Some(key.into());
        self
    }

    /// Set the poster key
    pub fn with_poster_key<S: Into<String>>(mut self, key: S) -> Self {
        self.poster_key = Some(key.into());
        self
    }
}

/// A media object resolved for a read
#[derive(Debug, Clone)]
pub struct ServedMedia {
    /// The key the read actually resolved to; may be a legacy variant of
    /// the requested reference
    pub key: String,
    pub bytes: Bytes,
    pub content_type: String,
}
