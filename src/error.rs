use thiserror::Error;

/// Result type for media pipeline operations
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur in the media ingestion pipeline
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("invalid media name: {name:?} is empty after sanitization")]
    InvalidName { name: String },

    #[error("invalid request: {message}")]
    Invalid { message: String },

    #[error("out-of-order chunk: expected offset {expected}, got {got}")]
    OutOfOrderChunk { expected: u64, got: u64 },

    #[error("upload session expired: {session_id}")]
    SessionExpired { session_id: String },

    #[error("upload session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("incomplete upload: expected {expected} bytes, received {received}")]
    IncompleteUpload { expected: u64, received: u64 },

    #[error("store write failed for {key}: {reason}")]
    StoreWrite { key: String, reason: String },

    #[error("unsupported image input: {reason}")]
    UnsupportedImage { reason: String },

    #[error("poster generation failed: {reason}")]
    PosterGeneration { reason: String },

    #[error("media not found: {reference}")]
    NotFound { reference: String },

    #[error("storage backend error for {key}: {reason}")]
    Backend { key: String, reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl MediaError {
    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(reference: S) -> Self {
        Self::NotFound {
            reference: reference.into(),
        }
    }

    /// Create a store write error
    pub fn store_write<K: Into<String>, R: Into<String>>(key: K, reason: R) -> Self {
        Self::StoreWrite {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a backend error
    pub fn backend<K: Into<String>, R: Into<String>>(key: K, reason: R) -> Self {
        Self::Backend {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported image error
    pub fn unsupported_image<S: Into<String>>(reason: S) -> Self {
        Self::UnsupportedImage {
            reason: reason.into(),
        }
    }

    /// Create a poster generation error
    pub fn poster<S: Into<String>>(reason: S) -> Self {
        Self::PosterGeneration {
            reason: reason.into(),
        }
    }
}
