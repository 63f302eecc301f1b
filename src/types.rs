use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::{MediaError, MediaResult};

/// Unique identifier for an upload session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID
    pub fn new() -> Self {
        Self(format!("ses_{}", Uuid::new_v4().simple()))
    }

    /// Create from existing string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of media accepted by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Extension assigned when the declared name carries none we recognize
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
        }
    }

    /// Extensions this kind is stored under
    pub fn known_extensions(&self) -> &'static [&'static str] {
        match self {
            MediaKind::Image => &["jpg", "jpeg", "png", "gif", "webp"],
            MediaKind::Video => &["mp4", "mov", "webm", "mkv", "m4v"],
        }
    }

    /// Guess the kind from a file extension, defaulting to image
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        if MediaKind::Video
            .known_extensions()
            .contains(&ext.as_str())
        {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }
}

/// Outcome of an idempotent delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteOutcome {
    /// The object existed and was removed
    Deleted,
    /// The object was already gone (never existed, already deleted, or the
    /// store reported 404 despite a positive existence probe)
    AlreadyAbsent,
}

/// Acknowledgement returned for each accepted chunk
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AppendAck {
    /// Total bytes received so far, including this chunk
    pub received_bytes: u64,
}

/// Acknowledgement returned when an upload session is opened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeginUploadAck {
    pub session_id: SessionId,
    /// The key the finished object will be stored under, chosen once per
    /// attempt and never reused
    pub target_key: String,
}

/// A fully received upload, ready for the durable write
#[derive(Debug)]
pub struct AssembledUpload {
    pub target_key: String,
    pub kind: MediaKind,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Transient state for an in-progress chunked upload.
///
/// Chunks are accepted strictly in offset order with no gaps or overlaps, so
/// reassembly is a plain concatenation of the buffers.
#[derive(Debug)]
pub struct UploadSession {
    pub session_id: SessionId,
    pub target_key: String,
    pub kind: MediaKind,
    pub content_type: String,
    pub expected_total_bytes: u64,
    pub received_bytes: u64,
    chunks: Vec<Bytes>,
    closed: bool,
    last_activity: Instant,
}

impl UploadSession {
    pub fn new(
        session_id: SessionId,
        target_key: String,
        kind: MediaKind,
        content_type: String,
        expected_total_bytes: u64,
    ) -> Self {
        Self {
            session_id,
            target_key,
            kind,
            content_type,
            expected_total_bytes,
            received_bytes: 0,
            chunks: Vec::new(),
            closed: false,
            last_activity: Instant::now(),
        }
    }

    /// Whether the session has been finalized
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the idle deadline has passed
    pub fn is_expired(&self, idle_timeout: Duration) -> bool {
        self.last_activity.elapsed() > idle_timeout
    }

    /// Accept the next chunk. Rejections never mutate state.
    pub fn append_chunk(&mut self, offset: u64, bytes: Bytes) -> MediaResult<AppendAck> {
        if offset != self.received_bytes {
            return Err(MediaError::OutOfOrderChunk {
                expected: self.received_bytes,
                got: offset,
            });
        }
        let incoming = bytes.len() as u64;
        if self.received_bytes + incoming > self.expected_total_bytes {
            return Err(MediaError::invalid(format!(
                "chunk overruns declared total: {} + {} > {}",
                self.received_bytes, incoming, self.expected_total_bytes
            )));
        }
        self.received_bytes += incoming;
        self.chunks.push(bytes);
        self.last_activity = Instant::now();
        Ok(AppendAck {
            received_bytes: self.received_bytes,
        })
    }

    /// Close the session and concatenate the received chunks.
    /// Fails without mutating state if the byte count does not match.
    pub fn close(&mut self) -> MediaResult<Bytes> {
        if self.received_bytes != self.expected_total_bytes {
            return Err(MediaError::IncompleteUpload {
                expected: self.expected_total_bytes,
                received: self.received_bytes,
            });
        }
        self.closed = true;
        let mut assembled = BytesMut::with_capacity(self.received_bytes as usize);
        for chunk in self.chunks.drain(..) {
            assembled.extend_from_slice(&chunk);
        }
        Ok(assembled.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_session(expected: u64) -> UploadSession {
        UploadSession::new(
            SessionId::new(),
            "media/uploads/test.jpg".to_string(),
            MediaKind::Image,
            "image/jpeg".to_string(),
            expected,
        )
    }

    #[test]
    fn test_ordered_chunks_assemble_exactly() {
        let mut session = open_session(10);
        session.append_chunk(0, Bytes::from_static(b"hello")).unwrap();
        let ack = session.append_chunk(5, Bytes::from_static(b"world")).unwrap();
        assert_eq!(ack.received_bytes, 10);

        let assembled = session.close().unwrap();
        assert_eq!(&assembled[..], b"helloworld");
    }

    #[test]
    fn test_out_of_order_chunk_rejected_without_mutation() {
        let mut session = open_session(10);
        let err = session.append_chunk(5, Bytes::from_static(b"world"));
        assert!(matches!(
            err,
            Err(MediaError::OutOfOrderChunk { expected: 0, got: 5 })
        ));
        assert_eq!(session.received_bytes, 0);

        // The correct chunk is still accepted afterwards
        session.append_chunk(0, Bytes::from_static(b"hello")).unwrap();
        assert_eq!(session.received_bytes, 5);
    }

    #[test]
    fn test_overrun_rejected() {
        let mut session = open_session(4);
        let err = session.append_chunk(0, Bytes::from_static(b"hello"));
        assert!(matches!(err, Err(MediaError::Invalid { .. })));
        assert_eq!(session.received_bytes, 0);
    }

    #[test]
    fn test_close_incomplete_fails() {
        let mut session = open_session(10);
        session.append_chunk(0, Bytes::from_static(b"hello")).unwrap();
        let err = session.close();
        assert!(matches!(
            err,
            Err(MediaError::IncompleteUpload {
                expected: 10,
                received: 5
            })
        ));
        assert!(!session.is_closed());
    }

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(MediaKind::from_extension("mov"), MediaKind::Video);
        assert_eq!(MediaKind::from_extension("MP4"), MediaKind::Video);
        assert_eq!(MediaKind::from_extension("png"), MediaKind::Image);
        assert_eq!(MediaKind::from_extension("bin"), MediaKind::Image);
    }
}
