//! # media-ingest: media ingestion and storage resolution
//!
//! `media-ingest` provides the media pipeline behind social posts and
//! messages: resumable chunked uploads, preview generation for images and
//! videos, and reads that tolerate a weakly consistent blob store.
//!
//! ## Key Features
//!
//! - **Chunked uploads**: large video files arrive in bounded pieces and are
//!   reassembled by strict offset ordering, so no single request carries the
//!   whole payload
//! - **Legacy-aware reads**: stored objects span several historical naming
//!   conventions; every read walks a fixed fallback chain instead of
//!   searching the store
//! - **Best-effort previews**: image thumbnails and video poster frames are
//!   generated after the durable write and can never fail an upload
//! - **Consistency-tolerant**: existence probes, reads, and deletes are
//!   wrapped in typed outcomes that absorb the store's observed anomalies
//! - **Storage agnostic**: any backend implementing [`BlobStore`] works;
//!   an S3-compatible implementation and an in-memory test store ship in
//!   the crate
//!
//! ## Quick Start
//!
//! ```rust
//! use media_ingest::prelude::*;
//! use bytes::Bytes;
//!
//! # #[tokio::main]
//! # async fn main() -> MediaResult<()> {
//! let media = MediaAdapter::new(MemoryBlobStore::new(), MediaConfig::default());
//!
//! // Small payloads skip the session machinery entirely
//! let receipt = media
//!     .upload(MediaKind::Image, "cat.jpg", Bytes::from_static(b"not a real jpeg"))
//!     .await?;
//!
//! // Reads resolve canonical and legacy spellings alike
//! let served = media.serve(&receipt.key).await?;
//! assert_eq!(&served.bytes[..], b"not a real jpeg");
//! # Ok(())
//! # }
//! ```
//!
//! Large payloads go through an upload session:
//!
//! ```rust
//! use media_ingest::prelude::*;
//! use bytes::Bytes;
//!
//! # #[tokio::main]
//! # async fn main() -> MediaResult<()> {
//! let media = MediaAdapter::new(MemoryBlobStore::new(), MediaConfig::default());
//!
//! let ack = media.begin_upload(MediaKind::Video, "clip.mp4", 10).await?;
//! media.append_chunk(&ack.session_id, 0, Bytes::from_static(b"01234")).await?;
//! media.append_chunk(&ack.session_id, 5, Bytes::from_static(b"56789")).await?;
//!
//! let receipt = media.finalize_upload(&ack.session_id).await?;
//! assert_eq!(receipt.key, ack.target_key);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   Your Service   │  ← routes, auth, posts
//! ├──────────────────┤
//! │   MediaAdapter   │  ← upload routing, read fallback, delete cascade
//! ├──────────────────┤
//! │ Coordinator /    │  ← sessions, previews
//! │ ThumbnailService │
//! ├──────────────────┤
//! │ ConsistencyGuard │  ← typed outcomes, bounded retries
//! ├──────────────────┤
//! │    BlobStore     │  ← storage primitives
//! └──────────────────┘
//! ```
//!
//! The adapter is infrastructure, not a service: the HTTP layer maps its
//! typed errors to status codes and otherwise stays out of media mechanics.

pub mod adapter;
mod config;
mod coordinator;
mod error;
mod guard;
mod memory_store;
mod receipt;
mod resolver;
mod s3_store;
mod store;
mod thumbnail;
mod types;

// Re-export main types for clean API
pub use adapter::MediaAdapter;
pub use config::{MediaConfig, ThumbnailConfig};
pub use coordinator::UploadCoordinator;
pub use error::{MediaError, MediaResult};
pub use guard::ConsistencyGuard;
pub use memory_store::MemoryBlobStore;
pub use receipt::{MediaReceipt, ServedMedia};
pub use resolver::KeyResolver;
pub use s3_store::{S3Config, S3ObjectStore};
pub use store::{
    content_type_for_key, BlobStore, FetchedObject, ObjectInfo, StoreError, StoreResult,
};
pub use thumbnail::ThumbnailService;
pub use types::{
    AppendAck, AssembledUpload, BeginUploadAck, DeleteOutcome, MediaKind, SessionId,
    UploadSession,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobStore, DeleteOutcome, MediaAdapter, MediaConfig, MediaError, MediaKind,
        MediaReceipt, MediaResult, MemoryBlobStore, ServedMedia, SessionId,
    };
}
