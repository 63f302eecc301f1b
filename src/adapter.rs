use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::store::{content_type_for_key, BlobStore};
use crate::{
    AppendAck, BeginUploadAck, ConsistencyGuard, DeleteOutcome, KeyResolver, MediaConfig,
    MediaError, MediaKind, MediaReceipt, MediaResult, ServedMedia, SessionId, ThumbnailService,
    UploadCoordinator,
};

/// The media ingestion entry point services embed.
///
/// Routes between the single-shot path for small payloads and the chunked
/// coordinator for large ones, and owns the read path's fallback probing.
/// Holds no state of its own beyond the components it wires together.
pub struct MediaAdapter {
    guard: Arc<ConsistencyGuard>,
    resolver: KeyResolver,
    thumbnails: Arc<ThumbnailService>,
    coordinator: Arc<UploadCoordinator>,
    config: MediaConfig,
}

impl MediaAdapter {
    /// Create a new adapter over a storage backend
    pub fn new<S: BlobStore + 'static>(store: S, config: MediaConfig) -> Self {
        Self::with_store(Arc::new(store), config)
    }

    /// Create from a shared storage backend
    pub fn with_store(store: Arc<dyn BlobStore>, config: MediaConfig) -> Self {
        let resolver = KeyResolver::new(config.namespace.clone());
        Self {
            guard: Arc::new(ConsistencyGuard::new(store, &config)),
            resolver: resolver.clone(),
            thumbnails: Arc::new(ThumbnailService::new(config.thumbnail.clone())),
            coordinator: Arc::new(UploadCoordinator::new(resolver, config.clone())),
            config,
        }
    }

    /// Spawn the background task that abandons idle upload sessions
    pub fn spawn_session_sweeper(
        &self,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        self.coordinator.spawn_sweeper(cancel)
    }

    /// Open a chunked upload session
    pub async fn begin_upload(
        &self,
        kind: MediaKind,
        declared_name: &str,
        expected_total_bytes: u64,
    ) -> MediaResult<BeginUploadAck> {
        self.coordinator
            .begin(kind, declared_name, expected_total_bytes)
            .await
    }

    /// Append the next chunk to a session
    pub async fn append_chunk(
        &self,
        session_id: &SessionId,
        offset: u64,
        bytes: Bytes,
    ) -> MediaResult<AppendAck> {
        self.coordinator.append(session_id, offset, bytes).await
    }

    /// Assemble a completed session, write it durably, and attach previews.
    ///
    /// Preview generation is best-effort: a failure is logged and the
    /// receipt simply carries no preview key. The durable write is never
    /// rolled back for a preview failure.
    pub async fn finalize_upload(&self, session_id: &SessionId) -> MediaResult<MediaReceipt> {
        let assembled = self.coordinator.finalize(session_id).await?;
        self.store_with_previews(
            &assembled.target_key,
            assembled.kind,
            &assembled.content_type,
            assembled.bytes,
        )
        .await
    }

    /// Single-shot upload for payloads below the chunking threshold
    pub async fn upload(
        &self,
        kind: MediaKind,
        declared_name: &str,
        bytes: Bytes,
    ) -> MediaResult<MediaReceipt> {
        if bytes.is_empty() {
            return Err(MediaError::invalid("payload is empty"));
        }
        if bytes.len() as u64 >= self.config.inline_threshold_bytes {
            return Err(MediaError::invalid(format!(
                "payload of {} bytes requires the chunked upload path (threshold {})",
                bytes.len(),
                self.config.inline_threshold_bytes
            )));
        }

        let generated = self.resolver.generated_object_name(declared_name);
        let key = self.resolver.canonical_key(&generated, kind)?;
        let content_type = content_type_for_key(&key).to_string();

        self.store_with_previews(&key, kind, &content_type, bytes)
            .await
    }

    /// Resolve a reference against the fallback chain and return the first
    /// hit
    pub async fn serve(&self, reference: &str) -> MediaResult<ServedMedia> {
        for candidate in self.resolver.candidate_keys_for(reference) {
            if let Some(fetched) = self.guard.get_or_not_found(&candidate).await? {
                debug!(reference, key = %candidate, "reference resolved");
                return Ok(ServedMedia {
                    key: candidate,
                    bytes: fetched.bytes,
                    content_type: fetched.content_type,
                });
            }
        }
        Err(MediaError::not_found(reference))
    }

    /// Delete a media object and its derived previews.
    ///
    /// Invoked when the owning post or message is deleted. Reports the
    /// primary key's outcome; an already-absent target is never an error.
    pub async fn delete_media(&self, key: &str) -> MediaResult<DeleteOutcome> {
        let outcome = self.guard.delete_idempotent(key).await?;

        // Both preview spellings are probed; deletes are idempotent so a
        // miss costs nothing
        let derived = [
            self.resolver.thumbnail_key_for(key, MediaKind::Image),
            self.resolver.thumbnail_key_for(key, MediaKind::Video),
        ];
        for derived_key in derived {
            match self.guard.delete_idempotent(&derived_key).await {
                Ok(derived_outcome) => {
                    debug!(key = %derived_key, ?derived_outcome, "derived asset delete");
                }
                Err(e) => {
                    warn!(key = %derived_key, error = %e, "derived asset delete failed");
                }
            }
        }

        Ok(outcome)
    }

    /// Get configuration
    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    async fn store_with_previews(
        &self,
        key: &str,
        kind: MediaKind,
        content_type: &str,
        bytes: Bytes,
    ) -> MediaResult<MediaReceipt> {
        self.guard
            .put_durable(key, bytes.clone(), content_type)
            .await?;

        let mut receipt = MediaReceipt::new(
            key.to_string(),
            kind,
            bytes.len() as u64,
            content_type.to_string(),
        );

        match self.generate_preview(kind, content_type, bytes).await {
            Ok(preview) => {
                let preview_key = self.resolver.thumbnail_key_for(key, kind);
                match self
                    .guard
                    .put_durable(&preview_key, Bytes::from(preview), "image/jpeg")
                    .await
                {
                    Ok(()) => {
                        receipt = match kind {
                            MediaKind::Image => receipt.with_thumbnail_key(preview_key),
                            MediaKind::Video => receipt.with_poster_key(preview_key),
                        };
                    }
                    Err(e) => {
                        warn!(key, error = %e, "preview write failed, media stored without preview");
                    }
                }
            }
            Err(e) => {
                warn!(key, error = %e, "preview generation failed, media stored without preview");
            }
        }

        Ok(receipt)
    }

    async fn generate_preview(
        &self,
        kind: MediaKind,
        content_type: &str,
        bytes: Bytes,
    ) -> MediaResult<Vec<u8>> {
        match kind {
            MediaKind::Image => {
                let service = Arc::clone(&self.thumbnails);
                let declared = content_type.to_string();
                // Decode and resize are CPU-bound
                tokio::task::spawn_blocking(move || {
                    service.generate_image_thumbnail(&bytes, &declared)
                })
                .await
                .map_err(|e| MediaError::unsupported_image(format!("preview task failed: {}", e)))?
            }
            MediaKind::Video => self.thumbnails.generate_video_poster(&bytes).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBlobStore;

    fn adapter() -> MediaAdapter {
        MediaAdapter::new(MemoryBlobStore::new(), MediaConfig::default())
    }

    #[tokio::test]
    async fn test_upload_rejects_payload_at_threshold() {
        let adapter = MediaAdapter::new(
            MemoryBlobStore::new(),
            MediaConfig::default().with_inline_threshold(8),
        );
        let err = adapter
            .upload(MediaKind::Image, "big.jpg", Bytes::from_static(b"12345678"))
            .await;
        assert!(matches!(err, Err(MediaError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_upload_rejects_empty_payload() {
        let err = adapter()
            .upload(MediaKind::Image, "empty.jpg", Bytes::new())
            .await;
        assert!(matches!(err, Err(MediaError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_serve_unknown_reference_is_not_found() {
        let err = adapter().serve("never-uploaded.jpg").await;
        assert!(matches!(err, Err(MediaError::NotFound { .. })));
    }
}
