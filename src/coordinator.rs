use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::store::content_type_for_key;
use crate::{
    AppendAck, AssembledUpload, BeginUploadAck, KeyResolver, MediaConfig, MediaError, MediaKind,
    MediaResult, SessionId, UploadSession,
};

type SessionTable = HashMap<String, Arc<Mutex<UploadSession>>>;

/// Coordinates chunked upload sessions.
///
/// Chunking exists to bound per-request latency and memory for large video
/// files; small payloads go through the adapter's single-shot path instead.
/// Each session's entry is its own mutex, so appends for the same session
/// serialize (preserving the gapless-offset invariant) while different
/// sessions proceed fully in parallel. Finalize takes the same lock before
/// checking completeness, making it exclusive with any in-flight append.
pub struct UploadCoordinator {
    sessions: Mutex<SessionTable>,
    resolver: KeyResolver,
    config: MediaConfig,
}

impl UploadCoordinator {
    pub fn new(resolver: KeyResolver, config: MediaConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            resolver,
            config,
        }
    }

    /// Open a session and allocate its target key.
    ///
    /// The key is chosen once here and never reused across attempts; a
    /// retried upload opens a new session and therefore writes a new key.
    pub async fn begin(
        &self,
        kind: MediaKind,
        declared_name: &str,
        expected_total_bytes: u64,
    ) -> MediaResult<BeginUploadAck> {
        if expected_total_bytes == 0 {
            return Err(MediaError::invalid("expected size must be non-zero"));
        }
        if expected_total_bytes > self.config.max_media_bytes {
            return Err(MediaError::invalid(format!(
                "expected size {} exceeds maximum {}",
                expected_total_bytes, self.config.max_media_bytes
            )));
        }

        let generated = self.resolver.generated_object_name(declared_name);
        let target_key = self.resolver.canonical_key(&generated, kind)?;
        let content_type = content_type_for_key(&target_key).to_string();

        let session_id = SessionId::new();
        let session = UploadSession::new(
            session_id.clone(),
            target_key.clone(),
            kind,
            content_type,
            expected_total_bytes,
        );

        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            session_id.to_string(),
            Arc::new(Mutex::new(session)),
        );
        debug!(%session_id, key = %target_key, expected_total_bytes, "upload session opened");

        Ok(BeginUploadAck {
            session_id,
            target_key,
        })
    }

    /// Accept the next chunk for a session.
    pub async fn append(
        &self,
        session_id: &SessionId,
        offset: u64,
        bytes: Bytes,
    ) -> MediaResult<AppendAck> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.lock().await;

        if session.is_closed() {
            return Err(MediaError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        if session.is_expired(self.config.session_idle_timeout) {
            drop(session);
            self.remove(session_id).await;
            return Err(MediaError::SessionExpired {
                session_id: session_id.to_string(),
            });
        }

        session.append_chunk(offset, bytes)
    }

    /// Close a session and hand back the assembled payload.
    ///
    /// On an incomplete byte count the session stays open; the caller can
    /// keep appending until the idle deadline abandons it.
    pub async fn finalize(&self, session_id: &SessionId) -> MediaResult<AssembledUpload> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.lock().await;

        if session.is_closed() {
            return Err(MediaError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        if session.is_expired(self.config.session_idle_timeout) {
            drop(session);
            self.remove(session_id).await;
            return Err(MediaError::SessionExpired {
                session_id: session_id.to_string(),
            });
        }

        let bytes = session.close()?;
        let assembled = AssembledUpload {
            target_key: session.target_key.clone(),
            kind: session.kind,
            content_type: session.content_type.clone(),
            bytes,
        };
        drop(session);
        self.remove(session_id).await;
        debug!(%session_id, key = %assembled.target_key, size = assembled.bytes.len(), "upload assembled");

        Ok(assembled)
    }

    /// Drop sessions idle past the deadline, releasing their buffers.
    /// Entries locked by an in-flight call are left for the next sweep.
    pub async fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| match entry.try_lock() {
            Ok(session) => !session.is_expired(self.config.session_idle_timeout),
            Err(_) => true,
        });
        let swept = before - sessions.len();
        if swept > 0 {
            info!(swept, "abandoned upload sessions released");
        }
        swept
    }

    /// Spawn the background sweeper. Runs until the token is cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let interval = coordinator.config.sweep_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("session sweeper shutting down");
                        return;
                    }
                    _ = tokio::time::sleep(interval) => {
                        coordinator.sweep_expired().await;
                    }
                }
            }
        })
    }

    async fn entry(&self, session_id: &SessionId) -> MediaResult<Arc<Mutex<UploadSession>>> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(session_id.as_str())
            .cloned()
            .ok_or_else(|| MediaError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    async fn remove(&self, session_id: &SessionId) {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(session_id.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn coordinator() -> UploadCoordinator {
        UploadCoordinator::new(KeyResolver::new("media"), MediaConfig::default())
    }

    fn coordinator_with_timeout(idle: Duration) -> UploadCoordinator {
        UploadCoordinator::new(
            KeyResolver::new("media"),
            MediaConfig::default().with_session_idle_timeout(idle),
        )
    }

    #[tokio::test]
    async fn test_full_upload_assembles_bytes_in_order() {
        let coordinator = coordinator();
        let ack = coordinator
            .begin(MediaKind::Image, "photo.jpg", 10)
            .await
            .unwrap();

        coordinator
            .append(&ack.session_id, 0, Bytes::from_static(b"01234"))
            .await
            .unwrap();
        let append_ack = coordinator
            .append(&ack.session_id, 5, Bytes::from_static(b"56789"))
            .await
            .unwrap();
        assert_eq!(append_ack.received_bytes, 10);

        let assembled = coordinator.finalize(&ack.session_id).await.unwrap();
        assert_eq!(&assembled.bytes[..], b"0123456789");
        assert_eq!(assembled.target_key, ack.target_key);
        assert_eq!(assembled.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_first_chunk_must_start_at_zero() {
        let coordinator = coordinator();
        let ack = coordinator
            .begin(MediaKind::Image, "photo.jpg", 10)
            .await
            .unwrap();

        let err = coordinator
            .append(&ack.session_id, 5, Bytes::from_static(b"56789"))
            .await;
        assert!(matches!(
            err,
            Err(MediaError::OutOfOrderChunk { expected: 0, got: 5 })
        ));
    }

    #[tokio::test]
    async fn test_finalize_incomplete_leaves_session_open() {
        let coordinator = coordinator();
        let ack = coordinator
            .begin(MediaKind::Image, "photo.jpg", 10)
            .await
            .unwrap();
        coordinator
            .append(&ack.session_id, 0, Bytes::from_static(b"01234"))
            .await
            .unwrap();

        let err = coordinator.finalize(&ack.session_id).await;
        assert!(matches!(err, Err(MediaError::IncompleteUpload { .. })));

        // Session is still usable
        coordinator
            .append(&ack.session_id, 5, Bytes::from_static(b"56789"))
            .await
            .unwrap();
        coordinator.finalize(&ack.session_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_finalized_session_is_gone() {
        let coordinator = coordinator();
        let ack = coordinator
            .begin(MediaKind::Image, "photo.jpg", 3)
            .await
            .unwrap();
        coordinator
            .append(&ack.session_id, 0, Bytes::from_static(b"abc"))
            .await
            .unwrap();
        coordinator.finalize(&ack.session_id).await.unwrap();

        let err = coordinator
            .append(&ack.session_id, 3, Bytes::from_static(b"d"))
            .await;
        assert!(matches!(err, Err(MediaError::SessionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_idle_session_expires_on_access() {
        let coordinator = coordinator_with_timeout(Duration::from_millis(10));
        let ack = coordinator
            .begin(MediaKind::Video, "clip.mp4", 10)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        let err = coordinator
            .append(&ack.session_id, 0, Bytes::from_static(b"01234"))
            .await;
        assert!(matches!(err, Err(MediaError::SessionExpired { .. })));

        // A second touch sees the removed session
        let err = coordinator
            .append(&ack.session_id, 0, Bytes::from_static(b"01234"))
            .await;
        assert!(matches!(err, Err(MediaError::SessionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_sweeper_releases_idle_sessions() {
        let coordinator = coordinator_with_timeout(Duration::from_millis(10));
        coordinator
            .begin(MediaKind::Image, "a.jpg", 10)
            .await
            .unwrap();
        coordinator
            .begin(MediaKind::Image, "b.jpg", 10)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(coordinator.sweep_expired().await, 2);
        assert_eq!(coordinator.sweep_expired().await, 0);
    }

    #[tokio::test]
    async fn test_background_sweeper_abandons_idle_sessions() {
        let coordinator = Arc::new(UploadCoordinator::new(
            KeyResolver::new("media"),
            MediaConfig::default()
                .with_session_idle_timeout(Duration::from_millis(5))
                .with_sweep_interval(Duration::from_millis(10)),
        ));
        let ack = coordinator
            .begin(MediaKind::Image, "a.jpg", 10)
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let handle = coordinator.spawn_sweeper(cancel.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;

        // The sweeper already removed the session, so access reports it gone
        let err = coordinator
            .append(&ack.session_id, 0, Bytes::from_static(b"x"))
            .await;
        assert!(matches!(err, Err(MediaError::SessionNotFound { .. })));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_begin_rejects_zero_and_oversize() {
        let coordinator = coordinator();
        assert!(matches!(
            coordinator.begin(MediaKind::Image, "a.jpg", 0).await,
            Err(MediaError::Invalid { .. })
        ));
        assert!(matches!(
            coordinator
                .begin(MediaKind::Image, "a.jpg", u64::MAX)
                .await,
            Err(MediaError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_sessions_are_independent() {
        let coordinator = Arc::new(coordinator());
        let a = coordinator
            .begin(MediaKind::Image, "a.jpg", 5)
            .await
            .unwrap();
        let b = coordinator
            .begin(MediaKind::Image, "b.jpg", 5)
            .await
            .unwrap();
        assert_ne!(a.target_key, b.target_key);

        let ca = Arc::clone(&coordinator);
        let sa = a.session_id.clone();
        let ta = tokio::spawn(async move {
            ca.append(&sa, 0, Bytes::from_static(b"aaaaa")).await
        });
        let cb = Arc::clone(&coordinator);
        let sb = b.session_id.clone();
        let tb = tokio::spawn(async move {
            cb.append(&sb, 0, Bytes::from_static(b"bbbbb")).await
        });
        ta.await.unwrap().unwrap();
        tb.await.unwrap().unwrap();

        let assembled = coordinator.finalize(&a.session_id).await.unwrap();
        assert_eq!(&assembled.bytes[..], b"aaaaa");
    }
}
