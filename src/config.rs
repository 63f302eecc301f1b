use std::time::Duration;

/// Configuration for the media ingestion pipeline
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Storage namespace prefixed onto every canonical key
    pub namespace: String,

    /// Payloads below this size bypass chunking and go through a single
    /// durable write
    pub inline_threshold_bytes: u64,

    /// Absolute max size allowed for a single media object (safety guard)
    pub max_media_bytes: u64,

    /// Idle deadline after which an upload session is abandoned and its
    /// buffered chunks released
    pub session_idle_timeout: Duration,

    /// Interval between sweeps for abandoned sessions
    pub sweep_interval: Duration,

    /// Retries for transient store failures (404s are never retried)
    pub transient_retries: u32,

    /// Base delay for exponential retry backoff
    pub retry_backoff_base: Duration,

    /// Preview generation settings
    pub thumbnail: ThumbnailConfig,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            namespace: "media".to_string(),
            inline_threshold_bytes: 4 * 1024 * 1024, // 4MB
            max_media_bytes: 512 * 1024 * 1024,      // 512MB
            session_idle_timeout: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(60),
            transient_retries: 2,
            retry_backoff_base: Duration::from_millis(200),
            thumbnail: ThumbnailConfig::default(),
        }
    }
}

impl MediaConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the storage namespace
    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the single-shot upload threshold
    pub fn with_inline_threshold(mut self, bytes: u64) -> Self {
        self.inline_threshold_bytes = bytes;
        self
    }

    /// Set the max media size
    pub fn with_max_media_bytes(mut self, bytes: u64) -> Self {
        self.max_media_bytes = bytes;
        self
    }

    /// Set the session idle deadline
    pub fn with_session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = timeout;
        self
    }

    /// Set the abandoned-session sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the transient retry budget
    pub fn with_transient_retries(mut self, retries: u32) -> Self {
        self.transient_retries = retries;
        self
    }

    /// Set preview generation settings
    pub fn with_thumbnail(mut self, thumbnail: ThumbnailConfig) -> Self {
        self.thumbnail = thumbnail;
        self
    }
}

/// Settings for thumbnail and poster generation
#[derive(Debug, Clone)]
pub struct ThumbnailConfig {
    /// Max dimension (width or height) of generated previews
    pub max_dimension: u32,

    /// JPEG quality for re-encoded previews
    pub jpeg_quality: u8,

    /// Timestamp to capture the video poster frame at
    pub poster_offset_secs: f64,

    /// Wall-clock limit for the frame-extraction process; the child is
    /// killed on overrun
    pub poster_timeout: Duration,

    /// Path to the ffmpeg binary
    pub ffmpeg_path: String,

    /// Max source size we will attempt to decode for a thumbnail
    pub max_source_bytes: usize,

    /// Max decoded dimension, guards against decompression bombs
    pub max_decode_dimension: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_dimension: 320,
            jpeg_quality: 80,
            poster_offset_secs: 1.0,
            poster_timeout: Duration::from_secs(10),
            ffmpeg_path: "ffmpeg".to_string(),
            max_source_bytes: 20 * 1024 * 1024, // 20MB
            max_decode_dimension: 16384,
        }
    }
}

impl ThumbnailConfig {
    /// Create new settings with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the max preview dimension
    pub fn with_max_dimension(mut self, dim: u32) -> Self {
        self.max_dimension = dim;
        self
    }

    /// Set the JPEG quality
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Set the poster capture timestamp
    pub fn with_poster_offset(mut self, secs: f64) -> Self {
        self.poster_offset_secs = secs;
        self
    }

    /// Set the frame-extraction timeout
    pub fn with_poster_timeout(mut self, timeout: Duration) -> Self {
        self.poster_timeout = timeout;
        self
    }

    /// Set the ffmpeg binary path
    pub fn with_ffmpeg_path<S: Into<String>>(mut self, path: S) -> Self {
        self.ffmpeg_path = path.into();
        self
    }
}
