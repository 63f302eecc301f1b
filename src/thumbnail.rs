use std::io::Cursor;
use std::path::Path;
use std::process::Stdio;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, Limits};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{MediaError, MediaResult, ThumbnailConfig};

/// Whether the frame-extraction process produced a usable frame
enum FrameOutcome {
    Written,
    /// The process succeeded but wrote nothing, which is what a seek past
    /// the end of a short clip looks like
    Empty,
}

/// Produces small raster previews for accepted media.
///
/// Images are decoded, resized to a bounded dimension, and re-encoded as
/// JPEG at fixed quality. Video posters are captured by an external ffmpeg
/// process under a hard wall-clock timeout; the source bytes live in a
/// scoped temporary directory that is removed on every exit path.
pub struct ThumbnailService {
    config: ThumbnailConfig,
}

impl ThumbnailService {
    pub fn new(config: ThumbnailConfig) -> Self {
        Self { config }
    }

    /// Resize an image to the bounded preview dimension.
    ///
    /// The declared MIME type is checked before any decode work so
    /// unsupported types fail fast. CPU-bound; call inside
    /// `spawn_blocking`.
    pub fn generate_image_thumbnail(
        &self,
        data: &[u8],
        declared_mime: &str,
    ) -> MediaResult<Vec<u8>> {
        if data.len() > self.config.max_source_bytes {
            return Err(MediaError::unsupported_image(format!(
                "source too large to process: {} bytes",
                data.len()
            )));
        }
        let format = mime_to_format(declared_mime)?;

        // Dimension limits stop a small compressed file from expanding
        // into an enormous RGBA buffer
        let mut reader = ImageReader::with_format(Cursor::new(data), format);
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.config.max_decode_dimension);
        limits.max_image_height = Some(self.config.max_decode_dimension);
        reader.limits(limits);

        let img = reader
            .decode()
            .map_err(|e| MediaError::unsupported_image(e.to_string()))?;

        self.bound_and_encode(&img)
    }

    /// Capture a poster frame from video bytes.
    ///
    /// Seeks to the configured offset; when the clip is shorter than the
    /// offset the capture is retried at zero, which clamps the seek to the
    /// clip's duration. Corrupt containers fail cleanly within the process
    /// timeout.
    pub async fn generate_video_poster(&self, data: &[u8]) -> MediaResult<Vec<u8>> {
        let scratch = tempfile::tempdir()?;
        let source = scratch.path().join("source.bin");
        let frame = scratch.path().join("poster.jpg");
        tokio::fs::write(&source, data).await?;

        let offset = self.config.poster_offset_secs;
        match self.extract_frame(&source, &frame, offset).await? {
            FrameOutcome::Written => {}
            FrameOutcome::Empty if offset > 0.0 => {
                debug!(offset, "no frame at requested offset, retrying at start");
                match self.extract_frame(&source, &frame, 0.0).await? {
                    FrameOutcome::Written => {}
                    FrameOutcome::Empty => {
                        return Err(MediaError::poster("video contains no capturable frame"));
                    }
                }
            }
            FrameOutcome::Empty => {
                return Err(MediaError::poster("video contains no capturable frame"));
            }
        }

        let frame_bytes = tokio::fs::read(&frame).await?;
        let img = image::load_from_memory_with_format(&frame_bytes, ImageFormat::Jpeg)
            .map_err(|e| MediaError::poster(format!("captured frame unreadable: {}", e)))?;
        self.bound_and_encode(&img)
    }

    /// Run ffmpeg to capture one frame at the given offset.
    async fn extract_frame(
        &self,
        source: &Path,
        output: &Path,
        offset: f64,
    ) -> MediaResult<FrameOutcome> {
        let mut child = Command::new(&self.config.ffmpeg_path)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-ss")
            .arg(format!("{:.3}", offset))
            .arg("-i")
            .arg(source)
            .arg("-frames:v")
            .arg("1")
            .arg("-q:v")
            .arg("2")
            .arg("-y")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::poster(format!("failed to spawn frame extraction: {}", e)))?;

        let status = match tokio::time::timeout(self.config.poster_timeout, child.wait()).await {
            Ok(waited) => waited?,
            Err(_) => {
                // Hard wall-clock limit: kill and reap, never leave the
                // process running
                child.start_kill().ok();
                let _ = child.wait().await;
                return Err(MediaError::poster(format!(
                    "frame extraction exceeded {}s timeout",
                    self.config.poster_timeout.as_secs()
                )));
            }
        };

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                pipe.read_to_string(&mut stderr).await.ok();
            }
            return Err(MediaError::poster(format!(
                "frame extraction exited with {}: {}",
                status,
                stderr.trim()
            )));
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(FrameOutcome::Written),
            _ => Ok(FrameOutcome::Empty),
        }
    }

    /// Resize to the preview bound if needed and encode as JPEG
    fn bound_and_encode(&self, img: &DynamicImage) -> MediaResult<Vec<u8>> {
        let max = self.config.max_dimension;
        let (w, h) = img.dimensions();

        let resized;
        let bounded = if w > max || h > max {
            resized = img.resize(max, max, FilterType::Lanczos3);
            &resized
        } else {
            img
        };

        // JPEG has no alpha channel
        let rgb = DynamicImage::ImageRgb8(bounded.to_rgb8());

        let mut out = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut out, self.config.jpeg_quality);
        rgb.write_with_encoder(encoder).map_err(|e| {
            warn!(error = %e, "preview encode failed");
            MediaError::unsupported_image(e.to_string())
        })?;
        Ok(out.into_inner())
    }
}

/// Map a declared MIME type to a decode format
fn mime_to_format(mime: &str) -> MediaResult<ImageFormat> {
    match mime {
        "image/png" => Ok(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Ok(ImageFormat::Jpeg),
        "image/gif" => Ok(ImageFormat::Gif),
        "image/webp" => Ok(ImageFormat::WebP),
        other => Err(MediaError::unsupported_image(format!(
            "undeclared or unsupported image type: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ThumbnailService {
        ThumbnailService::new(ThumbnailConfig::default())
    }

    /// Create a solid-color PNG in memory
    fn create_test_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgba8(width, height);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_large_image_is_bounded_and_jpeg() {
        let data = create_test_png(2000, 1500);
        let thumb = service()
            .generate_image_thumbnail(&data, "image/png")
            .unwrap();

        // JPEG SOI marker
        assert_eq!(&thumb[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&thumb).unwrap();
        let (w, h) = decoded.dimensions();
        assert!(w <= 320 && h <= 320);
        // Aspect ratio preserved: 4:3 source
        assert_eq!(w, 320);
        assert_eq!(h, 240);
    }

    #[test]
    fn test_small_image_is_reencoded_without_upscaling() {
        let data = create_test_png(100, 50);
        let thumb = service()
            .generate_image_thumbnail(&data, "image/png")
            .unwrap();

        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!(decoded.dimensions(), (100, 50));
    }

    #[test]
    fn test_unsupported_mime_fails_before_decode() {
        let err = service().generate_image_thumbnail(b"anything", "image/bmp");
        assert!(matches!(err, Err(MediaError::UnsupportedImage { .. })));
    }

    #[test]
    fn test_undecodable_bytes_fail() {
        let err = service().generate_image_thumbnail(b"not a png", "image/png");
        assert!(matches!(err, Err(MediaError::UnsupportedImage { .. })));
    }

    #[test]
    fn test_oversized_source_rejected() {
        let config = ThumbnailConfig::default();
        let data = vec![0u8; config.max_source_bytes + 1];
        let err = service().generate_image_thumbnail(&data, "image/png");
        assert!(matches!(err, Err(MediaError::UnsupportedImage { .. })));
    }

    #[tokio::test]
    async fn test_poster_fails_cleanly_when_extractor_missing() {
        let config = ThumbnailConfig::default()
            .with_ffmpeg_path("/nonexistent/ffmpeg-binary");
        let service = ThumbnailService::new(config);

        let err = service.generate_video_poster(b"fake video bytes").await;
        assert!(matches!(err, Err(MediaError::PosterGeneration { .. })));
    }
}
