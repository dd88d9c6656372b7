//! Media normalization
//!
//! Whatever was uploaded, the classifier sees exactly one RGB8 still frame.
//! Images are decoded directly; videos contribute their midpoint frame,
//! which a [`FrameExtractor`] writes into the invocation's scratch space.

use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::{ExtendedColorType, ImageEncoder, ImageError, RgbImage};
use tracing::debug;

use super::scratch::ScratchSpace;
use super::validate::MediaAsset;
use super::MediaKind;
use crate::error::{CapabilityError, ErrorCategory, ProcessingError};

/// Where a [`NormalizedFrame`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    OriginalImage,
    VideoFrame { index: u64, total_frames: u64 },
}

/// A single decoded RGB8 still image.
#[derive(Clone, PartialEq, Eq)]
pub struct NormalizedFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    source: FrameSource,
}

impl std::fmt::Debug for NormalizedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .field("source", &self.source)
            .finish()
    }
}

impl NormalizedFrame {
    pub fn from_rgb(image: RgbImage, source: FrameSource) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            pixels: image.into_raw(),
            source,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major RGB8 bytes, `width * height * 3` long.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn source(&self) -> FrameSource {
        self.source
    }

    /// Encode as PNG for classifiers that take an image upload.
    pub fn to_png(&self) -> Result<Vec<u8>, ProcessingError> {
        let mut out = Cursor::new(Vec::new());
        image::codecs::png::PngEncoder::new(&mut out)
            .write_image(&self.pixels, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| ProcessingError::vision(format!("failed to encode frame as PNG: {e}")))?;
        Ok(out.into_inner())
    }
}

/// Reads frame counts from, and single frames out of, a video file.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Total number of video frames; 0 for a video with no frames.
    async fn frame_count(&self, video: &Path) -> Result<u64, CapabilityError>;

    /// Write frame `index` (0-based) of `video` to `dest` as an image file.
    async fn write_frame(&self, video: &Path, index: u64, dest: &Path)
        -> Result<(), CapabilityError>;
}

/// Index of the frame used to represent a video: `total / 2`.
pub fn midpoint_frame_index(total_frames: u64) -> u64 {
    total_frames / 2
}

fn io_is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
    )
}

fn decode_error(path: &Path, err: ImageError) -> ProcessingError {
    match err {
        ImageError::IoError(io) if io_is_transient(&io) => ProcessingError::vision_transient(
            format!("failed to read {}: {io}", path.display()),
        ),
        other => ProcessingError::vision(format!(
            "file is corrupted or unreadable: {}: {other}",
            path.display()
        )),
    }
}

async fn decode_rgb(path: PathBuf) -> Result<RgbImage, ProcessingError> {
    let outcome = tokio::task::spawn_blocking(move || {
        let reader = image::ImageReader::open(&path)
            .map_err(|e| decode_error(&path, ImageError::IoError(e)))?
            .with_guessed_format()
            .map_err(|e| decode_error(&path, ImageError::IoError(e)))?;
        let decoded = reader.decode().map_err(|e| decode_error(&path, e))?;
        Ok(decoded.to_rgb8())
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(e) => Err(ProcessingError::vision(format!("decode task failed: {e}"))),
    }
}

/// Decode an image asset into RGB8.
pub async fn load_image(asset: &MediaAsset) -> Result<NormalizedFrame, ProcessingError> {
    let rgb = decode_rgb(asset.path().to_path_buf()).await?;
    debug!(
        width = rgb.width(),
        height = rgb.height(),
        "image normalized"
    );
    Ok(NormalizedFrame::from_rgb(rgb, FrameSource::OriginalImage))
}

/// Pull the midpoint frame out of a video asset.
pub async fn extract_frame(
    extractor: &dyn FrameExtractor,
    asset: &MediaAsset,
    scratch: &ScratchSpace,
) -> Result<NormalizedFrame, ProcessingError> {
    let total_frames = extractor
        .frame_count(asset.path())
        .await
        .map_err(|e| ProcessingError::from_capability(ErrorCategory::Vision, &e))?;
    if total_frames == 0 {
        return Err(ProcessingError::vision(format!(
            "video has no frames: {}",
            asset.path().display()
        )));
    }

    let index = midpoint_frame_index(total_frames);
    let dest = scratch.file(&format!("frame-{index}.png"));
    extractor
        .write_frame(asset.path(), index, &dest)
        .await
        .map_err(|e| ProcessingError::from_capability(ErrorCategory::Vision, &e))?;

    let rgb = decode_rgb(dest).await?;
    debug!(
        index,
        total_frames,
        width = rgb.width(),
        height = rgb.height(),
        "video frame extracted"
    );
    Ok(NormalizedFrame::from_rgb(
        rgb,
        FrameSource::VideoFrame {
            index,
            total_frames,
        },
    ))
}

/// Dispatches on media kind to produce the single frame for classification.
#[derive(Clone)]
pub struct MediaNormalizer {
    extractor: Arc<dyn FrameExtractor>,
}

impl MediaNormalizer {
    pub fn new(extractor: Arc<dyn FrameExtractor>) -> Self {
        Self { extractor }
    }

    pub async fn normalize(
        &self,
        asset: &MediaAsset,
        kind: MediaKind,
        scratch: &ScratchSpace,
    ) -> Result<NormalizedFrame, ProcessingError> {
        match kind {
            MediaKind::Image => load_image(asset).await,
            MediaKind::Video => extract_frame(self.extractor.as_ref(), asset, scratch).await,
        }
    }
}
