//! Validation gate
//!
//! Decides whether an uploaded file may enter the pipeline. Checks run in a
//! fixed order (presence, extension, declared kind, size, emptiness,
//! content probe) and the first failure wins.
//!
//! Expected rejections come back as `Ok(ValidationResult { is_valid: false, .. })`.
//! Only unexpected I/O faults are returned as `Err`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::{FileType, MediaKind};
use crate::error::ProcessingError;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Bytes read from the head of a video for container sniffing.
const VIDEO_PROBE_BYTES: u64 = 8 * 1024;

/// Container types accepted for video uploads, as reported by `infer`.
const VIDEO_CONTAINERS: &[&str] = &[
    "video/mp4",
    "video/quicktime",
    "video/x-matroska",
    "video/webm",
    "video/x-m4v",
];

/// Allow-lists and limits applied by [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub max_file_size_bytes: u64,
    /// Lowercase extensions without the leading dot.
    pub image_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 50 * BYTES_PER_MB,
            image_extensions: vec!["jpg".into(), "jpeg".into(), "png".into()],
            video_extensions: vec!["mp4".into(), "mov".into(), "mkv".into()],
        }
    }
}

impl ValidationPolicy {
    /// Kind implied by an extension, if it is on either allow-list.
    pub fn kind_for_extension(&self, extension: &str) -> Option<MediaKind> {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        if self.image_extensions.iter().any(|e| *e == ext) {
            Some(MediaKind::Image)
        } else if self.video_extensions.iter().any(|e| *e == ext) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    fn extensions_for(&self, kind: MediaKind) -> &[String] {
        match kind {
            MediaKind::Image => &self.image_extensions,
            MediaKind::Video => &self.video_extensions,
        }
    }

    fn supported_list(&self) -> String {
        self.image_extensions
            .iter()
            .chain(self.video_extensions.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn max_file_size_mb(&self) -> u64 {
        self.max_file_size_bytes / BYTES_PER_MB
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Missing,
    NotAFile,
    File { size: u64 },
}

/// An uploaded file as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    path: PathBuf,
    declared: Option<MediaKind>,
    presence: Presence,
}

impl MediaAsset {
    /// Stat `path`. A missing file is not an error here; [`validate`]
    /// reports it as an expected rejection.
    pub async fn from_path(
        path: impl AsRef<Path>,
        declared: Option<MediaKind>,
    ) -> Result<Self, ProcessingError> {
        let path = path.as_ref().to_path_buf();
        let presence = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Presence::File { size: meta.len() },
            Ok(_) => Presence::NotAFile,
            Err(e) if e.kind() == ErrorKind::NotFound => Presence::Missing,
            Err(e) => {
                return Err(ProcessingError::validation(format!(
                    "failed to read metadata for {}: {e}",
                    path.display()
                )))
            }
        };
        Ok(Self {
            path,
            declared,
            presence,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn declared(&self) -> Option<MediaKind> {
        self.declared
    }

    /// Size in bytes; 0 when the file does not exist.
    pub fn size(&self) -> u64 {
        match self.presence {
            Presence::File { size } => size,
            _ => 0,
        }
    }

    pub fn exists(&self) -> bool {
        !matches!(self.presence, Presence::Missing)
    }

    /// Lowercase extension without the dot.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// The declared kind, or the one implied by the extension.
    pub fn kind(&self, policy: &ValidationPolicy) -> Option<MediaKind> {
        self.declared
            .or_else(|| self.extension().and_then(|e| policy.kind_for_extension(&e)))
    }
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub file_type: FileType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub file_size: u64,
}

impl ValidationResult {
    fn accepted(file_type: FileType, file_size: u64) -> Self {
        Self {
            is_valid: true,
            file_type,
            error_message: None,
            file_size,
        }
    }

    fn rejected(file_type: FileType, message: impl Into<String>, file_size: u64) -> Self {
        Self {
            is_valid: false,
            file_type,
            error_message: Some(message.into()),
            file_size,
        }
    }

    /// The rejection as a validation error, if this result is a rejection.
    pub fn into_error(self) -> Option<ProcessingError> {
        if self.is_valid {
            return None;
        }
        let message = self
            .error_message
            .unwrap_or_else(|| "file rejected".to_string());
        Some(ProcessingError::validation(message))
    }
}

/// Apply `policy` to `asset`.
pub async fn validate(
    asset: &MediaAsset,
    policy: &ValidationPolicy,
) -> Result<ValidationResult, ProcessingError> {
    let size = asset.size();

    match asset.presence {
        Presence::Missing => {
            return Ok(ValidationResult::rejected(
                FileType::Unknown,
                format!("file not found: {}", asset.path.display()),
                0,
            ))
        }
        Presence::NotAFile => {
            return Ok(ValidationResult::rejected(
                FileType::Unknown,
                format!(
                    "file is corrupted or unreadable: {} is not a regular file",
                    asset.path.display()
                ),
                0,
            ))
        }
        Presence::File { .. } => {}
    }

    let extension = asset.extension().unwrap_or_default();
    let Some(kind) = policy.kind_for_extension(&extension) else {
        let shown = if extension.is_empty() {
            "(no extension)".to_string()
        } else {
            format!(".{extension}")
        };
        return Ok(ValidationResult::rejected(
            FileType::Unknown,
            format!(
                "unsupported file type {shown} (supported: {})",
                policy.supported_list()
            ),
            size,
        ));
    };

    if let Some(declared) = asset.declared {
        if declared != kind {
            return Ok(ValidationResult::rejected(
                FileType::Unknown,
                format!(
                    "unsupported file type .{extension} for {declared} upload (supported: {})",
                    policy.extensions_for(declared).join(", ")
                ),
                size,
            ));
        }
    }

    let file_type = FileType::from(kind);

    if size > policy.max_file_size_bytes {
        return Ok(ValidationResult::rejected(
            file_type,
            format!(
                "file size {:.2} MB exceeds limit of {} MB",
                size as f64 / BYTES_PER_MB as f64,
                policy.max_file_size_mb()
            ),
            size,
        ));
    }

    if size == 0 {
        return Ok(ValidationResult::rejected(
            file_type,
            "file is corrupted or unreadable: file is empty",
            size,
        ));
    }

    let probe = match kind {
        MediaKind::Image => probe_image(&asset.path).await,
        MediaKind::Video => probe_video(&asset.path).await,
    };
    if let Err(reason) = probe {
        return Ok(ValidationResult::rejected(
            file_type,
            format!("file is corrupted or unreadable: {reason}"),
            size,
        ));
    }

    debug!(path = %asset.path.display(), %kind, size, "media validated");
    Ok(ValidationResult::accepted(file_type, size))
}

/// Sniff the format from content bytes and read the dimensions.
async fn probe_image(path: &Path) -> Result<(), String> {
    let path = path.to_path_buf();
    let outcome = tokio::task::spawn_blocking(move || {
        let reader = image::ImageReader::open(&path)
            .map_err(|e| e.to_string())?
            .with_guessed_format()
            .map_err(|e| e.to_string())?;
        if reader.format().is_none() {
            return Err("content is not a recognised image format".to_string());
        }
        let (width, height) = reader.into_dimensions().map_err(|e| e.to_string())?;
        if width == 0 || height == 0 {
            return Err(format!("image has degenerate size {width}x{height}"));
        }
        Ok(())
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(e) => Err(format!("image probe task failed: {e}")),
    }
}

/// Recognise the container from its magic bytes.
async fn probe_video(path: &Path) -> Result<(), String> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| e.to_string())?;
    let mut head = Vec::with_capacity(VIDEO_PROBE_BYTES as usize);
    file.take(VIDEO_PROBE_BYTES)
        .read_to_end(&mut head)
        .await
        .map_err(|e| e.to_string())?;

    match infer::get(&head) {
        Some(kind) if VIDEO_CONTAINERS.contains(&kind.mime_type()) => Ok(()),
        Some(kind) => Err(format!(
            "content is {}, not a video container",
            kind.mime_type()
        )),
        None => Err("content is not a recognised video container".to_string()),
    }
}
