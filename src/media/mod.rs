//! Media intake
//!
//! - [`validate`]: type, size and integrity policy for an uploaded file
//! - [`normalize`]: reduce an image or a video to one RGB8 still frame
//! - [`ffmpeg`]: frame extraction through the system ffprobe/ffmpeg binaries
//! - [`scratch`]: per-invocation temporary directory

pub mod ffmpeg;
pub mod normalize;
pub mod scratch;
pub mod validate;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use ffmpeg::FfmpegFrameExtractor;
pub use normalize::{
    extract_frame, load_image, midpoint_frame_index, FrameExtractor, FrameSource, MediaNormalizer,
    NormalizedFrame,
};
pub use scratch::ScratchSpace;
pub use validate::{validate, MediaAsset, ValidationPolicy, ValidationResult};

/// What the caller says a file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" | "photo" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            other => Err(format!("unknown media type '{other}' (expected image or video)")),
        }
    }
}

/// What validation determined a file to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
    Unknown,
}

impl From<MediaKind> for FileType {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Image => FileType::Image,
            MediaKind::Video => FileType::Video,
        }
    }
}

impl FileType {
    pub fn kind(&self) -> Option<MediaKind> {
        match self {
            FileType::Image => Some(MediaKind::Image),
            FileType::Video => Some(MediaKind::Video),
            FileType::Unknown => None,
        }
    }
}
