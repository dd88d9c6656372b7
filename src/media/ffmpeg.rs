//! Frame extraction through the system `ffprobe` and `ffmpeg` binaries.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::normalize::FrameExtractor;
use crate::config::FfmpegConfig;
use crate::error::CapabilityError;

/// [`FrameExtractor`] backed by ffprobe (frame count) and ffmpeg (frame dump).
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegFrameExtractor {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(config: &FfmpegConfig) -> Self {
        Self::new(&config.ffmpeg_path, &config.ffprobe_path)
    }
}

impl Default for FfmpegFrameExtractor {
    fn default() -> Self {
        Self::from_config(&FfmpegConfig::default())
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    nb_read_packets: Option<String>,
    nb_frames: Option<String>,
}

/// Frame count from `ffprobe -of json` output: the counted packets when
/// present, otherwise the container's `nb_frames`. No video stream means 0.
fn parse_frame_count(stdout: &[u8]) -> Result<u64, CapabilityError> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| CapabilityError::Permanent(format!("unreadable ffprobe output: {e}")))?;
    let Some(stream) = probe.streams.first() else {
        return Ok(0);
    };
    let count = stream
        .nb_read_packets
        .as_deref()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .or_else(|| {
            stream
                .nb_frames
                .as_deref()
                .and_then(|v| v.trim().parse::<u64>().ok())
        })
        .unwrap_or(0);
    Ok(count)
}

fn spawn_error(program: &Path, err: std::io::Error) -> CapabilityError {
    match err.kind() {
        ErrorKind::NotFound => CapabilityError::Permanent(format!(
            "{} not found; install ffmpeg or set ffmpeg.ffmpeg_path/ffprobe_path",
            program.display()
        )),
        ErrorKind::PermissionDenied => {
            CapabilityError::Permanent(format!("{} is not executable: {err}", program.display()))
        }
        _ => CapabilityError::Unavailable(format!(
            "failed to run {}: {err}",
            program.display()
        )),
    }
}

fn failure(program: &Path, output: &Output) -> CapabilityError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let last_line = stderr.lines().last().unwrap_or("").trim();
    CapabilityError::Permanent(format!(
        "{} exited with code {}: {last_line}",
        program.display(),
        output.status.code().unwrap_or(-1)
    ))
}

async fn run(program: &Path, mut command: Command) -> Result<Output, CapabilityError> {
    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| spawn_error(program, e))?;
    if !output.status.success() {
        return Err(failure(program, &output));
    }
    Ok(output)
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn frame_count(&self, video: &Path) -> Result<u64, CapabilityError> {
        let mut command = Command::new(&self.ffprobe);
        command
            .args(["-v", "error", "-select_streams", "v:0", "-count_packets"])
            .args(["-show_entries", "stream=nb_read_packets,nb_frames"])
            .args(["-of", "json"])
            .arg(video);
        let output = run(&self.ffprobe, command).await?;
        let count = parse_frame_count(&output.stdout)?;
        debug!(video = %video.display(), count, "probed frame count");
        Ok(count)
    }

    async fn write_frame(
        &self,
        video: &Path,
        index: u64,
        dest: &Path,
    ) -> Result<(), CapabilityError> {
        let select = format!("select=eq(n\\,{index})");
        let mut command = Command::new(&self.ffmpeg);
        command
            .args(["-v", "error", "-nostdin", "-y", "-i"])
            .arg(video)
            .args(["-vf", select.as_str(), "-frames:v", "1"])
            .arg(dest);
        run(&self.ffmpeg, command).await?;

        if !tokio::fs::try_exists(dest).await.unwrap_or(false) {
            return Err(CapabilityError::Permanent(format!(
                "ffmpeg produced no image for frame {index}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_counted_packets_preferred() {
        let out = br#"{"streams": [{"nb_read_packets": "300", "nb_frames": "299"}]}"#;
        assert_eq!(parse_frame_count(out).unwrap(), 300);
    }

    #[test]
    fn test_parse_falls_back_to_nb_frames() {
        let out = br#"{"streams": [{"nb_frames": "48"}]}"#;
        assert_eq!(parse_frame_count(out).unwrap(), 48);
    }

    #[test]
    fn test_parse_no_video_stream_is_zero() {
        assert_eq!(parse_frame_count(br#"{"streams": []}"#).unwrap(), 0);
        assert_eq!(parse_frame_count(br#"{}"#).unwrap(), 0);
    }

    #[test]
    fn test_parse_garbage_is_permanent() {
        let err = parse_frame_count(b"Invalid data found").unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_binary_is_permanent() {
        let extractor = FfmpegFrameExtractor::new(
            "/nonexistent/captionforge-ffmpeg",
            "/nonexistent/captionforge-ffprobe",
        );
        let err = extractor
            .frame_count(Path::new("clip.mp4"))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("not found"));
    }
}
