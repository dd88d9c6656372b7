//! Typed configuration structures
//!
//! Every section is optional in the file; missing fields take the defaults
//! below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::media::ValidationPolicy;
use crate::resilience::RetryPolicy;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
    pub vision: VisionConfig,
    pub bedrock: BedrockConfig,
    pub ffmpeg: FfmpegConfig,
}

impl Config {
    /// Validate the configuration, collecting every violation.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if let Err(mut e) = self.pipeline.validate() {
            errors.append(&mut e);
        }
        if self.vision.model.trim().is_empty() {
            errors.push("vision.model must not be empty".to_string());
        }
        if url::Url::parse(&self.vision.base_url).is_err() {
            errors.push(format!(
                "vision.base_url is not a valid URL: {}",
                self.vision.base_url
            ));
        }
        if self.bedrock.model_id.trim().is_empty() {
            errors.push("bedrock.model_id must not be empty".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Options recognised by the media-to-content pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on the uploaded file size, in MiB.
    pub max_file_size_mb: u64,
    pub supported_image_formats: Vec<String>,
    pub supported_video_formats: Vec<String>,
    /// Maximum whitespace-separated words per caption.
    pub caption_max_words: usize,
    /// Exact number of hashtags to produce.
    pub hashtag_count: usize,
    /// Timeout for each external call (classification, generation, ffmpeg).
    pub timeout_seconds: u64,
    /// Total attempts for a transiently failing call, including the first.
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Hard deadline for a whole invocation.
    pub overall_timeout_seconds: u64,
    /// Soft processing-time targets; exceeding them only logs a warning.
    pub image_budget_seconds: u64,
    pub video_budget_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 50,
            supported_image_formats: vec!["jpg".into(), "jpeg".into(), "png".into()],
            supported_video_formats: vec!["mp4".into(), "mov".into(), "mkv".into()],
            caption_max_words: 12,
            hashtag_count: 15,
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8_000,
            overall_timeout_seconds: 120,
            image_budget_seconds: 10,
            video_budget_seconds: 15,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.max_file_size_mb == 0 {
            errors.push("pipeline.max_file_size_mb must be at least 1".to_string());
        }
        if self.supported_image_formats.is_empty() && self.supported_video_formats.is_empty() {
            errors.push("at least one supported image or video format is required".to_string());
        }
        if self.caption_max_words == 0 {
            errors.push("pipeline.caption_max_words must be at least 1".to_string());
        }
        if self.hashtag_count == 0 {
            errors.push("pipeline.hashtag_count must be at least 1".to_string());
        }
        if self.timeout_seconds == 0 {
            errors.push("pipeline.timeout_seconds must be at least 1".to_string());
        }
        if self.retry_attempts == 0 {
            errors.push("pipeline.retry_attempts must be at least 1".to_string());
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            errors.push(
                "pipeline.retry_max_delay_ms must not be smaller than retry_base_delay_ms"
                    .to_string(),
            );
        }
        if self.overall_timeout_seconds < self.timeout_seconds {
            errors.push(
                "pipeline.overall_timeout_seconds must not be smaller than timeout_seconds"
                    .to_string(),
            );
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            max_file_size_bytes: self.max_file_size_mb.saturating_mul(1024 * 1024),
            image_extensions: lowercase_all(&self.supported_image_formats),
            video_extensions: lowercase_all(&self.supported_video_formats),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_seconds)
    }
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "captionforge=debug".
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Remote image-classification endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// How many ranked labels to keep as alternatives.
    pub top_k: usize,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-inference.huggingface.co".to_string(),
            model: "google/vit-base-patch16-224".to_string(),
            api_key: None,
            top_k: 5,
        }
    }
}

/// AWS Bedrock text generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BedrockConfig {
    pub region: String,
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            model_id: "amazon.nova-lite-v1:0".to_string(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            max_tokens: 512,
            temperature: Some(0.7),
        }
    }
}

/// Locations of the ffmpeg tools used for video frame extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_file_size_mb, 50);
        assert_eq!(config.supported_image_formats, vec!["jpg", "jpeg", "png"]);
        assert_eq!(config.supported_video_formats, vec!["mp4", "mov", "mkv"]);
        assert_eq!(config.caption_max_words, 12);
        assert_eq!(config.hashtag_count, 15);
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.retry_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = PipelineConfig {
            max_file_size_mb: 0,
            caption_max_words: 0,
            retry_attempts: 0,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("max_file_size_mb")));
        assert!(errors.iter().any(|e| e.contains("caption_max_words")));
        assert!(errors.iter().any(|e| e.contains("retry_attempts")));
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let config = PipelineConfig {
            retry_base_delay_ms: 5_000,
            retry_max_delay_ms: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_root_validate_reports_bad_vision_url() {
        let mut config = Config::default();
        config.vision.base_url = "not a url".to_string();
        let errors = config.validate().unwrap_err();
        assert!(errors[0].contains("vision.base_url"));
    }

    #[test]
    fn test_validation_policy_normalises_extensions() {
        let config = PipelineConfig {
            supported_image_formats: vec![".JPG".into(), " png ".into(), "".into()],
            ..Default::default()
        };
        let policy = config.validation_policy();
        assert_eq!(policy.image_extensions, vec!["jpg", "png"]);
        assert_eq!(policy.max_file_size_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = PipelineConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_millis(8_000));
    }

    #[test]
    fn test_partial_section_deserializes_with_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"pipeline": {"hashtag_count": 10}}"#).unwrap();
        assert_eq!(config.pipeline.hashtag_count, 10);
        assert_eq!(config.pipeline.caption_max_words, 12);
        assert_eq!(config.bedrock.model_id, "amazon.nova-lite-v1:0");
    }

    #[test]
    fn test_log_format_lowercase() {
        let logging: LoggingConfig =
            serde_json::from_str(r#"{"level": "debug", "format": "json"}"#).unwrap();
        assert_eq!(logging.format, LogFormat::Json);
        assert_eq!(logging.level, "debug");
    }
}
