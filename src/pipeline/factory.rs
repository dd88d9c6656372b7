//! Capability construction.
//!
//! Builds the remote classifier, the Bedrock text generator and the ffmpeg
//! frame extractor from [`Config`], letting environment variables override
//! the file (env first, then config).

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{BedrockConfig, Config, VisionConfig};
use crate::error::CapabilityError;
use crate::generate::bedrock::AwsCredentials;
use crate::generate::{BedrockTextGenerator, TextGenerator};
use crate::media::{FfmpegFrameExtractor, FrameExtractor};
use crate::pipeline::Pipeline;
use crate::vision::http::HttpVisualClassifier;
use crate::vision::VisualClassifier;

pub const VISION_TOKEN_ENV: &str = "HF_API_TOKEN";
pub const VISION_URL_ENV: &str = "CAPTIONFORGE_VISION_URL";

#[derive(Error, Debug)]
pub enum FactoryError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

/// First non-blank value of `name` from `lookup`, else the config value.
fn env_or(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    fallback: Option<&String>,
) -> Option<String> {
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .or_else(|| fallback.filter(|v| !v.trim().is_empty()).cloned())
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Vision settings with `HF_API_TOKEN` / `CAPTIONFORGE_VISION_URL` applied.
pub fn resolve_vision(
    config: &VisionConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> VisionConfig {
    let mut resolved = config.clone();
    resolved.api_key = env_or(&lookup, VISION_TOKEN_ENV, config.api_key.as_ref());
    if let Some(url) = env_or(&lookup, VISION_URL_ENV, None) {
        resolved.base_url = url;
    }
    resolved
}

/// Region and credentials for Bedrock. Region falls back from `AWS_REGION`
/// to `AWS_DEFAULT_REGION` to the config file.
pub fn resolve_bedrock(
    config: &BedrockConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(String, AwsCredentials), FactoryError> {
    let region = env_or(&lookup, "AWS_REGION", None)
        .or_else(|| env_or(&lookup, "AWS_DEFAULT_REGION", Some(&config.region)))
        .ok_or_else(|| FactoryError::MissingCredentials("AWS region".to_string()))?;
    let access_key = env_or(&lookup, "AWS_ACCESS_KEY_ID", config.access_key_id.as_ref())
        .ok_or_else(|| FactoryError::MissingCredentials("AWS_ACCESS_KEY_ID".to_string()))?;
    let secret_key = env_or(
        &lookup,
        "AWS_SECRET_ACCESS_KEY",
        config.secret_access_key.as_ref(),
    )
    .ok_or_else(|| FactoryError::MissingCredentials("AWS_SECRET_ACCESS_KEY".to_string()))?;

    let mut credentials = AwsCredentials::new(access_key, secret_key);
    if let Some(token) = env_or(&lookup, "AWS_SESSION_TOKEN", config.session_token.as_ref()) {
        credentials = credentials.with_session_token(token);
    }
    Ok((region, credentials))
}

pub fn build_classifier(config: &Config) -> Result<Arc<dyn VisualClassifier>, FactoryError> {
    let vision = resolve_vision(&config.vision, process_env);
    if vision.api_key.is_none() {
        warn!("no {VISION_TOKEN_ENV} set, calling the classifier anonymously");
    }
    let classifier = HttpVisualClassifier::new(&vision, config.pipeline.call_timeout())?;
    info!(endpoint = %classifier.endpoint(), "vision classifier configured");
    Ok(Arc::new(classifier))
}

/// The concrete Bedrock client, also used by `check` for connectivity.
pub fn build_bedrock(config: &Config) -> Result<BedrockTextGenerator, FactoryError> {
    let (region, credentials) = resolve_bedrock(&config.bedrock, process_env)?;
    let generator =
        BedrockTextGenerator::new(region, credentials, config.pipeline.call_timeout())?
            .with_model(config.bedrock.model_id.clone())
            .with_max_tokens(config.bedrock.max_tokens)
            .with_temperature(config.bedrock.temperature);
    info!(
        region = generator.region(),
        model = generator.model_id(),
        "bedrock text generator configured"
    );
    Ok(generator)
}

pub fn build_text_generator(config: &Config) -> Result<Arc<dyn TextGenerator>, FactoryError> {
    Ok(Arc::new(build_bedrock(config)?))
}

pub fn build_frame_extractor(config: &Config) -> Arc<dyn FrameExtractor> {
    Arc::new(FfmpegFrameExtractor::from_config(&config.ffmpeg))
}

/// A pipeline wired to the real remote services.
pub fn build_pipeline(config: &Config) -> Result<Pipeline, FactoryError> {
    Ok(Pipeline::new(
        &config.pipeline,
        build_classifier(config)?,
        build_text_generator(config)?,
        build_frame_extractor(config),
    ))
}
