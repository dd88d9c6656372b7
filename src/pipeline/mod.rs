//! Media-to-content pipeline
//!
//! One invocation takes one file through
//! validate → normalize → classify → generate (captions ∥ hashtags) → assemble.
//! Normalization, classification and generation calls run under the shared
//! retry and per-call timeout policy. The whole invocation is bounded by an
//! overall deadline and can be cancelled; either way nothing partial is
//! returned and the scratch directory is released.

pub mod factory;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use crate::config::PipelineConfig;
use crate::error::{ErrorCategory, ProcessingError};
use crate::generate::{ContentGenerator, ContentLimits, TextGenerator};
use crate::logging::redact::sanitize_error_message;
use crate::logging::StageTimer;
use crate::media::{
    validate, FrameExtractor, MediaAsset, MediaKind, MediaNormalizer, ScratchSpace,
    ValidationPolicy,
};
use crate::output::{assemble, FormattedOutput};
use crate::resilience::Resilience;
use crate::vision::{ThemeClassifier, VisualClassifier};

/// Soft end-to-end targets per media kind. Exceeding one only warns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingBudget {
    pub image: Duration,
    pub video: Duration,
}

impl ProcessingBudget {
    pub fn for_kind(&self, kind: MediaKind) -> Duration {
        match kind {
            MediaKind::Image => self.image,
            MediaKind::Video => self.video,
        }
    }
}

pub struct Pipeline {
    policy: ValidationPolicy,
    normalizer: MediaNormalizer,
    classifier: ThemeClassifier,
    generator: ContentGenerator,
    resilience: Resilience,
    overall_timeout: Duration,
    budget: ProcessingBudget,
}

impl Pipeline {
    pub fn new(
        config: &PipelineConfig,
        classifier: Arc<dyn VisualClassifier>,
        generator: Arc<dyn TextGenerator>,
        extractor: Arc<dyn FrameExtractor>,
    ) -> Self {
        let resilience = Resilience::new(config.retry_policy(), config.call_timeout());
        let limits = ContentLimits {
            caption_max_words: config.caption_max_words,
            hashtag_count: config.hashtag_count,
        };
        Self {
            policy: config.validation_policy(),
            normalizer: MediaNormalizer::new(extractor),
            classifier: ThemeClassifier::new(classifier),
            generator: ContentGenerator::new(generator, limits, resilience),
            resilience,
            overall_timeout: config.overall_timeout(),
            budget: ProcessingBudget {
                image: Duration::from_secs(config.image_budget_seconds),
                video: Duration::from_secs(config.video_budget_seconds),
            },
        }
    }

    pub fn validation_policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Process one file. `declared` may be omitted; the extension decides.
    pub async fn process(
        &self,
        media_path: impl AsRef<Path>,
        declared: Option<MediaKind>,
    ) -> Result<FormattedOutput, ProcessingError> {
        self.process_with_cancel(media_path, declared, CancellationToken::new())
            .await
    }

    /// Like [`Pipeline::process`], abandoning all in-flight work when
    /// `cancel` fires.
    pub async fn process_with_cancel(
        &self,
        media_path: impl AsRef<Path>,
        declared: Option<MediaKind>,
        cancel: CancellationToken,
    ) -> Result<FormattedOutput, ProcessingError> {
        let media_path = media_path.as_ref();
        let invocation = uuid::Uuid::new_v4();
        let span = tracing::info_span!("process", %invocation);
        let started = Instant::now();

        let outcome = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ProcessingError::Cancelled),
                result = tokio::time::timeout(
                    self.overall_timeout,
                    self.run(media_path, declared, started),
                ) => match result {
                    Ok(inner) => inner,
                    Err(_) => Err(ProcessingError::service_unavailable(format!(
                        "processing timed out after {}s",
                        self.overall_timeout.as_secs()
                    ))),
                },
            }
        }
        .instrument(span.clone())
        .await;

        let _entered = span.enter();
        match &outcome {
            Ok(output) => info!(
                theme = %output.theme_detected,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "processing complete"
            ),
            Err(err) => log_failure(err, started.elapsed()),
        }
        outcome
    }

    async fn run(
        &self,
        media_path: &Path,
        declared: Option<MediaKind>,
        started: Instant,
    ) -> Result<FormattedOutput, ProcessingError> {
        let timer = StageTimer::start("validate");
        let asset = MediaAsset::from_path(media_path, declared).await?;
        let validation = validate(&asset, &self.policy).await?;
        timer.finish();
        let kind = match validation.file_type.kind() {
            Some(kind) if validation.is_valid => kind,
            _ => {
                return Err(validation
                    .into_error()
                    .unwrap_or_else(|| ProcessingError::validation("unsupported file type")))
            }
        };
        info!(%kind, size = validation.file_size, "media accepted");

        let timer = StageTimer::start("normalize");
        let scratch = ScratchSpace::new()?;
        let frame = self
            .resilience
            .run("normalize", ErrorCategory::Vision, |_| {
                self.normalizer.normalize(&asset, kind, &scratch)
            })
            .await?;
        scratch.close();
        timer.finish();

        let timer = StageTimer::start("classify");
        let theme = self
            .resilience
            .run("classify", ErrorCategory::Vision, |_| {
                self.classifier.classify(&frame)
            })
            .await?;
        timer.finish();
        info!(
            theme = %theme.theme,
            confidence = theme.confidence,
            "theme detected"
        );

        let timer = StageTimer::start("generate");
        let (captions, hashtags) = self.generator.generate(&theme.theme).await;
        timer.finish();
        let captions = captions?;
        let hashtags = hashtags?;

        let elapsed = started.elapsed();
        let budget = self.budget.for_kind(kind);
        if elapsed > budget {
            warn!(
                %kind,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = budget.as_millis() as u64,
                "processing exceeded its time budget"
            );
        }
        Ok(assemble(captions, &hashtags, &theme, elapsed))
    }
}

/// One diagnostic event per failed invocation. The message is redacted and
/// truncated; generated text and media bytes never reach the log.
fn log_failure(err: &ProcessingError, elapsed: Duration) {
    error!(
        category = %err.category(),
        recoverable = err.is_recoverable(),
        attempts = err.attempts(),
        exhausted = err.is_exhausted(),
        elapsed_ms = elapsed.as_millis() as u64,
        error = %sanitize_error_message(&err.to_string()),
        "processing failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_for_kind() {
        let budget = ProcessingBudget {
            image: Duration::from_secs(10),
            video: Duration::from_secs(15),
        };
        assert_eq!(budget.for_kind(MediaKind::Image), Duration::from_secs(10));
        assert_eq!(budget.for_kind(MediaKind::Video), Duration::from_secs(15));
    }
}
