//! Theme classification
//!
//! A [`VisualClassifier`] is any remote or local model that labels an image.
//! [`ThemeClassifier`] turns its raw top prediction into a readable theme.
//! ImageNet-style labels such as `"seashore, coast, seacoast, sea-coast"`
//! become `"seashore"`.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::{CapabilityError, ErrorCategory, ProcessingError};
use crate::media::NormalizedFrame;

pub use http::HttpVisualClassifier;

/// Top prediction exactly as the classifier returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    pub label: String,
    pub confidence: f32,
    /// Runner-up labels, best first.
    pub alternatives: Vec<String>,
}

#[async_trait]
pub trait VisualClassifier: Send + Sync {
    async fn classify(&self, frame: &NormalizedFrame) -> Result<RawPrediction, CapabilityError>;
}

/// Detected theme of one media item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThemeResult {
    pub theme: String,
    pub confidence: f32,
    pub alternative_themes: Vec<String>,
}

/// Reduce a raw label to its first synonym, with spaces for underscores and
/// collapsed whitespace.
pub fn clean_label(raw: &str) -> String {
    let first = raw.split(',').next().unwrap_or("");
    first
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Turn a raw prediction into a [`ThemeResult`].
///
/// Fails with a non-recoverable vision error when the primary label is
/// empty after cleaning.
pub fn post_process(raw: RawPrediction) -> Result<ThemeResult, ProcessingError> {
    let theme = clean_label(&raw.label);
    if theme.is_empty() {
        return Err(ProcessingError::vision(format!(
            "classifier returned an empty label ({:?})",
            raw.label
        )));
    }

    let confidence = if raw.confidence.is_finite() {
        raw.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let mut alternative_themes: Vec<String> = Vec::with_capacity(raw.alternatives.len());
    for alt in raw.alternatives.iter().map(|a| clean_label(a)) {
        if alt.is_empty() || alt == theme || alternative_themes.contains(&alt) {
            continue;
        }
        alternative_themes.push(alt);
    }

    Ok(ThemeResult {
        theme,
        confidence,
        alternative_themes,
    })
}

/// Wraps a [`VisualClassifier`] with label post-processing and error mapping.
#[derive(Clone)]
pub struct ThemeClassifier {
    classifier: Arc<dyn VisualClassifier>,
}

impl ThemeClassifier {
    pub fn new(classifier: Arc<dyn VisualClassifier>) -> Self {
        Self { classifier }
    }

    pub async fn classify(&self, frame: &NormalizedFrame) -> Result<ThemeResult, ProcessingError> {
        let raw = self
            .classifier
            .classify(frame)
            .await
            .map_err(|e| ProcessingError::from_capability(ErrorCategory::Vision, &e))?;
        let result = post_process(raw)?;
        debug!(
            theme = %result.theme,
            confidence = result.confidence,
            alternatives = result.alternative_themes.len(),
            "theme detected"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::FrameSource;

    fn raw(label: &str, confidence: f32, alternatives: &[&str]) -> RawPrediction {
        RawPrediction {
            label: label.to_string(),
            confidence,
            alternatives: alternatives.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn frame() -> NormalizedFrame {
        NormalizedFrame::from_rgb(image::RgbImage::new(1, 1), FrameSource::OriginalImage)
    }

    struct Fixed(Result<RawPrediction, CapabilityError>);

    #[async_trait]
    impl VisualClassifier for Fixed {
        async fn classify(&self, _frame: &NormalizedFrame) -> Result<RawPrediction, CapabilityError> {
            self.0.clone()
        }
    }

    #[test]
    fn test_clean_label_takes_first_synonym() {
        assert_eq!(clean_label("seashore, coast, seacoast, sea-coast"), "seashore");
        assert_eq!(clean_label("golden_retriever"), "golden retriever");
        assert_eq!(clean_label("  sports   car ,racer"), "sports car");
        assert_eq!(clean_label(", leading comma"), "");
    }

    #[test]
    fn test_post_process_filters_alternatives() {
        let result = post_process(raw(
            "seashore, coast",
            0.82,
            &["sandbar, sand bar", "seashore", "", "lakeside, lakeshore", "sandbar"],
        ))
        .unwrap();
        assert_eq!(result.theme, "seashore");
        assert_eq!(result.alternative_themes, vec!["sandbar", "lakeside"]);
    }

    #[test]
    fn test_confidence_clamped_without_floor() {
        assert_eq!(post_process(raw("cat", 1.7, &[])).unwrap().confidence, 1.0);
        assert_eq!(post_process(raw("cat", -0.2, &[])).unwrap().confidence, 0.0);
        assert_eq!(post_process(raw("cat", f32::NAN, &[])).unwrap().confidence, 0.0);
        // Low confidence still yields a theme.
        let low = post_process(raw("cat", 0.01, &[])).unwrap();
        assert_eq!(low.theme, "cat");
    }

    #[test]
    fn test_empty_label_is_fatal() {
        let err = post_process(raw(" _ , beach", 0.9, &[])).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Vision);
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_capability_timeout_is_recoverable() {
        let classifier = ThemeClassifier::new(Arc::new(Fixed(Err(CapabilityError::Timeout(
            std::time::Duration::from_secs(30),
        )))));
        let err = classifier.classify(&frame()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Vision);
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_capability_auth_failure_is_permanent() {
        let classifier = ThemeClassifier::new(Arc::new(Fixed(Err(
            CapabilityError::Unauthorized("invalid token".into()),
        ))));
        let err = classifier.classify(&frame()).await.unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_classify_success() {
        let classifier = ThemeClassifier::new(Arc::new(Fixed(Ok(raw(
            "alp",
            0.64,
            &["valley, vale", "mountain_tent"],
        )))));
        let result = classifier.classify(&frame()).await.unwrap();
        assert_eq!(result.theme, "alp");
        assert_eq!(result.alternative_themes, vec!["valley", "mountain tent"]);
    }
}
