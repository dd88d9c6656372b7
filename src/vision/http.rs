//! Hugging Face Inference API style image classification client.
//!
//! `POST {base_url}/models/{model}` with `{"inputs": "<base64 PNG>"}` and an
//! optional bearer token. The response is a list of `{label, score}`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

use super::{RawPrediction, VisualClassifier};
use crate::config::VisionConfig;
use crate::error::CapabilityError;
use crate::media::NormalizedFrame;

#[derive(Debug, Clone, Deserialize)]
struct LabelScore {
    label: String,
    score: f32,
}

/// Error body returned while a model is loading or misconfigured.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct HttpVisualClassifier {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    top_k: usize,
    timeout: Duration,
}

impl std::fmt::Debug for HttpVisualClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpVisualClassifier")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl HttpVisualClassifier {
    /// Build a client from config. `timeout` bounds each request at the
    /// transport level; the pipeline applies its own per-call timeout too.
    pub fn new(config: &VisionConfig, timeout: Duration) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| CapabilityError::Permanent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            top_k: config.top_k.max(1),
            timeout,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/models/{}", self.base_url, self.model)
    }
}

/// Parse a classification response into a prediction, best label first.
fn parse_predictions(body: &str, top_k: usize) -> Result<RawPrediction, CapabilityError> {
    let mut labels: Vec<LabelScore> = match serde_json::from_str::<Vec<LabelScore>>(body) {
        Ok(labels) => labels,
        Err(e) => {
            // Some deployments wrap single-image results in an extra list.
            if let Ok(mut nested) = serde_json::from_str::<Vec<Vec<LabelScore>>>(body) {
                if nested.is_empty() {
                    Vec::new()
                } else {
                    nested.swap_remove(0)
                }
            } else if let Ok(err) = serde_json::from_str::<ErrorBody>(body) {
                return Err(CapabilityError::MalformedResponse(format!(
                    "classifier error: {}",
                    err.error
                )));
            } else {
                return Err(CapabilityError::MalformedResponse(format!(
                    "unexpected classification response: {e}"
                )));
            }
        }
    };

    if labels.is_empty() {
        return Err(CapabilityError::MalformedResponse(
            "classifier returned no labels".to_string(),
        ));
    }

    labels.sort_by(|a, b| b.score.total_cmp(&a.score));
    labels.truncate(top_k.max(1));
    let mut iter = labels.into_iter();
    let Some(best) = iter.next() else {
        return Err(CapabilityError::MalformedResponse(
            "classifier returned no labels".to_string(),
        ));
    };
    Ok(RawPrediction {
        label: best.label,
        confidence: best.score,
        alternatives: iter.map(|l| l.label).collect(),
    })
}

#[async_trait]
impl VisualClassifier for HttpVisualClassifier {
    async fn classify(&self, frame: &NormalizedFrame) -> Result<RawPrediction, CapabilityError> {
        let png = frame
            .to_png()
            .map_err(|e| CapabilityError::Permanent(e.message().to_string()))?;
        let body = serde_json::json!({
            "inputs": base64::engine::general_purpose::STANDARD.encode(&png),
            "parameters": { "top_k": self.top_k },
        });

        let mut request = self
            .client
            .post(self.endpoint())
            .header("content-type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CapabilityError::from_reqwest(&e, self.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CapabilityError::from_reqwest(&e, self.timeout))?;
        if !status.is_success() {
            return Err(CapabilityError::from_status(status.as_u16(), &text));
        }

        let prediction = parse_predictions(&text, self.top_k)?;
        debug!(
            model = %self.model,
            label = %prediction.label,
            score = prediction.confidence,
            "classification received"
        );
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sorted_by_score() {
        let body = r#"[
            {"label": "lakeside, lakeshore", "score": 0.12},
            {"label": "seashore, coast, seacoast", "score": 0.71},
            {"label": "sandbar, sand bar", "score": 0.09}
        ]"#;
        let prediction = parse_predictions(body, 5).unwrap();
        assert_eq!(prediction.label, "seashore, coast, seacoast");
        assert!((prediction.confidence - 0.71).abs() < f32::EPSILON);
        assert_eq!(
            prediction.alternatives,
            vec!["lakeside, lakeshore", "sandbar, sand bar"]
        );
    }

    #[test]
    fn test_parse_respects_top_k() {
        let body = r#"[{"label": "a", "score": 0.5}, {"label": "b", "score": 0.3}, {"label": "c", "score": 0.2}]"#;
        let prediction = parse_predictions(body, 2).unwrap();
        assert_eq!(prediction.alternatives, vec!["b"]);
    }

    #[test]
    fn test_parse_nested_list() {
        let body = r#"[[{"label": "alp", "score": 0.9}]]"#;
        assert_eq!(parse_predictions(body, 5).unwrap().label, "alp");
    }

    #[test]
    fn test_parse_error_body_is_malformed() {
        let err = parse_predictions(r#"{"error": "Model is loading"}"#, 5).unwrap_err();
        assert!(matches!(err, CapabilityError::MalformedResponse(_)));
        assert!(err.is_transient());
        assert!(err.to_string().contains("Model is loading"));
    }

    #[test]
    fn test_parse_empty_list_is_malformed() {
        let err = parse_predictions("[]", 5).unwrap_err();
        assert!(matches!(err, CapabilityError::MalformedResponse(_)));
    }

    #[test]
    fn test_endpoint_and_debug_redaction() {
        let config = VisionConfig {
            base_url: "http://localhost:8080/".to_string(),
            api_key: Some("hf_secret".to_string()),
            ..Default::default()
        };
        let classifier = HttpVisualClassifier::new(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(
            classifier.endpoint(),
            "http://localhost:8080/models/google/vit-base-patch16-224"
        );
        let debug = format!("{classifier:?}");
        assert!(!debug.contains("hf_secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_transport_timeout_reports_configured_limit() {
        // Connections sit in the accept backlog and never get a response.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = VisionConfig {
            base_url: format!("http://{}", listener.local_addr().unwrap()),
            ..Default::default()
        };
        let classifier = HttpVisualClassifier::new(&config, Duration::from_millis(200)).unwrap();
        let frame = NormalizedFrame::from_rgb(
            image::RgbImage::new(2, 2),
            crate::media::FrameSource::OriginalImage,
        );

        let err = classifier.classify(&frame).await.unwrap_err();
        assert_eq!(err, CapabilityError::Timeout(Duration::from_millis(200)));
        assert_eq!(err.to_string(), "request timed out after 200ms");
        drop(listener);
    }
}
