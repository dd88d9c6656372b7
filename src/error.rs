//! Error taxonomy for the media-to-content pipeline.
//!
//! Two layers:
//!
//! - [`CapabilityError`] is what an external collaborator (classifier, text
//!   generator, frame extractor) reports. It only says whether the fault is
//!   transient or permanent.
//! - [`ProcessingError`] is what the pipeline reports to its caller. Each
//!   variant names the stage that failed and carries an [`ErrorDetail`] with
//!   the recoverable flag and retry bookkeeping.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Fault reported by an external capability.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapabilityError {
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("service temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("authentication failed: {0}")]
    Unauthorized(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("{0}")]
    Permanent(String),
}

impl CapabilityError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CapabilityError::Timeout(_)
                | CapabilityError::RateLimited(_)
                | CapabilityError::Unavailable(_)
                | CapabilityError::MalformedResponse(_)
        )
    }

    /// Classify an HTTP status code returned by a remote capability.
    pub fn from_status(status: u16, body: &str) -> Self {
        let summary = summarize_body(body);
        match status {
            429 => CapabilityError::RateLimited(format!("HTTP 429: {summary}")),
            401 | 403 => CapabilityError::Unauthorized(format!("HTTP {status}: {summary}")),
            408 | 500 | 502 | 503 | 504 => {
                CapabilityError::Unavailable(format!("HTTP {status}: {summary}"))
            }
            400..=499 => CapabilityError::Rejected(format!("HTTP {status}: {summary}")),
            _ => CapabilityError::Unavailable(format!("HTTP {status}: {summary}")),
        }
    }

    /// Classify a transport error from reqwest. `timeout` is the client's
    /// configured request timeout, reported when that timer fired.
    pub fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            CapabilityError::Timeout(timeout)
        } else if err.is_connect() || err.is_request() {
            CapabilityError::Unavailable(format!("HTTP request failed: {err}"))
        } else if err.is_decode() {
            CapabilityError::MalformedResponse(format!("failed to decode body: {err}"))
        } else {
            CapabilityError::Permanent(format!("HTTP client error: {err}"))
        }
    }
}

/// Response bodies can be large; only the head is kept in error messages.
fn summarize_body(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(MAX).collect();
        format!("{head}...")
    }
}

/// Which stage of the pipeline an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Vision,
    Generation,
    TransientService,
    Cancelled,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Vision => "vision",
            ErrorCategory::Generation => "generation",
            ErrorCategory::TransientService => "transient_service",
            ErrorCategory::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Message plus retry bookkeeping shared by every [`ProcessingError`] variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub message: String,
    pub recoverable: bool,
    pub attempts: u32,
    pub exhausted: bool,
}

impl ErrorDetail {
    fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
            attempts: 1,
            exhausted: false,
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if self.exhausted {
            write!(f, " (gave up after {} attempts)", self.attempts)?;
        }
        Ok(())
    }
}

/// Terminal or intermediate failure of a pipeline stage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    /// File type, size, or integrity rejected. Never retried.
    #[error("validation error: {0}")]
    Validation(ErrorDetail),

    /// Frame extraction or classification failed.
    #[error("vision analysis error: {0}")]
    VisionAnalysis(ErrorDetail),

    /// Caption/hashtag shape violation or text service failure.
    #[error("content generation error: {0}")]
    ContentGeneration(ErrorDetail),

    /// Network, timeout, or rate limit. Always retryable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(ErrorDetail),

    #[error("processing cancelled")]
    Cancelled,
}

impl ProcessingError {
    pub fn validation(message: impl Into<String>) -> Self {
        ProcessingError::Validation(ErrorDetail::new(message, false))
    }

    /// A fatal vision error (corrupted input, empty label, zero-length video).
    pub fn vision(message: impl Into<String>) -> Self {
        ProcessingError::VisionAnalysis(ErrorDetail::new(message, false))
    }

    /// A vision error worth retrying (intermittent I/O, flaky classifier).
    pub fn vision_transient(message: impl Into<String>) -> Self {
        ProcessingError::VisionAnalysis(ErrorDetail::new(message, true))
    }

    /// A fatal generation error (shape violation after regeneration, auth).
    pub fn generation(message: impl Into<String>) -> Self {
        ProcessingError::ContentGeneration(ErrorDetail::new(message, false))
    }

    pub fn generation_transient(message: impl Into<String>) -> Self {
        ProcessingError::ContentGeneration(ErrorDetail::new(message, true))
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ProcessingError::ServiceUnavailable(ErrorDetail::new(message, true))
    }

    /// Wrap a capability fault into the given stage, keeping its transient flag.
    pub fn from_capability(category: ErrorCategory, err: &CapabilityError) -> Self {
        let detail = ErrorDetail::new(err.to_string(), err.is_transient());
        match category {
            ErrorCategory::Validation => ProcessingError::Validation(ErrorDetail {
                recoverable: false,
                ..detail
            }),
            ErrorCategory::Vision => ProcessingError::VisionAnalysis(detail),
            ErrorCategory::Generation => ProcessingError::ContentGeneration(detail),
            ErrorCategory::TransientService => ProcessingError::ServiceUnavailable(ErrorDetail {
                recoverable: true,
                ..detail
            }),
            ErrorCategory::Cancelled => ProcessingError::Cancelled,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ProcessingError::Validation(_) => ErrorCategory::Validation,
            ProcessingError::VisionAnalysis(_) => ErrorCategory::Vision,
            ProcessingError::ContentGeneration(_) => ErrorCategory::Generation,
            ProcessingError::ServiceUnavailable(_) => ErrorCategory::TransientService,
            ProcessingError::Cancelled => ErrorCategory::Cancelled,
        }
    }

    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            ProcessingError::Validation(d)
            | ProcessingError::VisionAnalysis(d)
            | ProcessingError::ContentGeneration(d)
            | ProcessingError::ServiceUnavailable(d) => Some(d),
            ProcessingError::Cancelled => None,
        }
    }

    fn detail_mut(&mut self) -> Option<&mut ErrorDetail> {
        match self {
            ProcessingError::Validation(d)
            | ProcessingError::VisionAnalysis(d)
            | ProcessingError::ContentGeneration(d)
            | ProcessingError::ServiceUnavailable(d) => Some(d),
            ProcessingError::Cancelled => None,
        }
    }

    pub fn message(&self) -> &str {
        self.detail()
            .map(|d| d.message.as_str())
            .unwrap_or("processing cancelled")
    }

    /// Eligible for retry. Service-unavailable faults always are.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ProcessingError::ServiceUnavailable(_) => true,
            ProcessingError::Cancelled => false,
            other => other.detail().is_some_and(|d| d.recoverable),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.detail().is_some_and(|d| d.exhausted)
    }

    pub fn attempts(&self) -> u32 {
        self.detail().map(|d| d.attempts).unwrap_or(0)
    }

    /// Mark this as the last error of a retry loop that ran `attempts` times.
    pub fn exhausted_after(mut self, attempts: u32) -> Self {
        if let Some(d) = self.detail_mut() {
            d.attempts = attempts;
            d.exhausted = true;
        }
        self
    }

    /// Record how many attempts were made without marking exhaustion.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        if let Some(d) = self.detail_mut() {
            d.attempts = attempts;
        }
        self
    }

    /// Re-home a generic service fault under the stage that hit it.
    ///
    /// Timeouts raised by the resilience layer are `ServiceUnavailable`;
    /// once the retry loop gives up they are reported as the failing stage's
    /// error so callers see e.g. a `VisionAnalysis` error for a classifier
    /// that kept timing out. Other variants are returned unchanged.
    pub fn attributed_to(self, category: ErrorCategory) -> Self {
        let ProcessingError::ServiceUnavailable(detail) = self else {
            return self;
        };
        match category {
            ErrorCategory::Vision => ProcessingError::VisionAnalysis(detail),
            ErrorCategory::Generation => ProcessingError::ContentGeneration(detail),
            _ => ProcessingError::ServiceUnavailable(detail),
        }
    }
}
