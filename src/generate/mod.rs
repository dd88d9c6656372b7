//! Caption and hashtag generation
//!
//! [`ContentGenerator`] prompts a [`TextGenerator`] for three styled captions
//! and a hashtag set, runs both requests concurrently, and enforces their
//! shape. A caption field or hashtag set that violates the shape is
//! regenerated once. A second violation is a non-recoverable
//! `ContentGeneration` error. Output is never truncated or padded.

pub mod bedrock;
pub mod parse;
pub mod prompt;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{CapabilityError, ErrorCategory, ProcessingError};
use crate::resilience::Resilience;

pub use bedrock::BedrockTextGenerator;

/// A remote text model: prompt in, text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, CapabilityError>;
}

/// The three caption styles, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptionStyle {
    Aesthetic,
    Funny,
    Influencer,
}

impl CaptionStyle {
    pub const ALL: [CaptionStyle; 3] = [
        CaptionStyle::Aesthetic,
        CaptionStyle::Funny,
        CaptionStyle::Influencer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionStyle::Aesthetic => "aesthetic",
            CaptionStyle::Funny => "funny",
            CaptionStyle::Influencer => "influencer",
        }
    }

    /// Wording used when asking for this style on its own.
    pub fn description(&self) -> &'static str {
        match self {
            CaptionStyle::Aesthetic => "aesthetic, dreamy",
            CaptionStyle::Funny => "funny, playful",
            CaptionStyle::Influencer => "confident influencer-style",
        }
    }
}

impl fmt::Display for CaptionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three captions, each within the configured word limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptionSet {
    pub aesthetic: String,
    pub funny: String,
    pub influencer: String,
}

impl CaptionSet {
    pub fn get(&self, style: CaptionStyle) -> &str {
        match style {
            CaptionStyle::Aesthetic => &self.aesthetic,
            CaptionStyle::Funny => &self.funny,
            CaptionStyle::Influencer => &self.influencer,
        }
    }
}

/// Exactly `hashtag_count` distinct lowercase tags, without `#`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HashtagList(Vec<String>);

impl HashtagList {
    /// Parse a generator response, enforcing count, charset and uniqueness.
    pub fn parse(text: &str, count: usize) -> Result<Self, parse::HashtagViolation> {
        parse::parse_hashtags(text, count).map(HashtagList)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comma-joined, no spaces: `beach,sunset,ocean`.
    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

/// Shape constraints on generated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentLimits {
    pub caption_max_words: usize,
    pub hashtag_count: usize,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            caption_max_words: 12,
            hashtag_count: 15,
        }
    }
}

/// Why a caption candidate is unusable.
fn caption_problem(candidate: Option<&str>, max_words: usize) -> Option<String> {
    match candidate {
        None => Some("missing".to_string()),
        Some(text) => {
            let words = parse::word_count(text);
            if words == 0 {
                Some("empty".to_string())
            } else if words > max_words {
                Some(format!("{words} words exceeds limit of {max_words}"))
            } else {
                None
            }
        }
    }
}

#[derive(Clone)]
pub struct ContentGenerator {
    generator: Arc<dyn TextGenerator>,
    limits: ContentLimits,
    resilience: Resilience,
}

impl ContentGenerator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        limits: ContentLimits,
        resilience: Resilience,
    ) -> Self {
        Self {
            generator,
            limits,
            resilience,
        }
    }

    pub fn limits(&self) -> ContentLimits {
        self.limits
    }

    /// One generator call under retry and per-call timeout.
    async fn call(&self, operation: &str, prompt: &str) -> Result<String, ProcessingError> {
        let generator = &self.generator;
        self.resilience
            .run(operation, ErrorCategory::Generation, |_| async move {
                generator
                    .generate(prompt)
                    .await
                    .map_err(|e| ProcessingError::from_capability(ErrorCategory::Generation, &e))
            })
            .await
    }

    /// Three styled captions for `theme`.
    pub async fn generate_captions(&self, theme: &str) -> Result<CaptionSet, ProcessingError> {
        let max_words = self.limits.caption_max_words;
        let response = self
            .call(
                "generate_captions",
                &prompt::caption_prompt(theme, max_words),
            )
            .await?;
        let parsed = parse::parse_captions(&response);

        let mut fields: Vec<String> = Vec::with_capacity(CaptionStyle::ALL.len());
        for style in CaptionStyle::ALL {
            let candidate = parsed.get(style);
            let caption = match caption_problem(candidate, max_words) {
                None => candidate.unwrap_or_default().to_string(),
                Some(problem) => {
                    warn!(%style, %problem, "caption rejected, regenerating");
                    self.regenerate_caption(theme, style).await?
                }
            };
            fields.push(caption);
        }

        let mut fields = fields.into_iter();
        let captions = CaptionSet {
            aesthetic: fields.next().unwrap_or_default(),
            funny: fields.next().unwrap_or_default(),
            influencer: fields.next().unwrap_or_default(),
        };
        debug!(theme, "captions generated");
        Ok(captions)
    }

    async fn regenerate_caption(
        &self,
        theme: &str,
        style: CaptionStyle,
    ) -> Result<String, ProcessingError> {
        let max_words = self.limits.caption_max_words;
        let response = self
            .call(
                "regenerate_caption",
                &prompt::single_caption_prompt(theme, style, max_words),
            )
            .await?;
        let candidate = parse::parse_single_caption(&response, style);
        match caption_problem(candidate.as_deref(), max_words) {
            None => Ok(candidate.unwrap_or_default()),
            Some(problem) => Err(ProcessingError::generation(format!(
                "{style} caption rejected after regeneration: {problem}"
            ))),
        }
    }

    /// Exactly `hashtag_count` hashtags for `theme`.
    pub async fn generate_hashtags(&self, theme: &str) -> Result<HashtagList, ProcessingError> {
        let count = self.limits.hashtag_count;
        let request = prompt::hashtag_prompt(theme, count);

        let first = self.call("generate_hashtags", &request).await?;
        let violation = match HashtagList::parse(&first, count) {
            Ok(list) => {
                debug!(theme, count = list.len(), "hashtags generated");
                return Ok(list);
            }
            Err(violation) => violation,
        };

        warn!(%violation, "hashtag set rejected, regenerating");
        let second = self.call("regenerate_hashtags", &request).await?;
        HashtagList::parse(&second, count).map_err(|violation| {
            ProcessingError::generation(format!(
                "hashtag set rejected after regeneration: {violation}"
            ))
        })
    }

    /// Captions and hashtags concurrently. Both branches always run to
    /// completion; the caller decides what a single failure means.
    pub async fn generate(
        &self,
        theme: &str,
    ) -> (
        Result<CaptionSet, ProcessingError>,
        Result<HashtagList, ProcessingError>,
    ) {
        tokio::join!(self.generate_captions(theme), self.generate_hashtags(theme))
    }
}
