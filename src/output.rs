//! Final payload returned to the caller.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::generate::{CaptionSet, HashtagList};
use crate::vision::ThemeResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedOutput {
    pub captions: CaptionSet,
    /// Comma-separated, no spaces.
    pub hashtags: String,
    /// Wall-clock seconds for the whole invocation.
    pub processing_time: f64,
    pub theme_detected: String,
}

/// Merge stage results into the output payload. Pure.
pub fn assemble(
    captions: CaptionSet,
    hashtags: &HashtagList,
    theme: &ThemeResult,
    elapsed: Duration,
) -> FormattedOutput {
    FormattedOutput {
        captions,
        hashtags: hashtags.joined(),
        processing_time: elapsed.as_secs_f64(),
        theme_detected: theme.theme.clone(),
    }
}

impl fmt::Display for FormattedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Detected theme: {}", self.theme_detected)?;
        writeln!(f)?;
        writeln!(f, "Captions:")?;
        writeln!(f, "  Aesthetic:  {}", self.captions.aesthetic)?;
        writeln!(f, "  Funny:      {}", self.captions.funny)?;
        writeln!(f, "  Influencer: {}", self.captions.influencer)?;
        writeln!(f)?;
        writeln!(f, "Hashtags:")?;
        let tags: Vec<String> = self
            .hashtags
            .split(',')
            .filter(|t| !t.is_empty())
            .map(|t| format!("#{t}"))
            .collect();
        writeln!(f, "  {}", tags.join(" "))?;
        writeln!(f)?;
        write!(f, "Processed in {:.2}s", self.processing_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> (CaptionSet, HashtagList, ThemeResult) {
        let captions = CaptionSet {
            aesthetic: "Salt air".to_string(),
            funny: "Shell yeah".to_string(),
            influencer: "Book the trip".to_string(),
        };
        let hashtags = HashtagList::parse("#beach, #sea, #sun", 3).unwrap();
        let theme = ThemeResult {
            theme: "seashore".to_string(),
            confidence: 0.8,
            alternative_themes: vec![],
        };
        (captions, hashtags, theme)
    }

    #[test]
    fn test_assemble_joins_without_spaces() {
        let (captions, hashtags, theme) = inputs();
        let output = assemble(captions, &hashtags, &theme, Duration::from_millis(1500));
        assert_eq!(output.hashtags, "beach,sea,sun");
        assert_eq!(output.theme_detected, "seashore");
        assert!((output.processing_time - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_assemble_is_deterministic_apart_from_timing() {
        let (captions, hashtags, theme) = inputs();
        let a = assemble(captions.clone(), &hashtags, &theme, Duration::from_secs(1));
        let b = assemble(captions, &hashtags, &theme, Duration::from_secs(3));
        assert_eq!(a.captions, b.captions);
        assert_eq!(a.hashtags, b.hashtags);
        assert_eq!(a.theme_detected, b.theme_detected);
    }

    #[test]
    fn test_json_shape() {
        let (captions, hashtags, theme) = inputs();
        let output = assemble(captions, &hashtags, &theme, Duration::from_secs(2));
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["captions"]["funny"], "Shell yeah");
        assert_eq!(value["hashtags"], "beach,sea,sun");
        assert_eq!(value["theme_detected"], "seashore");
        assert_eq!(value["processing_time"], 2.0);
    }

    #[test]
    fn test_display_lists_hashtags() {
        let (captions, hashtags, theme) = inputs();
        let text = assemble(captions, &hashtags, &theme, Duration::from_secs(2)).to_string();
        assert!(text.contains("Detected theme: seashore"));
        assert!(text.contains("#beach #sea #sun"));
    }
}
