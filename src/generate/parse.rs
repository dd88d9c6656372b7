//! Parsing of free-form generator output into captions and hashtags.
//!
//! Models answer in many shapes (`Aesthetic: ...`, `1. ...`,
//! `**Funny:** "..."`). Parsing is lenient about the shape but never
//! invents, truncates or pads content; shape violations are reported to
//! the caller, which decides whether to regenerate.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::CaptionStyle;

static LABELED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:\d+\s*[.)]\s*)?(aesthetic|funny|influencer)(?:[\s-]+style)?(?:\s+caption)?\s*(?:\([^)]*\))?\s*[:\-–—]\s*(.*)$",
    )
    .expect("labeled caption pattern is valid")
});

static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*[.)]\s+(.+)$").expect("numbered line pattern is valid"));

static HASHTAG_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("hashtag pattern is valid"));

/// Caption fields found in a response; `None` where a style was missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCaptions {
    pub aesthetic: Option<String>,
    pub funny: Option<String>,
    pub influencer: Option<String>,
}

impl ParsedCaptions {
    pub fn get(&self, style: CaptionStyle) -> Option<&str> {
        match style {
            CaptionStyle::Aesthetic => self.aesthetic.as_deref(),
            CaptionStyle::Funny => self.funny.as_deref(),
            CaptionStyle::Influencer => self.influencer.as_deref(),
        }
    }

    fn slot(&mut self, style: CaptionStyle) -> &mut Option<String> {
        match style {
            CaptionStyle::Aesthetic => &mut self.aesthetic,
            CaptionStyle::Funny => &mut self.funny,
            CaptionStyle::Influencer => &mut self.influencer,
        }
    }

    fn fill(&mut self, style: CaptionStyle, text: String) {
        let slot = self.slot(style);
        if slot.is_none() && !text.is_empty() {
            *slot = Some(text);
        }
    }
}

fn style_from_label(label: &str) -> Option<CaptionStyle> {
    match label.to_ascii_lowercase().as_str() {
        "aesthetic" => Some(CaptionStyle::Aesthetic),
        "funny" => Some(CaptionStyle::Funny),
        "influencer" => Some(CaptionStyle::Influencer),
        _ => None,
    }
}

/// Remove markdown emphasis and list bullets around a line.
fn strip_markup(line: &str) -> String {
    let without_emphasis = line.replace("**", "").replace("__", "");
    without_emphasis
        .trim()
        .trim_start_matches(['-', '*', '•'])
        .trim()
        .to_string()
}

/// Trim whitespace and one layer of surrounding quotes.
pub fn clean_caption(text: &str) -> String {
    let trimmed = text.trim();
    let unquoted = [('"', '"'), ('“', '”'), ('\'', '\''), ('«', '»')]
        .iter()
        .find_map(|(open, close)| {
            trimmed
                .strip_prefix(*open)
                .and_then(|rest| rest.strip_suffix(*close))
        })
        .unwrap_or(trimmed);
    unquoted.trim().trim_matches('*').trim().to_string()
}

/// Whitespace-separated word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Extract the three caption styles from a combined response.
///
/// Labeled lines win; unlabeled numbered lines fill styles by position
/// (1 aesthetic, 2 funny, 3 influencer). A label on a line of its own takes
/// the next non-empty line as its caption.
pub fn parse_captions(text: &str) -> ParsedCaptions {
    let mut labeled = ParsedCaptions::default();
    let mut numbered = ParsedCaptions::default();
    let mut pending: Option<CaptionStyle> = None;

    for raw_line in text.lines() {
        let line = strip_markup(raw_line);
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = LABELED_LINE.captures(&line) {
            let style = caps.get(1).and_then(|m| style_from_label(m.as_str()));
            let body = caps.get(2).map(|m| clean_caption(m.as_str())).unwrap_or_default();
            if let Some(style) = style {
                if body.is_empty() {
                    pending = Some(style);
                } else {
                    labeled.fill(style, body);
                    pending = None;
                }
                continue;
            }
        }

        if let Some(style) = pending.take() {
            labeled.fill(style, clean_caption(&line));
            continue;
        }

        if let Some(caps) = NUMBERED_LINE.captures(&line) {
            let position = caps.get(1).and_then(|m| m.as_str().parse::<usize>().ok());
            let body = caps.get(2).map(|m| clean_caption(m.as_str())).unwrap_or_default();
            if let Some(style) = position.and_then(|p| CaptionStyle::ALL.get(p.wrapping_sub(1))) {
                numbered.fill(*style, body);
            }
        }
    }

    for style in CaptionStyle::ALL {
        if let Some(text) = numbered.get(style).map(str::to_string) {
            labeled.fill(style, text);
        }
    }
    labeled
}

/// Extract a single caption from a regeneration response.
pub fn parse_single_caption(text: &str, style: CaptionStyle) -> Option<String> {
    if let Some(found) = parse_captions(text).get(style) {
        return Some(found.to_string());
    }
    let lines: Vec<String> = text
        .lines()
        .map(strip_markup)
        .filter(|line| !line.is_empty())
        .collect();
    // "Here is a funny caption:" introduces the caption, it is not one.
    let caption = lines
        .iter()
        .find(|line| !line.ends_with(':'))
        .or_else(|| lines.last())
        .cloned();
    caption
        .map(|line| match NUMBERED_LINE.captures(&line) {
            Some(caps) => caps.get(2).map(|m| m.as_str()).unwrap_or("").to_string(),
            None => line,
        })
        .map(|line| clean_caption(&line))
        .filter(|caption| !caption.is_empty())
}

/// Why a hashtag response was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashtagViolation {
    InvalidToken(String),
    Duplicate(String),
    WrongCount { expected: usize, actual: usize },
}

impl fmt::Display for HashtagViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashtagViolation::InvalidToken(token) => write!(f, "invalid hashtag '{token}'"),
            HashtagViolation::Duplicate(token) => write!(f, "duplicate hashtag '{token}'"),
            HashtagViolation::WrongCount { expected, actual } => {
                write!(f, "expected {expected} hashtags, got {actual}")
            }
        }
    }
}

/// Drop a leading prose label such as "Here are your hashtags:". The colon
/// must end the line or be followed by whitespace, so `a:b` stays intact.
fn strip_line_label(line: &str) -> &str {
    match line.split_once(':') {
        Some((head, tail))
            if !head.contains('#') && (tail.is_empty() || tail.starts_with(char::is_whitespace)) =>
        {
            tail
        }
        _ => line,
    }
}

/// Split a response into raw hashtag items without judging them.
///
/// Items are separated by commas and newlines. An item made only of
/// `#`-prefixed words (`#a #b #c`) is split on whitespace; any other item
/// keeps its inner whitespace so validation rejects it instead of turning
/// one phrase into several tags.
pub fn hashtag_items(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    for line in text.lines() {
        for item in strip_line_label(line).split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let words: Vec<&str> = item.split_whitespace().collect();
            if words.len() > 1 && words.iter().all(|w| w.starts_with('#')) {
                items.extend(words.into_iter().map(str::to_string));
            } else {
                items.push(item.to_string());
            }
        }
    }
    items
}

/// One normalized token per item: leading `#` stripped, lowercased.
pub fn tokenize_hashtags(text: &str) -> Vec<String> {
    hashtag_items(text)
        .into_iter()
        .map(|item| item.trim_start_matches('#').to_lowercase())
        .collect()
}

/// Parse exactly `expected` valid, distinct hashtags.
pub fn parse_hashtags(text: &str, expected: usize) -> Result<Vec<String>, HashtagViolation> {
    let tokens = tokenize_hashtags(text);
    let mut seen = HashSet::with_capacity(tokens.len());
    for token in &tokens {
        if !HASHTAG_TOKEN.is_match(token) {
            return Err(HashtagViolation::InvalidToken(token.clone()));
        }
        if !seen.insert(token.as_str()) {
            return Err(HashtagViolation::Duplicate(token.clone()));
        }
    }
    if tokens.len() != expected {
        return Err(HashtagViolation::WrongCount {
            expected,
            actual: tokens.len(),
        });
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Caption parsing tests ====================

    #[test]
    fn test_parse_labeled_lines() {
        let text = "Aesthetic: Salt air and soft light\n\
                    Funny: Sand in places I did not know existed\n\
                    Influencer: Living my best coastal life, link in bio";
        let parsed = parse_captions(text);
        assert_eq!(parsed.aesthetic.as_deref(), Some("Salt air and soft light"));
        assert_eq!(
            parsed.funny.as_deref(),
            Some("Sand in places I did not know existed")
        );
        assert_eq!(
            parsed.influencer.as_deref(),
            Some("Living my best coastal life, link in bio")
        );
    }

    #[test]
    fn test_parse_markdown_and_quotes() {
        let text = "Here are your captions:\n\n\
                    1. **Aesthetic (under 12 words):** \"Golden hour by the shore\"\n\
                    2. **Funny:** “Beach hair, don't care”\n\
                    3. **Influencer style:** 'Tag someone you'd bring here'";
        let parsed = parse_captions(text);
        assert_eq!(parsed.aesthetic.as_deref(), Some("Golden hour by the shore"));
        assert_eq!(parsed.funny.as_deref(), Some("Beach hair, don't care"));
        assert_eq!(
            parsed.influencer.as_deref(),
            Some("Tag someone you'd bring here")
        );
    }

    #[test]
    fn test_parse_numbered_without_labels() {
        let text = "1. Quiet mornings\n2) Coffee first, mountains second\n3. Find your peak";
        let parsed = parse_captions(text);
        assert_eq!(parsed.aesthetic.as_deref(), Some("Quiet mornings"));
        assert_eq!(parsed.funny.as_deref(), Some("Coffee first, mountains second"));
        assert_eq!(parsed.influencer.as_deref(), Some("Find your peak"));
    }

    #[test]
    fn test_parse_label_on_its_own_line() {
        let text = "**Aesthetic:**\n\"Petals and patience\"\n\n**Funny:**\nI came for the flowers, stayed for snacks";
        let parsed = parse_captions(text);
        assert_eq!(parsed.aesthetic.as_deref(), Some("Petals and patience"));
        assert_eq!(
            parsed.funny.as_deref(),
            Some("I came for the flowers, stayed for snacks")
        );
        assert_eq!(parsed.influencer, None);
    }

    #[test]
    fn test_labels_beat_positions() {
        let text = "1. Funny: Oops\n2. Aesthetic: Calm\n3. Influencer: Shop now";
        let parsed = parse_captions(text);
        assert_eq!(parsed.aesthetic.as_deref(), Some("Calm"));
        assert_eq!(parsed.funny.as_deref(), Some("Oops"));
    }

    #[test]
    fn test_parse_single_caption_plain() {
        assert_eq!(
            parse_single_caption("  \"Waves say hi\"  \n", CaptionStyle::Funny).as_deref(),
            Some("Waves say hi")
        );
        assert_eq!(
            parse_single_caption("Funny: Shell yeah", CaptionStyle::Funny).as_deref(),
            Some("Shell yeah")
        );
        assert_eq!(parse_single_caption("\n  \n", CaptionStyle::Funny), None);
    }

    #[test]
    fn test_parse_single_caption_skips_intro_line() {
        assert_eq!(
            parse_single_caption(
                "Here is a funny caption:\nSandy toes, salty jokes",
                CaptionStyle::Funny
            )
            .as_deref(),
            Some("Sandy toes, salty jokes")
        );
        assert_eq!(
            parse_single_caption("Sure! Here you go:\n\n\"Beach please\"", CaptionStyle::Aesthetic)
                .as_deref(),
            Some("Beach please")
        );
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("one  two\tthree\nfour"), 4);
        assert_eq!(word_count("   "), 0);
    }

    // ==================== Hashtag parsing tests ====================

    fn tags(n: usize) -> String {
        (0..n).map(|i| format!("#tag{i}")).collect::<Vec<_>>().join(", ")
    }

    #[test]
    fn test_parse_exact_count() {
        let parsed = parse_hashtags(&tags(15), 15).unwrap();
        assert_eq!(parsed.len(), 15);
        assert_eq!(parsed[0], "tag0");
    }

    #[test]
    fn test_hashtags_lowercased_and_mixed_separators() {
        let parsed = parse_hashtags("#Beach,#SunSet\n#ocean_vibes  #Travel2024", 4).unwrap();
        assert_eq!(parsed, vec!["beach", "sunset", "ocean_vibes", "travel2024"]);
    }

    #[test]
    fn test_preamble_label_ignored() {
        let parsed = parse_hashtags("Here are your hashtags: #a, #b, #c", 3).unwrap();
        assert_eq!(parsed, vec!["a", "b", "c"]);
        let parsed = parse_hashtags("Here are 3 hashtags:\n#a #b #c", 3).unwrap();
        assert_eq!(parsed, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_multi_word_hash_item_rejected() {
        let text = format!("{}, #beach life", tags(14));
        let err = parse_hashtags(&text, 15).unwrap_err();
        assert_eq!(err, HashtagViolation::InvalidToken("beach life".to_string()));
    }

    #[test]
    fn test_multi_word_plain_item_not_split() {
        let plain: Vec<String> = (0..13).map(|i| format!("tag{i}")).collect();
        let text = format!("{}, beach life", plain.join(", "));
        let err = parse_hashtags(&text, 15).unwrap_err();
        assert_eq!(err, HashtagViolation::InvalidToken("beach life".to_string()));
    }

    #[test]
    fn test_space_separated_hash_line() {
        let parsed = parse_hashtags("#Sun #sea #sand", 3).unwrap();
        assert_eq!(parsed, vec!["sun", "sea", "sand"]);
        assert_eq!(hashtag_items("#a #b, c"), vec!["#a", "#b", "c"]);
    }

    #[test]
    fn test_colon_inside_token_is_not_a_label() {
        let err = parse_hashtags("beach:sun, sea", 2).unwrap_err();
        assert_eq!(err, HashtagViolation::InvalidToken("beach:sun".to_string()));
    }

    #[test]
    fn test_short_set_is_never_padded() {
        let err = parse_hashtags(&tags(13), 15).unwrap_err();
        assert_eq!(
            err,
            HashtagViolation::WrongCount {
                expected: 15,
                actual: 13
            }
        );
    }

    #[test]
    fn test_long_set_is_never_truncated() {
        assert!(matches!(
            parse_hashtags(&tags(16), 15),
            Err(HashtagViolation::WrongCount { actual: 16, .. })
        ));
    }

    #[test]
    fn test_duplicate_rejected_case_insensitively() {
        let err = parse_hashtags("#Beach, #beach, #sun", 3).unwrap_err();
        assert_eq!(err, HashtagViolation::Duplicate("beach".to_string()));
    }

    #[test]
    fn test_invalid_characters_rejected() {
        let err = parse_hashtags("#beach, #sun-set, #sea", 3).unwrap_err();
        assert_eq!(err, HashtagViolation::InvalidToken("sun-set".to_string()));
        assert!(parse_hashtags("#beach, #café", 2).is_err());
    }
}
