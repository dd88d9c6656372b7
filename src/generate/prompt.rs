//! Prompt text sent to the text generator.

use super::CaptionStyle;

/// One request for all three caption styles.
pub fn caption_prompt(theme: &str, max_words: usize) -> String {
    format!(
        "Generate 3 Instagram captions for: {theme}\n\
         \n\
         1. Aesthetic (under {max_words} words)\n\
         2. Funny (under {max_words} words)\n\
         3. Influencer style (under {max_words} words)\n\
         \n\
         Reply with exactly three lines in the form \"Style: caption\" and nothing else."
    )
}

/// Regeneration request for a single caption style.
pub fn single_caption_prompt(theme: &str, style: CaptionStyle, max_words: usize) -> String {
    format!(
        "Write one {} Instagram caption for: {theme}\n\
         \n\
         Use at most {max_words} words. Reply with the caption only, without a label or quotes.",
        style.description()
    )
}

/// Hashtag request; also used verbatim for regeneration.
pub fn hashtag_prompt(theme: &str, count: usize) -> String {
    format!(
        "Generate exactly {count} Instagram hashtags for {theme}.\n\
         Rules:\n\
         - lowercase\n\
         - no spaces\n\
         - letters, digits and underscores only\n\
         - no duplicates\n\
         - comma separated, on a single line"
    )
}
