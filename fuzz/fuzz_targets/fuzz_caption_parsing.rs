#![no_main]

use libfuzzer_sys::fuzz_target;

use captionforge::generate::parse::{parse_captions, parse_single_caption, word_count};
use captionforge::generate::CaptionStyle;

fuzz_target!(|data: &str| {
    // Model output is untrusted text; parsing must never panic and every
    // extracted caption must be trimmed and non-empty.
    let parsed = parse_captions(data);
    for style in CaptionStyle::ALL {
        if let Some(caption) = parsed.get(style) {
            assert!(!caption.is_empty());
            assert_eq!(caption, caption.trim());
            let _ = word_count(caption);
        }
        if let Some(single) = parse_single_caption(data, style) {
            assert!(!single.is_empty());
        }
    }
});
