#![no_main]

use libfuzzer_sys::fuzz_target;

use captionforge::generate::parse::{hashtag_items, parse_hashtags};

fuzz_target!(|input: (u8, &str)| {
    let (count, text) = input;
    let expected = usize::from(count % 32);

    let items = hashtag_items(text);
    for item in &items {
        assert!(!item.contains(',') && !item.contains('\n'));
    }

    // An accepted set always has the exact size, no duplicates, and only
    // lowercase word characters. Each tag is exactly one delimited item.
    if let Ok(tags) = parse_hashtags(text, expected) {
        assert_eq!(tags.len(), expected);
        assert_eq!(tags.len(), items.len());
        for (tag, item) in tags.iter().zip(&items) {
            assert_eq!(*tag, item.trim_start_matches('#').to_lowercase());
        }
        let mut sorted = tags.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), tags.len());
        for tag in &tags {
            assert!(!tag.is_empty());
            assert!(tag
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        }
    }
});
