#![no_main]

use libfuzzer_sys::fuzz_target;

use captionforge::logging::redact::{sanitize_error_message, sanitize_log_message};

fuzz_target!(|data: &str| {
    // ReDoS guard: libFuzzer's per-input timeout catches catastrophic
    // backtracking in the secret patterns.
    let _ = sanitize_log_message(data);
    let _ = sanitize_error_message(data);
});
