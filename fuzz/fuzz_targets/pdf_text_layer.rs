//! Fuzz target for the native PDF text layer reader.
//!
//! Feeds arbitrary bytes through PDF parsing, content stream decoding and
//! the text-state machine that turns show-text operators into tokens.
//!
//! Run with:
//!   cargo +nightly fuzz run pdf_text_layer

#![no_main]

use libfuzzer_sys::fuzz_target;
use langspan::source::pdf::fuzz_text_layer;

fuzz_target!(|data: &[u8]| {
    // Same cap as intake's default size limit.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = fuzz_text_layer(data);
});
