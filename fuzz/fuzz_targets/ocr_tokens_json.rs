//! Fuzz target for pre-computed OCR token files.
//!
//! Run with:
//!   cargo +nightly fuzz run ocr_tokens_json

#![no_main]

use libfuzzer_sys::fuzz_target;
use langspan::ir::io_tokens::from_token_json_slice;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    // Scaling whatever parsed must not panic either.
    if let Ok(file) = from_token_json_slice(data) {
        for page in &file.pages {
            let _ = page.to_tokens((612.0, 792.0));
        }
    }
});
