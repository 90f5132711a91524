//! Fuzz target for Tesseract TSV output parsing.
//!
//! Run with:
//!   cargo +nightly fuzz run tesseract_tsv

#![no_main]

use libfuzzer_sys::fuzz_target;
use langspan::ir::PageIndex;
use langspan::source::parse_tsv;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = parse_tsv(data, PageIndex::new(0), (2550.0, 3300.0), (612.0, 792.0));
});
