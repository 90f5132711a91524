#![allow(dead_code)]

use langspan::ir::{BBox, ClassifiedToken, LanguageCode, LanguageLabel, Token};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

/// Labels drawn by the strategies below.
pub const LANGUAGES: &[&str] = &["en", "fr", "la", "de"];

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub fn code(s: &str) -> LanguageCode {
    LanguageCode::parse(s).expect("valid language code")
}

fn arb_label() -> BoxedStrategy<LanguageLabel> {
    prop_oneof![
        6 => prop::sample::select(LANGUAGES).prop_map(|l| LanguageLabel::Known(code(l))),
        1 => Just(LanguageLabel::Unknown),
    ]
    .boxed()
}

fn arb_word() -> BoxedStrategy<String> {
    proptest::string::string_regex("[a-zà-ÿ]{1,10}")
        .expect("valid word regex")
        .boxed()
}

/// Classified tokens spread over up to three pages, in reading order.
pub fn arb_classified_tokens(max_len: usize) -> BoxedStrategy<Vec<ClassifiedToken>> {
    proptest::collection::vec((arb_word(), arb_label(), 0u16..=1000u16), 0..=max_len)
        .prop_map(|rows| {
            let per_page = rows.len() / 3 + 1;
            rows.into_iter()
                .enumerate()
                .map(|(i, (word, label, raw_conf))| {
                    let page = (i / per_page) as u32;
                    let x = 72.0 + 40.0 * (i % per_page) as f64;
                    let token = Token::native(word, page, BBox::new(x, 700.0, x + 30.0, 712.0));
                    ClassifiedToken::new(token, label, raw_conf as f64 / 1000.0)
                })
                .collect()
        })
        .boxed()
}

/// Runs of one language: `(language, length)` pairs expanded into tokens,
/// each run long enough that hysteresis with `min_run` keeps it.
pub fn arb_runs(min_run: usize, max_runs: usize) -> BoxedStrategy<Vec<(&'static str, usize)>> {
    proptest::collection::vec(
        (prop::sample::select(LANGUAGES), min_run..=min_run + 4),
        1..=max_runs,
    )
    .prop_map(|mut runs| {
        runs.dedup_by(|a, b| a.0 == b.0);
        runs
    })
    .boxed()
}

pub fn tokens_from_runs(runs: &[(&str, usize)]) -> Vec<ClassifiedToken> {
    let mut out = Vec::new();
    for (language, len) in runs {
        for _ in 0..*len {
            let i = out.len();
            let x = 72.0 + 10.0 * (i % 40) as f64;
            out.push(ClassifiedToken::new(
                Token::native(format!("w{i}"), 0u32, BBox::new(x, 700.0, x + 8.0, 712.0)),
                LanguageLabel::Known(code(language)),
                0.9,
            ));
        }
    }
    out
}
