mod proptest_helpers;

use std::collections::BTreeSet;

use langspan::annotate::{color_for, map_to_annotations};
use langspan::ir::{BBox, ClassifiedToken, LanguageCode, LanguageLabel, Token};
use langspan::segment::{document_text, segment, SegmentOptions};
use langspan::stats::{aggregate, StatsOptions};
use proptest::prelude::*;
use proptest_helpers::{
    arb_classified_tokens, arb_runs, code, proptest_config, tokens_from_runs,
};

fn opts(min_run: usize) -> SegmentOptions {
    SegmentOptions {
        min_run,
        primary: code("en"),
    }
}

fn token(text: &str, language: &str) -> ClassifiedToken {
    ClassifiedToken::new(
        Token::native(text, 0u32, BBox::new(0.0, 0.0, 10.0, 10.0)),
        LanguageLabel::Known(code(language)),
        0.9,
    )
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn spans_partition_the_document(
        tokens in arb_classified_tokens(60),
        min_run in 1usize..=4,
    ) {
        let spans = segment(&tokens, &opts(min_run));

        let flattened: Vec<&ClassifiedToken> = spans.iter().flat_map(|s| s.tokens.iter()).collect();
        prop_assert_eq!(flattened.len(), tokens.len());
        for (a, b) in flattened.iter().zip(tokens.iter()) {
            prop_assert_eq!(*a, b);
        }

        let text = document_text(&tokens);
        let chars: Vec<char> = text.chars().collect();
        for (n, span) in spans.iter().enumerate() {
            prop_assert!(span.token_count() > 0);
            prop_assert_eq!(span.id.as_u64(), n as u64 + 1);
            let slice: String = chars[span.start_offset..span.end_offset].iter().collect();
            prop_assert_eq!(slice, span.text());
        }
        for pair in spans.windows(2) {
            prop_assert_ne!(&pair[0].language, &pair[1].language);
        }
    }

    #[test]
    fn segmentation_and_stats_are_idempotent(
        tokens in arb_classified_tokens(60),
        min_run in 1usize..=4,
    ) {
        let first = segment(&tokens, &opts(min_run));
        let second = segment(&tokens, &opts(min_run));
        prop_assert_eq!(&first, &second);

        let stats_opts = StatsOptions::default();
        let a = aggregate(&first, &tokens, &stats_opts);
        let b = aggregate(&second, &tokens, &stats_opts);
        prop_assert_eq!(&a, &b);

        let counted: usize = a.per_language.values().map(|l| l.token_count).sum();
        prop_assert_eq!(counted, tokens.len());
    }

    #[test]
    fn sustained_runs_become_spans(
        runs in arb_runs(3, 6),
    ) {
        let tokens = tokens_from_runs(&runs);
        let spans = segment(&tokens, &opts(3));
        let got: Vec<(String, usize)> = spans
            .iter()
            .map(|s| (s.language.as_str().to_string(), s.token_count()))
            .collect();
        let want: Vec<(String, usize)> = runs.iter().map(|(l, n)| (l.to_string(), *n)).collect();
        prop_assert_eq!(got, want);
    }

    #[test]
    fn isolated_word_never_opens_a_span(
        min_run in 2usize..=5,
        before_extra in 0usize..4,
        after_extra in 0usize..4,
        foreign in prop::sample::select(vec!["fr", "la", "de"]),
    ) {
        let mut tokens: Vec<ClassifiedToken> = (0..min_run + before_extra)
            .map(|i| token(&format!("a{i}"), "en"))
            .collect();
        tokens.push(token("mot", foreign));
        tokens.extend((0..min_run + after_extra).map(|i| token(&format!("b{i}"), "en")));

        let spans = segment(&tokens, &opts(min_run));
        prop_assert_eq!(spans.len(), 1);
        prop_assert_eq!(&spans[0].language, &code("en"));
    }

    #[test]
    fn colors_are_stable_per_language(
        tokens in arb_classified_tokens(40),
        raw in "[a-z]{2,3}",
    ) {
        let language = LanguageCode::parse(&raw).unwrap();
        prop_assert_eq!(color_for(&language), color_for(&language.clone()));

        let spans = segment(&tokens, &opts(1));
        let instructions = map_to_annotations(&spans, &BTreeSet::new());
        for instruction in &instructions {
            prop_assert_eq!(instruction.color_key, color_for(&instruction.language));
        }
    }
}
