//! Criterion microbenches for langspan's per-token stages.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the performance of:
//! - Hysteresis segmentation (segment)
//! - Sliding-window classification with the whatlang detector (classify_tokens)
//! - Plain-text layout (layout)

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

use langspan::classify::{classify_tokens, ClassifierOptions, WhatlangDetector};
use langspan::ir::{BBox, ClassifiedToken, LanguageCode, LanguageLabel, Token};
use langspan::segment::{segment, SegmentOptions};
use langspan::source::text::layout;

const PASSAGE: &str = "The archive holds letters written over three centuries. \
Many of them quote Latin: arma virumque cano Troiae qui primus ab oris. \
Others switch to French midway, comme si la langue anglaise ne suffisait plus, \
before returning to English for the closing courtesies.\n";

/// Alternating runs of English, French and Latin labels.
fn labelled_tokens(count: usize) -> Vec<ClassifiedToken> {
    let languages = ["en", "en", "fr", "la"];
    (0..count)
        .map(|i| {
            let language = languages[(i / 7) % languages.len()];
            let x = 72.0 + (i % 60) as f64 * 8.0;
            ClassifiedToken::new(
                Token::native(format!("w{i}"), (i / 400) as u32, BBox::new(x, 700.0, x + 6.0, 712.0)),
                LanguageLabel::Known(LanguageCode::parse(language).unwrap()),
                0.8,
            )
        })
        .collect()
}

/// Benchmark segmentation of a long labelled document.
fn bench_segment(c: &mut Criterion) {
    let tokens = labelled_tokens(10_000);
    let opts = SegmentOptions::default();
    let mut group = c.benchmark_group("segment");
    group.throughput(Throughput::Elements(tokens.len() as u64));

    group.bench_function("segment_10k", |b| {
        b.iter(|| {
            let spans = segment(black_box(&tokens), &opts);
            black_box(spans)
        })
    });

    group.finish();
}

/// Benchmark window classification over a few pages of mixed text.
fn bench_classify(c: &mut Criterion) {
    let text = PASSAGE.repeat(20);
    let (_, tokens) = layout(&text);
    let detector = WhatlangDetector::new();
    let opts = ClassifierOptions {
        enabled: ["en", "fr", "la"]
            .iter()
            .map(|l| LanguageCode::parse(l).unwrap())
            .collect(),
        ..Default::default()
    };
    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Elements(tokens.len() as u64));

    group.bench_function("whatlang_window_5", |b| {
        b.iter(|| {
            let labelled = classify_tokens(&detector, black_box(&tokens), &opts);
            black_box(labelled)
        })
    });

    group.finish();
}

/// Benchmark laying out plain text into positioned tokens.
fn bench_layout(c: &mut Criterion) {
    let text = PASSAGE.repeat(200);
    let mut group = c.benchmark_group("layout");
    group.throughput(Throughput::Bytes(text.len() as u64));

    group.bench_function("layout_text", |b| {
        b.iter(|| {
            let out = layout(black_box(&text));
            black_box(out)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_segment, bench_classify, bench_layout);
criterion_main!(benches);
