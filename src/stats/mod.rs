//! Document statistics.
//!
//! [`aggregate`] is a pure fold over the spans and classified tokens of one
//! document: same input, same [`DocumentStats`], same serialization.

mod report;

pub use report::{ConfidenceBucket, ConfidenceDistribution, DocumentStats, LanguageStats};
pub(crate) use report::{
    box_blank, box_bottom, box_row, box_top, fmt_percent, format_number, truncate_label,
};

use std::collections::BTreeMap;

use crate::ir::{ClassifiedToken, LanguageCode, Span};

/// Upper bounds of the OCR confidence buckets; the last one includes 1.0.
const BUCKET_BOUNDS: [f64; 5] = [0.2, 0.4, 0.6, 0.8, 1.0];

/// Options for document statistics.
#[derive(Clone, Debug)]
pub struct StatsOptions {
    /// Page count of the document. When `None`, pages are counted from the
    /// highest page any token sits on.
    pub pages: Option<u32>,
    /// Width of histogram bars (in characters).
    pub bar_width: usize,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            pages: None,
            bar_width: 20,
        }
    }
}

/// Computes statistics for one document.
///
/// Per-language counts follow span languages, so every token is counted
/// exactly once and shares sum to 1 for a non-empty document.
pub fn aggregate(spans: &[Span], tokens: &[ClassifiedToken], opts: &StatsOptions) -> DocumentStats {
    let total_tokens = tokens.len();
    let total_chars: usize = tokens.iter().map(|t| t.token.char_count()).sum();
    let unknown_tokens = tokens.iter().filter(|t| t.language.is_unknown()).count();
    let pages = opts.pages.unwrap_or_else(|| {
        tokens
            .iter()
            .map(|t| t.page().0 + 1)
            .max()
            .unwrap_or(0)
    });

    let per_language = per_language(spans, total_chars);

    let ocr_scores: Vec<f64> = tokens
        .iter()
        .filter_map(|t| t.token.ocr_confidence)
        .collect();
    let ocr_used = !ocr_scores.is_empty();

    DocumentStats {
        total_tokens,
        total_chars,
        pages,
        ocr_used,
        unknown_tokens,
        span_count: spans.len(),
        per_language,
        ocr_confidence: confidence_distribution(&ocr_scores),
        bar_width: opts.bar_width,
    }
}

fn per_language(spans: &[Span], total_chars: usize) -> BTreeMap<LanguageCode, LanguageStats> {
    let mut confidence_sums: BTreeMap<&LanguageCode, f64> = BTreeMap::new();
    let mut map: BTreeMap<LanguageCode, LanguageStats> = BTreeMap::new();

    for span in spans {
        let entry = map.entry(span.language.clone()).or_default();
        entry.span_count += 1;
        entry.token_count += span.token_count();
        entry.char_count += span.char_count();
        *confidence_sums.entry(&span.language).or_default() += span
            .tokens
            .iter()
            .map(|t| t.classifier_confidence)
            .sum::<f64>();
    }

    for (language, stats) in map.iter_mut() {
        let sum = confidence_sums.get(language).copied().unwrap_or(0.0);
        stats.avg_confidence = if stats.token_count > 0 {
            sum / stats.token_count as f64
        } else {
            0.0
        };
        stats.share = if total_chars > 0 {
            stats.char_count as f64 / total_chars as f64
        } else {
            0.0
        };
    }
    map
}

fn confidence_distribution(scores: &[f64]) -> Option<ConfidenceDistribution> {
    if scores.is_empty() {
        return None;
    }

    let mut counts = [0usize; BUCKET_BOUNDS.len()];
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &score in scores {
        min = min.min(score);
        max = max.max(score);
        sum += score;
        let bucket = BUCKET_BOUNDS
            .iter()
            .position(|&upper| score < upper)
            .unwrap_or(BUCKET_BOUNDS.len() - 1);
        counts[bucket] += 1;
    }

    let mut lower = 0.0;
    let buckets = BUCKET_BOUNDS
        .iter()
        .zip(counts)
        .map(|(&upper, count)| {
            let name = format!("{lower:.1}-{upper:.1}");
            lower = upper;
            ConfidenceBucket { name, count }
        })
        .collect();

    Some(ConfidenceDistribution {
        count: scores.len(),
        min,
        mean: sum / scores.len() as f64,
        max,
        buckets,
    })
}
