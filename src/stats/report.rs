//! Document statistics types and terminal formatting.
//!
//! Statistics render as boxed terminal text (Display) and serialize as JSON.
//! Maps are ordered so repeated serialization is byte-identical.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::ir::LanguageCode;

/// Inner width of a report box, between the vertical borders.
pub(crate) const BOX_WIDTH: usize = 59;

/// Statistics for one processed document.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocumentStats {
    /// Number of tokens in the document.
    pub total_tokens: usize,
    /// Characters across all tokens, separators excluded.
    pub total_chars: usize,
    pub pages: u32,
    /// Whether the tokens came from OCR.
    pub ocr_used: bool,
    /// Tokens the classifier could not label (absorbed into their span).
    pub unknown_tokens: usize,
    pub span_count: usize,
    /// Counts per span language.
    pub per_language: BTreeMap<LanguageCode, LanguageStats>,
    /// OCR confidence spread; absent for native text.
    pub ocr_confidence: Option<ConfidenceDistribution>,
    /// Display-only option for histogram rendering width.
    #[serde(skip)]
    pub(crate) bar_width: usize,
}

/// Counts for one language.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LanguageStats {
    pub token_count: usize,
    pub char_count: usize,
    pub span_count: usize,
    /// Mean classifier confidence of the language's tokens.
    pub avg_confidence: f64,
    /// Fraction of the document's characters, in `[0, 1]`.
    pub share: f64,
}

/// Spread of OCR word confidences.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfidenceDistribution {
    pub count: usize,
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    /// Five equal-width buckets over `[0, 1]`; `1.0` falls in the last.
    pub buckets: Vec<ConfidenceBucket>,
}

/// One histogram bucket.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfidenceBucket {
    pub name: String,
    pub count: usize,
}

impl DocumentStats {
    /// Languages ordered by character count, largest first; ties by code.
    pub fn languages_by_share(&self) -> Vec<(&LanguageCode, &LanguageStats)> {
        let mut rows: Vec<_> = self.per_language.iter().collect();
        rows.sort_by(|a, b| b.1.char_count.cmp(&a.1.char_count).then(a.0.cmp(b.0)));
        rows
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for DocumentStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_summary(f)?;
        writeln!(f)?;
        self.fmt_languages(f)?;
        if self.ocr_confidence.is_some() {
            writeln!(f)?;
            self.fmt_ocr_confidence(f)?;
        }
        Ok(())
    }
}

impl DocumentStats {
    fn fmt_summary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        box_top(f, "Document")?;
        box_blank(f)?;
        box_row(
            f,
            &format!("  Pages:         {:>8}", format_number(self.pages as usize)),
        )?;
        box_row(
            f,
            &format!("  Tokens:        {:>8}", format_number(self.total_tokens)),
        )?;
        box_row(
            f,
            &format!("  Characters:    {:>8}", format_number(self.total_chars)),
        )?;
        box_row(
            f,
            &format!("  Spans:         {:>8}", format_number(self.span_count)),
        )?;
        box_row(
            f,
            &format!(
                "  Unknown:       {:>8} ({})",
                format_number(self.unknown_tokens),
                fmt_percent(self.unknown_tokens, self.total_tokens)
            ),
        )?;
        box_row(
            f,
            &format!(
                "  Text layer:    {:>8}",
                if self.ocr_used { "OCR" } else { "native" }
            ),
        )?;
        box_blank(f)?;
        box_bottom(f)
    }

    fn fmt_languages(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        box_top(f, &format!("Languages ({})", self.per_language.len()))?;
        box_blank(f)?;

        let rows = self.languages_by_share();
        if rows.is_empty() {
            box_row(f, "  No text found.")?;
        } else {
            let max_chars = rows.iter().map(|(_, s)| s.char_count).max().unwrap_or(1);
            for (code, stats) in rows {
                let bar = render_bar(stats.char_count, max_chars, self.bar_width);
                box_row(
                    f,
                    &format!(
                        "  {:<3} {:<12} {:>7} {:>6}  {}",
                        code.as_str(),
                        truncate_label(&code.display_name(), 12),
                        format_number(stats.token_count),
                        fmt_percent(stats.char_count, self.total_chars),
                        pad_bar(&bar, self.bar_width)
                    ),
                )?;
            }
        }

        box_blank(f)?;
        box_bottom(f)
    }

    fn fmt_ocr_confidence(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(dist) = &self.ocr_confidence else {
            return Ok(());
        };
        box_top(f, "OCR Confidence")?;
        box_blank(f)?;
        box_row(
            f,
            &format!(
                "  Words {:>7}   min {:.2}  mean {:.2}  max {:.2}",
                format_number(dist.count),
                dist.min,
                dist.mean,
                dist.max
            ),
        )?;
        let max_count = dist.buckets.iter().map(|b| b.count).max().unwrap_or(1);
        for bucket in &dist.buckets {
            box_row(
                f,
                &format!(
                    "  {:<9} {:>7}  {}",
                    bucket.name,
                    format_number(bucket.count),
                    pad_bar(
                        &render_bar(bucket.count, max_count, self.bar_width),
                        self.bar_width
                    )
                ),
            )?;
        }
        box_blank(f)?;
        box_bottom(f)
    }
}

/// `┌─ Title ───┐`
pub(crate) fn box_top(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    let used = title.chars().count() + 3;
    writeln!(
        f,
        "┌─ {} {}┐",
        title,
        "─".repeat(BOX_WIDTH.saturating_sub(used))
    )
}

pub(crate) fn box_bottom(f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "└{}┘", "─".repeat(BOX_WIDTH))
}

pub(crate) fn box_blank(f: &mut fmt::Formatter<'_>) -> fmt::Result {
    box_row(f, "")
}

/// One bordered row, padded to the box width. Overlong content is cut.
pub(crate) fn box_row(f: &mut fmt::Formatter<'_>, content: &str) -> fmt::Result {
    let content = truncate_label(content, BOX_WIDTH);
    let pad = BOX_WIDTH.saturating_sub(content.chars().count());
    writeln!(f, "│{}{}│", content, " ".repeat(pad))
}

/// Format a number with thousands separators.
pub(crate) fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Format a percentage, handling zero denominators.
pub(crate) fn fmt_percent(numerator: usize, denominator: usize) -> String {
    if denominator == 0 {
        "n/a".to_string()
    } else {
        format!("{:.1}%", (numerator as f64 / denominator as f64) * 100.0)
    }
}

/// Render a horizontal bar using Unicode block characters.
pub(crate) fn render_bar(count: usize, max_count: usize, width: usize) -> String {
    if max_count == 0 || width == 0 {
        return String::new();
    }

    let filled = (count * width) / max_count;
    let filled = filled.min(width);
    "█".repeat(filled) + &"░".repeat(width - filled)
}

/// Pad a bar string to ensure consistent column alignment.
pub(crate) fn pad_bar(bar: &str, width: usize) -> String {
    let visual_len = bar.chars().count();
    let padding = (width + 2).saturating_sub(visual_len);
    format!("{}{}", bar, " ".repeat(padding))
}

/// Truncate a label to `max_len` characters, marking the cut with `…`.
pub(crate) fn truncate_label(label: &str, max_len: usize) -> String {
    if label.chars().count() <= max_len {
        label.to_string()
    } else {
        let kept: String = label.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}
