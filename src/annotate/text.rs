//! Inline language markers for plain-text documents.
//!
//! Highlighted spans are wrapped as `[[fr]]chat noir[[/fr]]` in the original
//! text; everything outside the markers, whitespace included, is untouched.
//! A short legend header precedes the text when anything is marked.

use std::collections::BTreeSet;

use tracing::warn;

use super::{legend, AnnotationInstruction};
use crate::ir::{Span, SpanId};
use crate::source::text::word_ranges;

/// Returns `text` with the spans referenced by `instructions` marked up.
///
/// `spans` must be the segmentation of this same text, so that token `i`
/// is the `i`-th whitespace-separated word.
pub fn render_text(text: &str, spans: &[Span], instructions: &[AnnotationInstruction]) -> String {
    let marked: BTreeSet<SpanId> = instructions.iter().map(|i| i.span_id).collect();
    let words = word_ranges(text);
    let total_tokens: usize = spans.iter().map(Span::token_count).sum();
    if total_tokens != words.len() {
        warn!(
            tokens = total_tokens,
            words = words.len(),
            "spans do not match the text; writing it unmarked"
        );
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() + marked.len() * 12 + 64);
    let entries = legend(instructions);
    if !entries.is_empty() {
        out.push_str("# langspan legend:");
        for entry in &entries {
            out.push_str(&format!(" [[{}]] {}", entry.language, entry.name));
        }
        out.push_str("\n\n");
    }

    let mut cursor = 0;
    let mut first_token = 0;
    for span in spans {
        let last_token = first_token + span.token_count();
        if marked.contains(&span.id) && span.token_count() > 0 {
            let start = words[first_token].start;
            let end = words[last_token - 1].end;
            out.push_str(&text[cursor..start]);
            out.push_str(&format!("[[{}]]", span.language));
            out.push_str(&text[start..end]);
            out.push_str(&format!("[[/{}]]", span.language));
            cursor = end;
        }
        first_token = last_token;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::map_to_annotations;
    use crate::ir::{ClassifiedToken, LanguageCode, LanguageLabel};
    use crate::segment::{segment, SegmentOptions};
    use crate::source::text::layout;

    fn code(s: &str) -> LanguageCode {
        LanguageCode::parse(s).unwrap()
    }

    fn spans_for(text: &str, labels: &[&str]) -> Vec<Span> {
        let (_, tokens) = layout(text);
        assert_eq!(tokens.len(), labels.len());
        let classified: Vec<ClassifiedToken> = tokens
            .into_iter()
            .zip(labels)
            .map(|(t, l)| ClassifiedToken::new(t, LanguageLabel::Known(code(l)), 0.9))
            .collect();
        segment(&classified, &SegmentOptions::default())
    }

    #[test]
    fn marks_foreign_spans_in_place() {
        let text = "The  chat\nnoir sat.\n";
        let spans = spans_for(text, &["en", "fr", "fr", "en"]);
        let exclude = BTreeSet::from([code("en")]);
        let instructions = map_to_annotations(&spans, &exclude);

        let out = render_text(text, &spans, &instructions);
        assert_eq!(
            out,
            "# langspan legend: [[fr]] French\n\nThe  [[fr]]chat\nnoir[[/fr]] sat.\n"
        );
    }

    #[test]
    fn nothing_marked_leaves_text_alone() {
        let text = "Plain English text here.";
        let spans = spans_for(text, &["en", "en", "en", "en"]);
        let instructions = map_to_annotations(&spans, &BTreeSet::from([code("en")]));
        assert_eq!(render_text(text, &spans, &instructions), text);
    }

    #[test]
    fn mismatched_spans_fall_back_to_plain_text() {
        let spans = spans_for("un deux", &["fr", "fr"]);
        let instructions = map_to_annotations(&spans, &BTreeSet::new());
        assert_eq!(render_text("one", &spans, &instructions), "one");
    }
}
