//! Span segmentation with hysteresis.
//!
//! The segmenter walks classified tokens left to right and groups them into
//! [`Span`]s. A language change only opens a new span once it has been
//! sustained for `min_run` consecutive tokens, so a single misclassified
//! word inside a paragraph does not fragment it. Tokens labelled
//! [`LanguageLabel::Unknown`] take the language of the span they fall in
//! (the primary language before any span exists) and interrupt a competing
//! run.
//!
//! The resulting spans partition the input: every token belongs to exactly
//! one span and concatenating the spans in order gives the input back.

use tracing::debug;

use crate::ir::{ClassifiedToken, LanguageCode, LanguageLabel, PageBox, Span, SpanId};

/// Default number of consecutive tokens a language change must last.
pub const DEFAULT_MIN_RUN: usize = 2;

/// Options for segmentation.
#[derive(Clone, Debug)]
pub struct SegmentOptions {
    /// A competing language must last this many tokens to open a span.
    /// A shorter run that ends the document still does when it returns to
    /// the primary language or to the language before the open span.
    pub min_run: usize,
    /// Language of the document before any span has been opened.
    pub primary: LanguageCode,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            min_run: DEFAULT_MIN_RUN,
            primary: LanguageCode::english(),
        }
    }
}

/// Groups classified tokens into language spans.
///
/// Empty input yields no spans. Span ids are assigned in document order
/// starting at 1.
pub fn segment(tokens: &[ClassifiedToken], opts: &SegmentOptions) -> Vec<Span> {
    let min_run = opts.min_run.max(1);
    let offsets = token_offsets(tokens);

    let mut builders: Vec<SpanBuilder> = Vec::new();
    let mut current = opts.primary.clone();
    let mut i = 0;

    while i < tokens.len() {
        let label = effective_language(&tokens[i], &current);

        if label == current {
            push_current(&mut builders, &current, i);
            i += 1;
            continue;
        }

        let mut end = i + 1;
        while end < tokens.len() && effective_language(&tokens[end], &current) == label {
            end += 1;
        }
        let run = end - i;

        let trailing_return = end == tokens.len()
            && (label == opts.primary || previous_language(&builders) == Some(&label));
        if run >= min_run || trailing_return {
            builders.push(SpanBuilder::new(label.clone(), i));
            current = label;
        }
        for k in i..end {
            push_current(&mut builders, &current, k);
        }
        i = end;
    }

    let spans: Vec<Span> = builders
        .into_iter()
        .enumerate()
        .map(|(n, b)| b.finish(SpanId::new(n as u64 + 1), tokens, &offsets))
        .collect();

    debug!(
        tokens = tokens.len(),
        spans = spans.len(),
        min_run,
        "segmented document"
    );
    spans
}

/// Document text as seen by span offsets: all tokens joined by one space.
pub fn document_text(tokens: &[ClassifiedToken]) -> String {
    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(token.text());
    }
    out
}

/// Spans whose language differs from `primary`, in document order.
pub fn foreign_spans<'a>(
    spans: &'a [Span],
    primary: &LanguageCode,
) -> impl Iterator<Item = &'a Span> + 'a {
    let primary = primary.clone();
    spans.iter().filter(move |s| s.language != primary)
}

fn effective_language(token: &ClassifiedToken, current: &LanguageCode) -> LanguageCode {
    match &token.language {
        LanguageLabel::Known(code) => code.clone(),
        LanguageLabel::Unknown => current.clone(),
    }
}

/// Language of the span before the open one.
fn previous_language(builders: &[SpanBuilder]) -> Option<&LanguageCode> {
    builders
        .len()
        .checked_sub(2)
        .map(|n| &builders[n].language)
}

/// Appends token `index` to the open span, opening one in `current` if
/// nothing is open yet.
fn push_current(builders: &mut Vec<SpanBuilder>, current: &LanguageCode, index: usize) {
    if builders.is_empty() {
        builders.push(SpanBuilder::new(current.clone(), index));
    }
    if let Some(open) = builders.last_mut() {
        open.end = index + 1;
    }
}

/// Character offset of every token in the joined document text.
fn token_offsets(tokens: &[ClassifiedToken]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(tokens.len());
    let mut cursor = 0;
    for token in tokens {
        offsets.push(cursor);
        cursor += token.token.char_count() + 1;
    }
    offsets
}

/// A span under construction, covering `tokens[start..end]`.
struct SpanBuilder {
    language: LanguageCode,
    start: usize,
    end: usize,
}

impl SpanBuilder {
    fn new(language: LanguageCode, start: usize) -> Self {
        Self {
            language,
            start,
            end: start,
        }
    }

    fn finish(self, id: SpanId, tokens: &[ClassifiedToken], offsets: &[usize]) -> Span {
        let members = &tokens[self.start..self.end];
        let start_offset = offsets[self.start];
        let end_offset = offsets[self.end - 1] + members[members.len() - 1].token.char_count();

        let confidence_sum: f64 = members.iter().map(|t| t.classifier_confidence).sum();
        let aggregate_confidence = confidence_sum / members.len() as f64;

        Span {
            id,
            language: self.language,
            tokens: members.to_vec(),
            start_offset,
            end_offset,
            bboxes: page_boxes(members),
            aggregate_confidence,
        }
    }
}

/// One union box per page touched, in order of first appearance.
fn page_boxes(tokens: &[ClassifiedToken]) -> Vec<PageBox> {
    let mut boxes: Vec<PageBox> = Vec::new();
    for token in tokens {
        let bbox = token.token.bbox;
        match boxes.iter_mut().find(|pb| pb.page == token.page()) {
            Some(existing) => existing.bbox = existing.bbox.union(&bbox),
            None => boxes.push(PageBox {
                page: token.page(),
                bbox: bbox.normalized(),
            }),
        }
    }
    boxes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BBox, PageIndex, Token};

    fn code(s: &str) -> LanguageCode {
        LanguageCode::parse(s).unwrap()
    }

    fn ct(text: &str, lang: Option<&str>, conf: f64) -> ClassifiedToken {
        ct_on(text, lang, conf, 0)
    }

    fn ct_on(text: &str, lang: Option<&str>, conf: f64, page: u32) -> ClassifiedToken {
        let label = match lang {
            Some(l) => LanguageLabel::Known(code(l)),
            None => LanguageLabel::Unknown,
        };
        ClassifiedToken::new(
            Token::native(text, page, BBox::new(10.0, 10.0, 50.0, 22.0)),
            label,
            conf,
        )
    }

    fn opts(min_run: usize) -> SegmentOptions {
        SegmentOptions {
            min_run,
            primary: code("en"),
        }
    }

    fn summary(spans: &[Span]) -> Vec<(String, String)> {
        spans
            .iter()
            .map(|s| (s.language.to_string(), s.text()))
            .collect()
    }

    fn scenario() -> Vec<ClassifiedToken> {
        vec![
            ct("The", Some("en"), 0.99),
            ct("chat", Some("fr"), 0.9),
            ct("noir", Some("fr"), 0.88),
            ct("sat", Some("en"), 0.95),
        ]
    }

    #[test]
    fn sustained_change_opens_span() {
        let spans = segment(&scenario(), &opts(2));
        assert_eq!(
            summary(&spans),
            vec![
                ("en".into(), "The".into()),
                ("fr".into(), "chat noir".into()),
                ("en".into(), "sat".into()),
            ]
        );
        assert_eq!(spans[1].start_offset, 4);
        assert_eq!(spans[1].end_offset, 13);
        assert!((spans[1].aggregate_confidence - 0.89).abs() < 1e-9);
        let ids: Vec<u64> = spans.iter().map(|s| s.id.as_u64()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn short_change_is_absorbed() {
        let spans = segment(&scenario(), &opts(3));
        assert_eq!(summary(&spans), vec![("en".into(), "The chat noir sat".into())]);
        assert_eq!(spans[0].start_offset, 0);
        assert_eq!(spans[0].end_offset, 17);
    }

    #[test]
    fn empty_input_has_no_spans() {
        assert!(segment(&[], &opts(2)).is_empty());
    }

    #[test]
    fn unknown_inherits_current_language() {
        let tokens = vec![
            ct("Le", Some("fr"), 0.9),
            ct("chat", Some("fr"), 0.9),
            ct("1914", None, 0.0),
            ct("noir", Some("fr"), 0.9),
        ];
        let spans = segment(&tokens, &opts(2));
        assert_eq!(summary(&spans), vec![("fr".into(), "Le chat 1914 noir".into())]);
    }

    #[test]
    fn all_unknown_is_one_primary_span() {
        let tokens = vec![ct("1", None, 0.1), ct("2", None, 0.2)];
        let spans = segment(&tokens, &opts(2));
        assert_eq!(summary(&spans), vec![("en".into(), "1 2".into())]);
    }

    #[test]
    fn unknown_interrupts_competing_run() {
        // fr, ?, fr: the unknown token takes "en" and splits the run.
        let tokens = vec![
            ct("The", Some("en"), 0.9),
            ct("cat", Some("en"), 0.9),
            ct("chat", Some("fr"), 0.9),
            ct("--", None, 0.0),
            ct("noir", Some("fr"), 0.9),
            ct("sat", Some("en"), 0.9),
        ];
        let spans = segment(&tokens, &opts(2));
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn short_foreign_run_at_start_is_absorbed() {
        let tokens = vec![
            ct("Bonjour", Some("fr"), 0.9),
            ct("my", Some("en"), 0.9),
            ct("friend", Some("en"), 0.9),
        ];
        let spans = segment(&tokens, &opts(2));
        assert_eq!(summary(&spans), vec![("en".into(), "Bonjour my friend".into())]);
    }

    #[test]
    fn short_foreign_run_at_end_is_absorbed() {
        let tokens = vec![
            ct("The", Some("en"), 0.9),
            ct("cat", Some("en"), 0.9),
            ct("fin", Some("fr"), 0.9),
        ];
        let spans = segment(&tokens, &opts(3));
        assert_eq!(summary(&spans), vec![("en".into(), "The cat fin".into())]);
    }

    #[test]
    fn short_return_at_end_opens_span() {
        let words = [
            ("one", "en"),
            ("two", "en"),
            ("trois", "fr"),
            ("quatre", "fr"),
            ("cinq", "fr"),
            ("sex", "la"),
            ("septem", "la"),
            ("octo", "la"),
            ("neuf", "fr"),
        ];
        let tokens: Vec<ClassifiedToken> =
            words.iter().map(|(w, l)| ct(w, Some(l), 0.9)).collect();
        let spans = segment(&tokens, &opts(3));
        let languages: Vec<&str> = spans.iter().map(|s| s.language.as_str()).collect();
        assert_eq!(languages, vec!["en", "fr", "la", "fr"]);

        // A third language right at the end stays in the open span.
        let mut other = tokens.clone();
        other[8] = ct("neun", Some("de"), 0.9);
        let spans = segment(&other, &opts(3));
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[2].text(), "sex septem octo neun");
    }

    #[test]
    fn span_crossing_pages_gets_box_per_page() {
        let mut a = ct_on("Lorem", Some("la"), 0.8, 0);
        a.token.bbox = BBox::new(72.0, 90.0, 110.0, 102.0);
        let mut b = ct_on("ipsum", Some("la"), 0.8, 0);
        b.token.bbox = BBox::new(115.0, 90.0, 150.0, 102.0);
        let mut c = ct_on("dolor", Some("la"), 0.8, 1);
        c.token.bbox = BBox::new(72.0, 700.0, 105.0, 712.0);

        let spans = segment(&[a, b, c], &opts(2));
        assert_eq!(spans.len(), 1);
        let boxes = &spans[0].bboxes;
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].page, PageIndex::new(0));
        assert_eq!(boxes[0].bbox, BBox::new(72.0, 90.0, 150.0, 102.0));
        assert_eq!(boxes[1].page, PageIndex::new(1));
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let tokens = vec![
            ct("λόγος", Some("el"), 0.9),
            ct("καὶ", Some("el"), 0.9),
            ct("word", Some("en"), 0.9),
            ct("here", Some("en"), 0.9),
        ];
        let spans = segment(&tokens, &opts(2));
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].start_offset, spans[0].end_offset), (0, 9));
        assert_eq!((spans[1].start_offset, spans[1].end_offset), (10, 19));
        let text = document_text(&tokens);
        let chars: Vec<char> = text.chars().collect();
        let second: String = chars[spans[1].start_offset..spans[1].end_offset].iter().collect();
        assert_eq!(second, "word here");
    }

    #[test]
    fn foreign_spans_skip_primary() {
        let spans = segment(&scenario(), &opts(2));
        let primary = code("en");
        let foreign: Vec<_> = foreign_spans(&spans, &primary).collect();
        assert_eq!(foreign.len(), 1);
        assert_eq!(foreign[0].text(), "chat noir");

        // The primary code may be a temporary; only the spans are borrowed.
        let from_temporary: Vec<&Span> = foreign_spans(&spans, &code("en")).collect();
        assert_eq!(from_temporary, foreign);
    }
}
