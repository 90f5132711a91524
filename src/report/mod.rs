//! The analysis report.
//!
//! A [`Report`] combines document statistics, the foreign-language spans
//! (with their translations when translation was requested) and notes about
//! anything that was degraded along the way: OCR pages that failed, spans
//! that could not be translated, and extraction warnings. It renders as
//! boxed terminal text (Display) and serializes as JSON.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::intake::DocumentKind;
use crate::ir::{LanguageCode, Span, SpanId};
use crate::source::{ExtractionMethod, PageFailure};
use crate::stats::{
    box_blank, box_bottom, box_row, box_top, fmt_percent, format_number, truncate_label,
    DocumentStats,
};
use crate::translate::SpanFailure;

/// Characters of span text shown in the terminal rendering.
const PREVIEW_CHARS: usize = 40;

/// Whether a span was translated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    NotRequested,
    Translated,
    Unavailable,
}

/// One foreign-language span in the report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpanSummary {
    pub id: SpanId,
    pub language: LanguageCode,
    pub language_name: String,
    /// 1-based page numbers touched by the span.
    pub pages: Vec<u32>,
    pub token_count: usize,
    pub confidence: f64,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
    pub translated_text: Option<String>,
    pub translation: TranslationStatus,
}

/// What a note is about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum NoteScope {
    Document,
    Page { page: u32 },
    Span { span_id: SpanId },
}

/// A degradation worth telling the reader about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Note {
    #[serde(flatten)]
    pub scope: NoteScope,
    pub message: String,
}

impl Note {
    pub fn document(message: impl Into<String>) -> Self {
        Self {
            scope: NoteScope::Document,
            message: message.into(),
        }
    }

    pub fn page(page: u32, message: impl Into<String>) -> Self {
        Self {
            scope: NoteScope::Page { page },
            message: message.into(),
        }
    }

    pub fn span(span_id: SpanId, message: impl Into<String>) -> Self {
        Self {
            scope: NoteScope::Span { span_id },
            message: message.into(),
        }
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            NoteScope::Document => write!(f, "{}", self.message),
            NoteScope::Page { page } => write!(f, "page {page}: {}", self.message),
            NoteScope::Span { span_id } => write!(f, "span {span_id}: {}", self.message),
        }
    }
}

/// Where the report's text came from.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocumentInfo {
    pub name: String,
    pub kind: DocumentKind,
    /// SHA-256 of the document bytes, hex encoded.
    pub fingerprint: String,
    pub extraction: ExtractionMethod,
}

/// The full analysis report for one document.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentInfo>,
    pub stats: DocumentStats,
    pub spans: Vec<SpanSummary>,
    pub notes: Vec<Note>,
}

/// Builds a report from statistics and the spans to list.
///
/// `translations` is `None` when translation was not requested. When it is
/// `Some`, a span without an entry is kept with no translated text, marked
/// unavailable, and noted.
pub fn build(
    stats: DocumentStats,
    spans: &[&Span],
    translations: Option<&BTreeMap<SpanId, String>>,
) -> Report {
    let mut notes = Vec::new();
    let summaries = spans
        .iter()
        .map(|span| {
            let (translated_text, translation) = match translations {
                None => (None, TranslationStatus::NotRequested),
                Some(map) => match map.get(&span.id) {
                    Some(text) => (Some(text.clone()), TranslationStatus::Translated),
                    None => {
                        notes.push(Note::span(span.id, "translation unavailable"));
                        (None, TranslationStatus::Unavailable)
                    }
                },
            };
            SpanSummary {
                id: span.id,
                language: span.language.clone(),
                language_name: span.language.display_name(),
                pages: span.pages().map(|p| p.number()).collect(),
                token_count: span.token_count(),
                confidence: span.aggregate_confidence,
                start_offset: span.start_offset,
                end_offset: span.end_offset,
                text: span.text(),
                translated_text,
                translation,
            }
        })
        .collect();

    Report {
        document: None,
        stats,
        spans: summaries,
        notes,
    }
}

impl Report {
    pub fn with_document(mut self, document: DocumentInfo) -> Self {
        self.document = Some(document);
        self
    }

    /// Notes every page OCR gave up on.
    pub fn with_page_failures(mut self, failures: &[PageFailure]) -> Self {
        for failure in failures {
            self.notes.push(Note::page(
                failure.page.number(),
                format!(
                    "OCR failed after {} attempt(s): {}",
                    failure.attempts, failure.message
                ),
            ));
        }
        self
    }

    /// Adds the provider's reason to the notes of untranslated spans.
    pub fn with_translation_failures(mut self, failures: &[SpanFailure]) -> Self {
        for failure in failures {
            let scope = NoteScope::Span {
                span_id: failure.span_id,
            };
            let message = format!("translation unavailable: {}", failure.message);
            match self.notes.iter_mut().find(|n| n.scope == scope) {
                Some(note) => note.message = message,
                None => self.notes.push(Note::span(failure.span_id, message)),
            }
        }
        self
    }

    pub fn with_warnings<I, S>(mut self, warnings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.notes.extend(warnings.into_iter().map(Note::document));
        self
    }

    pub fn untranslated(&self) -> usize {
        self.spans
            .iter()
            .filter(|s| s.translation == TranslationStatus::Unavailable)
            .count()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(
            f,
            "╭─────────────────────────────────────────────────────────────╮"
        )?;
        writeln!(
            f,
            "│                 Language Analysis Report                    │"
        )?;
        writeln!(
            f,
            "╰─────────────────────────────────────────────────────────────╯"
        )?;
        writeln!(f)?;

        if let Some(doc) = &self.document {
            writeln!(f, "  Document:    {} ({})", doc.name, doc.kind)?;
            writeln!(f, "  Fingerprint: {}", doc.fingerprint)?;
            writeln!(f)?;
        }

        write!(f, "{}", self.stats)?;
        writeln!(f)?;
        self.fmt_spans(f)?;
        if !self.notes.is_empty() {
            writeln!(f)?;
            self.fmt_notes(f)?;
        }
        Ok(())
    }
}

impl Report {
    fn fmt_spans(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let foreign_tokens: usize = self.spans.iter().map(|s| s.token_count).sum();
        box_top(
            f,
            &format!(
                "Foreign-language spans ({}, {} of tokens)",
                format_number(self.spans.len()),
                fmt_percent(foreign_tokens, self.stats.total_tokens)
            ),
        )?;
        box_blank(f)?;

        if self.spans.is_empty() {
            box_row(f, "  No foreign-language spans found.")?;
        }
        for span in &self.spans {
            box_row(
                f,
                &format!(
                    "  {:<5} {:<3} {:<9} {:.2}  {}",
                    span.id.to_string(),
                    span.language.as_str(),
                    page_range(&span.pages),
                    span.confidence,
                    truncate_label(&span.text, PREVIEW_CHARS)
                ),
            )?;
            match (&span.translated_text, span.translation) {
                (Some(text), _) => {
                    box_row(f, &format!("        → {}", truncate_label(text, PREVIEW_CHARS)))?
                }
                (None, TranslationStatus::Unavailable) => {
                    box_row(f, "        → (translation unavailable)")?
                }
                _ => {}
            }
        }

        box_blank(f)?;
        box_bottom(f)
    }

    fn fmt_notes(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        box_top(f, &format!("Notes ({})", self.notes.len()))?;
        box_blank(f)?;
        for note in &self.notes {
            box_row(f, &format!("  • {note}"))?;
        }
        box_blank(f)?;
        box_bottom(f)
    }
}

/// `p.3` or `p.3-5`.
fn page_range(pages: &[u32]) -> String {
    match (pages.first(), pages.last()) {
        (Some(first), Some(last)) if first == last => format!("p.{first}"),
        (Some(first), Some(last)) => format!("p.{first}-{last}"),
        _ => String::new(),
    }
}
