//! Document screening before any extraction work.
//!
//! Intake decides what kind of document we were handed and refuses anything
//! we should not process:
//! - Unsupported or empty files, and files over the size limit
//! - PDFs that cannot be parsed, are encrypted or have no pages
//! - PDFs carrying active content (JavaScript, attached files)
//!
//! Every document also gets a SHA-256 fingerprint for the report.

mod report;

pub use report::{IntakeIssue, IntakeReport, IssueCode, IssueContext, Severity};

use std::fmt;

use lopdf::{Dictionary, Document, Object};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::LangspanError;

/// Default size limit: 10 MiB.
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// How far into the file the `%PDF-` header may appear.
const PDF_HEADER_WINDOW: usize = 1024;

/// Bytes scanned for NUL when deciding whether a file is text.
const BINARY_PROBE: usize = 8192;

/// The kinds of document the pipeline accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// File extension used for annotated output.
    pub fn extension(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Text => "txt",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Pdf => write!(f, "PDF"),
            DocumentKind::Text => write!(f, "text"),
        }
    }
}

/// Options for intake behavior.
#[derive(Clone, Debug)]
pub struct IntakeOptions {
    /// Documents larger than this are refused.
    pub max_bytes: u64,
    /// If true, treat warnings as errors.
    pub strict: bool,
}

impl Default for IntakeOptions {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            strict: false,
        }
    }
}

/// Guesses the document kind from its content.
///
/// A `%PDF-` header near the start makes a PDF; otherwise anything without
/// NUL bytes in its first few kilobytes is treated as text.
pub fn sniff_kind(bytes: &[u8]) -> Option<DocumentKind> {
    let head = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    if head.windows(5).any(|w| w == b"%PDF-") {
        return Some(DocumentKind::Pdf);
    }
    let probe = &bytes[..bytes.len().min(BINARY_PROBE)];
    if probe.contains(&0) {
        return None;
    }
    Some(DocumentKind::Text)
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Screens a document and returns a report of all issues found.
pub fn inspect_document(bytes: &[u8], opts: &IntakeOptions) -> IntakeReport {
    let mut report = IntakeReport::new();
    report.byte_len = bytes.len() as u64;
    report.fingerprint = fingerprint(bytes);

    if bytes.is_empty() {
        report.add(IntakeIssue::error(
            IssueCode::EmptyDocument,
            "Document is empty",
            IssueContext::Document,
        ));
        return report;
    }

    if report.byte_len > opts.max_bytes {
        report.add(IntakeIssue::error(
            IssueCode::DocumentTooLarge,
            format!(
                "Document is {} bytes; the limit is {} bytes",
                report.byte_len, opts.max_bytes
            ),
            IssueContext::Document,
        ));
        return report;
    }

    report.kind = sniff_kind(bytes);
    match report.kind {
        None => report.add(IntakeIssue::error(
            IssueCode::UnsupportedFileType,
            "Not a PDF or plain-text document",
            IssueContext::Document,
        )),
        Some(DocumentKind::Text) => inspect_text(bytes, &mut report),
        Some(DocumentKind::Pdf) => inspect_pdf(bytes, &mut report),
    }

    debug!(
        kind = ?report.kind,
        bytes = report.byte_len,
        errors = report.error_count(),
        warnings = report.warning_count(),
        "intake finished"
    );
    report
}

/// Screens a document and turns a failing report into an error.
///
/// In strict mode warnings also reject the document.
pub fn admit(bytes: &[u8], opts: &IntakeOptions) -> Result<IntakeReport, LangspanError> {
    let report = inspect_document(bytes, opts);
    let error_count = if opts.strict {
        report.issues.len()
    } else {
        report.error_count()
    };
    if error_count > 0 {
        return Err(LangspanError::IntakeRejected {
            error_count,
            report,
        });
    }
    Ok(report)
}

fn inspect_text(bytes: &[u8], report: &mut IntakeReport) {
    if std::str::from_utf8(bytes).is_err() {
        report.add(IntakeIssue::warning(
            IssueCode::InvalidUtf8,
            "Text is not valid UTF-8; invalid sequences will be replaced",
            IssueContext::Document,
        ));
    }
    let pages = bytes.iter().filter(|&&b| b == 0x0c).count() + 1;
    report.pages = Some(u32::try_from(pages).unwrap_or(u32::MAX));
}

fn inspect_pdf(bytes: &[u8], report: &mut IntakeReport) {
    let doc = match Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            report.add(IntakeIssue::error(
                IssueCode::PdfUnreadable,
                format!("Failed to parse PDF: {}", e),
                IssueContext::Document,
            ));
            return;
        }
    };

    if doc.trailer.has(b"Encrypt") {
        report.add(IntakeIssue::error(
            IssueCode::PdfEncrypted,
            "Encrypted PDFs are not supported",
            IssueContext::Document,
        ));
    }

    let pages = doc.get_pages().len();
    report.pages = Some(u32::try_from(pages).unwrap_or(u32::MAX));
    if pages == 0 {
        report.add(IntakeIssue::error(
            IssueCode::PdfNoPages,
            "PDF has no pages",
            IssueContext::Document,
        ));
    }

    for (&(id, generation), object) in &doc.objects {
        let dict = match object {
            Object::Dictionary(dict) => dict,
            Object::Stream(stream) => &stream.dict,
            _ => continue,
        };
        let context = IssueContext::Object { id, generation };

        if has_javascript(dict) {
            report.add(IntakeIssue::error(
                IssueCode::EmbeddedJavaScript,
                "PDF contains JavaScript",
                context.clone(),
            ));
        }
        if has_embedded_files(dict) {
            report.add(IntakeIssue::error(
                IssueCode::EmbeddedFiles,
                "PDF contains embedded files",
                context,
            ));
        }
    }
}

fn has_javascript(dict: &Dictionary) -> bool {
    dict.has(b"JS") || dict.has(b"JavaScript") || name_is(dict, b"S", b"JavaScript")
}

fn has_embedded_files(dict: &Dictionary) -> bool {
    dict.has(b"EmbeddedFiles") || name_is(dict, b"Type", b"EmbeddedFile")
}

fn name_is(dict: &Dictionary, key: &[u8], expected: &[u8]) -> bool {
    dict.get(key)
        .and_then(Object::as_name)
        .map_or(false, |name| name == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pdf_bytes, pdf_with_pages};
    use lopdf::dictionary;

    fn codes(report: &IntakeReport) -> Vec<IssueCode> {
        report.issues.iter().map(|i| i.code).collect()
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sniffs_kinds() {
        assert_eq!(sniff_kind(b"%PDF-1.7\n..."), Some(DocumentKind::Pdf));
        assert_eq!(sniff_kind(b"junk\n%PDF-1.4\n"), Some(DocumentKind::Pdf));
        assert_eq!(sniff_kind("Le chat".as_bytes()), Some(DocumentKind::Text));
        assert_eq!(sniff_kind(&[0x89, b'P', b'N', b'G', 0, 0]), None);
    }

    #[test]
    fn clean_text_passes() {
        let report = inspect_document(b"Hello\x0cworld", &IntakeOptions::default());
        assert!(report.is_ok_strict());
        assert_eq!(report.kind, Some(DocumentKind::Text));
        assert_eq!(report.pages, Some(2));
        assert_eq!(report.byte_len, 11);
    }

    #[test]
    fn empty_document_is_rejected() {
        let err = admit(b"", &IntakeOptions::default()).unwrap_err();
        match err {
            LangspanError::IntakeRejected { error_count, report } => {
                assert_eq!(error_count, 1);
                assert_eq!(codes(&report), vec![IssueCode::EmptyDocument]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn oversized_document_is_rejected() {
        let opts = IntakeOptions {
            max_bytes: 4,
            ..Default::default()
        };
        let report = inspect_document(b"hello", &opts);
        assert_eq!(codes(&report), vec![IssueCode::DocumentTooLarge]);
    }

    #[test]
    fn binary_is_unsupported() {
        let report = inspect_document(&[1, 2, 0, 4], &IntakeOptions::default());
        assert_eq!(codes(&report), vec![IssueCode::UnsupportedFileType]);
        assert!(report.kind.is_none());
    }

    #[test]
    fn invalid_utf8_is_a_warning_unless_strict() {
        let bytes = b"caf\xe9 au lait";
        assert!(admit(bytes, &IntakeOptions::default()).is_ok());
        let strict = IntakeOptions {
            strict: true,
            ..Default::default()
        };
        assert!(matches!(
            admit(bytes, &strict),
            Err(LangspanError::IntakeRejected { error_count: 1, .. })
        ));
    }

    #[test]
    fn clean_pdf_passes() {
        let bytes = pdf_bytes(pdf_with_pages(&[&["Hello world"], &["Second page"]]));
        let report = inspect_document(&bytes, &IntakeOptions::default());
        assert!(report.is_ok(), "{report}");
        assert_eq!(report.kind, Some(DocumentKind::Pdf));
        assert_eq!(report.pages, Some(2));
    }

    #[test]
    fn garbage_after_header_is_unreadable() {
        let report = inspect_document(b"%PDF-1.5\nthis is not a pdf", &IntakeOptions::default());
        assert_eq!(codes(&report), vec![IssueCode::PdfUnreadable]);
    }

    #[test]
    fn javascript_is_rejected() {
        let mut doc = pdf_with_pages(&[&["Click me"]]);
        doc.add_object(dictionary! {
            "S" => "JavaScript",
            "JS" => Object::string_literal("app.alert('hi')"),
        });
        let report = inspect_document(&pdf_bytes(doc), &IntakeOptions::default());
        assert!(report.has(IssueCode::EmbeddedJavaScript));
        assert!(!report.is_ok());
    }

    #[test]
    fn embedded_files_are_rejected() {
        let mut doc = pdf_with_pages(&[&["Attachment inside"]]);
        doc.add_object(dictionary! {
            "EmbeddedFiles" => dictionary! { "Names" => Vec::<Object>::new() },
        });
        let report = inspect_document(&pdf_bytes(doc), &IntakeOptions::default());
        assert!(report.has(IssueCode::EmbeddedFiles));
    }

    #[test]
    fn report_display_lists_issues() {
        let report = inspect_document(&[0, 0], &IntakeOptions::default());
        let text = report.to_string();
        assert!(text.contains("unsupported"));
        assert!(text.contains("UnsupportedFileType"));
    }
}
