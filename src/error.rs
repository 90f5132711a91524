use std::path::PathBuf;
use thiserror::Error;

use crate::intake::IntakeReport;
use crate::ir::LanguageCode;
use crate::runtime::CancelReason;

/// The main error type for langspan operations.
///
/// Only document-wide failures end up here. Failures local to one page
/// (`OcrFailure`) or one span (`TranslationUnavailable`) are degraded and
/// recorded in the report instead.
#[derive(Debug, Error)]
pub enum LangspanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No extractable text in document ({pages} page(s), OCR attempted: {ocr_attempted})")]
    NoExtractableContent { pages: u32, ocr_attempted: bool },

    #[error("Language '{language}' is not supported by the classifier (supported: {supported})")]
    UnsupportedLanguageRequested {
        language: LanguageCode,
        supported: String,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to parse config from {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to parse OCR token file {path}: {source}")]
    TokenFileParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write report to {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Document rejected with {error_count} error(s)")]
    IntakeRejected {
        error_count: usize,
        report: IntakeReport,
    },

    #[error("Failed to read PDF: {message}")]
    PdfParse { message: String },

    #[error("Failed to write annotated PDF: {message}")]
    PdfWrite { message: String },

    #[error("Processing cancelled: {reason}")]
    Cancelled { reason: CancelReason },

    #[error("Too many concurrent requests ({in_flight} in flight, {queued} queued); try again later")]
    Overloaded { in_flight: usize, queued: usize },

    #[error("Failed to start worker pool: {message}")]
    WorkerPool { message: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("{failed} of {total} document(s) failed")]
    BatchFailed { failed: usize, total: usize },
}

impl From<lopdf::Error> for LangspanError {
    fn from(source: lopdf::Error) -> Self {
        LangspanError::PdfParse {
            message: source.to_string(),
        }
    }
}
