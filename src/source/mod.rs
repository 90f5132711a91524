//! TextSource adapter: turns document bytes into positioned tokens.
//!
//! Two paths produce tokens:
//!
//! - the **native** path reads text the document already carries (a PDF text
//!   layer, or the words of a plain-text file on a synthetic page grid);
//! - the **OCR** path hands page images to an [`OcrEngine`].
//!
//! In [`ExtractMode::Auto`] the native layer is used when it is dense enough
//! (non-whitespace characters per page, averaged over pages, at least
//! `min_chars_per_page`), and OCR otherwise.

pub mod ocr;
pub mod pdf;
mod tesseract;
pub mod text;

pub use ocr::{
    run_ocr, OcrEngine, OcrFailure, OcrOptions, OcrOutcome, PageFailure, PageImage, Raster,
    RasterFormat, TokenFileOcr,
};
pub use tesseract::{parse_tsv, TesseractCli};

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::LangspanError;
use crate::intake::{sniff_kind, DocumentKind};
use crate::ir::{PageIndex, Token};
use crate::runtime::{CallLimiter, CancelToken};

/// Default native-layer density below which Auto mode falls back to OCR.
pub const DEFAULT_MIN_CHARS_PER_PAGE: f64 = 25.0;

/// How to obtain the text layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractMode {
    /// Only the document's own text.
    Native,
    /// Always OCR, ignoring any native text.
    ForceOcr,
    /// Native text when dense enough, OCR otherwise.
    #[default]
    Auto,
}

/// Which path produced the tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Native,
    Ocr,
}

/// Size of one page in points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub index: PageIndex,
    pub width: f64,
    pub height: f64,
}

/// A document held in memory.
#[derive(Clone, Debug)]
pub struct SourceDocument {
    kind: DocumentKind,
    bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(kind: DocumentKind, bytes: Vec<u8>) -> Self {
        Self { kind, bytes }
    }

    /// Wraps bytes, detecting the kind from the content.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, LangspanError> {
        let kind = sniff_kind(&bytes)
            .ok_or_else(|| LangspanError::UnsupportedFormat("not a PDF or text document".into()))?;
        Ok(Self::new(kind, bytes))
    }

    pub fn read(path: &Path) -> Result<Self, LangspanError> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the document. Same as `drop`.
    pub fn dispose(self) {}
}

/// Options for extraction.
#[derive(Clone, Debug)]
pub struct ExtractOptions {
    pub mode: ExtractMode,
    pub min_chars_per_page: f64,
    pub ocr: OcrOptions,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            mode: ExtractMode::Auto,
            min_chars_per_page: DEFAULT_MIN_CHARS_PER_PAGE,
            ocr: OcrOptions::default(),
        }
    }
}

/// Positioned tokens for a whole document.
#[derive(Clone, Debug)]
pub struct Extraction {
    pub method: ExtractionMethod,
    pub pages: Vec<PageInfo>,
    /// Tokens in reading order: page by page, then content order.
    pub tokens: Vec<Token>,
    /// Pages OCR gave up on.
    pub page_failures: Vec<PageFailure>,
    /// Non-fatal problems worth reporting.
    pub warnings: Vec<String>,
    /// Decoded text of a plain-text document.
    pub text: Option<String>,
}

impl Extraction {
    pub fn page_count(&self) -> u32 {
        u32::try_from(self.pages.len()).unwrap_or(u32::MAX)
    }

    pub fn ocr_used(&self) -> bool {
        self.method == ExtractionMethod::Ocr
    }
}

/// Average non-whitespace characters per page.
pub fn text_density(tokens: &[Token], pages: usize) -> f64 {
    let chars: usize = tokens
        .iter()
        .map(|t| t.text.chars().filter(|c| !c.is_whitespace()).count())
        .sum();
    chars as f64 / pages.max(1) as f64
}

/// How much native text a document carries, without running OCR.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TextLayerAssessment {
    pub pages: u32,
    pub tokens: usize,
    pub chars_per_page: f64,
    /// Mode [`ExtractMode::Auto`] resolves to for this document.
    pub recommended: ExtractMode,
}

/// Reads the native text layer and reports whether OCR would be needed.
pub fn assess_text_layer(
    document: &SourceDocument,
    min_chars_per_page: f64,
) -> Result<TextLayerAssessment, LangspanError> {
    let (pages, tokens) = match document.kind() {
        DocumentKind::Text => {
            let (text, _) = text::decode(document.bytes());
            let (pages, tokens) = text::layout(&text);
            (pages.len(), tokens)
        }
        DocumentKind::Pdf => {
            let doc = pdf::load(document.bytes())?;
            let pdf_pages = pdf::pages(&doc);
            (pdf_pages.len(), pdf::text_layer(&doc, &pdf_pages))
        }
    };
    let chars_per_page = text_density(&tokens, pages);
    let recommended = if document.kind() == DocumentKind::Pdf && chars_per_page < min_chars_per_page
    {
        ExtractMode::ForceOcr
    } else {
        ExtractMode::Native
    };
    Ok(TextLayerAssessment {
        pages: u32::try_from(pages).unwrap_or(u32::MAX),
        tokens: tokens.len(),
        chars_per_page,
        recommended,
    })
}

/// Extracts positioned tokens from `document`.
///
/// # Errors
/// - [`LangspanError::NoExtractableContent`] if neither the native layer nor
///   OCR yields a single token.
/// - [`LangspanError::InvalidConfig`] for [`ExtractMode::ForceOcr`] without
///   an OCR engine.
/// - [`LangspanError::PdfParse`] if a PDF cannot be parsed.
/// - [`LangspanError::Cancelled`] from OCR.
pub fn extract(
    document: &SourceDocument,
    opts: &ExtractOptions,
    ocr: Option<&dyn OcrEngine>,
    cancel: &CancelToken,
    limiter: &CallLimiter,
) -> Result<Extraction, LangspanError> {
    match document.kind() {
        DocumentKind::Text => extract_text(document.bytes(), opts),
        DocumentKind::Pdf => extract_pdf(document.bytes(), opts, ocr, cancel, limiter),
    }
}

fn extract_text(bytes: &[u8], opts: &ExtractOptions) -> Result<Extraction, LangspanError> {
    let mut warnings = Vec::new();
    let (text, lossy) = text::decode(bytes);
    if lossy {
        warnings.push("document is not valid UTF-8; invalid sequences were replaced".to_string());
    }
    if opts.mode == ExtractMode::ForceOcr {
        warnings.push("OCR does not apply to plain-text documents; using the text as-is".to_string());
    }

    let (pages, tokens) = text::layout(&text);
    if tokens.is_empty() {
        return Err(LangspanError::NoExtractableContent {
            pages: u32::try_from(pages.len()).unwrap_or(u32::MAX),
            ocr_attempted: false,
        });
    }

    info!(pages = pages.len(), tokens = tokens.len(), "read text document");
    Ok(Extraction {
        method: ExtractionMethod::Native,
        pages,
        tokens,
        page_failures: Vec::new(),
        warnings,
        text: Some(text),
    })
}

fn extract_pdf(
    bytes: &[u8],
    opts: &ExtractOptions,
    ocr: Option<&dyn OcrEngine>,
    cancel: &CancelToken,
    limiter: &CallLimiter,
) -> Result<Extraction, LangspanError> {
    let doc = pdf::load(bytes)?;
    let pdf_pages = pdf::pages(&doc);
    let pages: Vec<PageInfo> = pdf_pages.iter().map(|p| p.info).collect();
    let page_count = u32::try_from(pages.len()).unwrap_or(u32::MAX);
    let mut warnings = Vec::new();

    let native = match opts.mode {
        ExtractMode::ForceOcr => Vec::new(),
        _ => pdf::text_layer(&doc, &pdf_pages),
    };
    let density = text_density(&native, pages.len());

    let want_ocr = match opts.mode {
        ExtractMode::Native => false,
        ExtractMode::ForceOcr => true,
        ExtractMode::Auto => density < opts.min_chars_per_page,
    };
    info!(
        mode = ?opts.mode,
        pages = pages.len(),
        native_tokens = native.len(),
        density,
        want_ocr,
        "assessed text layer"
    );

    let mut ocr_attempted = false;
    let mut page_failures = Vec::new();

    if want_ocr {
        match ocr {
            Some(engine) => {
                cancel.check()?;
                let images = pdf::page_images(&doc, &pdf_pages);
                let outcome = run_ocr(engine, &images, &opts.ocr, cancel, limiter)?;
                ocr_attempted = true;
                page_failures = outcome.failures;
                if !outcome.tokens.is_empty() {
                    return Ok(Extraction {
                        method: ExtractionMethod::Ocr,
                        pages,
                        tokens: outcome.tokens,
                        page_failures,
                        warnings,
                        text: None,
                    });
                }
                if !native.is_empty() {
                    warn!("OCR produced no text; falling back to the sparse native layer");
                    warnings.push("OCR produced no text; used the sparse native text layer".into());
                }
            }
            None if opts.mode == ExtractMode::ForceOcr => {
                return Err(LangspanError::InvalidConfig {
                    message: "OCR was forced but no OCR engine is configured".into(),
                });
            }
            None => {
                if !native.is_empty() {
                    warnings.push(format!(
                        "text layer is sparse ({density:.1} characters per page) and no OCR engine is configured"
                    ));
                }
            }
        }
    }

    if native.is_empty() {
        return Err(LangspanError::NoExtractableContent {
            pages: page_count,
            ocr_attempted,
        });
    }

    Ok(Extraction {
        method: ExtractionMethod::Native,
        pages,
        tokens: native,
        page_failures,
        warnings,
        text: None,
    })
}
