//! Token and span model shared by every pipeline stage.
//!
//! The derivation is strictly one-way: the source adapter produces
//! [`Token`]s, the classifier wraps each one in a [`ClassifiedToken`], and the
//! segmenter groups those into [`Span`]s. No stage mutates what an earlier
//! stage produced.

use serde::{Deserialize, Serialize};

use super::bbox::BBox;
use super::ids::{PageIndex, SpanId};
use super::language::{LanguageCode, LanguageLabel};
use super::space::PagePoints;

/// The smallest positioned unit of extracted text: a word from the native
/// text layer or a fragment detected by OCR.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,

    /// Zero-based page the token sits on.
    pub page: PageIndex,

    /// Location on the page in PDF user space.
    pub bbox: BBox<PagePoints>,

    /// OCR recognition confidence in `[0, 1]`; `None` for native text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f64>,
}

impl Token {
    /// A token read from a native text layer.
    pub fn native(text: impl Into<String>, page: impl Into<PageIndex>, bbox: BBox<PagePoints>) -> Self {
        Self {
            text: text.into(),
            page: page.into(),
            bbox,
            ocr_confidence: None,
        }
    }

    /// A token recognized by OCR. The confidence is clamped into `[0, 1]`.
    pub fn ocr(
        text: impl Into<String>,
        page: impl Into<PageIndex>,
        bbox: BBox<PagePoints>,
        confidence: f64,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            text: text.into(),
            page: page.into(),
            bbox,
            ocr_confidence: Some(confidence),
        }
    }

    /// Length in Unicode scalar values.
    #[inline]
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// A token together with the language the classifier assigned to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedToken {
    #[serde(flatten)]
    pub token: Token,
    pub language: LanguageLabel,
    /// Confidence in `[0, 1]` of the window that produced `language`.
    pub classifier_confidence: f64,
}

impl ClassifiedToken {
    pub fn new(token: Token, language: LanguageLabel, classifier_confidence: f64) -> Self {
        Self {
            token,
            language,
            classifier_confidence,
        }
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.token.text
    }

    #[inline]
    pub fn page(&self) -> PageIndex {
        self.token.page
    }
}

/// The union box of a span's tokens on one page.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageBox {
    pub page: PageIndex,
    pub bbox: BBox<PagePoints>,
}

/// A maximal run of tokens sharing one language after hysteresis.
///
/// Offsets index the document text obtained by joining all tokens with a
/// single space; `end_offset` is exclusive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub id: SpanId,
    pub language: LanguageCode,
    pub tokens: Vec<ClassifiedToken>,
    pub start_offset: usize,
    pub end_offset: usize,
    /// One entry per page touched, in page order.
    pub bboxes: Vec<PageBox>,
    /// Mean of the constituent classifier confidences.
    pub aggregate_confidence: f64,
}

impl Span {
    /// The span's text, tokens joined by single spaces.
    pub fn text(&self) -> String {
        let mut out = String::with_capacity(self.end_offset.saturating_sub(self.start_offset));
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(token.text());
        }
        out
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Characters in the span's tokens, excluding the joining spaces.
    pub fn char_count(&self) -> usize {
        self.tokens.iter().map(|t| t.token.char_count()).sum()
    }

    /// Pages touched by this span, in order.
    pub fn pages(&self) -> impl Iterator<Item = PageIndex> + '_ {
        self.bboxes.iter().map(|pb| pb.page)
    }

    pub fn first_page(&self) -> Option<PageIndex> {
        self.bboxes.first().map(|pb| pb.page)
    }
}
