//! Sliding-window language classification.
//!
//! Single words are too short to classify reliably, so every token is
//! labelled by classifying a window of its neighbours. The raw detector is a
//! pluggable [`LanguageDetector`]; this module owns the policy layered on
//! top of it:
//!
//! - output is restricted to the enabled languages plus
//!   [`LanguageLabel::Unknown`];
//! - a guess outside the enabled set falls back to the primary language, so
//!   languages the user declined to track are never highlighted;
//! - a window whose confidence is below the minimum is `Unknown`;
//! - OCR uncertainty scales classifier confidence down, so badly recognized
//!   text tends towards `Unknown` rather than a spurious language.

mod agreement;
mod whatlang_detector;

pub use agreement::AgreementDetector;
pub use whatlang_detector::WhatlangDetector;

use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::debug;

use crate::ir::{ClassifiedToken, LanguageCode, LanguageLabel, Token};

/// Default window width in tokens.
pub const DEFAULT_WINDOW_WIDTH: usize = 5;

/// Default minimum confidence below which a window is `Unknown`.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// A raw, unrestricted language guess.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub language: LanguageCode,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Detection {
    pub fn new(language: LanguageCode, confidence: f64) -> Self {
        Self {
            language,
            confidence,
        }
    }
}

/// A language identification engine.
///
/// Implementations see plain text and return their best guess over every
/// language they know; the enabled-set policy is applied by the caller.
pub trait LanguageDetector: Send + Sync {
    /// Best guess for `text`, or `None` if the engine cannot decide.
    fn detect(&self, text: &str) -> Option<Detection>;

    /// Whether the engine can ever output `language`. Used to reject
    /// configurations that enable a language the engine cannot see.
    fn supports(&self, _language: &LanguageCode) -> bool {
        true
    }
}

impl<T: LanguageDetector + ?Sized> LanguageDetector for Box<T> {
    fn detect(&self, text: &str) -> Option<Detection> {
        (**self).detect(text)
    }

    fn supports(&self, language: &LanguageCode) -> bool {
        (**self).supports(language)
    }
}

/// Options for window classification.
#[derive(Clone, Debug)]
pub struct ClassifierOptions {
    /// Languages the caller wants tracked. The primary language is always
    /// considered enabled.
    pub enabled: BTreeSet<LanguageCode>,
    /// Fallback for guesses outside `enabled`.
    pub primary: LanguageCode,
    /// Windows below this confidence are `Unknown`; a confidence exactly at
    /// the threshold is accepted.
    pub min_confidence: f64,
    /// Tokens per window, centred on the token being labelled.
    pub window_width: usize,
    /// Scale confidence by the window's mean OCR confidence.
    pub ocr_weighting: bool,
}

impl ClassifierOptions {
    pub fn is_enabled(&self, language: &LanguageCode) -> bool {
        *language == self.primary || self.enabled.contains(language)
    }
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            enabled: BTreeSet::new(),
            primary: LanguageCode::english(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            window_width: DEFAULT_WINDOW_WIDTH,
            ocr_weighting: true,
        }
    }
}

/// Classifies one window of tokens.
///
/// Returns the label and the (possibly OCR-weighted) confidence. Empty or
/// whitespace-only windows are `Unknown` with confidence 0.
pub fn classify(
    detector: &dyn LanguageDetector,
    window: &[Token],
    opts: &ClassifierOptions,
) -> (LanguageLabel, f64) {
    let text = window_text(window);
    if text.trim().is_empty() {
        return (LanguageLabel::Unknown, 0.0);
    }

    let Some(detection) = detector.detect(&text) else {
        return (LanguageLabel::Unknown, 0.0);
    };

    let mut confidence = sanitize_confidence(detection.confidence);
    if opts.ocr_weighting {
        confidence *= mean_ocr_confidence(window);
    }

    if confidence < opts.min_confidence {
        return (LanguageLabel::Unknown, confidence);
    }

    if opts.is_enabled(&detection.language) {
        (LanguageLabel::Known(detection.language), confidence)
    } else {
        (LanguageLabel::Known(opts.primary.clone()), confidence)
    }
}

/// Labels every token using a window centred on it.
///
/// Windows are independent, so they are classified in parallel; the output
/// keeps input order.
pub fn classify_tokens(
    detector: &dyn LanguageDetector,
    tokens: &[Token],
    opts: &ClassifierOptions,
) -> Vec<ClassifiedToken> {
    let labels: Vec<(LanguageLabel, f64)> = (0..tokens.len())
        .into_par_iter()
        .map(|i| classify(detector, window_around(tokens, i, opts.window_width), opts))
        .collect();

    let unknown = labels.iter().filter(|(l, _)| l.is_unknown()).count();
    debug!(
        tokens = tokens.len(),
        unknown,
        window = opts.window_width,
        "classified tokens"
    );

    tokens
        .iter()
        .cloned()
        .zip(labels)
        .map(|(token, (label, confidence))| ClassifiedToken::new(token, label, confidence))
        .collect()
}

/// The window of `width` tokens centred on `index`, shifted inwards at the
/// document edges so that it keeps its full width whenever the document is
/// long enough.
pub fn window_around(tokens: &[Token], index: usize, width: usize) -> &[Token] {
    if tokens.is_empty() {
        return tokens;
    }
    let width = width.clamp(1, tokens.len());
    let half = width / 2;
    let start = index.saturating_sub(half).min(tokens.len() - width);
    &tokens[start..start + width]
}

fn window_text(window: &[Token]) -> String {
    let mut text = String::new();
    for (i, token) in window.iter().enumerate() {
        if i > 0 {
            text.push(' ');
        }
        text.push_str(&token.text);
    }
    text
}

/// Mean OCR confidence of the window; native tokens count as certain.
fn mean_ocr_confidence(window: &[Token]) -> f64 {
    if window.is_empty() {
        return 1.0;
    }
    let sum: f64 = window.iter().map(|t| t.ocr_confidence.unwrap_or(1.0)).sum();
    sum / window.len() as f64
}

fn sanitize_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
