//! Combines two detectors and scores how much they agree.

use super::{Detection, LanguageDetector};
use crate::ir::LanguageCode;

/// Confidence when both detectors name the same language.
const AGREE: f64 = 1.0;
/// Confidence when they disagree, or only the primary answers.
const PRIMARY_ONLY: f64 = 0.7;
/// Confidence when only the secondary answers.
const SECONDARY_ONLY: f64 = 0.6;

/// Runs a primary and a secondary detector on the same text.
///
/// The engines' own confidences are discarded; the result is scored by
/// agreement instead. On disagreement the primary's language wins.
#[derive(Debug)]
pub struct AgreementDetector<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> AgreementDetector<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P: LanguageDetector, S: LanguageDetector> LanguageDetector for AgreementDetector<P, S> {
    fn detect(&self, text: &str) -> Option<Detection> {
        match (self.primary.detect(text), self.secondary.detect(text)) {
            (Some(a), Some(b)) if a.language == b.language => Some(Detection::new(a.language, AGREE)),
            (Some(a), _) => Some(Detection::new(a.language, PRIMARY_ONLY)),
            (None, Some(b)) => Some(Detection::new(b.language, SECONDARY_ONLY)),
            (None, None) => None,
        }
    }

    fn supports(&self, language: &LanguageCode) -> bool {
        self.primary.supports(language) || self.secondary.supports(language)
    }
}
