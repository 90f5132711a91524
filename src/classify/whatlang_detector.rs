//! Built-in detector backed by the `whatlang` trigram model.

use whatlang::{Detector, Lang};

use super::{Detection, LanguageDetector};
use crate::ir::LanguageCode;

/// Statistical detector using `whatlang`.
///
/// `whatlang` reports ISO 639-3 codes; they are folded to the canonical
/// [`LanguageCode`] form. Languages without a two-letter code keep their
/// three-letter code.
pub struct WhatlangDetector {
    detector: Detector,
}

impl WhatlangDetector {
    pub fn new() -> Self {
        Self {
            detector: Detector::new(),
        }
    }
}

impl Default for WhatlangDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WhatlangDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WhatlangDetector")
    }
}

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<Detection> {
        let info = self.detector.detect(text)?;
        let language = LanguageCode::parse(info.lang().code()).ok()?;
        Some(Detection::new(language, info.confidence()))
    }

    fn supports(&self, language: &LanguageCode) -> bool {
        Lang::from_code(language.iso639_3()).is_some()
    }
}
