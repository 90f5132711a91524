//! Per-request pipeline configuration.
//!
//! A [`PipelineConfig`] is read from YAML (every field optional), then
//! overridden by command-line flags, then validated once before any work
//! starts. It is immutable for the rest of the request and is converted into
//! the option structs of each stage.
//!
//! ```yaml
//! enabled_languages: [la, de, fr]
//! primary_language: en
//! min_run: 3
//! translate: true
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::{
    ClassifierOptions, LanguageDetector, DEFAULT_MIN_CONFIDENCE, DEFAULT_WINDOW_WIDTH,
};
use crate::error::LangspanError;
use crate::ir::LanguageCode;
use crate::segment::{SegmentOptions, DEFAULT_MIN_RUN};
use crate::source::{ExtractMode, ExtractOptions, OcrOptions, DEFAULT_MIN_CHARS_PER_PAGE};
use crate::translate::TranslateOptions;

/// Languages tracked when none are configured.
pub const DEFAULT_LANGUAGES: &[&str] = &["la", "en", "de", "fr", "nl", "it", "el"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub enabled_languages: Vec<LanguageCode>,
    pub primary_language: LanguageCode,
    /// Ignore the native text layer and OCR every page.
    pub force_ocr: bool,
    /// Never OCR, even when the native text layer is sparse.
    pub no_ocr: bool,
    pub translate: bool,
    pub translate_target: LanguageCode,
    pub min_classifier_confidence: f64,
    pub min_run: usize,
    pub window_width: usize,
    /// Scale classifier confidence by OCR confidence.
    pub ocr_weighting: bool,
    pub min_chars_per_page: f64,
    pub ocr_max_retries: u32,
    pub ocr_workers: usize,
    pub translation_concurrency: usize,
    pub translation_timeout_secs: u64,
    /// Languages never highlighted, in addition to the primary language.
    pub highlight_exclude: Vec<LanguageCode>,
    /// Wall-clock budget for the whole request.
    pub deadline_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled_languages: DEFAULT_LANGUAGES
                .iter()
                .filter_map(|c| LanguageCode::parse(c).ok())
                .collect(),
            primary_language: LanguageCode::english(),
            force_ocr: false,
            no_ocr: false,
            translate: false,
            translate_target: LanguageCode::english(),
            min_classifier_confidence: DEFAULT_MIN_CONFIDENCE,
            min_run: DEFAULT_MIN_RUN,
            window_width: DEFAULT_WINDOW_WIDTH,
            ocr_weighting: true,
            min_chars_per_page: DEFAULT_MIN_CHARS_PER_PAGE,
            ocr_max_retries: 2,
            ocr_workers: crate::source::ocr::default_workers(),
            translation_concurrency: 4,
            translation_timeout_secs: 30,
            highlight_exclude: Vec::new(),
            deadline_secs: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn load_yaml(path: &Path) -> Result<Self, LangspanError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text).map_err(|source| LangspanError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Rejects values no stage can work with.
    pub fn validate(&self) -> Result<(), LangspanError> {
        let invalid = |message: String| Err(LangspanError::InvalidConfig { message });

        if self.enabled_languages.is_empty() {
            return invalid("at least one language must be enabled".into());
        }
        if !(0.0..=1.0).contains(&self.min_classifier_confidence) {
            return invalid(format!(
                "min_classifier_confidence must be between 0 and 1, got {}",
                self.min_classifier_confidence
            ));
        }
        if self.min_run == 0 {
            return invalid("min_run must be at least 1".into());
        }
        if self.window_width == 0 {
            return invalid("window_width must be at least 1".into());
        }
        if !self.min_chars_per_page.is_finite() || self.min_chars_per_page < 0.0 {
            return invalid(format!(
                "min_chars_per_page must be a non-negative number, got {}",
                self.min_chars_per_page
            ));
        }
        if self.ocr_workers == 0 {
            return invalid("ocr_workers must be at least 1".into());
        }
        if self.translation_concurrency == 0 {
            return invalid("translation_concurrency must be at least 1".into());
        }
        if self.translation_timeout_secs == 0 {
            return invalid("translation_timeout_secs must be at least 1".into());
        }
        if self.deadline_secs == Some(0) {
            return invalid("deadline_secs must be at least 1 when set".into());
        }
        if self.force_ocr && self.no_ocr {
            return invalid("force_ocr and no_ocr cannot both be set".into());
        }
        Ok(())
    }

    /// Rejects enabled languages the detector can never report.
    pub fn validate_languages(&self, detector: &dyn LanguageDetector) -> Result<(), LangspanError> {
        let wanted = self
            .enabled_languages
            .iter()
            .chain(std::iter::once(&self.primary_language));
        for language in wanted {
            if !detector.supports(language) {
                let supported: Vec<String> = LanguageCode::known()
                    .filter(|c| detector.supports(c))
                    .map(|c| c.as_str().to_string())
                    .collect();
                return Err(LangspanError::UnsupportedLanguageRequested {
                    language: language.clone(),
                    supported: supported.join(", "),
                });
            }
        }
        Ok(())
    }

    pub fn enabled_set(&self) -> BTreeSet<LanguageCode> {
        let mut set: BTreeSet<LanguageCode> = self.enabled_languages.iter().cloned().collect();
        set.insert(self.primary_language.clone());
        set
    }

    pub fn classifier_options(&self) -> ClassifierOptions {
        ClassifierOptions {
            enabled: self.enabled_set(),
            primary: self.primary_language.clone(),
            min_confidence: self.min_classifier_confidence,
            window_width: self.window_width,
            ocr_weighting: self.ocr_weighting,
        }
    }

    pub fn segment_options(&self) -> SegmentOptions {
        SegmentOptions {
            min_run: self.min_run,
            primary: self.primary_language.clone(),
        }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        let mode = if self.force_ocr {
            ExtractMode::ForceOcr
        } else if self.no_ocr {
            ExtractMode::Native
        } else {
            ExtractMode::Auto
        };
        ExtractOptions {
            mode,
            min_chars_per_page: self.min_chars_per_page,
            ocr: OcrOptions {
                max_retries: self.ocr_max_retries,
                workers: self.ocr_workers,
            },
        }
    }

    pub fn translate_options(&self) -> TranslateOptions {
        TranslateOptions {
            target: self.translate_target.clone(),
            concurrency: self.translation_concurrency,
            timeout: Duration::from_secs(self.translation_timeout_secs),
        }
    }

    /// Languages left out of highlighting: the primary language plus
    /// `highlight_exclude`.
    pub fn highlight_filter(&self) -> BTreeSet<LanguageCode> {
        let mut set: BTreeSet<LanguageCode> = self.highlight_exclude.iter().cloned().collect();
        set.insert(self.primary_language.clone());
        set
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}
