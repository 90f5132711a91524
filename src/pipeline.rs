//! End-to-end processing of one document.
//!
//! ```text
//! intake ─▶ source ─▶ classify ─▶ segment ─┬─▶ stats ───────┬─▶ report (+ translate)
//!                                          └─▶ annotations ─┘
//! ```
//!
//! A [`Pipeline`] holds the immutable configuration and the capability
//! objects (detector, OCR engine, translator) plus the [`CallLimiter`] shared
//! with other pipelines. Each [`Pipeline::run`] is independent: it reads the
//! document, computes everything in memory and returns an [`OutputBundle`].
//! Nothing is written unless the caller asks the bundle to write itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::annotate::{self, AnnotationInstruction};
use crate::classify::{classify_tokens, LanguageDetector};
use crate::config::PipelineConfig;
use crate::error::LangspanError;
use crate::intake::{admit, DocumentKind, IntakeOptions, IntakeReport};
use crate::ir::{ClassifiedToken, Span};
use crate::report::{self, DocumentInfo, Report};
use crate::runtime::{CallLimiter, CancelToken};
use crate::segment::{foreign_spans, segment};
use crate::source::{extract, OcrEngine, SourceDocument};
use crate::stats::{aggregate, StatsOptions};
use crate::translate::{translate_spans, Translator};

/// A configured document processor.
pub struct Pipeline {
    config: PipelineConfig,
    detector: Arc<dyn LanguageDetector>,
    ocr: Option<Arc<dyn OcrEngine>>,
    translator: Option<Arc<dyn Translator>>,
    limiter: Arc<CallLimiter>,
    intake: IntakeOptions,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("ocr", &self.ocr.as_ref().map(|o| o.name().to_string()))
            .field("translator", &self.translator.is_some())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Validates `config` against `detector` and builds a pipeline with no
    /// OCR engine, no translator and a machine-sized limiter.
    pub fn new(
        config: PipelineConfig,
        detector: Arc<dyn LanguageDetector>,
    ) -> Result<Self, LangspanError> {
        config.validate()?;
        config.validate_languages(detector.as_ref())?;
        Ok(Self {
            config,
            detector,
            ocr: None,
            translator: None,
            limiter: Arc::new(CallLimiter::for_available_parallelism()),
            intake: IntakeOptions::default(),
        })
    }

    pub fn with_ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Shares `limiter` with other pipelines.
    pub fn with_limiter(mut self, limiter: Arc<CallLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_intake(mut self, intake: IntakeOptions) -> Self {
        self.intake = intake;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn limiter(&self) -> &Arc<CallLimiter> {
        &self.limiter
    }

    /// A fresh cancel token carrying the configured deadline, if any.
    pub fn cancel_token(&self) -> CancelToken {
        match self.config.deadline() {
            Some(deadline) => CancelToken::with_timeout(deadline),
            None => CancelToken::new(),
        }
    }

    /// Reads and processes the file at `path`.
    pub fn run_path(&self, path: &Path, cancel: &CancelToken) -> Result<OutputBundle, LangspanError> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.run(&name, bytes, cancel)
    }

    /// Processes one document held in memory.
    ///
    /// # Errors
    /// Any document-wide failure: intake rejection, unreadable PDF, no
    /// extractable text, cancellation or overload. Per-page OCR failures
    /// and per-span translation failures end up as report notes instead.
    pub fn run(
        &self,
        name: &str,
        bytes: Vec<u8>,
        cancel: &CancelToken,
    ) -> Result<OutputBundle, LangspanError> {
        let started = Instant::now();
        let intake = admit(&bytes, &self.intake)?;
        let kind = intake
            .kind
            .ok_or_else(|| LangspanError::UnsupportedFormat(name.to_string()))?;
        let document = SourceDocument::new(kind, bytes);
        cancel.check()?;

        let extraction = extract(
            &document,
            &self.config.extract_options(),
            self.ocr.as_deref(),
            cancel,
            &self.limiter,
        )?;
        cancel.check()?;

        let tokens = classify_tokens(
            self.detector.as_ref(),
            &extraction.tokens,
            &self.config.classifier_options(),
        );
        cancel.check()?;

        let spans = segment(&tokens, &self.config.segment_options());
        cancel.check()?;

        let stats_opts = StatsOptions {
            pages: Some(extraction.page_count()),
            ..Default::default()
        };
        let exclude = self.config.highlight_filter();
        let (stats, annotated) = rayon::join(
            || aggregate(&spans, &tokens, &stats_opts),
            || -> Result<_, LangspanError> {
                let instructions = annotate::map_to_annotations(&spans, &exclude);
                let bytes = match (kind, extraction.text.as_deref()) {
                    (DocumentKind::Text, Some(text)) => {
                        annotate::text::render_text(text, &spans, &instructions).into_bytes()
                    }
                    _ => annotate::pdf::render_pdf(document.bytes(), &instructions)?,
                };
                Ok((instructions, bytes))
            },
        );
        let (instructions, annotated) = annotated?;
        cancel.check()?;

        let primary = &self.config.primary_language;
        let foreign: Vec<&Span> = foreign_spans(&spans, primary).collect();
        let mut notes = extraction.warnings.clone();
        let mut failures = Vec::new();
        let translations: Option<BTreeMap<_, _>> = if self.config.translate {
            match &self.translator {
                Some(translator) => {
                    let outcome = translate_spans(
                        translator,
                        &foreign,
                        &self.config.translate_options(),
                        cancel,
                        &self.limiter,
                    )?;
                    failures = outcome.failures;
                    Some(outcome.translations)
                }
                None => {
                    warn!("translation requested but no translator is configured");
                    notes.push("translation requested but no translator is configured".into());
                    Some(BTreeMap::new())
                }
            }
        } else {
            None
        };

        let report = report::build(stats, &foreign, translations.as_ref())
            .with_document(DocumentInfo {
                name: name.to_string(),
                kind,
                fingerprint: intake.fingerprint.clone(),
                extraction: extraction.method,
            })
            .with_page_failures(&extraction.page_failures)
            .with_translation_failures(&failures)
            .with_warnings(notes);
        cancel.check()?;

        info!(
            document = name,
            method = ?extraction.method,
            tokens = tokens.len(),
            spans = spans.len(),
            foreign = foreign.len(),
            highlights = instructions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analyzed document"
        );

        document.dispose();
        Ok(OutputBundle {
            name: name.to_string(),
            kind,
            intake,
            tokens,
            spans,
            instructions,
            annotated,
            report,
        })
    }

    /// Processes many files in parallel, sharing this pipeline's limiter.
    ///
    /// Results come back in input order; one document failing does not
    /// stop the others. Each document gets its own cancel token derived from
    /// the configured deadline, and all of them also stop once `cancel`
    /// fires.
    pub fn run_batch(
        &self,
        paths: &[PathBuf],
        cancel: &CancelToken,
    ) -> Vec<(PathBuf, Result<OutputBundle, LangspanError>)> {
        paths
            .par_iter()
            .map(|path| {
                let result = cancel
                    .check()
                    .and_then(|()| self.run_path(path, &self.document_token(cancel)));
                if let Err(e) = &result {
                    debug!(path = %path.display(), error = %e, "document failed");
                }
                (path.clone(), result)
            })
            .collect()
    }

    fn document_token(&self, batch: &CancelToken) -> CancelToken {
        match self.config.deadline() {
            Some(deadline) => batch.child_with_timeout(deadline),
            None => batch.clone(),
        }
    }
}

/// Everything one run produced, held in memory until written or dropped.
#[derive(Clone, Debug)]
pub struct OutputBundle {
    pub name: String,
    pub kind: DocumentKind,
    pub intake: IntakeReport,
    pub tokens: Vec<ClassifiedToken>,
    pub spans: Vec<Span>,
    pub instructions: Vec<AnnotationInstruction>,
    /// The annotated copy of the input.
    pub annotated: Vec<u8>,
    pub report: Report,
}

/// Which report renderings to write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportFiles {
    pub text: bool,
    pub json: bool,
}

impl Default for ReportFiles {
    fn default() -> Self {
        Self {
            text: true,
            json: true,
        }
    }
}

impl OutputBundle {
    /// File stem shared by every output, e.g. `scan` for `scan.pdf`.
    pub fn stem(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }

    pub fn annotated_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.annotated.{}", self.stem(), self.kind.extension()))
    }

    /// Writes `<stem>.annotated.<ext>` and the requested report files into
    /// `dir`, creating it if needed. Returns the paths written.
    pub fn write(&self, dir: &Path, files: ReportFiles) -> Result<Vec<PathBuf>, LangspanError> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();

        let annotated = self.annotated_path(dir);
        std::fs::write(&annotated, &self.annotated)?;
        written.push(annotated);

        if files.text {
            let path = dir.join(format!("{}.report.txt", self.stem()));
            std::fs::write(&path, self.report.to_string())?;
            written.push(path);
        }
        if files.json {
            let path = dir.join(format!("{}.report.json", self.stem()));
            let json = self
                .report
                .to_json()
                .map_err(|source| LangspanError::ReportWrite {
                    path: path.clone(),
                    source,
                })?;
            std::fs::write(&path, json)?;
            written.push(path);
        }

        debug!(files = written.len(), dir = %dir.display(), "wrote outputs");
        Ok(written)
    }

    /// Consumes the bundle. Same as `drop`; nothing outlives the bundle, so
    /// there is no other cleanup.
    pub fn dispose(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::tests::LexiconDetector;
    use crate::ir::{BBox, LanguageCode, Token};
    use crate::report::TranslationStatus;
    use crate::source::{OcrFailure, PageImage};
    use crate::testing::{blank_pdf, pdf_bytes, pdf_with_pages};
    use crate::translate::TranslationUnavailable;

    fn code(s: &str) -> LanguageCode {
        LanguageCode::parse(s).unwrap()
    }

    fn detector() -> Arc<dyn LanguageDetector> {
        Arc::new(LexiconDetector::new(
            &[
                ("the", "en"),
                ("cat", "en"),
                ("sat", "en"),
                ("on", "en"),
                ("mat", "en"),
                ("and", "en"),
                ("le", "fr"),
                ("chat", "fr"),
                ("noir", "fr"),
                ("est", "fr"),
                ("ici", "fr"),
            ],
            0.9,
        ))
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            enabled_languages: vec![code("en"), code("fr")],
            window_width: 1,
            min_chars_per_page: 10.0,
            ocr_workers: 2,
            ..Default::default()
        }
    }

    struct Upper;

    impl Translator for Upper {
        fn translate(
            &self,
            text: &str,
            _source: &LanguageCode,
            _target: &LanguageCode,
        ) -> Result<String, TranslationUnavailable> {
            Ok(text.to_uppercase())
        }
    }

    struct Scanner;

    impl OcrEngine for Scanner {
        fn recognize(&self, image: &PageImage) -> Result<Vec<Token>, OcrFailure> {
            Ok(["le", "chat", "noir"]
                .iter()
                .enumerate()
                .map(|(i, w)| {
                    let x = 72.0 + i as f64 * 40.0;
                    Token::ocr(*w, image.page, BBox::new(x, 700.0, x + 30.0, 712.0), 0.95)
                })
                .collect())
        }
    }

    #[test]
    fn text_document_end_to_end() {
        let config = PipelineConfig {
            translate: true,
            ..config()
        };
        let pipeline = Pipeline::new(config, detector())
            .unwrap()
            .with_translator(Arc::new(Upper));
        let bundle = pipeline
            .run(
                "story.txt",
                b"The cat sat on the mat and le chat noir est ici".to_vec(),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(bundle.kind, DocumentKind::Text);
        assert_eq!(bundle.spans.len(), 2);
        assert_eq!(bundle.report.spans.len(), 1);
        let span = &bundle.report.spans[0];
        assert_eq!(span.language, code("fr"));
        assert_eq!(span.text, "le chat noir est ici");
        assert_eq!(span.translated_text.as_deref(), Some("LE CHAT NOIR EST ICI"));
        assert_eq!(span.translation, TranslationStatus::Translated);

        let annotated = String::from_utf8(bundle.annotated.clone()).unwrap();
        assert!(annotated.ends_with("and [[fr]]le chat noir est ici[[/fr]]"));
        assert_eq!(bundle.instructions.len(), 1);
    }

    #[test]
    fn pdf_document_gets_highlights() {
        let bytes = pdf_bytes(pdf_with_pages(&[
            &["The cat sat on the mat and the cat sat on the mat"],
            &["le chat noir est ici"],
        ]));
        let pipeline = Pipeline::new(config(), detector()).unwrap();
        let bundle = pipeline
            .run("two.pdf", bytes, &CancelToken::new())
            .unwrap();

        assert_eq!(bundle.report.stats.pages, 2);
        assert_eq!(bundle.report.spans.len(), 1);
        assert_eq!(bundle.report.spans[0].pages, vec![2]);
        let highlights = annotate::pdf::count_annotations(&bundle.annotated, "Highlight").unwrap();
        assert_eq!(highlights, BTreeMap::from([(2, 1)]));
    }

    #[test]
    fn scanned_pdf_goes_through_ocr() {
        let pipeline = Pipeline::new(config(), detector())
            .unwrap()
            .with_ocr(Arc::new(Scanner));
        let bundle = pipeline
            .run("scan.pdf", pdf_bytes(blank_pdf(1)), &CancelToken::new())
            .unwrap();
        assert!(bundle.report.stats.ocr_used);
        assert_eq!(bundle.report.spans.len(), 1);
        assert_eq!(bundle.report.spans[0].text, "le chat noir");
    }

    #[test]
    fn blank_pdf_without_ocr_has_no_content() {
        let pipeline = Pipeline::new(config(), detector()).unwrap();
        let err = pipeline
            .run("blank.pdf", pdf_bytes(blank_pdf(2)), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(
            err,
            LangspanError::NoExtractableContent {
                pages: 2,
                ocr_attempted: false
            }
        ));
    }

    #[test]
    fn translation_without_translator_is_noted() {
        let config = PipelineConfig {
            translate: true,
            ..config()
        };
        let pipeline = Pipeline::new(config, detector()).unwrap();
        let bundle = pipeline
            .run("s.txt", b"the cat sat le chat noir".to_vec(), &CancelToken::new())
            .unwrap();
        assert_eq!(bundle.report.untranslated(), 1);
        assert!(bundle
            .report
            .notes
            .iter()
            .any(|n| n.message.contains("no translator")));
    }

    #[test]
    fn cancelled_run_writes_nothing() {
        let pipeline = Pipeline::new(config(), detector()).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = pipeline
            .run("s.txt", b"the cat".to_vec(), &cancel)
            .unwrap_err();
        assert!(matches!(err, LangspanError::Cancelled { .. }));
    }

    #[test]
    fn rejected_documents_never_reach_extraction() {
        let pipeline = Pipeline::new(config(), detector()).unwrap();
        let err = pipeline
            .run("empty.txt", Vec::new(), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, LangspanError::IntakeRejected { .. }));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = PipelineConfig {
            min_run: 0,
            ..config()
        };
        assert!(matches!(
            Pipeline::new(config, detector()),
            Err(LangspanError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn bundle_writes_named_outputs() {
        let pipeline = Pipeline::new(config(), detector()).unwrap();
        let bundle = pipeline
            .run("notes.txt", b"the cat sat le chat noir".to_vec(), &CancelToken::new())
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let written = bundle.write(dir.path(), ReportFiles::default()).unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["notes.annotated.txt", "notes.report.txt", "notes.report.json"]
        );
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&written[2]).unwrap()).unwrap();
        assert_eq!(json["document"]["name"], "notes.txt");
        bundle.dispose();
    }

    #[test]
    fn batch_keeps_order_and_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.txt");
        let bad = dir.path().join("b.txt");
        std::fs::write(&good, "the cat sat").unwrap();
        std::fs::write(&bad, "").unwrap();

        let pipeline = Pipeline::new(config(), detector()).unwrap();
        let results = pipeline.run_batch(&[good.clone(), bad.clone()], &CancelToken::new());
        assert_eq!(results[0].0, good);
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].0, bad);
        assert!(results[1].1.is_err());
    }
}
