//! OCR capability and the per-page OCR runner.

use std::path::Path;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::LangspanError;
use crate::ir::io_tokens::{read_token_file, TokenFile};
use crate::ir::{PageIndex, Token};
use crate::runtime::{CallLimiter, CancelToken};

/// Encodings passed through to OCR engines untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterFormat {
    Jpeg,
    Jpeg2000,
}

/// An encoded page image.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    pub data: Vec<u8>,
    pub format: RasterFormat,
    /// Pixel size.
    pub width: u32,
    pub height: u32,
}

/// What an OCR engine is asked to read.
#[derive(Clone, Debug, PartialEq)]
pub struct PageImage {
    pub page: PageIndex,
    /// Page size in points, for mapping pixel boxes back onto the page.
    pub page_size: (f64, f64),
    /// The page's scan, if the page has one.
    pub raster: Option<Raster>,
}

/// A page that could not be recognized.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("OCR failed on {page}: {message}")]
pub struct OcrFailure {
    pub page: PageIndex,
    pub message: String,
}

impl OcrFailure {
    pub fn new(page: PageIndex, message: impl Into<String>) -> Self {
        Self {
            page,
            message: message.into(),
        }
    }
}

/// An OCR engine. Treated as a black box producing positioned words.
pub trait OcrEngine: Send + Sync {
    /// Recognizes one page. Returned token boxes must be in page points.
    fn recognize(&self, image: &PageImage) -> Result<Vec<Token>, OcrFailure>;

    /// Short engine name for logs and reports.
    fn name(&self) -> &str {
        "ocr"
    }
}

impl<T: OcrEngine + ?Sized> OcrEngine for Box<T> {
    fn recognize(&self, image: &PageImage) -> Result<Vec<Token>, OcrFailure> {
        (**self).recognize(image)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Replays pre-computed OCR output from a token file.
///
/// Pages missing from the file are recognized as empty.
#[derive(Clone, Debug)]
pub struct TokenFileOcr {
    file: TokenFile,
}

impl TokenFileOcr {
    pub fn new(file: TokenFile) -> Self {
        Self { file }
    }

    pub fn from_path(path: &Path) -> Result<Self, LangspanError> {
        Ok(Self::new(read_token_file(path)?))
    }
}

impl OcrEngine for TokenFileOcr {
    fn recognize(&self, image: &PageImage) -> Result<Vec<Token>, OcrFailure> {
        Ok(self
            .file
            .page(image.page)
            .map(|p| p.to_tokens(image.page_size))
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "token-file"
    }
}

/// Options for the OCR runner.
#[derive(Clone, Debug)]
pub struct OcrOptions {
    /// Extra attempts after a page's first failure.
    pub max_retries: u32,
    /// Pages recognized concurrently.
    pub workers: usize,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            max_retries: 2,
            workers: default_workers(),
        }
    }
}

pub(crate) fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// A page that exhausted its retries.
#[derive(Clone, Debug, PartialEq)]
pub struct PageFailure {
    pub page: PageIndex,
    pub attempts: u32,
    pub message: String,
}

/// Tokens for a recognized page, or why it could not be recognized.
type PageResult = Result<Vec<Token>, PageFailure>;

/// Output of [`run_ocr`]: tokens in page order plus the pages that failed.
#[derive(Clone, Debug, Default)]
pub struct OcrOutcome {
    pub tokens: Vec<Token>,
    pub failures: Vec<PageFailure>,
}

/// Recognizes every page on a bounded worker pool.
///
/// Each page is retried up to `max_retries` times; a page that keeps failing
/// contributes no tokens and is reported in [`OcrOutcome::failures`]. Every
/// engine call holds a permit from `limiter`.
///
/// # Errors
/// [`LangspanError::Cancelled`] once `cancel` fires; partial results are
/// discarded. An attempt turned away by a full limiter queue counts as a
/// failed attempt on that page.
pub fn run_ocr(
    engine: &dyn OcrEngine,
    images: &[PageImage],
    opts: &OcrOptions,
    cancel: &CancelToken,
    limiter: &CallLimiter,
) -> Result<OcrOutcome, LangspanError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.workers.max(1))
        .thread_name(|i| format!("langspan-ocr-{i}"))
        .build()
        .map_err(|e| LangspanError::WorkerPool {
            message: e.to_string(),
        })?;

    info!(
        engine = engine.name(),
        pages = images.len(),
        workers = opts.workers.max(1),
        "running OCR"
    );

    let results: Vec<Result<PageResult, LangspanError>> = pool.install(|| {
        images
            .par_iter()
            .map(|image| recognize_page(engine, image, opts.max_retries, cancel, limiter))
            .collect()
    });

    let mut outcome = OcrOutcome::default();
    for result in results {
        match result? {
            Ok(mut tokens) => outcome.tokens.append(&mut tokens),
            Err(failure) => outcome.failures.push(failure),
        }
    }
    cancel.check()?;

    debug!(
        tokens = outcome.tokens.len(),
        failed_pages = outcome.failures.len(),
        "OCR finished"
    );
    Ok(outcome)
}

fn recognize_page(
    engine: &dyn OcrEngine,
    image: &PageImage,
    max_retries: u32,
    cancel: &CancelToken,
    limiter: &CallLimiter,
) -> Result<PageResult, LangspanError> {
    let attempts = max_retries + 1;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        cancel.check()?;
        let result = match limiter.acquire(cancel) {
            Ok(_permit) => engine.recognize(image),
            Err(e @ LangspanError::Overloaded { .. }) => {
                Err(OcrFailure::new(image.page, e.to_string()))
            }
            Err(e) => return Err(e),
        };
        cancel.check()?;

        match result {
            Ok(tokens) => {
                let tokens = tokens
                    .into_iter()
                    .filter(|t| !t.text.trim().is_empty())
                    .map(|t| Token {
                        page: image.page,
                        ..t
                    })
                    .collect();
                return Ok(Ok(tokens));
            }
            Err(failure) => {
                warn!(
                    page = image.page.number(),
                    attempt,
                    attempts,
                    error = %failure.message,
                    "OCR attempt failed"
                );
                last_error = failure.message;
            }
        }
    }

    Ok(Err(PageFailure {
        page: image.page,
        attempts,
        message: last_error,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::io_tokens::from_token_json_str;
    use crate::ir::BBox;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn image(page: u32) -> PageImage {
        PageImage {
            page: PageIndex::new(page),
            page_size: (612.0, 792.0),
            raster: None,
        }
    }

    /// Fails the first `failures` calls on page 1, succeeds elsewhere.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl OcrEngine for Flaky {
        fn recognize(&self, image: &PageImage) -> Result<Vec<Token>, OcrFailure> {
            if image.page.0 == 1 {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < self.failures {
                    return Err(OcrFailure::new(image.page, "engine crashed"));
                }
            }
            Ok(vec![
                Token::ocr(format!("p{}", image.page.0), 99u32, BBox::default(), 0.9),
                Token::ocr("   ", 99u32, BBox::default(), 0.9),
            ])
        }
    }

    fn run(engine: &dyn OcrEngine, pages: u32, retries: u32) -> Result<OcrOutcome, LangspanError> {
        let images: Vec<PageImage> = (0..pages).map(image).collect();
        let opts = OcrOptions {
            max_retries: retries,
            workers: 2,
        };
        run_ocr(engine, &images, &opts, &CancelToken::new(), &CallLimiter::new(2, 16))
    }

    #[test]
    fn tokens_come_back_in_page_order() {
        let engine = Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        };
        let outcome = run(&engine, 4, 0).unwrap();
        let texts: Vec<&str> = outcome.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["p0", "p1", "p2", "p3"]);
        let pages: Vec<u32> = outcome.tokens.iter().map(|t| t.page.0).collect();
        assert_eq!(pages, vec![0, 1, 2, 3]);
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn transient_failure_is_retried() {
        let engine = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let outcome = run(&engine, 3, 2).unwrap();
        assert_eq!(outcome.tokens.len(), 3);
        assert!(outcome.failures.is_empty());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn persistent_failure_degrades_the_page() {
        let engine = Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let outcome = run(&engine, 3, 2).unwrap();
        let texts: Vec<&str> = outcome.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["p0", "p2"]);
        assert_eq!(
            outcome.failures,
            vec![PageFailure {
                page: PageIndex::new(1),
                attempts: 3,
                message: "engine crashed".into(),
            }]
        );
    }

    #[test]
    fn cancelled_run_returns_nothing() {
        let engine = Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        };
        let cancel = CancelToken::new();
        cancel.cancel();
        let images = vec![image(0)];
        let err = run_ocr(
            &engine,
            &images,
            &OcrOptions::default(),
            &cancel,
            &CallLimiter::new(1, 1),
        )
        .unwrap_err();
        assert!(matches!(err, LangspanError::Cancelled { .. }));
    }

    #[test]
    fn full_limiter_degrades_pages_instead_of_aborting() {
        let engine = Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        };
        let limiter = CallLimiter::new(1, 0);
        let _held = limiter.try_acquire().unwrap();
        let images = vec![image(0), image(1)];
        let opts = OcrOptions {
            max_retries: 1,
            workers: 1,
        };
        let outcome = run_ocr(&engine, &images, &opts, &CancelToken::new(), &limiter).unwrap();
        assert!(outcome.tokens.is_empty());
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failures[0].attempts, 2);
        assert!(outcome.failures[0].message.contains("Too many concurrent requests"));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn token_file_replays_pages() {
        let file = from_token_json_str(
            r#"{"pages": [{"page": 1, "words": [
                {"text": "Salve", "bbox": {"x0": 72, "y0": 700, "x1": 110, "y1": 712}, "confidence": 0.8}
            ]}]}"#,
        )
        .unwrap();
        let engine = TokenFileOcr::new(file);
        assert!(engine.recognize(&image(0)).unwrap().is_empty());
        let tokens = engine.recognize(&image(1)).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "Salve");
        assert_eq!(tokens[0].ocr_confidence, Some(0.8));
    }
}
