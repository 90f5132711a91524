//! Optional translation of foreign-language spans.
//!
//! The provider is a black box behind [`Translator`]. Spans are translated
//! concurrently on a bounded pool; each call holds a [`CallLimiter`] permit
//! and has a time budget. A span whose call fails, overruns its budget or is
//! turned away by a full limiter is recorded as a [`SpanFailure`] and the
//! rest carry on.

#[cfg(feature = "translate-http")]
mod http;

#[cfg(feature = "translate-http")]
pub use http::HttpTranslator;

use std::collections::BTreeMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::LangspanError;
use crate::ir::{LanguageCode, Span, SpanId};
use crate::runtime::{CallLimiter, CancelToken, CANCEL_POLL};

/// Why one span could not be translated.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("translation unavailable: {reason}")]
pub struct TranslationUnavailable {
    pub reason: String,
}

impl TranslationUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A translation provider: text in, text out.
pub trait Translator: Send + Sync {
    fn translate(
        &self,
        text: &str,
        source: &LanguageCode,
        target: &LanguageCode,
    ) -> Result<String, TranslationUnavailable>;
}

impl<T: Translator + ?Sized> Translator for Box<T> {
    fn translate(
        &self,
        text: &str,
        source: &LanguageCode,
        target: &LanguageCode,
    ) -> Result<String, TranslationUnavailable> {
        (**self).translate(text, source, target)
    }
}

/// Options for [`translate_spans`].
#[derive(Clone, Debug)]
pub struct TranslateOptions {
    pub target: LanguageCode,
    /// Spans translated at once.
    pub concurrency: usize,
    /// Budget per call. A call still running when it expires is abandoned.
    pub timeout: Duration,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            target: LanguageCode::english(),
            concurrency: 4,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A span left untranslated.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpanFailure {
    pub span_id: SpanId,
    pub message: String,
}

/// Translations by span id plus the spans that failed.
#[derive(Clone, Debug, Default)]
pub struct TranslationOutcome {
    pub translations: BTreeMap<SpanId, String>,
    pub failures: Vec<SpanFailure>,
}

/// Translates every span in `spans`.
///
/// Spans already in the target language keep their own text without a
/// provider call.
///
/// # Errors
/// [`LangspanError::Cancelled`] once `cancel` fires (partial translations
/// are discarded, including calls still in flight), and
/// [`LangspanError::WorkerPool`] if the pool cannot start.
pub fn translate_spans(
    translator: &Arc<dyn Translator>,
    spans: &[&Span],
    opts: &TranslateOptions,
    cancel: &CancelToken,
    limiter: &CallLimiter,
) -> Result<TranslationOutcome, LangspanError> {
    if spans.is_empty() {
        return Ok(TranslationOutcome::default());
    }

    let workers = opts.concurrency.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("langspan-translate-{i}"))
        .build()
        .map_err(|e| LangspanError::WorkerPool {
            message: e.to_string(),
        })?;

    info!(spans = spans.len(), workers, target = %opts.target, "translating spans");

    let results: Vec<Result<(SpanId, Result<String, TranslationUnavailable>), LangspanError>> =
        pool.install(|| {
            spans
                .par_iter()
                .map(|span| {
                    translate_one(translator, span, opts, cancel, limiter).map(|r| (span.id, r))
                })
                .collect()
        });

    let mut outcome = TranslationOutcome::default();
    for result in results {
        let (span_id, translation) = result?;
        match translation {
            Ok(text) => {
                outcome.translations.insert(span_id, text);
            }
            Err(e) => outcome.failures.push(SpanFailure {
                span_id,
                message: e.reason,
            }),
        }
    }
    cancel.check()?;

    debug!(
        translated = outcome.translations.len(),
        failed = outcome.failures.len(),
        "translation finished"
    );
    Ok(outcome)
}

fn translate_one(
    translator: &Arc<dyn Translator>,
    span: &Span,
    opts: &TranslateOptions,
    cancel: &CancelToken,
    limiter: &CallLimiter,
) -> Result<Result<String, TranslationUnavailable>, LangspanError> {
    let text = span.text();
    if span.language == opts.target {
        return Ok(Ok(text));
    }

    cancel.check()?;
    let result = match limiter.acquire(cancel) {
        Ok(_permit) => call_with_budget(translator, text, span, opts, cancel)?,
        Err(LangspanError::Overloaded { .. }) => Err(TranslationUnavailable::new(
            "translation capacity exceeded",
        )),
        Err(e) => return Err(e),
    };

    if let Err(e) = &result {
        warn!(span = %span.id, error = %e.reason, "span left untranslated");
    }
    Ok(result)
}

/// Runs one provider call on its own thread and waits for it at most
/// `opts.timeout`, watching `cancel` meanwhile.
///
/// An abandoned call keeps its thread until the provider returns; the answer
/// is dropped.
fn call_with_budget(
    translator: &Arc<dyn Translator>,
    text: String,
    span: &Span,
    opts: &TranslateOptions,
    cancel: &CancelToken,
) -> Result<Result<String, TranslationUnavailable>, LangspanError> {
    let (tx, rx) = mpsc::channel();
    let worker = Arc::clone(translator);
    let source = span.language.clone();
    let target = opts.target.clone();
    let spawned = std::thread::Builder::new()
        .name(format!("langspan-translate-{}", span.id))
        .spawn(move || {
            // The receiver is gone if the call was abandoned.
            let _ = tx.send(worker.translate(&text, &source, &target));
        });
    if let Err(e) = spawned {
        return Ok(Err(TranslationUnavailable::new(format!(
            "could not start translation call: {e}"
        ))));
    }

    let started = Instant::now();
    loop {
        cancel.check()?;
        let elapsed = started.elapsed();
        if elapsed >= opts.timeout {
            debug!(span = %span.id, "abandoning translation call");
            return Ok(Err(TranslationUnavailable::new(format!(
                "timed out after {:.1}s",
                elapsed.as_secs_f64()
            ))));
        }
        match rx.recv_timeout((opts.timeout - elapsed).min(CANCEL_POLL)) {
            Ok(result) => return Ok(result),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Ok(Err(TranslationUnavailable::new(
                    "translation call ended without an answer",
                )))
            }
        }
    }
}
