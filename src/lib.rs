//! Langspan: find, highlight and report foreign-language passages.
//!
//! Langspan reads a PDF or plain-text document, classifies every word with a
//! sliding-window language detector, groups the words into contiguous
//! language spans and produces an annotated copy of the document together
//! with a report of the passages that are not in the primary language.
//!
//! # Modules
//!
//! - [`intake`]: Document screening (type, size, active content, fingerprint)
//! - [`source`]: Native text layer and OCR token extraction
//! - [`classify`]: Sliding-window language classification
//! - [`segment`]: Hysteresis span segmentation
//! - [`stats`]: Per-language statistics
//! - [`annotate`]: Highlight instructions and annotated PDF/text rendering
//! - [`translate`]: Optional span translation
//! - [`report`]: The final report
//! - [`pipeline`]: End-to-end processing of one document or a batch
//! - [`ir`]: Core data types (tokens, spans, language codes, boxes)
//! - [`error`]: Error types for langspan operations

pub mod annotate;
pub mod classify;
pub mod config;
pub mod error;
pub mod intake;
pub mod ir;
pub mod pipeline;
pub mod report;
pub mod runtime;
pub mod segment;
pub mod source;
pub mod stats;
pub mod translate;

#[cfg(test)]
pub(crate) mod testing;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use crate::classify::{LanguageDetector, WhatlangDetector};
use crate::config::PipelineConfig;
use crate::intake::{inspect_document, DocumentKind, IntakeOptions, IntakeReport, DEFAULT_MAX_BYTES};
use crate::ir::LanguageCode;
use crate::pipeline::{Pipeline, ReportFiles};
use crate::runtime::CancelToken;
use crate::source::{assess_text_layer, SourceDocument, TesseractCli, TextLayerAssessment, TokenFileOcr};

pub use error::LangspanError;

/// The langspan CLI application.
#[derive(Parser)]
#[command(name = "langspan")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug). RUST_LOG wins if set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Analyze one document and write the annotated copy and report.
    Analyze(AnalyzeArgs),
    /// Analyze every PDF and text file under a directory.
    Batch(BatchArgs),
    /// Screen a document and assess its text layer without analyzing it.
    Inspect(InspectArgs),
    /// List the languages langspan can report on.
    Languages(LanguagesArgs),
}

/// Report rendering printed on stdout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Pipeline settings shared by `analyze` and `batch`.
///
/// Flags override values loaded from `--config`.
#[derive(clap::Args)]
struct PipelineArgs {
    /// YAML configuration file.
    #[arg(long, env = "LANGSPAN_CONFIG")]
    config: Option<PathBuf>,

    /// Languages to track, comma separated (e.g. 'la,en,fr').
    #[arg(long, env = "LANGSPAN_LANGUAGES", value_delimiter = ',')]
    languages: Option<Vec<LanguageCode>>,

    /// The document's main language; never highlighted.
    #[arg(long, env = "LANGSPAN_PRIMARY")]
    primary: Option<LanguageCode>,

    /// Languages never highlighted, comma separated.
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<LanguageCode>,

    /// OCR every page, ignoring any native text layer.
    #[arg(long, conflicts_with = "no_ocr")]
    force_ocr: bool,

    /// Never OCR, even when the native text layer is sparse.
    #[arg(long)]
    no_ocr: bool,

    /// Pre-computed OCR tokens (JSON) to use as the OCR engine.
    #[arg(long, conflicts_with = "tesseract")]
    ocr_tokens: Option<PathBuf>,

    /// Run Tesseract for OCR; `--tesseract=PATH` picks the binary.
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "tesseract"
    )]
    tesseract: Option<PathBuf>,

    /// Translate foreign spans.
    #[arg(long)]
    translate: bool,

    /// Translation target language.
    #[arg(long)]
    translate_target: Option<LanguageCode>,

    /// Base URL of a LibreTranslate-compatible service.
    #[cfg(feature = "translate-http")]
    #[arg(long, env = "LANGSPAN_TRANSLATE_URL")]
    translate_url: Option<String>,

    /// API key for the translation service.
    #[cfg(feature = "translate-http")]
    #[arg(long, env = "LANGSPAN_TRANSLATE_API_KEY", hide_env_values = true)]
    translate_api_key: Option<String>,

    /// Tokens a language change must last before a new span opens.
    #[arg(long)]
    min_run: Option<usize>,

    /// Classifier window width in tokens.
    #[arg(long)]
    window: Option<usize>,

    /// Classifier confidence below which a token is unknown.
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Native characters per page below which OCR is used.
    #[arg(long)]
    min_chars_per_page: Option<f64>,

    /// Give up on a document after this many seconds.
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Refuse documents larger than this many bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_BYTES)]
    max_bytes: u64,

    /// Treat intake warnings as errors.
    #[arg(long)]
    strict: bool,
}

/// Arguments for the analyze subcommand.
#[derive(clap::Args)]
struct AnalyzeArgs {
    /// PDF or text document.
    input: PathBuf,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Directory for outputs (defaults to the input's directory).
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Print the report without writing any files.
    #[arg(long)]
    no_write: bool,

    /// Report format printed on stdout.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

/// Arguments for the batch subcommand.
#[derive(clap::Args)]
struct BatchArgs {
    /// Directory searched recursively for .pdf and .txt files.
    dir: PathBuf,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Directory for outputs (defaults to each document's directory).
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Analyze without writing any files.
    #[arg(long)]
    no_write: bool,

    /// Summary format printed on stdout.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

/// Arguments for the inspect subcommand.
#[derive(clap::Args)]
struct InspectArgs {
    /// Document to screen.
    input: PathBuf,

    /// Refuse documents larger than this many bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_BYTES)]
    max_bytes: u64,

    /// Treat intake warnings as errors.
    #[arg(long)]
    strict: bool,

    /// Native characters per page below which OCR would be used.
    #[arg(long, default_value_t = source::DEFAULT_MIN_CHARS_PER_PAGE)]
    min_chars_per_page: f64,

    /// Output format ('text' or 'json').
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

/// Arguments for the languages subcommand.
#[derive(clap::Args)]
struct LanguagesArgs {
    /// Output format ('text' or 'json').
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

/// Run the langspan CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), LangspanError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Commands::Analyze(args)) => run_analyze(args),
        Some(Commands::Batch(args)) => run_batch(args),
        Some(Commands::Inspect(args)) => run_inspect(args),
        Some(Commands::Languages(args)) => run_languages(args),
        None => {
            println!("langspan {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Find, highlight and report foreign-language passages.");
            println!();
            println!("Run 'langspan --help' for usage information.");
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "langspan=warn",
        1 => "langspan=info",
        _ => "langspan=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when run() is called twice in-process.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

impl PipelineArgs {
    /// The config file (or defaults) with command-line overrides applied.
    fn load_config(&self) -> Result<PipelineConfig, LangspanError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load_yaml(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(languages) = &self.languages {
            config.enabled_languages = languages.clone();
        }
        if let Some(primary) = &self.primary {
            config.primary_language = primary.clone();
        }
        if !self.exclude.is_empty() {
            config.highlight_exclude = self.exclude.clone();
        }
        if self.force_ocr {
            config.force_ocr = true;
            config.no_ocr = false;
        }
        if self.no_ocr {
            config.no_ocr = true;
            config.force_ocr = false;
        }
        if self.translate {
            config.translate = true;
        }
        if let Some(target) = &self.translate_target {
            config.translate_target = target.clone();
        }
        if let Some(min_run) = self.min_run {
            config.min_run = min_run;
        }
        if let Some(window) = self.window {
            config.window_width = window;
        }
        if let Some(min_confidence) = self.min_confidence {
            config.min_classifier_confidence = min_confidence;
        }
        if let Some(min_chars) = self.min_chars_per_page {
            config.min_chars_per_page = min_chars;
        }
        if let Some(deadline) = self.deadline_secs {
            config.deadline_secs = Some(deadline);
        }
        Ok(config)
    }

    fn build_pipeline(&self) -> Result<Pipeline, LangspanError> {
        let config = self.load_config()?;
        let ocr_languages = config.enabled_languages.clone();
        #[cfg(feature = "translate-http")]
        let translation_timeout = std::time::Duration::from_secs(config.translation_timeout_secs);

        let detector: Arc<dyn LanguageDetector> = Arc::new(WhatlangDetector::new());
        let mut pipeline = Pipeline::new(config, detector)?.with_intake(IntakeOptions {
            max_bytes: self.max_bytes,
            strict: self.strict,
        });

        if let Some(path) = &self.ocr_tokens {
            pipeline = pipeline.with_ocr(Arc::new(TokenFileOcr::from_path(path)?));
        } else if let Some(binary) = &self.tesseract {
            pipeline = pipeline.with_ocr(Arc::new(TesseractCli::with_binary(
                binary.clone(),
                ocr_languages,
            )));
        }

        #[cfg(feature = "translate-http")]
        if let Some(url) = &self.translate_url {
            let translator = translate::HttpTranslator::new(
                url,
                self.translate_api_key.clone(),
                translation_timeout,
            )?;
            tracing::debug!(endpoint = translator.endpoint(), "using HTTP translator");
            pipeline = pipeline.with_translator(Arc::new(translator));
        }

        Ok(pipeline)
    }
}

/// Execute the analyze subcommand.
fn run_analyze(args: AnalyzeArgs) -> Result<(), LangspanError> {
    let pipeline = args.pipeline.build_pipeline()?;
    let cancel = pipeline.cancel_token();
    let bundle = pipeline.run_path(&args.input, &cancel)?;

    let written = if args.no_write {
        Vec::new()
    } else {
        let dir = args
            .out_dir
            .clone()
            .unwrap_or_else(|| parent_dir(&args.input));
        bundle.write(&dir, ReportFiles::default())?
    };

    match args.output {
        OutputFormat::Json => println!("{}", to_stdout_json(&bundle.report)?),
        OutputFormat::Text => {
            print!("{}", bundle.report);
            if !written.is_empty() {
                println!();
                for path in &written {
                    println!("Wrote {}", path.display());
                }
            }
        }
    }

    bundle.dispose();
    Ok(())
}

/// One line of the batch summary.
#[derive(Debug, Serialize)]
struct BatchEntry {
    path: PathBuf,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    foreign_spans: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    languages: Vec<LanguageCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Execute the batch subcommand.
fn run_batch(args: BatchArgs) -> Result<(), LangspanError> {
    let pipeline = args.pipeline.build_pipeline()?;
    let paths = find_documents(&args.dir)?;
    info!(dir = %args.dir.display(), documents = paths.len(), "starting batch");

    let results = pipeline.run_batch(&paths, &CancelToken::new());
    let total = results.len();
    let mut entries = Vec::with_capacity(total);

    for (path, result) in results {
        let outcome = result.and_then(|bundle| {
            if !args.no_write {
                let dir = args.out_dir.clone().unwrap_or_else(|| parent_dir(&path));
                bundle.write(&dir, ReportFiles::default())?;
            }
            Ok(bundle)
        });
        entries.push(match outcome {
            Ok(bundle) => {
                let mut languages: Vec<LanguageCode> =
                    bundle.report.spans.iter().map(|s| s.language.clone()).collect();
                languages.sort();
                languages.dedup();
                BatchEntry {
                    path,
                    ok: true,
                    foreign_spans: Some(bundle.report.spans.len()),
                    languages,
                    error: None,
                }
            }
            Err(e) => BatchEntry {
                path,
                ok: false,
                foreign_spans: None,
                languages: Vec::new(),
                error: Some(e.to_string()),
            },
        });
    }

    let failed = entries.iter().filter(|e| !e.ok).count();
    match args.output {
        OutputFormat::Json => println!("{}", to_stdout_json(&entries)?),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No PDF or text documents found in {}", args.dir.display());
            }
            for entry in &entries {
                print_batch_entry(entry);
            }
            if total > 0 {
                println!();
                println!("{} of {} document(s) analyzed", total - failed, total);
            }
        }
    }

    if failed > 0 {
        return Err(LangspanError::BatchFailed { failed, total });
    }
    Ok(())
}

fn print_batch_entry(entry: &BatchEntry) {
    match (&entry.error, entry.foreign_spans) {
        (Some(error), _) => println!("✗ {}: {}", entry.path.display(), error),
        (None, Some(0)) => println!("✓ {}: no foreign spans", entry.path.display()),
        (None, count) => {
            let languages: Vec<&str> = entry.languages.iter().map(LanguageCode::as_str).collect();
            println!(
                "✓ {}: {} foreign span(s) ({})",
                entry.path.display(),
                count.unwrap_or(0),
                languages.join(", ")
            );
        }
    }
}

/// PDF and text files under `dir`, sorted, skipping langspan's own outputs.
fn find_documents(dir: &Path) -> Result<Vec<PathBuf>, LangspanError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| {
            LangspanError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy();
        if name.contains(".annotated.") || name.contains(".report.") {
            continue;
        }
        let wanted = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf") || e.eq_ignore_ascii_case("txt"))
            .unwrap_or(false);
        if wanted {
            paths.push(path.to_path_buf());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Everything `inspect` found out about one document.
#[derive(Debug, Serialize)]
struct InspectOutput {
    intake: IntakeReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_layer: Option<TextLayerAssessment>,
    /// Highlight annotations already in a PDF.
    #[serde(skip_serializing_if = "Option::is_none")]
    existing_highlights: Option<usize>,
}

/// Execute the inspect subcommand.
fn run_inspect(args: InspectArgs) -> Result<(), LangspanError> {
    let bytes = std::fs::read(&args.input)?;
    let opts = IntakeOptions {
        max_bytes: args.max_bytes,
        strict: args.strict,
    };
    let intake = inspect_document(&bytes, &opts);

    let error_count = if opts.strict {
        intake.issues.len()
    } else {
        intake.error_count()
    };
    let accepted = error_count == 0;
    let existing_highlights = match intake.kind {
        Some(DocumentKind::Pdf) if accepted => {
            Some(annotate::pdf::count_annotations(&bytes, "Highlight")?.values().sum())
        }
        _ => None,
    };
    let text_layer = match intake.kind {
        Some(kind) if accepted => Some(assess_text_layer(
            &SourceDocument::new(kind, bytes),
            args.min_chars_per_page,
        )?),
        _ => None,
    };

    let output = InspectOutput {
        intake,
        text_layer,
        existing_highlights,
    };
    match args.output {
        OutputFormat::Json => println!("{}", to_stdout_json(&output)?),
        OutputFormat::Text => {
            print!("{}", output.intake);
            if let Some(layer) = &output.text_layer {
                println!();
                println!("Text layer:");
                println!("  Words:           {}", layer.tokens);
                println!("  Chars per page:  {:.1}", layer.chars_per_page);
                let mode = match layer.recommended {
                    source::ExtractMode::ForceOcr => "OCR (text layer is sparse)",
                    _ => "native text layer",
                };
                println!("  Recommended:     {}", mode);
            }
            if let Some(count) = output.existing_highlights.filter(|&n| n > 0) {
                println!("  Highlights:      {} already present", count);
            }
        }
    }

    if !accepted {
        return Err(LangspanError::IntakeRejected {
            error_count,
            report: output.intake,
        });
    }
    Ok(())
}

/// One row of the language table.
#[derive(Debug, Serialize)]
struct LanguageRow {
    code: LanguageCode,
    name: String,
    color: annotate::Color,
    detectable: bool,
}

/// Execute the languages subcommand.
fn run_languages(args: LanguagesArgs) -> Result<(), LangspanError> {
    let detector = WhatlangDetector::new();
    let rows: Vec<LanguageRow> = LanguageCode::known()
        .map(|code| LanguageRow {
            name: code.display_name(),
            color: annotate::color_for(&code),
            detectable: detector.supports(&code),
            code,
        })
        .collect();

    match args.output {
        OutputFormat::Json => println!("{}", to_stdout_json(&rows)?),
        OutputFormat::Text => {
            println!("{:<6} {:<24} {:<9} Detectable", "Code", "Name", "Color");
            for row in &rows {
                println!(
                    "{:<6} {:<24} {:<9} {}",
                    row.code,
                    row.name,
                    row.color,
                    if row.detectable { "yes" } else { "no" }
                );
            }
        }
    }
    Ok(())
}

fn to_stdout_json<T: Serialize + ?Sized>(value: &T) -> Result<String, LangspanError> {
    serde_json::to_string_pretty(value).map_err(|source| LangspanError::ReportWrite {
        path: PathBuf::from("<stdout>"),
        source,
    })
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
