//! OCR through the `tesseract` command-line tool.
//!
//! The page image is piped to `tesseract stdin stdout -l <langs> tsv` and
//! word rows (level 5) of the TSV output become tokens.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::debug;

use super::ocr::{OcrEngine, OcrFailure, PageImage};
use crate::ir::{BBox, ImagePixels, LanguageCode, PageIndex, Token};

/// TSV level of word rows.
const WORD_LEVEL: u32 = 5;

/// Runs the `tesseract` binary once per page.
#[derive(Clone, Debug)]
pub struct TesseractCli {
    binary: PathBuf,
    languages: Vec<LanguageCode>,
}

impl TesseractCli {
    /// Uses `tesseract` from `PATH`.
    pub fn new(languages: impl IntoIterator<Item = LanguageCode>) -> Self {
        Self::with_binary("tesseract", languages)
    }

    pub fn with_binary(
        binary: impl Into<PathBuf>,
        languages: impl IntoIterator<Item = LanguageCode>,
    ) -> Self {
        Self {
            binary: binary.into(),
            languages: languages.into_iter().collect(),
        }
    }

    /// The `-l` argument, e.g. `eng+fra+chi_sim`.
    pub fn language_arg(&self) -> String {
        let mut codes: Vec<&str> = self.languages.iter().map(traineddata_name).collect();
        codes.dedup();
        if codes.is_empty() {
            return "eng".to_string();
        }
        codes.join("+")
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, image: &PageImage) -> Result<Vec<Token>, OcrFailure> {
        let raster = image
            .raster
            .as_ref()
            .ok_or_else(|| OcrFailure::new(image.page, "page has no embedded image to read"))?;

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l"])
            .arg(self.language_arg())
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                OcrFailure::new(
                    image.page,
                    format!("failed to start {}: {}", self.binary.display(), e),
                )
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&raster.data)
                .map_err(|e| OcrFailure::new(image.page, format!("failed to send image: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| OcrFailure::new(image.page, format!("tesseract did not finish: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrFailure::new(
                image.page,
                format!("tesseract exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let tokens = parse_tsv(
            &output.stdout,
            image.page,
            (f64::from(raster.width), f64::from(raster.height)),
            image.page_size,
        )
        .map_err(|e| OcrFailure::new(image.page, format!("unreadable tesseract output: {e}")))?;

        debug!(page = image.page.number(), words = tokens.len(), "tesseract page done");
        Ok(tokens)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

/// Tesseract's traineddata name for a language.
fn traineddata_name(code: &LanguageCode) -> &str {
    match code.as_str() {
        "zh" => "chi_sim",
        _ => code.iso639_3(),
    }
}

#[derive(Debug, Deserialize)]
struct TsvRow {
    level: u32,
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    conf: f64,
    #[serde(default)]
    text: Option<String>,
}

/// Parses `tesseract ... tsv` output into page-space tokens.
pub fn parse_tsv(
    tsv: &[u8],
    page: PageIndex,
    image_size: (f64, f64),
    page_size: (f64, f64),
) -> Result<Vec<Token>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(tsv);

    let mut tokens = Vec::new();
    for row in reader.deserialize::<TsvRow>() {
        let row = row?;
        if row.level != WORD_LEVEL || row.conf < 0.0 {
            continue;
        }
        let Some(text) = row.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            continue;
        };
        let pixels: BBox<ImagePixels> =
            BBox::from_origin_size(row.left, row.top, row.width, row.height);
        tokens.push(Token::ocr(
            text,
            page,
            pixels.to_page(image_size, page_size),
            row.conf / 100.0,
        ));
    }
    Ok(tokens)
}
