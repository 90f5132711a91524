//! JSON interchange format for pre-computed OCR output.
//!
//! Lets an OCR run happen elsewhere (a batch job, a GPU box, a different
//! engine entirely) and be fed back into the pipeline as if the engine had
//! been called in-process. Word boxes are in raster pixels when the page
//! declares its image size, and in page points otherwise:
//!
//! ```json
//! {
//!   "pages": [
//!     {
//!       "page": 0,
//!       "image_width": 1700,
//!       "image_height": 2200,
//!       "words": [
//!         { "text": "Lorem", "bbox": { "x0": 170, "y0": 220, "x1": 340, "y1": 260 }, "confidence": 0.93 }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::bbox::BBox;
use super::ids::PageIndex;
use super::model::Token;
use super::space::{ImagePixels, PagePoints};
use crate::error::LangspanError;

/// A whole OCR sidecar file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenFile {
    #[serde(default)]
    pub pages: Vec<TokenFilePage>,
}

/// OCR words for one page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenFilePage {
    pub page: PageIndex,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_height: Option<u32>,
    #[serde(default)]
    pub words: Vec<TokenFileWord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenFileWord {
    pub text: String,
    /// Raw box; its space depends on whether the page declares an image size.
    pub bbox: BBox<ImagePixels>,
    pub confidence: f64,
}

impl TokenFile {
    /// Looks up a page entry.
    pub fn page(&self, page: PageIndex) -> Option<&TokenFilePage> {
        self.pages.iter().find(|p| p.page == page)
    }
}

impl TokenFilePage {
    /// Converts the page's words to tokens on a page of `page_size` points.
    pub fn to_tokens(&self, page_size: (f64, f64)) -> Vec<Token> {
        let image_size = match (self.image_width, self.image_height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w as f64, h as f64)),
            _ => None,
        };

        self.words
            .iter()
            .filter(|w| !w.text.trim().is_empty())
            .map(|w| {
                let bbox: BBox<PagePoints> = match image_size {
                    Some(size) => w.bbox.to_page(size, page_size),
                    None => BBox::new(w.bbox.x0, w.bbox.y0, w.bbox.x1, w.bbox.y1),
                };
                Token::ocr(w.text.trim(), self.page, bbox, w.confidence)
            })
            .collect()
    }
}

/// Reads an OCR sidecar file.
///
/// # Errors
/// Returns an error if the file cannot be opened or is not valid JSON in the
/// expected shape.
pub fn read_token_file(path: &Path) -> Result<TokenFile, LangspanError> {
    let file = File::open(path).map_err(LangspanError::Io)?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).map_err(|source| LangspanError::TokenFileParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses an OCR sidecar from a string. Useful for tests.
pub fn from_token_json_str(json: &str) -> Result<TokenFile, serde_json::Error> {
    serde_json::from_str(json)
}

/// Parses an OCR sidecar from raw bytes.
pub fn from_token_json_slice(bytes: &[u8]) -> Result<TokenFile, serde_json::Error> {
    serde_json::from_slice(bytes)
}
