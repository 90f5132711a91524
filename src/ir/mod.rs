//! Intermediate representation shared by the pipeline stages.
//!
//! Every stage consumes an immutable value produced by the previous one:
//!
//! ```text
//! Token ──classify──▶ ClassifiedToken ──segment──▶ Span
//! ```
//!
//! # Design Principles
//!
//! 1. **Typed coordinate spaces**: boxes carry a marker type so that OCR
//!    raster boxes ([`ImagePixels`]) are converted to page points
//!    ([`PagePoints`]) explicitly, never by accident.
//!
//! 2. **Canonical language codes**: [`LanguageCode`] folds case and known
//!    ISO 639-3 codes to ISO 639-1, so `"FRA"` and `"fr"` are the same key
//!    everywhere (maps, colors, reports).
//!
//! 3. **Permissive construction**: boxes are not reordered on creation; OCR
//!    engines sometimes report odd geometry and consumers decide what to do.
//!
//! # Example
//!
//! ```
//! use langspan::ir::{BBox, LanguageCode, PagePoints, Token};
//!
//! let token = Token::native("Bonjour", 0u32, BBox::<PagePoints>::new(72.0, 700.0, 114.0, 712.0));
//! assert_eq!(token.char_count(), 7);
//! assert_eq!(LanguageCode::parse("FRA").unwrap().as_str(), "fr");
//! ```

mod bbox;
mod ids;
pub mod io_tokens;
mod language;
mod model;
mod space;

pub use bbox::BBox;
pub use ids::{PageIndex, SpanId};
pub use language::{LanguageCode, LanguageCodeError, LanguageLabel};
pub use model::{ClassifiedToken, PageBox, Span, Token};
pub use space::{ImagePixels, PagePoints};
