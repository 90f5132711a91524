//! Maps language spans onto page highlights.
//!
//! [`map_to_annotations`] turns spans into one [`AnnotationInstruction`] per
//! (span, page touched). Instructions are format-neutral; [`pdf`] renders
//! them as highlight annotations on a PDF and [`text`] as inline markers in
//! a plain-text document.
//!
//! Colors are a pure function of the language code, so a language has the
//! same color in every document and every run.

pub mod pdf;
pub mod text;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::ir::{BBox, LanguageCode, PageIndex, PagePoints, Span, SpanId};

/// Sixteen colors distinct enough to tell apart on a page.
const PALETTE: [(u8, u8, u8); 16] = [
    (0xe6, 0x19, 0x4b),
    (0x3c, 0xb4, 0x4b),
    (0xff, 0xe1, 0x19),
    (0x43, 0x63, 0xd8),
    (0xf5, 0x82, 0x31),
    (0x91, 0x1e, 0xb4),
    (0x42, 0xd4, 0xf4),
    (0xf0, 0x32, 0xe6),
    (0xbf, 0xef, 0x45),
    (0xfa, 0xbe, 0xd4),
    (0x46, 0x99, 0x90),
    (0xdc, 0xbe, 0xff),
    (0x9a, 0x63, 0x24),
    (0xff, 0xfa, 0xc8),
    (0x80, 0x00, 0x00),
    (0xaa, 0xff, 0xc3),
];

/// An sRGB highlight color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Components in `[0, 1]`, as PDF `/C` arrays expect.
    pub fn to_unit_rgb(self) -> [f32; 3] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        ]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The highlight color of a language.
///
/// The first byte of the SHA-256 of the canonical code picks a palette
/// entry. Two languages may share a color; the legend tells them apart.
pub fn color_for(language: &LanguageCode) -> Color {
    let digest = Sha256::digest(language.as_str().as_bytes());
    let (r, g, b) = PALETTE[usize::from(digest[0]) % PALETTE.len()];
    Color::new(r, g, b)
}

/// One highlight: a span's union box on one page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnnotationInstruction {
    pub span_id: SpanId,
    pub page: PageIndex,
    pub bbox: BBox<PagePoints>,
    pub language: LanguageCode,
    pub color_key: Color,
}

/// A legend row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LegendEntry {
    pub language: LanguageCode,
    pub name: String,
    pub color: Color,
}

/// One instruction per page of every span whose language is not excluded,
/// in span order then page order.
pub fn map_to_annotations(
    spans: &[Span],
    exclude: &BTreeSet<LanguageCode>,
) -> Vec<AnnotationInstruction> {
    spans
        .iter()
        .filter(|span| !exclude.contains(&span.language))
        .flat_map(|span| {
            let color = color_for(&span.language);
            span.bboxes.iter().map(move |pb| AnnotationInstruction {
                span_id: span.id,
                page: pb.page,
                bbox: pb.bbox,
                language: span.language.clone(),
                color_key: color,
            })
        })
        .collect()
}

/// Distinct languages of `instructions` with their colors, ordered by code.
pub fn legend(instructions: &[AnnotationInstruction]) -> Vec<LegendEntry> {
    let mut seen: BTreeMap<&LanguageCode, Color> = BTreeMap::new();
    for instruction in instructions {
        seen.entry(&instruction.language)
            .or_insert(instruction.color_key);
    }
    seen.into_iter()
        .map(|(language, color)| LegendEntry {
            language: language.clone(),
            name: language.display_name(),
            color,
        })
        .collect()
}

/// Instructions grouped by page, pages ascending.
pub fn by_page(
    instructions: &[AnnotationInstruction],
) -> BTreeMap<PageIndex, Vec<&AnnotationInstruction>> {
    let mut pages: BTreeMap<PageIndex, Vec<&AnnotationInstruction>> = BTreeMap::new();
    for instruction in instructions {
        pages.entry(instruction.page).or_default().push(instruction);
    }
    pages
}
