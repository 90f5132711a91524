//! Native PDF text layer and page images, read with `lopdf`.
//!
//! Strings are decoded through the current font's `/Encoding` or
//! `/ToUnicode` map when it has one. Glyph positions follow the text matrix
//! composed with the graphics state's transformation matrix.
//!
//! Glyph metrics are not consulted. Every character advances half an em and
//! a word's box spans from 0.2 em below the baseline to 0.8 em above it,
//! which is close enough to highlight the right words in common fonts.

use std::collections::{BTreeMap, BTreeSet};

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Encoding, Object, ObjectId};
use tracing::{debug, warn};

use super::ocr::{PageImage, Raster, RasterFormat};
use super::PageInfo;
use crate::error::LangspanError;
use crate::ir::{BBox, PageIndex, PagePoints, Token};

/// US Letter, used when a page declares no MediaBox anywhere in its tree.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Horizontal advance per character, in em.
const ADVANCE_EM: f64 = 0.5;
const ASCENT_EM: f64 = 0.8;
const DESCENT_EM: f64 = 0.2;

/// A `TJ` adjustment wider than this (thousandths of an em) separates words.
const TJ_WORD_GAP: f64 = 200.0;

/// Parent-chain depth limit when resolving inherited page attributes.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// A page of a loaded PDF.
#[derive(Clone, Debug)]
pub struct PdfPage {
    pub info: PageInfo,
    pub id: ObjectId,
}

/// Parses PDF bytes.
pub fn load(bytes: &[u8]) -> Result<Document, LangspanError> {
    Ok(Document::load_mem(bytes)?)
}

/// Pages in document order with their MediaBox sizes.
pub fn pages(doc: &Document) -> Vec<PdfPage> {
    doc.get_pages()
        .into_iter()
        .enumerate()
        .map(|(i, (_, id))| {
            let [x0, y0, x1, y1] = media_box(doc, id);
            PdfPage {
                info: PageInfo {
                    index: PageIndex::new(i as u32),
                    width: (x1 - x0).abs(),
                    height: (y1 - y0).abs(),
                },
                id,
            }
        })
        .collect()
}

/// Tokens from the native text layer of every page.
///
/// A page whose content stream cannot be decoded contributes no tokens; the
/// document as a whole only fails if it cannot be parsed at all.
pub fn text_layer(doc: &Document, pages: &[PdfPage]) -> Vec<Token> {
    let mut tokens = Vec::new();
    for page in pages {
        match page_tokens(doc, page) {
            Ok(mut page_tokens) => tokens.append(&mut page_tokens),
            Err(e) => warn!(page = page.info.index.number(), error = %e, "skipping unreadable page content"),
        }
    }
    debug!(pages = pages.len(), tokens = tokens.len(), "read native text layer");
    tokens
}

/// Tokens on one page.
pub fn page_tokens(doc: &Document, page: &PdfPage) -> Result<Vec<Token>, LangspanError> {
    let bytes = page_content(doc, page.id)?;
    let content = Content::decode(&bytes)?;
    let mut reader = TextReader::new(page.info.index).with_fonts(font_encodings(doc, page.id));
    for op in &content.operations {
        reader.apply(&op.operator, &op.operands);
    }
    Ok(reader.finish())
}

/// Fuzz-only entrypoint: parse, read every page's text and locate images.
#[cfg(feature = "fuzzing")]
pub fn fuzz_text_layer(bytes: &[u8]) -> Result<usize, LangspanError> {
    let doc = load(bytes)?;
    let pages = pages(&doc);
    let _ = page_images(&doc, &pages);
    Ok(text_layer(&doc, &pages).len())
}

/// The largest embedded JPEG or JPEG 2000 image on each page.
///
/// Pages without one get a [`PageImage`] with no raster; rasterizing vector
/// content is left to whoever produced the document.
pub fn page_images(doc: &Document, pages: &[PdfPage]) -> Vec<PageImage> {
    pages
        .iter()
        .map(|page| PageImage {
            page: page.info.index,
            page_size: (page.info.width, page.info.height),
            raster: largest_image(doc, page.id),
        })
        .collect()
}

fn largest_image(doc: &Document, page_id: ObjectId) -> Option<Raster> {
    let resources = inherited(doc, page_id, b"Resources")?;
    let resources = resolve(doc, resources).as_dict().ok()?;
    let xobjects = resolve(doc, resources.get(b"XObject").ok()?).as_dict().ok()?;

    let mut best: Option<Raster> = None;
    for (_, entry) in xobjects.iter() {
        let Object::Stream(stream) = resolve(doc, entry) else {
            continue;
        };
        if !name_is(doc, &stream.dict, b"Subtype", b"Image") {
            continue;
        }
        let Some(format) = raster_format(doc, &stream.dict) else {
            continue;
        };

        let declared = (
            integer(doc, &stream.dict, b"Width"),
            integer(doc, &stream.dict, b"Height"),
        );
        let (width, height) = match declared {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w as u32, h as u32),
            _ => match imagesize::blob_size(&stream.content) {
                Ok(size) if size.width > 0 && size.height > 0 => {
                    (size.width as u32, size.height as u32)
                }
                _ => continue,
            },
        };

        let area = u64::from(width) * u64::from(height);
        let better = best
            .as_ref()
            .map_or(true, |b| area > u64::from(b.width) * u64::from(b.height));
        if better {
            best = Some(Raster {
                data: stream.content.clone(),
                format,
                width,
                height,
            });
        }
    }
    best
}

fn raster_format(doc: &Document, dict: &Dictionary) -> Option<RasterFormat> {
    let filter = resolve(doc, dict.get(b"Filter").ok()?);
    let name = match filter {
        Object::Name(name) => name.as_slice(),
        Object::Array(filters) if filters.len() == 1 => filters[0].as_name().ok()?,
        _ => return None,
    };
    match name {
        b"DCTDecode" => Some(RasterFormat::Jpeg),
        b"JPXDecode" => Some(RasterFormat::Jpeg2000),
        _ => None,
    }
}

/// Concatenated, decompressed content streams of a page.
fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, LangspanError> {
    let page = doc.get_dictionary(page_id)?;
    let Ok(contents) = page.get(b"Contents") else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    let streams: Vec<&Object> = match resolve(doc, contents) {
        Object::Array(items) => items.iter().map(|item| resolve(doc, item)).collect(),
        other => vec![other],
    };
    for object in streams {
        if let Object::Stream(stream) = object {
            let data = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            out.extend_from_slice(&data);
            out.push(b'\n');
        }
    }
    Ok(out)
}

/// Encodings of the page's fonts, keyed by resource name.
///
/// Fonts that declare neither `/Encoding` nor `/ToUnicode` are left out, so
/// their strings fall back to [`decode_pdf_string`].
fn font_encodings(doc: &Document, page_id: ObjectId) -> BTreeMap<Vec<u8>, Encoding<'_>> {
    let fonts = match doc.get_page_fonts(page_id) {
        Ok(fonts) => fonts,
        Err(e) => {
            debug!(error = %e, "page fonts unavailable");
            return BTreeMap::new();
        }
    };
    fonts
        .into_iter()
        .filter(|(_, font)| font.has(b"Encoding") || font.has(b"ToUnicode"))
        .filter_map(|(name, font)| match font.get_font_encoding(doc) {
            Ok(encoding) => Some((name, encoding)),
            Err(e) => {
                debug!(font = %String::from_utf8_lossy(&name), error = %e, "unsupported font encoding");
                None
            }
        })
        .collect()
}

fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    let Some(object) = inherited(doc, page_id, b"MediaBox") else {
        return DEFAULT_MEDIA_BOX;
    };
    let Object::Array(items) = resolve(doc, object) else {
        return DEFAULT_MEDIA_BOX;
    };
    let values: Vec<f64> = items
        .iter()
        .filter_map(|item| number(resolve(doc, item)))
        .collect();
    match values.as_slice() {
        [x0, y0, x1, y1] if x1 != x0 && y1 != y0 => [*x0, *y0, *x1, *y1],
        _ => DEFAULT_MEDIA_BOX,
    }
}

/// Looks `key` up on the page, then on its ancestors.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut seen = BTreeSet::new();
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        if !seen.insert(parent) {
            return None;
        }
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Follows indirect references.
fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    let mut current = object;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(target) => current = target,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

fn name_is(doc: &Document, dict: &Dictionary, key: &[u8], expected: &[u8]) -> bool {
    dict.get(key)
        .ok()
        .and_then(|o| resolve(doc, o).as_name().ok())
        .map_or(false, |name| name == expected)
}

fn integer(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<i64> {
    dict.get(key).ok().and_then(|o| resolve(doc, o).as_i64().ok())
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Decodes a PDF string operand shown in a font without a usable encoding:
/// UTF-16BE with a byte order mark, Latin-1 otherwise.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// An affine matrix `[a b c d e f]` as PDF writes them.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// `translate(tx, ty) × self`.
    fn pre_translate(&self, tx: f64, ty: f64) -> Matrix {
        Matrix {
            e: tx * self.a + ty * self.c + self.e,
            f: tx * self.b + ty * self.d + self.f,
            ..*self
        }
    }

    /// `self × other`: `self` first, then `other`.
    fn concat(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }
}

/// Text-state machine over content-stream operators.
struct TextReader<'a> {
    page: PageIndex,
    fonts: BTreeMap<Vec<u8>, Encoding<'a>>,
    font: Option<Vec<u8>>,
    ctm: Matrix,
    saved_ctm: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    font_size: f64,
    leading: f64,
    char_spacing: f64,
    word_spacing: f64,
    word: String,
    word_box: Option<BBox<PagePoints>>,
    tokens: Vec<Token>,
}

impl<'a> TextReader<'a> {
    fn new(page: PageIndex) -> Self {
        Self {
            page,
            fonts: BTreeMap::new(),
            font: None,
            ctm: Matrix::IDENTITY,
            saved_ctm: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font_size: 12.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            word: String::new(),
            word_box: None,
            tokens: Vec::new(),
        }
    }

    fn with_fonts(mut self, fonts: BTreeMap<Vec<u8>, Encoding<'a>>) -> Self {
        self.fonts = fonts;
        self
    }

    fn apply(&mut self, operator: &str, operands: &[Object]) {
        let num = |i: usize| operands.get(i).and_then(number);
        match operator {
            "q" => self.saved_ctm.push(self.ctm),
            "Q" => {
                if let Some(ctm) = self.saved_ctm.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" => {
                if let (Some(a), Some(b), Some(c), Some(d), Some(e), Some(f)) =
                    (num(0), num(1), num(2), num(3), num(4), num(5))
                {
                    self.ctm = Matrix { a, b, c, d, e, f }.concat(&self.ctm);
                }
            }
            "BT" => {
                self.flush();
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
            }
            "ET" => self.flush(),
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.font = Some(name.clone());
                }
                if let Some(size) = num(1) {
                    self.font_size = size.abs();
                }
            }
            "TL" => self.leading = num(0).unwrap_or(self.leading),
            "Tc" => self.char_spacing = num(0).unwrap_or(self.char_spacing),
            "Tw" => self.word_spacing = num(0).unwrap_or(self.word_spacing),
            "Td" => self.move_line(num(0).unwrap_or(0.0), num(1).unwrap_or(0.0)),
            "TD" => {
                let ty = num(1).unwrap_or(0.0);
                self.leading = -ty;
                self.move_line(num(0).unwrap_or(0.0), ty);
            }
            "Tm" => {
                if let (Some(a), Some(b), Some(c), Some(d), Some(e), Some(f)) =
                    (num(0), num(1), num(2), num(3), num(4), num(5))
                {
                    self.flush();
                    self.tm = Matrix { a, b, c, d, e, f };
                    self.tlm = self.tm;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(bytes),
                            other => {
                                if let Some(adjust) = number(other) {
                                    self.adjust(adjust);
                                }
                            }
                        }
                    }
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "\"" => {
                self.word_spacing = num(0).unwrap_or(self.word_spacing);
                self.char_spacing = num(1).unwrap_or(self.char_spacing);
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(bytes);
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.flush();
        self.tlm = self.tlm.pre_translate(tx, ty);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn show(&mut self, bytes: &[u8]) {
        let fs = self.font_size;
        for ch in self.decode(bytes).chars() {
            let mut advance = ADVANCE_EM * fs + self.char_spacing;
            if ch.is_whitespace() {
                advance += self.word_spacing;
                self.flush();
            } else {
                let glyph = self.glyph_box(advance);
                self.word.push(ch);
                self.word_box = Some(match self.word_box {
                    Some(b) => b.union(&glyph),
                    None => glyph,
                });
            }
            self.tm = self.tm.pre_translate(advance, 0.0);
        }
    }

    fn decode(&self, bytes: &[u8]) -> String {
        self.font
            .as_ref()
            .and_then(|name| self.fonts.get(name))
            .and_then(|encoding| Document::decode_text(encoding, bytes).ok())
            .unwrap_or_else(|| decode_pdf_string(bytes))
    }

    /// `TJ` number: moves left by `amount` thousandths of an em.
    fn adjust(&mut self, amount: f64) {
        if -amount > TJ_WORD_GAP {
            self.flush();
        }
        self.tm = self.tm.pre_translate(-amount / 1000.0 * self.font_size, 0.0);
    }

    fn glyph_box(&self, advance: f64) -> BBox<PagePoints> {
        let descent = -DESCENT_EM * self.font_size;
        let ascent = ASCENT_EM * self.font_size;
        let trm = self.tm.concat(&self.ctm);
        let corners = [
            trm.apply(0.0, descent),
            trm.apply(advance, descent),
            trm.apply(0.0, ascent),
            trm.apply(advance, ascent),
        ];
        let xs = corners.iter().map(|c| c.0);
        let ys = corners.iter().map(|c| c.1);
        BBox::new(
            xs.clone().fold(f64::INFINITY, f64::min),
            ys.clone().fold(f64::INFINITY, f64::min),
            xs.fold(f64::NEG_INFINITY, f64::max),
            ys.fold(f64::NEG_INFINITY, f64::max),
        )
    }

    fn flush(&mut self) {
        if let Some(bbox) = self.word_box.take() {
            let text = std::mem::take(&mut self.word);
            self.tokens.push(Token::native(text, self.page, bbox));
        }
        self.word.clear();
    }

    fn finish(mut self) -> Vec<Token> {
        self.flush();
        self.tokens
    }
}
