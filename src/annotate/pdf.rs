//! Highlight annotations on a copy of the input PDF.
//!
//! Every instruction becomes a `/Highlight` annotation whose `/QuadPoints`
//! cover the span's box on that page, colored by language and labelled with
//! the language and span id. A `/FreeText` legend listing the highlighted
//! languages is placed in the top-left corner of the first page.

use std::collections::BTreeMap;

use lopdf::{dictionary, Document, Object, ObjectId, StringFormat};
use tracing::debug;

use super::{by_page, legend, AnnotationInstruction, LegendEntry};
use crate::error::LangspanError;
use crate::ir::{BBox, PagePoints};
use crate::source::pdf::{self as pdf_source, PdfPage};

const AUTHOR: &str = "langspan";
/// Highlight opacity.
const HIGHLIGHT_ALPHA: f32 = 0.4;
const LEGEND_FONT_SIZE: f64 = 9.0;
const LEGEND_MARGIN: f64 = 18.0;
const LEGEND_WIDTH: f64 = 200.0;

/// Writes highlights for `instructions` into a copy of `bytes`.
///
/// Instructions pointing past the last page are ignored. With no
/// instructions the document is re-saved unchanged apart from serialization.
pub fn render_pdf(
    bytes: &[u8],
    instructions: &[AnnotationInstruction],
) -> Result<Vec<u8>, LangspanError> {
    let mut doc = pdf_source::load(bytes)?;
    let pages = pdf_source::pages(&doc);
    let mut added = 0usize;

    for (page_index, page_instructions) in by_page(instructions) {
        let Some(page) = pages.get(page_index.as_usize()) else {
            debug!(page = page_index.number(), "instruction beyond last page; skipped");
            continue;
        };
        let ids: Vec<ObjectId> = page_instructions
            .into_iter()
            .map(|instruction| doc.add_object(highlight(instruction)))
            .collect();
        added += ids.len();
        append_annotations(&mut doc, page.id, ids)?;
    }

    let entries = legend(instructions);
    if let Some(first) = pages.first() {
        if !entries.is_empty() {
            let id = doc.add_object(legend_annotation(first, &entries));
            append_annotations(&mut doc, first.id, vec![id])?;
        }
    }

    debug!(highlights = added, legend = entries.len(), "annotated PDF");

    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(|e| LangspanError::PdfWrite {
        message: e.to_string(),
    })?;
    Ok(out)
}

fn highlight(instruction: &AnnotationInstruction) -> lopdf::Dictionary {
    let bbox = instruction.bbox.normalized();
    let [r, g, b] = instruction.color_key.to_unit_rgb();
    let contents = format!(
        "{} ({}), span {}",
        instruction.language.display_name(),
        instruction.language,
        instruction.span_id
    );
    dictionary! {
        "Type" => "Annot",
        "Subtype" => "Highlight",
        "Rect" => rect(&bbox),
        "QuadPoints" => quad_points(&bbox),
        "C" => vec![Object::Real(r), Object::Real(g), Object::Real(b)],
        "CA" => Object::Real(HIGHLIGHT_ALPHA),
        "F" => 4i64,
        "T" => text_string(AUTHOR),
        "Contents" => text_string(&contents),
        "NM" => text_string(&format!(
            "langspan-{}-p{}",
            instruction.span_id.as_u64(),
            instruction.page.number()
        )),
    }
}

fn legend_annotation(page: &PdfPage, entries: &[LegendEntry]) -> lopdf::Dictionary {
    let mut lines = vec!["Languages".to_string()];
    lines.extend(
        entries
            .iter()
            .map(|e| format!("{} {} ({})", e.color, e.name, e.language)),
    );

    let height = (lines.len() as f64 + 1.0) * LEGEND_FONT_SIZE * 1.4;
    let top = page.info.height - LEGEND_MARGIN;
    let bbox: BBox<PagePoints> = BBox::new(
        LEGEND_MARGIN,
        top - height,
        LEGEND_MARGIN + LEGEND_WIDTH,
        top,
    );

    dictionary! {
        "Type" => "Annot",
        "Subtype" => "FreeText",
        "Rect" => rect(&bbox),
        "DA" => Object::string_literal(format!("/Helv {LEGEND_FONT_SIZE} Tf 0 g")),
        "F" => 4i64,
        "T" => text_string(AUTHOR),
        "Contents" => text_string(&lines.join("\n")),
        "NM" => text_string("langspan-legend"),
    }
}

/// Adds annotation references to a page's `/Annots`, which may be missing,
/// inline, or an indirect array.
fn append_annotations(
    doc: &mut Document,
    page_id: ObjectId,
    ids: Vec<ObjectId>,
) -> Result<(), LangspanError> {
    let refs = ids.into_iter().map(Object::Reference);
    let existing = doc.get_dictionary(page_id)?.get(b"Annots").ok().cloned();

    match existing {
        Some(Object::Reference(array_id)) => {
            doc.get_object_mut(array_id)?.as_array_mut()?.extend(refs);
        }
        Some(Object::Array(mut array)) => {
            array.extend(refs);
            doc.get_dictionary_mut(page_id)?.set("Annots", array);
        }
        _ => {
            doc.get_dictionary_mut(page_id)?
                .set("Annots", refs.collect::<Vec<Object>>());
        }
    }
    Ok(())
}

fn rect(bbox: &BBox<PagePoints>) -> Vec<Object> {
    [bbox.x0, bbox.y0, bbox.x1, bbox.y1]
        .into_iter()
        .map(|v| Object::Real(v as f32))
        .collect()
}

/// Upper-left, upper-right, lower-left, lower-right.
fn quad_points(bbox: &BBox<PagePoints>) -> Vec<Object> {
    [
        bbox.x0, bbox.y1, bbox.x1, bbox.y1, bbox.x0, bbox.y0, bbox.x1, bbox.y0,
    ]
    .into_iter()
    .map(|v| Object::Real(v as f32))
    .collect()
}

/// A PDF text string: literal for ASCII, UTF-16BE with a byte order mark
/// otherwise.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    bytes.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Annotations of one subtype, counted per one-based page number. Pages
/// without any are left out.
pub fn count_annotations(bytes: &[u8], subtype: &str) -> Result<BTreeMap<u32, usize>, LangspanError> {
    let doc = pdf_source::load(bytes)?;
    let mut counts = BTreeMap::new();
    for page in pdf_source::pages(&doc) {
        let annots = match doc.get_dictionary(page.id)?.get(b"Annots") {
            Ok(Object::Reference(id)) => doc.get_object(*id)?.as_array()?.clone(),
            Ok(Object::Array(array)) => array.clone(),
            _ => continue,
        };
        let n = annots
            .iter()
            .filter_map(|a| a.as_reference().ok())
            .filter_map(|id| doc.get_dictionary(id).ok())
            .filter(|d| {
                d.get(b"Subtype")
                    .and_then(Object::as_name)
                    .map(|name| name == subtype.as_bytes())
                    .unwrap_or(false)
            })
            .count();
        if n > 0 {
            counts.insert(page.info.index.number(), n);
        }
    }
    Ok(counts)
}
