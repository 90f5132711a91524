#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use langspan::classify::{Detection, LanguageDetector};
use langspan::ir::LanguageCode;
use langspan::translate::{TranslationUnavailable, Translator};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

/// Letter-sized PDF; each inner slice is one page, each string one line.
pub fn pdf_bytes(pages: &[&[&str]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for lines in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("TL", vec![14.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
        ];
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                operations.push(Operation::new("T*", vec![]));
            }
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        }
        operations.push(Operation::new("ET", vec![]));

        let encoded = Content { operations }.encode().expect("encode content");
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save pdf");
    out
}

pub fn write_pdf(path: &Path, pages: &[&[&str]]) {
    write_bytes(path, &pdf_bytes(pages));
}

pub fn write_bytes(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bytes).expect("write file");
}

/// OCR sidecar JSON giving `words` on page 0, laid out on one line.
pub fn token_file_json(words: &[&str]) -> String {
    let entries: Vec<serde_json::Value> = words
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let x = 72.0 + 60.0 * i as f64;
            serde_json::json!({
                "text": w,
                "bbox": { "x0": x, "y0": 700.0, "x1": x + 50.0, "y1": 712.0 },
                "confidence": 0.95,
            })
        })
        .collect();
    serde_json::json!({ "pages": [ { "page": 0, "words": entries } ] }).to_string()
}

/// Votes by word lookup with a fixed confidence; ties go to the language
/// seen first.
pub struct LexiconDetector {
    words: HashMap<String, &'static str>,
    confidence: f64,
}

impl LexiconDetector {
    pub fn new(entries: &[(&str, &'static str)], confidence: f64) -> Self {
        Self {
            words: entries
                .iter()
                .map(|(w, l)| (w.to_lowercase(), *l))
                .collect(),
            confidence,
        }
    }

    /// English and French function words plus a few Latin and German ones.
    pub fn european() -> Self {
        Self::new(
            &[
                ("the", "en"),
                ("cat", "en"),
                ("sat", "en"),
                ("on", "en"),
                ("mat", "en"),
                ("and", "en"),
                ("then", "en"),
                ("slept", "en"),
                ("le", "fr"),
                ("chat", "fr"),
                ("noir", "fr"),
                ("dort", "fr"),
                ("carpe", "la"),
                ("diem", "la"),
                ("quam", "la"),
                ("der", "de"),
                ("hund", "de"),
                ("el", "es"),
                ("perro", "es"),
            ],
            0.9,
        )
    }
}

impl LanguageDetector for LexiconDetector {
    fn detect(&self, text: &str) -> Option<Detection> {
        let mut order: Vec<&str> = Vec::new();
        let mut votes: HashMap<&str, usize> = HashMap::new();
        for word in text.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if let Some(&lang) = self.words.get(&word) {
                if !votes.contains_key(lang) {
                    order.push(lang);
                }
                *votes.entry(lang).or_insert(0) += 1;
            }
        }
        let mut best: Option<&str> = None;
        for lang in order {
            if best.map_or(true, |b| votes[lang] > votes[b]) {
                best = Some(lang);
            }
        }
        Some(Detection::new(
            LanguageCode::parse(best?).ok()?,
            self.confidence,
        ))
    }
}

/// Upper-cases text; refuses Latin.
pub struct UpperTranslator;

impl Translator for UpperTranslator {
    fn translate(
        &self,
        text: &str,
        source: &LanguageCode,
        _target: &LanguageCode,
    ) -> Result<String, TranslationUnavailable> {
        if source.as_str() == "la" {
            return Err(TranslationUnavailable::new("no model for Latin"));
        }
        Ok(text.to_uppercase())
    }
}
