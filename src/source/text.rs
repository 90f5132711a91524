//! Plain-text documents laid out on a synthetic page grid.
//!
//! Text has no geometry of its own, so words are placed on a monospace grid
//! over US Letter pages. Pages break on form feed and when a page fills up.
//! The grid only has to be stable and plausible: annotated text output is
//! produced from word offsets, not from boxes.

use std::ops::Range;

use tracing::warn;

use super::PageInfo;
use crate::ir::{BBox, PageIndex, Token};

pub const PAGE_WIDTH: f64 = 612.0;
pub const PAGE_HEIGHT: f64 = 792.0;
pub const MARGIN: f64 = 72.0;
pub const CHAR_WIDTH: f64 = 6.0;
pub const LINE_HEIGHT: f64 = 12.0;

const FORM_FEED: char = '\u{0c}';

/// Decodes document bytes as UTF-8, replacing invalid sequences.
///
/// Returns the text and whether anything had to be replaced.
pub fn decode(bytes: &[u8]) -> (String, bool) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), false),
        Err(_) => {
            warn!("text document is not valid UTF-8; decoding lossily");
            (String::from_utf8_lossy(bytes).into_owned(), true)
        }
    }
}

/// Byte ranges of the whitespace-separated words of `text`, in order.
///
/// Token `i` of a text extraction is always `&text[word_ranges(text)[i]]`.
pub fn word_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start: Option<usize> = None;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                ranges.push(s..i);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        ranges.push(s..text.len());
    }
    ranges
}

/// Lays `text` out on synthetic pages and returns one token per word.
pub fn layout(text: &str) -> (Vec<PageInfo>, Vec<Token>) {
    let columns = ((PAGE_WIDTH - 2.0 * MARGIN) / CHAR_WIDTH) as usize;
    let rows = ((PAGE_HEIGHT - 2.0 * MARGIN) / LINE_HEIGHT) as usize;

    let mut cursor = Cursor::default();
    let mut tokens = Vec::new();
    let mut prev_end = 0;

    for range in word_ranges(text) {
        cursor.advance(&text[prev_end..range.start], rows);

        let word = &text[range.clone()];
        let len = word.chars().count();
        if cursor.col > 0 && cursor.col + len > columns {
            cursor.new_line(rows);
        }

        let x0 = MARGIN + cursor.col as f64 * CHAR_WIDTH;
        let top = PAGE_HEIGHT - MARGIN - cursor.row as f64 * LINE_HEIGHT;
        let bbox = BBox::new(x0, top - LINE_HEIGHT, x0 + len as f64 * CHAR_WIDTH, top);
        tokens.push(Token::native(word, cursor.page, bbox));
        cursor.col += len;
        prev_end = range.end;
    }
    cursor.advance(&text[prev_end..], rows);

    let pages = (0..=cursor.page)
        .map(|p| PageInfo {
            index: PageIndex::new(p),
            width: PAGE_WIDTH,
            height: PAGE_HEIGHT,
        })
        .collect();
    (pages, tokens)
}

#[derive(Debug, Default)]
struct Cursor {
    page: u32,
    row: usize,
    col: usize,
}

impl Cursor {
    /// Moves over the whitespace between two words.
    fn advance(&mut self, gap: &str, rows: usize) {
        for ch in gap.chars() {
            match ch {
                FORM_FEED => self.new_page(),
                '\n' => self.new_line(rows),
                '\r' => {}
                _ => self.col += 1,
            }
        }
    }

    fn new_line(&mut self, rows: usize) {
        self.col = 0;
        self.row += 1;
        if self.row >= rows {
            self.new_page();
        }
    }

    fn new_page(&mut self) {
        self.page += 1;
        self.row = 0;
        self.col = 0;
    }
}
