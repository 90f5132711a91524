//! Coordinate space marker types.
//!
//! These are zero-sized types (ZSTs) used as type parameters so that boxes
//! measured on a rendered page image can never be mixed up with boxes in
//! PDF user space without an explicit conversion.

use std::fmt;

/// Marker for page coordinates: PDF user space in points, origin at the
/// bottom-left corner of the MediaBox, y growing upwards.
///
/// Every [`Token`](super::Token) box lives in this space, including tokens
/// that originate from plain-text documents (laid out on a synthetic page).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum PagePoints {}

/// Marker for raster coordinates as reported by OCR engines: pixels, origin
/// at the top-left corner of the page image, y growing downwards.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImagePixels {}

impl fmt::Debug for PagePoints {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

impl fmt::Debug for ImagePixels {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}
