//! Axis-aligned boxes anchoring tokens and spans to the page.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

use super::space::{ImagePixels, PagePoints};

/// An axis-aligned bounding box given by two corners, `(x0, y0)` and
/// `(x1, y1)`.
///
/// The `TSpace` parameter is either [`PagePoints`] or [`ImagePixels`].
/// Construction does not reorder corners; OCR engines occasionally report
/// inverted or empty boxes and those are kept as-is so that downstream
/// consumers can decide what to do with them.
#[derive(Clone, Copy, PartialEq)]
pub struct BBox<TSpace> {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    _space: PhantomData<TSpace>,
}

impl<TSpace> BBox<TSpace> {
    /// Creates a box from explicit corner coordinates.
    #[inline]
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0,
            y0,
            x1,
            y1,
            _space: PhantomData,
        }
    }

    /// Creates a box from an origin corner plus width and height.
    #[inline]
    pub fn from_origin_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Width of the box. Negative for inverted boxes.
    #[inline]
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    /// Height of the box. Negative for inverted boxes.
    #[inline]
    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns true if all coordinates are finite (not NaN or infinite).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x0.is_finite() && self.y0.is_finite() && self.x1.is_finite() && self.y1.is_finite()
    }

    /// Returns true if `x0 <= x1` and `y0 <= y1`.
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.x0 <= self.x1 && self.y0 <= self.y1
    }

    /// Returns the same box with corners swapped where needed so that it is
    /// ordered.
    pub fn normalized(&self) -> Self {
        Self::new(
            self.x0.min(self.x1),
            self.y0.min(self.y1),
            self.x0.max(self.x1),
            self.y0.max(self.y1),
        )
    }

    /// Smallest box containing both `self` and `other`.
    ///
    /// Both inputs are normalized first, so the union of two inverted boxes
    /// is still ordered. Non-finite coordinates propagate through `min`/`max`
    /// the way `f64::min` defines it (NaN loses).
    pub fn union(&self, other: &Self) -> Self {
        let a = self.normalized();
        let b = other.normalized();
        Self::new(
            a.x0.min(b.x0),
            a.y0.min(b.y0),
            a.x1.max(b.x1),
            a.y1.max(b.y1),
        )
    }

    /// Union over an iterator of boxes, `None` when the iterator is empty.
    pub fn union_all<'a, I>(boxes: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Self>,
        TSpace: 'a,
    {
        boxes
            .into_iter()
            .fold(None, |acc: Option<Self>, b| match acc {
                None => Some(b.normalized()),
                Some(acc) => Some(acc.union(b)),
            })
    }
}

impl BBox<ImagePixels> {
    /// Maps a raster box onto page points.
    ///
    /// `image_size` is the raster size in pixels and `page_size` the page
    /// MediaBox size in points. The y axis is flipped because rasters grow
    /// downwards while PDF user space grows upwards.
    pub fn to_page(&self, image_size: (f64, f64), page_size: (f64, f64)) -> BBox<PagePoints> {
        let (img_w, img_h) = image_size;
        let (page_w, page_h) = page_size;
        let sx = page_w / img_w;
        let sy = page_h / img_h;
        BBox::new(
            self.x0 * sx,
            page_h - self.y1 * sy,
            self.x1 * sx,
            page_h - self.y0 * sy,
        )
    }
}

impl<TSpace> std::fmt::Debug for BBox<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BBox")
            .field("x0", &self.x0)
            .field("y0", &self.y0)
            .field("x1", &self.x1)
            .field("y1", &self.y1)
            .finish()
    }
}

impl<TSpace> Default for BBox<TSpace> {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

// Manual serde so that TSpace needs no Serialize/Deserialize bounds.
impl<TSpace> Serialize for BBox<TSpace> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("BBox", 4)?;
        state.serialize_field("x0", &self.x0)?;
        state.serialize_field("y0", &self.y0)?;
        state.serialize_field("x1", &self.x1)?;
        state.serialize_field("y1", &self.y1)?;
        state.end()
    }
}

impl<'de, TSpace> Deserialize<'de> for BBox<TSpace> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct BoxData {
            x0: f64,
            y0: f64,
            x1: f64,
            y1: f64,
        }
        let data = BoxData::deserialize(deserializer)?;
        Ok(BBox::new(data.x0, data.y0, data.x1, data.y1))
    }
}
