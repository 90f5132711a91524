//! Newtype IDs for type-safe identification of pipeline entities.
//!
//! Spans are numbered in document order by the segmenter; pages are
//! zero-based. Keeping them as distinct types prevents passing a page number
//! where a span id is expected (both are small integers in practice).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a [`Span`](super::Span), unique within one document and
/// assigned in document order starting at 0.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpanId(pub u64);

impl SpanId {
    #[inline]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying u64 value.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for SpanId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Zero-based page index.
///
/// Displayed one-based, because that is what a reader of the report sees in
/// their PDF viewer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageIndex(pub u32);

impl PageIndex {
    #[inline]
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }

    /// One-based page number for user-facing messages.
    #[inline]
    pub fn number(&self) -> u32 {
        self.0 + 1
    }
}

impl fmt::Debug for PageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageIndex({})", self.0)
    }
}

impl fmt::Display for PageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}", self.number())
    }
}

impl From<u32> for PageIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}
