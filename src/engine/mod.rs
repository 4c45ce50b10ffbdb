//! Rasterizer abstraction
//!
//! PDF parsing and painting are delegated to a [`RasterEngine`]. The crate
//! only orchestrates: unlocking, preview sizing, caching and prefetching.
//!
//! # Implementations
//!
//! - [`MemoryEngine`]: synthetic in-memory pages made of filled rectangles,
//!   deterministic and dependency-free
//! - `MupdfEngine` (feature `mupdf`): real PDF files rendered by MuPDF
//!
//! # Thread Safety
//!
//! Engines must be shareable across threads, but a single document handle is
//! never used concurrently: [`crate::Document`] keeps it behind a mutex and
//! serializes every call that touches it.

mod memory;
#[cfg(feature = "mupdf")]
mod mupdf;

use std::path::Path;

use crate::error::Result;
use crate::render::{Surface, Transform};

pub use memory::{
    EngineStats, Mark, MemoryDocument, MemoryEngine, MemoryHandle, MemoryPage, Protection,
};
#[cfg(feature = "mupdf")]
pub use self::mupdf::{MupdfEngine, MupdfHandle, MupdfPage};

/// Axis-aligned page rectangle in PDF user space (y grows upward)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PageRect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Rectangle anchored at the origin
    pub fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// Opaque PDF rasterizer
///
/// Page indices are 1-based throughout.
pub trait RasterEngine: Send + Sync + 'static {
    /// Open document handle, exclusively owned by one [`crate::Document`]
    type Handle: Send + 'static;

    /// Page handle, only used while the document handle is locked
    type Page;

    /// Open the document at `location`
    fn open(&self, location: &Path) -> Result<Self::Handle>;

    /// Whether the document declares itself encrypted
    fn is_encrypted(&self, doc: &Self::Handle) -> bool;

    /// Whether the document content is currently accessible
    fn is_unlocked(&self, doc: &Self::Handle) -> bool;

    /// Attempt to unlock with a raw credential, returning whether it worked
    fn unlock(&self, doc: &mut Self::Handle, credential: &[u8]) -> bool;

    fn page_count(&self, doc: &Self::Handle) -> usize;

    /// Look up a page; `None` when the page cannot be obtained
    fn page(&self, doc: &Self::Handle, page_index: usize) -> Option<Self::Page>;

    /// Media box of the page
    fn page_bounds(&self, page: &Self::Page) -> Option<PageRect>;

    /// Paint page content into `surface`, mapping user space through `transform`
    fn paint(&self, page: &Self::Page, surface: &mut Surface, transform: &Transform) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_rect_dimensions() {
        let rect = PageRect::new(10.0, 20.0, 490.0, 260.0);
        assert_eq!(rect.width(), 480.0);
        assert_eq!(rect.height(), 240.0);
        assert_eq!(PageRect::from_size(612.0, 792.0).x0, 0.0);
    }
}
