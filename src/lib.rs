//! PDF Page Previews
//!
//! Opens a PDF (optionally password-protected), reports its page count and
//! rasterizes pages into low-resolution previews held in an in-memory cache.
//! Every page is prefetched in the background as soon as the document opens.
//!
//! # Modules
//!
//! - `document`: Open/unlock, on-demand and all-pages retrieval, prefetch
//! - `cache`: Shared page preview cache
//! - `aggregate`: Fan-in of per-page completions
//! - `render`: Preview sizing, page transform and drawing surface
//! - `engine`: Rasterizer abstraction plus in-memory and MuPDF engines
//!
//! The actual PDF parsing and painting are delegated to a [`RasterEngine`].

pub mod aggregate;
pub mod bitmap;
pub mod cache;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod render;

pub use aggregate::PageAggregator;
pub use bitmap::PageImage;
pub use cache::{CacheStats, PageCache};
pub use config::PreviewConfig;
pub use document::{Document, DocumentInfo, PrefetchReport, UnlockState};
pub use engine::{PageRect, RasterEngine};
pub use error::{PreviewError, Result};
pub use render::{PreviewGeometry, Surface, Transform};
