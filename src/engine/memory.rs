//! In-memory raster engine
//!
//! Documents are registered under a path and described as pages with a media
//! box and a list of filled rectangles ("marks") in PDF user space. Locked
//! documents paint nothing, so their previews come out blank white.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::Rgba;
use parking_lot::RwLock;

use super::{PageRect, RasterEngine};
use crate::error::{PreviewError, Result};
use crate::render::{Surface, Transform};

/// How a registered document is protected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protection {
    None,
    /// Encrypted for permissions only; the empty credential unlocks it
    EmptyPassword,
    /// Requires this exact credential
    Password(Vec<u8>),
}

/// A filled rectangle painted onto a page
#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    pub rect: PageRect,
    pub color: Rgba<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPage {
    media_box: PageRect,
    marks: Vec<Mark>,
}

impl MemoryPage {
    pub fn new(width: f32, height: f32) -> Self {
        Self::with_media_box(PageRect::from_size(width, height))
    }

    pub fn with_media_box(media_box: PageRect) -> Self {
        Self {
            media_box,
            marks: Vec::new(),
        }
    }

    pub fn mark(mut self, rect: PageRect, color: Rgba<u8>) -> Self {
        self.marks.push(Mark { rect, color });
        self
    }

    pub fn media_box(&self) -> PageRect {
        self.media_box
    }
}

/// Page list plus protection; `None` pages cannot be loaded
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryDocument {
    pages: Vec<Option<MemoryPage>>,
    protection: Protection,
}

impl MemoryDocument {
    pub fn new(pages: Vec<MemoryPage>) -> Self {
        Self {
            pages: pages.into_iter().map(Some).collect(),
            protection: Protection::None,
        }
    }

    /// `count` identical pages with a single mark, handy for fixtures
    pub fn uniform(count: usize, page: MemoryPage) -> Self {
        Self::new(vec![page; count])
    }

    pub fn protected(mut self, protection: Protection) -> Self {
        self.protection = protection;
        self
    }

    /// Append a page that fails to load
    pub fn broken_page(mut self) -> Self {
        self.pages.push(None);
        self
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Open handle onto a registered document
pub struct MemoryHandle {
    doc: Arc<MemoryDocument>,
    unlocked: bool,
}

/// Paint counters shared by every handle of an engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Total paint calls
    pub paints: usize,
    /// Highest number of paint calls observed running at once
    pub peak_concurrent_paints: usize,
}

#[derive(Default)]
struct Counters {
    paints: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Deterministic engine over registered in-memory documents
#[derive(Default)]
pub struct MemoryEngine {
    documents: RwLock<HashMap<PathBuf, Arc<MemoryDocument>>>,
    paint_delay: Option<Duration>,
    counters: Counters,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every paint call, simulating a slow rasterizer
    pub fn with_paint_delay(mut self, delay: Duration) -> Self {
        self.paint_delay = Some(delay);
        self
    }

    pub fn with_document<P: AsRef<Path>>(self, path: P, doc: MemoryDocument) -> Self {
        self.register(path, doc);
        self
    }

    pub fn register<P: AsRef<Path>>(&self, path: P, doc: MemoryDocument) {
        self.documents
            .write()
            .insert(path.as_ref().to_path_buf(), Arc::new(doc));
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            paints: self.counters.paints.load(Ordering::Acquire),
            peak_concurrent_paints: self.counters.peak.load(Ordering::Acquire),
        }
    }
}

impl RasterEngine for MemoryEngine {
    type Handle = MemoryHandle;
    type Page = MemoryPage;

    fn open(&self, location: &Path) -> Result<Self::Handle> {
        let doc = self
            .documents
            .read()
            .get(location)
            .cloned()
            .ok_or_else(|| PreviewError::open(location.display().to_string(), "no such document"))?;

        let unlocked = doc.protection == Protection::None;
        Ok(MemoryHandle { doc, unlocked })
    }

    fn is_encrypted(&self, doc: &Self::Handle) -> bool {
        doc.doc.protection != Protection::None
    }

    fn is_unlocked(&self, doc: &Self::Handle) -> bool {
        doc.unlocked
    }

    fn unlock(&self, doc: &mut Self::Handle, credential: &[u8]) -> bool {
        let accepted = match &doc.doc.protection {
            Protection::None => true,
            Protection::EmptyPassword => true,
            Protection::Password(expected) => expected.as_slice() == credential,
        };
        if accepted {
            doc.unlocked = true;
        }
        accepted
    }

    fn page_count(&self, doc: &Self::Handle) -> usize {
        doc.doc.page_count()
    }

    fn page(&self, doc: &Self::Handle, page_index: usize) -> Option<Self::Page> {
        let page = doc.doc.pages.get(page_index.checked_sub(1)?)?.clone()?;
        if doc.unlocked {
            Some(page)
        } else {
            // Locked content is unreadable; only the page geometry survives
            Some(MemoryPage::with_media_box(page.media_box))
        }
    }

    fn page_bounds(&self, page: &Self::Page) -> Option<PageRect> {
        Some(page.media_box)
    }

    fn paint(&self, page: &Self::Page, surface: &mut Surface, transform: &Transform) -> Result<()> {
        let active = self.counters.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters.peak.fetch_max(active, Ordering::AcqRel);

        if let Some(delay) = self.paint_delay {
            std::thread::sleep(delay);
        }

        for mark in &page.marks {
            let from = transform.apply(mark.rect.x0, mark.rect.y0);
            let to = transform.apply(mark.rect.x1, mark.rect.y1);
            surface.fill_rect(from, to, mark.color);
        }

        self.counters.paints.fetch_add(1, Ordering::AcqRel);
        self.counters.active.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locked_engine() -> MemoryEngine {
        MemoryEngine::new().with_document(
            "/docs/secret.pdf",
            MemoryDocument::uniform(2, MemoryPage::new(100.0, 100.0))
                .protected(Protection::Password(b"hunter2".to_vec())),
        )
    }

    #[test]
    fn test_open_unknown_path() {
        let engine = MemoryEngine::new();
        let result = engine.open(Path::new("/nope.pdf"));
        assert!(matches!(result, Err(PreviewError::Open { .. })));
    }

    #[test]
    fn test_unlock_with_password() {
        let engine = locked_engine();
        let mut handle = engine.open(Path::new("/docs/secret.pdf")).unwrap();

        assert!(engine.is_encrypted(&handle));
        assert!(!engine.is_unlocked(&handle));
        assert!(!engine.unlock(&mut handle, b""));
        assert!(!engine.unlock(&mut handle, b"wrong"));
        assert!(engine.unlock(&mut handle, b"hunter2"));
        assert!(engine.is_unlocked(&handle));
    }

    #[test]
    fn test_page_lookup_is_one_based() {
        let engine = MemoryEngine::new().with_document(
            "/docs/a.pdf",
            MemoryDocument::uniform(1, MemoryPage::new(10.0, 20.0)).broken_page(),
        );
        let handle = engine.open(Path::new("/docs/a.pdf")).unwrap();

        assert_eq!(engine.page_count(&handle), 2);
        assert!(engine.page(&handle, 0).is_none());
        assert!(engine.page(&handle, 1).is_some());
        assert!(engine.page(&handle, 2).is_none());
        assert!(engine.page(&handle, 3).is_none());
    }

    #[test]
    fn test_paint_counts() {
        let engine = MemoryEngine::new();
        let mut surface = Surface::new(4, 4).unwrap();
        let page = MemoryPage::new(4.0, 4.0);
        engine.paint(&page, &mut surface, &Transform::IDENTITY).unwrap();
        engine.paint(&page, &mut surface, &Transform::IDENTITY).unwrap();

        let stats = engine.stats();
        assert_eq!(stats.paints, 2);
        assert_eq!(stats.peak_concurrent_paints, 1);
    }
}
