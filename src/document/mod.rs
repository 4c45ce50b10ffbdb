//! Open documents and page preview retrieval
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        Document                           │
//! │  open → unlock → page count → spawn prefetch              │
//! └───────────────────────────────────────────────────────────┘
//!          │ Arc<DocumentInner>            │ Arc<DocumentInner>
//!          ▼                               ▼
//!   ┌──────────────┐              ┌──────────────────┐
//!   │ page_image() │              │ prefetch task    │
//!   │ all_pages()  │              │ (blocking pool)  │
//!   └──────────────┘              └──────────────────┘
//!          │                               │
//!          └───────────────┬───────────────┘
//!                          ▼
//!   ┌───────────────────────────────────────────────────────────┐
//!   │  Mutex<E::Handle>  (one render at a time per document)    │
//!   │  PageCache         (shared, Arc<PageImage> values)        │
//!   └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pdf_preview::{Document, PreviewConfig};
//! use pdf_preview::engine::MupdfEngine;
//!
//! let doc = Document::open(Arc::new(MupdfEngine::new()), "book.pdf", None, PreviewConfig::default()).await?;
//! let first = doc.page_image(1).await;
//! let all = doc.all_page_images().await;
//! ```

mod prefetch;
mod unlock;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::aggregate::PageAggregator;
use crate::bitmap::PageImage;
use crate::cache::PageCache;
use crate::config::PreviewConfig;
use crate::engine::RasterEngine;
use crate::error::{PreviewError, Result};
use crate::render;

pub use prefetch::PrefetchReport;
pub use unlock::UnlockState;

/// An open PDF with its preview cache
///
/// Dropping the document cancels the background prefetch before its next page.
pub struct Document<E: RasterEngine> {
    inner: Arc<DocumentInner<E>>,
    prefetch: Mutex<Option<JoinHandle<PrefetchReport>>>,
}

/// State shared with page tasks and the prefetch task
pub(crate) struct DocumentInner<E: RasterEngine> {
    engine: Arc<E>,
    /// Native handle; the lock serializes every engine call on it
    handle: Mutex<E::Handle>,
    source: PathBuf,
    file_identity: String,
    page_count: usize,
    resolved_password: Option<String>,
    unlock_state: UnlockState,
    cache: PageCache,
    preview_edge: f32,
    cancelled: AtomicBool,
}

/// Serializable summary of an open document
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub file_identity: String,
    pub source: PathBuf,
    pub page_count: usize,
    pub unlock_state: UnlockState,
    pub password_applied: bool,
}

impl<E: RasterEngine> Document<E> {
    /// Open the document at `path` with a fresh cache sized by `config`.
    ///
    /// Fails only when the engine cannot create the document handle. A wrong
    /// or missing password still yields a document (in [`UnlockState::Locked`]).
    pub async fn open<P: AsRef<Path>>(
        engine: Arc<E>,
        path: P,
        password: Option<&str>,
        config: PreviewConfig,
    ) -> Result<Self> {
        let cache = PageCache::from_config(&config);
        Self::open_with_cache(engine, path, password, config, cache).await
    }

    /// Open using a caller-provided cache.
    ///
    /// Entries are keyed by page index only, so a cache must not be shared by
    /// two documents at the same time.
    pub async fn open_with_cache<P: AsRef<Path>>(
        engine: Arc<E>,
        path: P,
        password: Option<&str>,
        config: PreviewConfig,
        cache: PageCache,
    ) -> Result<Self> {
        config.validate()?;

        let source = path.as_ref().to_path_buf();
        let file_identity = file_identity(&source);

        let open_engine = Arc::clone(&engine);
        let open_source = source.clone();
        let open_identity = file_identity.clone();
        let password = password.map(str::to_owned);

        // Opening may parse the whole file; keep it off the async workers
        let opened = timeout(
            Duration::from_secs(config.open_timeout_secs),
            tokio::task::spawn_blocking(move || {
                let mut handle = open_engine.open(&open_source)?;
                let outcome = unlock::unlock(
                    &*open_engine,
                    &mut handle,
                    password.as_deref(),
                    &open_identity,
                );
                let page_count = open_engine.page_count(&handle);
                Ok::<_, PreviewError>((handle, outcome, page_count))
            }),
        )
        .await;

        let (handle, outcome, page_count) = match opened {
            Ok(join_result) => join_result??,
            Err(_) => return Err(PreviewError::Timeout(config.open_timeout_secs)),
        };

        info!(
            "Opened {} ({} pages, {:?})",
            file_identity, page_count, outcome.state
        );

        let inner = Arc::new(DocumentInner {
            engine,
            handle: Mutex::new(handle),
            source,
            file_identity,
            page_count,
            resolved_password: outcome.resolved_password,
            unlock_state: outcome.state,
            cache,
            preview_edge: config.preview_edge,
            cancelled: AtomicBool::new(false),
        });

        let prefetch = if config.prefetch && page_count > 0 {
            prefetch::spawn(Arc::clone(&inner))
        } else {
            None
        };

        Ok(Self {
            inner,
            prefetch: Mutex::new(prefetch),
        })
    }

    pub fn page_count(&self) -> usize {
        self.inner.page_count
    }

    /// Display name derived from the source path
    pub fn file_identity(&self) -> &str {
        &self.inner.file_identity
    }

    pub fn source(&self) -> &Path {
        &self.inner.source
    }

    /// Non-empty password applied at open, whether or not it unlocked the file
    pub fn resolved_password(&self) -> Option<&str> {
        self.inner.resolved_password.as_deref()
    }

    pub fn unlock_state(&self) -> UnlockState {
        self.inner.unlock_state
    }

    /// Ask the engine whether content is currently accessible
    ///
    /// Takes the document lock, so it waits for any page render in progress.
    /// [`Document::unlock_state`] answers without blocking.
    pub fn is_unlocked(&self) -> bool {
        let handle = self.inner.handle.lock();
        self.inner.engine.is_unlocked(&handle)
    }

    pub fn cache(&self) -> &PageCache {
        &self.inner.cache
    }

    pub fn info(&self) -> DocumentInfo {
        DocumentInfo {
            file_identity: self.inner.file_identity.clone(),
            source: self.inner.source.clone(),
            page_count: self.inner.page_count,
            unlock_state: self.inner.unlock_state,
            password_applied: self.inner.resolved_password.is_some(),
        }
    }

    /// Rasterize a page synchronously, bypassing the cache.
    ///
    /// Blocks on the document lock and on the engine; call it from a blocking
    /// context.
    pub fn render_page(&self, page_index: usize) -> Option<PageImage> {
        self.inner.render_page(page_index)
    }

    /// Cache-only lookup
    pub fn cached_page_image(&self, page_index: usize) -> Option<Arc<PageImage>> {
        self.inner.cache.get(page_index)
    }

    /// Preview for one page.
    ///
    /// A cache hit returns without suspending; a miss renders on the blocking
    /// pool and stores the result. Concurrent misses for the same page are
    /// not merged; each renders and the last write wins.
    pub async fn page_image(&self, page_index: usize) -> Option<Arc<PageImage>> {
        self.inner.page_image(page_index).await
    }

    /// Previews for every page that has one, in page order.
    ///
    /// One task per page; pages without an image are left out.
    pub async fn all_page_images(&self) -> Vec<Arc<PageImage>> {
        let page_count = self.inner.page_count;
        let (aggregator, done) = PageAggregator::new(page_count);

        for page_index in 1..=page_count {
            let inner = Arc::clone(&self.inner);
            let aggregator = Arc::clone(&aggregator);
            tokio::spawn(async move {
                let image = inner.page_image(page_index).await;
                aggregator.record(page_index, image);
            });
        }
        drop(aggregator);

        match done.await {
            Ok(images) => images,
            Err(_) => {
                warn!(
                    "Page tasks for {} ended before all pages completed",
                    self.inner.file_identity
                );
                Vec::new()
            }
        }
    }

    /// Stop the background prefetch before its next page
    pub fn cancel_prefetch(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    /// Wait for the background prefetch to finish.
    ///
    /// Returns `None` if prefetch was never started or was already awaited.
    pub async fn wait_for_prefetch(&self) -> Option<PrefetchReport> {
        let task = self.prefetch.lock().take()?;
        match task.await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Prefetch task for {} failed: {}", self.inner.file_identity, e);
                None
            }
        }
    }
}

impl<E: RasterEngine> Drop for Document<E> {
    fn drop(&mut self) {
        self.cancel_prefetch();
        debug!("Closed {}", self.inner.file_identity);
    }
}

impl<E: RasterEngine> DocumentInner<E> {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn render_page(&self, page_index: usize) -> Option<PageImage> {
        let handle = self.handle.lock();
        render::render_page(
            &*self.engine,
            &*handle,
            page_index,
            self.page_count,
            self.preview_edge,
        )
    }

    async fn page_image(self: &Arc<Self>, page_index: usize) -> Option<Arc<PageImage>> {
        if page_index == 0 || page_index > self.page_count {
            return None;
        }

        if let Some(image) = self.cache.get(page_index) {
            return Some(image);
        }

        let inner = Arc::clone(self);
        match tokio::task::spawn_blocking(move || inner.render_page(page_index)).await {
            Ok(Some(image)) => {
                let image = Arc::new(image);
                self.cache.insert(page_index, Arc::clone(&image));
                Some(image)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Render task for page {} failed: {}", page_index, e);
                None
            }
        }
    }
}

fn file_identity(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MemoryDocument, MemoryEngine, MemoryPage, PageRect, Protection};
    use crate::render::WHITE;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn three_wide_pages() -> MemoryDocument {
        MemoryDocument::uniform(
            3,
            MemoryPage::new(480.0, 240.0).mark(PageRect::new(0.0, 0.0, 480.0, 40.0), RED),
        )
    }

    fn no_prefetch() -> PreviewConfig {
        PreviewConfig::default().with_prefetch(false)
    }

    #[test]
    fn test_file_identity() {
        assert_eq!(file_identity(Path::new("/books/Moby Dick.pdf")), "Moby Dick");
        assert_eq!(file_identity(Path::new("report")), "report");
        assert_eq!(file_identity(Path::new("/")), "/");
    }

    #[tokio::test]
    async fn test_open_unencrypted() {
        let engine = Arc::new(MemoryEngine::new().with_document("/docs/wide.pdf", three_wide_pages()));
        let doc = Document::open(engine, "/docs/wide.pdf", Some("unused"), no_prefetch())
            .await
            .unwrap();

        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.file_identity(), "wide");
        assert_eq!(doc.resolved_password(), None);
        assert_eq!(doc.unlock_state(), UnlockState::NotEncrypted);
        assert!(doc.is_unlocked());
    }

    #[tokio::test]
    async fn test_open_missing_path() {
        let engine = Arc::new(MemoryEngine::new());
        let result = Document::open(engine, "/docs/absent.pdf", None, no_prefetch()).await;
        assert!(matches!(result, Err(PreviewError::Open { .. })));
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let engine = Arc::new(MemoryEngine::new().with_document("/docs/wide.pdf", three_wide_pages()));
        let config = no_prefetch().with_preview_edge(0.0);
        let result = Document::open(engine, "/docs/wide.pdf", None, config).await;
        assert!(matches!(result, Err(PreviewError::Config(_))));
    }

    #[tokio::test]
    async fn test_preview_size() {
        let engine = Arc::new(MemoryEngine::new().with_document("/docs/wide.pdf", three_wide_pages()));
        let doc = Document::open(engine, "/docs/wide.pdf", None, no_prefetch())
            .await
            .unwrap();

        for page_index in 1..=3 {
            let image = doc.page_image(page_index).await.unwrap();
            assert_eq!((image.width(), image.height()), (240, 120));
            assert_eq!(image.scale(), 0.5);
        }
    }

    #[tokio::test]
    async fn test_content_rendered_right_side_up() {
        let engine = Arc::new(MemoryEngine::new().with_document("/docs/wide.pdf", three_wide_pages()));
        let doc = Document::open(engine, "/docs/wide.pdf", None, no_prefetch())
            .await
            .unwrap();

        // Mark covers user-space y 0..40, the bottom 20 pixel rows at scale 0.5
        let image = doc.page_image(1).await.unwrap();
        assert_eq!(image.pixel(120, 119), RED);
        assert_eq!(image.pixel(120, 100), RED);
        assert_eq!(image.pixel(120, 99), WHITE);
        assert_eq!(image.pixel(120, 0), WHITE);
    }

    #[tokio::test]
    async fn test_out_of_range_pages() {
        let engine = Arc::new(MemoryEngine::new().with_document("/docs/wide.pdf", three_wide_pages()));
        let doc = Document::open(Arc::clone(&engine), "/docs/wide.pdf", None, no_prefetch())
            .await
            .unwrap();

        assert!(doc.render_page(0).is_none());
        assert!(doc.render_page(4).is_none());
        assert!(doc.page_image(0).await.is_none());
        assert!(doc.page_image(99).await.is_none());
        assert!(doc.cache().is_empty());
        assert_eq!(engine.stats().paints, 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_engine() {
        let engine = Arc::new(MemoryEngine::new().with_document("/docs/wide.pdf", three_wide_pages()));
        let doc = Document::open(Arc::clone(&engine), "/docs/wide.pdf", None, no_prefetch())
            .await
            .unwrap();

        let first = doc.page_image(2).await.unwrap();
        let second = doc.page_image(2).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.stats().paints, 1);
        assert_eq!(doc.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_render_is_idempotent() {
        let engine = Arc::new(MemoryEngine::new().with_document("/docs/wide.pdf", three_wide_pages()));
        let doc = Document::open(engine, "/docs/wide.pdf", None, no_prefetch())
            .await
            .unwrap();

        let cached = doc.page_image(1).await.unwrap();
        let fresh = doc.render_page(1).unwrap();
        assert!(cached.same_content(&fresh));
    }

    #[tokio::test]
    async fn test_broken_page_is_skipped() {
        let engine = Arc::new(
            MemoryEngine::new().with_document("/docs/broken.pdf", three_wide_pages().broken_page()),
        );
        let doc = Document::open(engine, "/docs/broken.pdf", None, no_prefetch())
            .await
            .unwrap();

        assert_eq!(doc.page_count(), 4);
        assert!(doc.page_image(4).await.is_none());

        let all = doc.all_page_images().await;
        let pages: Vec<usize> = all.iter().map(|p| p.page_index()).collect();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_document() {
        let engine = Arc::new(MemoryEngine::new().with_document("/docs/empty.pdf", MemoryDocument::new(vec![])));
        let doc = Document::open(engine, "/docs/empty.pdf", None, PreviewConfig::default())
            .await
            .unwrap();

        assert_eq!(doc.page_count(), 0);
        assert!(doc.all_page_images().await.is_empty());
        assert!(doc.wait_for_prefetch().await.is_none());
    }

    #[tokio::test]
    async fn test_locked_document_renders_blank() {
        let engine = Arc::new(MemoryEngine::new().with_document(
            "/docs/secret.pdf",
            three_wide_pages().protected(Protection::Password(b"s3cret".to_vec())),
        ));
        let doc = Document::open(engine, "/docs/secret.pdf", Some("wrong"), no_prefetch())
            .await
            .unwrap();

        assert_eq!(doc.unlock_state(), UnlockState::Locked);
        assert_eq!(doc.resolved_password(), Some("wrong"));
        assert!(!doc.is_unlocked());

        let image = doc.page_image(1).await.unwrap();
        assert!(image.is_uniform());
        assert_eq!(image.pixel(0, 0), WHITE);
    }

    #[tokio::test]
    async fn test_prefetch_fills_cache() {
        let engine = Arc::new(MemoryEngine::new().with_document("/docs/wide.pdf", three_wide_pages()));
        let doc = Document::open(Arc::clone(&engine), "/docs/wide.pdf", None, PreviewConfig::default())
            .await
            .unwrap();

        let report = doc.wait_for_prefetch().await.unwrap();
        assert_eq!(report.rendered + report.already_cached, 3);
        assert!(!report.cancelled);
        assert_eq!(doc.cache().page_indices(), vec![1, 2, 3]);

        doc.page_image(3).await.unwrap();
        assert_eq!(engine.stats().paints, 3);
        assert!(doc.wait_for_prefetch().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_prefetch() {
        let engine = Arc::new(
            MemoryEngine::new()
                .with_paint_delay(Duration::from_millis(20))
                .with_document(
                    "/docs/long.pdf",
                    MemoryDocument::uniform(40, MemoryPage::new(100.0, 100.0)),
                ),
        );
        let doc = Document::open(engine, "/docs/long.pdf", None, PreviewConfig::default())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        doc.cancel_prefetch();

        let report = doc.wait_for_prefetch().await.unwrap();
        assert!(report.cancelled);
        assert!(report.rendered < 40);
        assert_eq!(doc.cache().len(), report.rendered);
    }
}
