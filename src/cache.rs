//! Page preview cache
//!
//! Maps 1-based page indices to rendered previews. Entries are shared
//! (`Arc<PageImage>`), so evicting one never invalidates an image a caller
//! already holds.
//!
//! # Thread Safety
//!
//! The map sits behind a `parking_lot::Mutex` because LRU lookups reorder
//! entries and need `&mut`. The lock is never held across an await point or
//! while rendering. Cloning a `PageCache` shares the same storage.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::bitmap::PageImage;
use crate::config::PreviewConfig;

/// Thread-safe page preview cache
#[derive(Clone)]
pub struct PageCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    pages: Mutex<LruCache<usize, Arc<PageImage>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PageCache {
    /// Create an unbounded cache
    pub fn new() -> Self {
        Self::from_lru(LruCache::unbounded())
    }

    /// Create a cache holding at most `capacity` pages, evicting the least
    /// recently used. A zero capacity is treated as one page.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self::from_lru(LruCache::new(capacity))
    }

    pub fn from_config(config: &PreviewConfig) -> Self {
        match config.cache_capacity {
            Some(capacity) => Self::with_capacity(capacity),
            None => Self::new(),
        }
    }

    fn from_lru(pages: LruCache<usize, Arc<PageImage>>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                pages: Mutex::new(pages),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                inserts: AtomicU64::new(0),
            }),
        }
    }

    /// Look up a page, counting the hit or miss
    pub fn get(&self, page_index: usize) -> Option<Arc<PageImage>> {
        let found = self.inner.pages.lock().get(&page_index).cloned();
        let counter = if found.is_some() {
            &self.inner.hits
        } else {
            &self.inner.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Check presence without touching recency or counters
    pub fn contains(&self, page_index: usize) -> bool {
        self.inner.pages.lock().contains(&page_index)
    }

    /// Store a page, replacing any previous preview for the same index
    pub fn insert(&self, page_index: usize, image: Arc<PageImage>) {
        let evicted = self.inner.pages.lock().push(page_index, image);
        self.inner.inserts.fetch_add(1, Ordering::Relaxed);

        match evicted {
            Some((key, _)) if key != page_index => trace!("Evicted page {} from cache", key),
            _ => {}
        }
    }

    pub fn remove(&self, page_index: usize) -> Option<Arc<PageImage>> {
        self.inner.pages.lock().pop(&page_index)
    }

    /// Drop every entry (explicit invalidation)
    pub fn clear(&self) {
        self.inner.pages.lock().clear();
        debug!("Page cache cleared");
    }

    /// Shed entries under memory pressure, keeping the `keep` most recently
    /// used. Returns how many were dropped.
    pub fn purge(&self, keep: usize) -> usize {
        let mut pages = self.inner.pages.lock();
        let mut dropped = 0;
        while pages.len() > keep {
            if pages.pop_lru().is_none() {
                break;
            }
            dropped += 1;
        }
        drop(pages);

        if dropped > 0 {
            debug!("Purged {} pages from cache", dropped);
        }
        dropped
    }

    /// Cached page indices in ascending order
    pub fn page_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.inner.pages.lock().iter().map(|(k, _)| *k).collect();
        indices.sort_unstable();
        indices
    }

    pub fn len(&self) -> usize {
        self.inner.pages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.pages.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let (len, capacity) = {
            let pages = self.inner.pages.lock();
            let cap = pages.cap().get();
            (pages.len(), (cap != usize::MAX).then_some(cap))
        };

        CacheStats {
            pages: len,
            capacity,
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            inserts: self.inner.inserts.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached previews
    pub pages: usize,
    /// Capacity bound, `None` when unbounded
    pub capacity: Option<usize>,
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }
}
