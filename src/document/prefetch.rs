//! Background prefetch of every page
//!
//! Runs on Tokio's blocking pool right after a document opens. The task holds
//! its own reference to the document internals, so the native handle stays
//! valid until it returns; dropping the [`super::Document`] raises the
//! cancellation flag, which is checked before each page.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::DocumentInner;
use crate::engine::RasterEngine;

/// Summary of a finished prefetch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchReport {
    /// Pages rendered and cached by the prefetch
    pub rendered: usize,
    /// Pages already cached by an on-demand request
    pub already_cached: usize,
    /// Pages that resolved to no image
    pub skipped: usize,
    /// Stopped before reaching the last page
    pub cancelled: bool,
}

pub(crate) fn spawn<E: RasterEngine>(inner: Arc<DocumentInner<E>>) -> Option<JoinHandle<PrefetchReport>> {
    if tokio::runtime::Handle::try_current().is_err() {
        debug!("No Tokio runtime; prefetch for {} not started", inner.file_identity);
        return None;
    }
    Some(tokio::task::spawn_blocking(move || run(&inner)))
}

pub(crate) fn run<E: RasterEngine>(inner: &DocumentInner<E>) -> PrefetchReport {
    let mut report = PrefetchReport::default();

    for page_index in 1..=inner.page_count {
        if inner.is_cancelled() {
            debug!(
                "Prefetch for {} cancelled before page {}",
                inner.file_identity, page_index
            );
            report.cancelled = true;
            return report;
        }

        if inner.cache.contains(page_index) {
            report.already_cached += 1;
            continue;
        }

        match inner.render_page(page_index) {
            Some(image) => {
                inner.cache.insert(page_index, Arc::new(image));
                report.rendered += 1;
            }
            None => report.skipped += 1,
        }
    }

    info!(
        "Prefetched {} ({} rendered, {} cached, {} unavailable)",
        inner.file_identity, report.rendered, report.already_cached, report.skipped
    );
    report
}
