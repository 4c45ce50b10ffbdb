//! Fan-in of per-page results
//!
//! A [`PageAggregator`] lives for one all-pages request. Each page task calls
//! [`PageAggregator::record`] once; when the completion count reaches the
//! expected number the collected previews are delivered exactly once, sorted
//! by page index.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

use crate::bitmap::PageImage;

pub type AggregateReceiver = oneshot::Receiver<Vec<Arc<PageImage>>>;

pub struct PageAggregator {
    expected: usize,
    completed: AtomicUsize,
    results: Mutex<Vec<(usize, Arc<PageImage>)>>,
    done: Mutex<Option<oneshot::Sender<Vec<Arc<PageImage>>>>>,
}

impl PageAggregator {
    /// Create an aggregator expecting `expected` completions.
    ///
    /// With nothing to wait for the receiver resolves immediately.
    pub fn new(expected: usize) -> (Arc<Self>, AggregateReceiver) {
        let (tx, rx) = oneshot::channel();
        let aggregator = Arc::new(Self {
            expected,
            completed: AtomicUsize::new(0),
            results: Mutex::new(Vec::with_capacity(expected)),
            done: Mutex::new(Some(tx)),
        });

        if expected == 0 {
            aggregator.finish();
        }
        (aggregator, rx)
    }

    /// Record one page outcome; `None` counts as completed but is not collected
    pub fn record(&self, page_index: usize, image: Option<Arc<PageImage>>) {
        if let Some(image) = image {
            self.results.lock().push((page_index, image));
        }

        // The push above happens-before the final increment observes it
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        trace!("Aggregate {}/{} (page {})", completed, self.expected, page_index);

        if completed == self.expected {
            self.finish();
        }
    }

    fn finish(&self) {
        let Some(tx) = self.done.lock().take() else {
            return;
        };

        let mut results = std::mem::take(&mut *self.results.lock());
        results.sort_by_key(|(page_index, _)| *page_index);
        let _ = tx.send(results.into_iter().map(|(_, image)| image).collect());
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.done.lock().is_none()
    }
}
