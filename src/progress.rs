//! Progress-callback trait for per-batch extraction events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through the batches. The CLI uses this to
//! drive its progress bar; library callers can forward events wherever they
//! like.
//!
//! # Example
//!
//! ```rust
//! use cv_survey::{BatchProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     candidates: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_batch_complete(&self, _batch: usize, _total: usize, candidates: usize) {
//!         self.candidates.fetch_add(candidates, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { candidates: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch orchestrator as it processes each batch.
///
/// Batches run one after another, so calls never overlap, but the trait is
/// `Send + Sync` so implementations can be shared with other tasks. All
/// methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first batch.
    ///
    /// # Arguments
    /// * `total_batches`  : number of batches that will be attempted
    /// * `total_documents`: number of loaded documents
    fn on_run_start(&self, total_batches: usize, total_documents: usize) {
        let _ = (total_batches, total_documents);
    }

    /// Called before the first attempt of a batch.
    ///
    /// # Arguments
    /// * `batch`    : 1-indexed batch number
    /// * `total`    : total batches
    /// * `documents`: documents in this batch
    fn on_batch_start(&self, batch: usize, total: usize, documents: usize) {
        let _ = (batch, total, documents);
    }

    /// Called when an attempt failed and another will follow after `delay_secs`.
    fn on_batch_retry(&self, batch: usize, attempt: u32, delay_secs: u64, error: &str) {
        let _ = (batch, attempt, delay_secs, error);
    }

    /// Called when a batch returned a response.
    fn on_batch_complete(&self, batch: usize, total: usize, candidates: usize) {
        let _ = (batch, total, candidates);
    }

    /// Called when a batch used every attempt and was dropped.
    fn on_batch_dropped(&self, batch: usize, total: usize, error: &str) {
        let _ = (batch, total, error);
    }

    /// Called once after all batches have been attempted.
    ///
    /// # Arguments
    /// * `total_batches`: batches attempted
    /// * `succeeded`    : batches that returned a response
    fn on_run_complete(&self, total_batches: usize, succeeded: usize) {
        let _ = (total_batches, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        retries: AtomicUsize,
        completes: AtomicUsize,
        dropped: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_batch_start(&self, _batch: usize, _total: usize, _documents: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_retry(&self, _batch: usize, _attempt: u32, _delay_secs: u64, _error: &str) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _batch: usize, _total: usize, _candidates: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_dropped(&self, _batch: usize, _total: usize, _error: &str) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, _total_batches: usize, succeeded: usize) {
            self.succeeded.store(succeeded, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(2, 4);
        cb.on_batch_start(1, 2, 3);
        cb.on_batch_retry(1, 1, 10, "HTTP 503");
        cb.on_batch_complete(1, 2, 3);
        cb.on_batch_dropped(2, 2, "exhausted");
        cb.on_run_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_batch_start(1, 2, 3);
        tracker.on_batch_complete(1, 2, 2);
        tracker.on_batch_start(2, 2, 1);
        tracker.on_batch_retry(2, 1, 10, "timeout");
        tracker.on_batch_dropped(2, 2, "timeout");
        tracker.on_run_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.retries.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.dropped.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 1);
    }
}
