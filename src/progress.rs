//! Progress observer for batch events.
//!
//! Inject an [`Arc<dyn ProgressObserver>`] via
//! [`crate::config::DescribeConfigBuilder::progress`] to receive events as the
//! dispatcher walks the inputs, the aggregator expands PDFs, and each unit
//! comes back from the model. The observer lives for one invocation; the
//! library itself never touches global logging state beyond `tracing` macros.
//!
//! # Example
//!
//! ```rust
//! use files2knowledge::{DescribeConfig, ProgressObserver};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingObserver {
//!     done: AtomicUsize,
//! }
//!
//! impl ProgressObserver for CountingObserver {
//!     fn on_unit_complete(&self, label: &str, record: &Path) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("#{n} {label} -> {}", record.display());
//!     }
//! }
//!
//! let observer = Arc::new(CountingObserver { done: AtomicUsize::new(0) });
//! let config = DescribeConfig::builder()
//!     .progress(observer as Arc<dyn ProgressObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::BatchStats;
use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it processes a batch.
///
/// All methods have default no-op implementations so implementors only
/// override what they care about. With `concurrency > 1` events for different
/// inputs may interleave and arrive from different tasks.
pub trait ProgressObserver: Send + Sync {
    /// Called once after discovery, before any inference.
    ///
    /// # Arguments
    /// * `pdfs`  : number of PDF documents to process
    /// * `images`: number of standalone images to process
    fn on_batch_start(&self, pdfs: usize, images: usize) {
        let _ = (pdfs, images);
    }

    /// Called when processing of a top-level input begins.
    fn on_input_start(&self, path: &Path) {
        let _ = path;
    }

    /// Called when a PDF has been rasterised.
    fn on_document_rasterized(&self, path: &Path, pages: usize) {
        let _ = (path, pages);
    }

    /// Called after a unit's record has been written.
    ///
    /// # Arguments
    /// * `label` : `file.png` or `deck.pdf#3`
    /// * `record`: path of the written record
    fn on_unit_complete(&self, label: &str, record: &Path) {
        let _ = (label, record);
    }

    /// Called when a unit fails.
    fn on_unit_error(&self, label: &str, error: &str) {
        let _ = (label, error);
    }

    /// Called when a PDF cannot be rasterised. No page units exist for it,
    /// so this is reported instead of [`Self::on_unit_error`].
    fn on_document_failed(&self, path: &Path, error: &str) {
        let _ = (path, error);
    }

    /// Called for a file that was not processed because of its type.
    fn on_input_skipped(&self, path: &Path) {
        let _ = path;
    }

    /// Called once after every input has been attempted (not called when
    /// the batch aborts).
    fn on_batch_complete(&self, stats: &BatchStats) {
        let _ = stats;
    }
}

/// A no-op observer for callers that don't need events.
pub struct NoopProgressObserver;

impl ProgressObserver for NoopProgressObserver {}

/// Convenience alias matching the type stored in [`crate::config::DescribeConfig`].
pub type ProgressCallback = Arc<dyn ProgressObserver>;
