//! Progress-callback trait for scan and batch events.
//!
//! Inject an [`Arc<dyn ScanProgressCallback>`] via
//! [`crate::config::ScanConfigBuilder::progress_callback`] to receive events
//! as a scan runs: strategy start, fractional OCR progress, completion or
//! failure, and per-item progress while a reconciled batch is written.
//!
//! # Example
//!
//! ```rust
//! use tastecheq::{ScanConfig, ScanProgressCallback};
//! use std::sync::{Arc, Mutex};
//!
//! struct LastFraction(Mutex<f32>);
//!
//! impl ScanProgressCallback for LastFraction {
//!     fn on_recognition_progress(&self, fraction: f32) {
//!         *self.0.lock().unwrap() = fraction;
//!     }
//! }
//!
//! let config = ScanConfig::builder()
//!     .progress_callback(Arc::new(LastFraction(Mutex::new(0.0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::config::ExtractionMode;
use std::sync::Arc;

/// Called by the pipeline as a scan cycle proceeds.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The OCR engine reports progress from a blocking
/// worker thread, hence `Send + Sync`.
pub trait ScanProgressCallback: Send + Sync {
    /// Called once before extraction starts.
    fn on_scan_start(&self, mode: ExtractionMode) {
        let _ = mode;
    }

    /// Fractional recognition progress in `0.0..=1.0` (local strategy only).
    fn on_recognition_progress(&self, fraction: f32) {
        let _ = fraction;
    }

    /// Called when extraction produced `item_count` candidates.
    fn on_scan_complete(&self, item_count: usize) {
        let _ = item_count;
    }

    /// Called when extraction failed.
    fn on_scan_error(&self, error: &str) {
        let _ = error;
    }

    /// Called after each item of a reconciled batch is written.
    ///
    /// # Arguments
    /// * `done`  — items processed so far, skipped ones included
    /// * `total` — items the batch will attempt
    fn on_batch_progress(&self, done: usize, total: usize) {
        let _ = (done, total);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ScanProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ScanConfig`].
pub type ProgressCallback = Arc<dyn ScanProgressCallback>;

/// Percentage shown for `done` of `total`, rounded; 100 when `total` is 0.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done as f64 / total as f64) * 100.0).round().min(100.0) as u8
}
