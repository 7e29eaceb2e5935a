//! Progress-callback trait for per-image batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::TranscriptionConfigBuilder::progress_callback`] to receive
//! events as the batch orchestrator works through its images. The CLI uses it
//! to drive an `indicatif` progress bar.
//!
//! # Example
//!
//! ```rust
//! use edgequake_scan2txt::{BatchProgressCallback, TranscriptionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, index: usize, total: usize, name: &str, chars: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {} ({} chars)", index, total, name, chars);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = TranscriptionConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch orchestrator as it processes each image.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `index` is 1-based.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, after the input has been resolved and before any image
    /// is processed.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before an image enters the item pipeline.
    fn on_item_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when an image was transcribed and its output written.
    ///
    /// `chars` is the character count of the persisted transcription.
    fn on_item_complete(&self, index: usize, total: usize, name: &str, chars: usize) {
        let _ = (index, total, name, chars);
    }

    /// Called when an image failed; `error` is the human-readable failure.
    fn on_item_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let _ = (index, total, name, error);
    }

    /// Called once after every image has been attempted.
    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let _ = (total, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in
/// [`crate::config::TranscriptionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
