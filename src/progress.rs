//! Progress-callback trait for extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline structures a document and picks record images.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a terminal progress bar, a job table or a
//! WebSocket without the library knowing how the host communicates. The trait
//! is `Send + Sync` because image selection runs several records at once.
//!
//! # Example
//!
//! ```rust
//! use zirkel_inventory::{ExtractionProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     selected: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_selection_complete(&self, record: usize, total: usize, has_image: bool) {
//!         self.selected.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("record {record}/{total}: image={has_image}");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { selected: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction pipeline as it moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_selection_start` and `on_selection_complete` may
/// be called concurrently from different tasks.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once the document is opened.
    ///
    /// # Arguments
    /// * `page_count` - pages (or worksheets) in the document
    fn on_extraction_start(&self, page_count: usize) {
        let _ = page_count;
    }

    /// Called when the structuring reply has been parsed and validated.
    fn on_records_structured(&self, record_count: usize) {
        let _ = record_count;
    }

    /// Called before a record's image-selection request.
    ///
    /// # Arguments
    /// * `record` - 1-indexed record position
    /// * `total`  - number of records
    fn on_selection_start(&self, record: usize, total: usize) {
        let _ = (record, total);
    }

    /// Called when a record's image selection settles, with or without an image.
    fn on_selection_complete(&self, record: usize, total: usize, has_image: bool) {
        let _ = (record, total, has_image);
    }

    /// Called once after every record has been through selection.
    ///
    /// # Arguments
    /// * `record_count` - records returned
    /// * `with_image`   - records that ended up with a selected image
    fn on_extraction_complete(&self, record_count: usize, with_image: usize) {
        let _ = (record_count, with_image);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
