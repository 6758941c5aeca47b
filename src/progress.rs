//! Progress-callback trait for pipeline phase events.
//!
//! Inject an [`Arc<dyn ProcessingProgressCallback>`] via
//! [`crate::config::ProcessingConfigBuilder::progress_callback`] to follow a
//! document through its phases: extract, upload, enrich, merge, assemble.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a terminal progress bar, a log line or a
//! job record without the library knowing how the host communicates. Upload
//! and enrichment items complete concurrently, so the trait is `Send + Sync`.
//!
//! # Example
//!
//! ```rust
//! use pdf_blueprint::{Phase, ProcessingConfig, ProcessingProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     enriched: AtomicUsize,
//! }
//!
//! impl ProcessingProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, phase: Phase, _done: usize, _total: usize) {
//!         if phase == Phase::Enrich {
//!             self.enriched.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let config = ProcessingConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { enriched: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::model::PageContent;
use std::fmt;
use std::sync::Arc;

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Text/image extraction and classification (blocking, one pass).
    Extract,
    /// Concurrent image uploads.
    Upload,
    /// Concurrent vision analysis.
    Enrich,
    /// Correlating upload and vision results back to their images.
    Merge,
    /// Per-page ordering and markdown flattening.
    Assemble,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Extract => "extract",
            Phase::Upload => "upload",
            Phase::Enrich => "enrich",
            Phase::Merge => "merge",
            Phase::Assemble => "assemble",
        };
        f.write_str(name)
    }
}

/// Called by the orchestrator as a document moves through its phases.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_item_complete` is called from concurrently
/// running futures during [`Phase::Upload`] and [`Phase::Enrich`];
/// implementations must synchronise shared state.
pub trait ProcessingProgressCallback: Send + Sync {
    /// Called once the document has been opened and its pages counted.
    fn on_processing_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when a phase begins; `items` is the number of units it will process.
    fn on_phase_start(&self, phase: Phase, items: usize) {
        let _ = (phase, items);
    }

    /// Called after each unit of work (page, upload, vision call) finishes.
    fn on_item_complete(&self, phase: Phase, done: usize, total: usize) {
        let _ = (phase, done, total);
    }

    fn on_phase_complete(&self, phase: Phase) {
        let _ = phase;
    }

    /// Called once with the assembled pages, before the result is returned.
    fn on_processing_complete(&self, pages: &[PageContent]) {
        let _ = pages;
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl ProcessingProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ProcessingConfig`].
pub type ProgressCallback = Arc<dyn ProcessingProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProcessingProgressCallback for Recorder {
        fn on_phase_start(&self, phase: Phase, items: usize) {
            self.events.lock().unwrap().push(format!("start {phase} {items}"));
        }

        fn on_phase_complete(&self, phase: Phase) {
            self.events.lock().unwrap().push(format!("done {phase}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_processing_start(5);
        cb.on_phase_start(Phase::Upload, 3);
        cb.on_item_complete(Phase::Upload, 1, 3);
        cb.on_phase_complete(Phase::Upload);
        cb.on_processing_complete(&[]);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recorder::default();
        let cb: &dyn ProcessingProgressCallback = &rec;
        cb.on_phase_start(Phase::Enrich, 2);
        cb.on_item_complete(Phase::Enrich, 1, 2);
        cb.on_phase_complete(Phase::Enrich);
        assert_eq!(*rec.events.lock().unwrap(), vec!["start enrich 2", "done enrich"]);
    }
}
