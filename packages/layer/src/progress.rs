//! Progress reporting for record-by-record passes.
//!
//! The spatial join and the derive stage announce how many records they
//! will visit, then tick once per record. Rendering belongs to the caller:
//! the CLI draws a bar, tests pass [`null_progress`].

use std::sync::Arc;

/// Sink for per-record progress of a stage.
pub trait ProgressCallback: Send + Sync {
    /// Number of records the pass will visit.
    fn set_total(&self, total: u64);

    /// `delta` more records are done.
    fn inc(&self, delta: u64);

    /// Replaces the label shown next to the count.
    fn set_message(&self, msg: String);

    /// The pass is over; `msg` summarizes it.
    fn finish(&self, msg: String);
}

/// Discards all progress.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
