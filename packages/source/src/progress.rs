//! Progress reporting for the load and clean stages.
//!
//! The pipeline crates only see the [`ProgressCallback`] trait; the CLI
//! decides whether progress is drawn as a terminal bar, written to the log
//! or dropped.

use std::sync::Arc;

/// Receives progress updates from long-running pipeline steps.
pub trait ProgressCallback: Send + Sync {
    /// Sets the number of units of work (files, rows) expected.
    fn set_total(&self, total: u64);

    /// Advances by `delta` units.
    fn inc(&self, delta: u64);

    /// Replaces the message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Marks the step complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores every update. Used by tests and non-interactive callers.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Writes step messages and the final summary to the log instead of
/// drawing a bar.
pub struct LogProgress;

impl ProgressCallback for LogProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}

    fn set_message(&self, msg: String) {
        log::debug!("{msg}");
    }

    fn finish(&self, msg: String) {
        log::info!("{msg}");
    }
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
