//! Progress and diagnostics sink supplied by the embedding layer.
//!
//! Long-running operations (index rebuild, renumbering, bulk import) report
//! non-fatal diagnostics through this sink instead of returning structured
//! errors for everything. The default [`TracingSink`] forwards to the
//! `tracing` macros; tests mostly use [`NullSink`].

use tracing::{debug, error, info, warn};

pub trait ProgressSink: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
    /// An unexpected failure that was caught and converted to a diagnostic.
    fn exception(&self, message: &str);
    fn progress(&self, current: usize, total: usize, message: &str);
    fn done(&self, message: &str);
}

/// Forwards every level to the corresponding `tracing` macro.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn debug(&self, message: &str) {
        debug!("{message}");
    }

    fn info(&self, message: &str) {
        info!("{message}");
    }

    fn warning(&self, message: &str) {
        warn!("{message}");
    }

    fn error(&self, message: &str) {
        error!("{message}");
    }

    fn exception(&self, message: &str) {
        error!(exception = true, "{message}");
    }

    fn progress(&self, current: usize, total: usize, message: &str) {
        debug!(current, total, "{message}");
    }

    fn done(&self, message: &str) {
        info!(done = true, "{message}");
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn debug(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn exception(&self, _message: &str) {}
    fn progress(&self, _current: usize, _total: usize, _message: &str) {}
    fn done(&self, _message: &str) {}
}
