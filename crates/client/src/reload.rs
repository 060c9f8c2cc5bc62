//! The page reload primitive.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Reloads the current page (`window.location.reload()`).
pub trait PageReloader: Send + Sync + 'static {
    fn reload(&self);
}

/// Reloader that only records how often a reload was requested.
#[derive(Debug, Default)]
pub struct RecordingReloader {
    count: AtomicUsize,
}

impl RecordingReloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl PageReloader for RecordingReloader {
    fn reload(&self) {
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(reloads = n, "Page reload requested");
    }
}
