//! Best-effort background work.
//!
//! Cache writes made while answering a fetch are never awaited by the
//! response path. They are spawned here, their failures are logged and
//! counted, and the set of pending tasks stays observable so that tests
//! (and orderly shutdown) can wait for them with [`BackgroundTasks::drain`].

use crate::metrics;
use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;
use tokio::task::JoinSet;

#[derive(Debug, Default)]
pub struct BackgroundTasks {
    tasks: Mutex<JoinSet<()>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `work` without waiting for it. An `Err` outcome is logged with
    /// `label` and otherwise ignored.
    pub fn spawn<F, E>(&self, label: &'static str, work: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let task = async move {
            if let Err(e) = work.await {
                metrics::BACKGROUND_WRITE_FAILURES.inc();
                tracing::warn!(task = label, error = %e, "Background task failed");
            }
        };

        match self.tasks.lock() {
            Ok(mut tasks) => {
                // Reap whatever already finished so the set does not grow
                // with every request.
                while tasks.try_join_next().is_some() {}
                tasks.spawn(task);
            }
            Err(_) => {
                tracing::warn!(task = label, "Background task set poisoned, running untracked");
                tokio::spawn(task);
            }
        }
    }

    /// Number of tasks spawned and not yet reaped.
    pub fn pending(&self) -> usize {
        self.tasks.lock().map(|tasks| tasks.len()).unwrap_or(0)
    }

    /// Wait for every task spawned so far to finish.
    pub async fn drain(&self) {
        let mut tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(_) => return,
        };

        while let Some(result) = tasks.join_next().await {
            if let Err(join_err) = result
                && join_err.is_panic()
            {
                tracing::error!(error = %join_err, "Background task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_drain_waits_for_spawned_work() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let done = done.clone();
            tasks.spawn("count", async move {
                tokio::task::yield_now().await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            });
        }

        tasks.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let tasks = BackgroundTasks::new();
        let before = metrics::BACKGROUND_WRITE_FAILURES.get();
        tasks.spawn("fail", async { Err::<(), _>("disk full") });
        tasks.drain().await;
        assert!(metrics::BACKGROUND_WRITE_FAILURES.get() > before);
    }
}
