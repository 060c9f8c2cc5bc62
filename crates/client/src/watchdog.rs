//! Startup watchdog.
//!
//! Armed when the app shell mounts. If startup has not finished when the
//! deadline passes, the app is declared stuck and the "recovery attempted"
//! flag is set so the next load does not arm again.

use crate::flags::RecoveryFlags;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupPhase {
    Starting,
    Ready,
    Stuck,
}

pub struct StartupWatchdog {
    phase: Arc<watch::Sender<StartupPhase>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl StartupWatchdog {
    /// Arm the deadline timer on the current runtime.
    ///
    /// Returns `None` without arming anything while a recovery cooldown is
    /// active or after a recovery was already attempted this session.
    pub fn arm(flags: RecoveryFlags, deadline: Duration) -> Option<Self> {
        if flags.is_in_recovery_cooldown() {
            tracing::info!("In recovery cooldown, watchdog skipped");
            return None;
        }
        if flags.has_recovery_been_attempted() {
            tracing::info!("Recovery already attempted, watchdog skipped");
            return None;
        }

        let (tx, _) = watch::channel(StartupPhase::Starting);
        let phase = Arc::new(tx);
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let phase = phase.clone();
            let cancel = cancel.clone();
            async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(deadline) => {
                        tracing::warn!(
                            deadline_secs = deadline.as_secs(),
                            "App appears stuck during initialization"
                        );
                        phase.send_if_modified(|p| {
                            if *p == StartupPhase::Starting {
                                *p = StartupPhase::Stuck;
                                true
                            } else {
                                false
                            }
                        });
                        if let Err(e) = flags.mark_recovery_attempted() {
                            tracing::error!(error = %e, "Failed to mark recovery attempted");
                        }
                    }
                }
            }
        });

        Some(Self {
            phase,
            cancel,
            task,
        })
    }

    pub fn phase(&self) -> StartupPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<StartupPhase> {
        self.phase.subscribe()
    }

    pub fn is_stuck(&self) -> bool {
        self.phase() == StartupPhase::Stuck
    }

    /// Startup finished. Cancels the timer; a stuck verdict already reached
    /// stands.
    pub fn mark_ready(&self) {
        self.cancel.cancel();
        self.phase.send_if_modified(|p| {
            if *p == StartupPhase::Starting {
                *p = StartupPhase::Ready;
                true
            } else {
                false
            }
        });
    }

    /// Cancel the timer without reporting anything (the shell unmounted).
    pub fn disarm(self) {
        self.cancel.cancel();
    }

    /// Whether the deadline task has completed, by firing or by
    /// cancellation.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for StartupWatchdog {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
