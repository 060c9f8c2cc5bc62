//! What the top-level app shell shows.

use crate::error::ClientResult;
use crate::monitor::{UpdateMonitor, UpdateStatus};
use crate::recovery::{Recovery, RecoveryReport};
use crate::watchdog::StartupPhase;
use deeds_core::Clock;
use std::sync::Arc;
use std::time::Duration;

/// Label of the recovery screen's only action.
pub const RECOVERY_ACTION: &str = "Reload and Clear Cache";

/// How long an update may take to reload the page before the banner
/// offers a cache clear instead.
pub const UPDATE_RELOAD_GRACE: Duration = Duration::from_secs(2);

/// Why the recovery screen is up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryContext {
    /// Startup did not finish before the watchdog deadline.
    Stuck,
    /// A controller change arrived after the reload ceiling was reached.
    UpdateFailed,
}

impl RecoveryContext {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Stuck => "App Loading Issue",
            Self::UpdateFailed => "Update Did Not Complete",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Stuck => {
                "Deeds is having trouble loading. This might be due to cached data from a previous version."
            }
            Self::UpdateFailed => {
                "The app update encountered an issue. Clearing the cache will help resolve this."
            }
        }
    }
}

/// The update banner's primary action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BannerAction {
    /// Ask the waiting worker to take over.
    UpdateNow,
    /// An update was requested and the reload it should cause is pending.
    Updating,
    /// Run full recovery. Offered when reloads are blocked, when the
    /// update request failed, or when no reload came within
    /// [`UPDATE_RELOAD_GRACE`].
    ClearCache,
}

impl BannerAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::UpdateNow => "Update Now",
            Self::Updating => "Updating...",
            Self::ClearCache => "Clear Cache",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShellView {
    Normal { banner: Option<BannerAction> },
    Recovery(RecoveryContext),
}

/// Banner bookkeeping across status updates.
///
/// The banner comes up whenever the status changes while any flag is set,
/// and stays dismissed until the next such change.
pub struct AppShell {
    clock: Arc<dyn Clock>,
    status: UpdateStatus,
    banner: bool,
    update_requested_at: Option<i64>,
    update_failed: bool,
}

impl AppShell {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            status: UpdateStatus::default(),
            banner: false,
            update_requested_at: None,
            update_failed: false,
        }
    }

    pub fn observe(&mut self, status: UpdateStatus) {
        if status != self.status && status.any() {
            self.banner = true;
        }
        self.status = status;
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = false;
    }

    /// The banner's "Update Now": ask the waiting worker to take over and
    /// start the reload grace period. A failed request offers the cache
    /// clear right away.
    pub async fn request_update(&mut self, monitor: &UpdateMonitor) -> ClientResult<bool> {
        self.update_requested_at = Some(self.clock.now_millis());
        monitor.activate_update().await.inspect_err(|e| {
            tracing::error!(error = %e, "Update failed");
            self.update_failed = true;
        })
    }

    pub fn banner_action(&self) -> BannerAction {
        if self.status.reload_blocked || self.update_failed {
            return BannerAction::ClearCache;
        }
        let Some(requested_at) = self.update_requested_at else {
            return BannerAction::UpdateNow;
        };
        let grace = i64::try_from(UPDATE_RELOAD_GRACE.as_millis()).unwrap_or(i64::MAX);
        if self.clock.now_millis().saturating_sub(requested_at) >= grace {
            BannerAction::ClearCache
        } else {
            BannerAction::Updating
        }
    }

    pub fn view(&self, startup: StartupPhase) -> ShellView {
        if startup == StartupPhase::Stuck {
            return ShellView::Recovery(RecoveryContext::Stuck);
        }
        if self.status.reload_blocked {
            return ShellView::Recovery(RecoveryContext::UpdateFailed);
        }
        ShellView::Normal {
            banner: self.banner.then(|| self.banner_action()),
        }
    }

    /// The recovery screen's action, also behind the banner's "Clear Cache".
    /// Full recovery ends in a reload, so the shell starts over afterwards.
    pub async fn run_recovery(&mut self, recovery: &Recovery) -> RecoveryReport {
        let report = recovery.perform_full_recovery().await;
        self.status = UpdateStatus::default();
        self.banner = false;
        self.update_requested_at = None;
        self.update_failed = false;
        report
    }
}
