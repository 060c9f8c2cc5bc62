//! Page side of the Deeds client update lifecycle.
//!
//! This crate provides:
//! - [`ReloadGuard`]: one automatic reload per session
//! - [`RecoveryFlags`] and [`Recovery`]: cooldown, attempted flag, and the
//!   full clear-everything recovery
//! - [`UpdateMonitor`]: update, staleness and blocked-reload detection
//! - [`StartupWatchdog`]: stuck-startup detection
//! - [`AppShell`]: banner and recovery screen decisions

pub mod error;
pub mod flags;
pub mod guard;
pub mod monitor;
pub mod recovery;
pub mod reload;
pub mod shell;
pub mod watchdog;

pub use error::{ClientError, ClientResult};
pub use flags::RecoveryFlags;
pub use guard::ReloadGuard;
pub use monitor::{UpdateMonitor, UpdateStatus};
pub use recovery::{Recovery, RecoveryReport};
pub use reload::{PageReloader, RecordingReloader};
pub use shell::{
    AppShell, BannerAction, RECOVERY_ACTION, RecoveryContext, ShellView, UPDATE_RELOAD_GRACE,
};
pub use watchdog::{StartupPhase, StartupWatchdog};
