//! Keys persisted in session and local key-value storage.

/// Session: number of automatic reloads triggered by worker activation.
pub const RELOAD_COUNT_KEY: &str = "deeds-sw-reload-count";

/// Session: epoch-ms deadline of the post-recovery cooldown.
pub const RECOVERY_COOLDOWN_KEY: &str = "deeds-recovery-cooldown";

/// Session: `"true"` once the startup watchdog has fired.
pub const RECOVERY_ATTEMPTED_KEY: &str = "deeds-recovery-attempted";

/// Local: epoch-ms of the previous update check.
pub const LAST_UPDATE_CHECK_KEY: &str = "deeds-last-update-check";
