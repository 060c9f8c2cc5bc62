//! Recovery cooldown and "recovery attempted" flags.

use crate::error::ClientResult;
use deeds_core::Clock;
use deeds_core::config::GuardConfig;
use deeds_core::keys::{RECOVERY_ATTEMPTED_KEY, RECOVERY_COOLDOWN_KEY};
use deeds_storage::KeyValueStore;
use std::sync::Arc;
use std::time::Duration;

/// Session-scoped flags the watchdog and full recovery coordinate through.
#[derive(Clone)]
pub struct RecoveryFlags {
    session: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
}

impl RecoveryFlags {
    pub fn new(session: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
        Self {
            session,
            clock,
            cooldown,
        }
    }

    pub fn from_config(
        session: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &GuardConfig,
    ) -> Self {
        Self::new(session, clock, config.recovery_cooldown())
    }

    /// End of the current cooldown in epoch milliseconds, if one was set.
    pub fn cooldown_end(&self) -> Option<i64> {
        self.session
            .get(RECOVERY_COOLDOWN_KEY)
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn is_in_recovery_cooldown(&self) -> bool {
        self.cooldown_end()
            .is_some_and(|end| self.clock.now_millis() < end)
    }

    /// Start a cooldown window from now.
    pub fn set_recovery_cooldown(&self) -> ClientResult<()> {
        let cooldown = i64::try_from(self.cooldown.as_millis()).unwrap_or(i64::MAX);
        let end = self.clock.now_millis().saturating_add(cooldown);
        self.session.set(RECOVERY_COOLDOWN_KEY, &end.to_string())?;
        Ok(())
    }

    pub fn has_recovery_been_attempted(&self) -> bool {
        self.session.get(RECOVERY_ATTEMPTED_KEY).as_deref() == Some("true")
    }

    pub fn mark_recovery_attempted(&self) -> ClientResult<()> {
        self.session.set(RECOVERY_ATTEMPTED_KEY, "true")?;
        Ok(())
    }

    pub fn clear_recovery_attempted(&self) -> ClientResult<()> {
        self.session.remove(RECOVERY_ATTEMPTED_KEY)?;
        Ok(())
    }
}
