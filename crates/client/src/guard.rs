//! Session-scoped reload guard.
//!
//! Counts automatic reloads triggered by controller changes and refuses more
//! than the configured ceiling per session. The count only goes back to zero
//! through [`ReloadGuard::reset`], which full recovery calls.

use crate::error::ClientResult;
use deeds_core::config::GuardConfig;
use deeds_core::keys::RELOAD_COUNT_KEY;
use deeds_storage::KeyValueStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct ReloadGuard {
    session: Arc<dyn KeyValueStore>,
    ceiling: u32,
}

impl ReloadGuard {
    pub fn new(session: Arc<dyn KeyValueStore>, ceiling: u32) -> Self {
        Self { session, ceiling }
    }

    pub fn from_config(session: Arc<dyn KeyValueStore>, config: &GuardConfig) -> Self {
        Self::new(session, config.max_reloads_per_session)
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Reloads performed this session. Missing or malformed values read as 0.
    pub fn count(&self) -> u32 {
        self.session
            .get(RELOAD_COUNT_KEY)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Record one more reload and return the new count.
    pub fn increment(&self) -> ClientResult<u32> {
        let next = self.count().saturating_add(1);
        self.session.set(RELOAD_COUNT_KEY, &next.to_string())?;
        Ok(next)
    }

    pub fn reset(&self) -> ClientResult<()> {
        self.session.remove(RELOAD_COUNT_KEY)?;
        Ok(())
    }

    pub fn is_reload_allowed(&self) -> bool {
        self.count() < self.ceiling
    }

    pub fn should_block_reload(&self) -> bool {
        !self.is_reload_allowed()
    }
}

impl std::fmt::Debug for ReloadGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadGuard")
            .field("count", &self.count())
            .field("ceiling", &self.ceiling)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deeds_storage::MemoryKeyValueStore;

    fn guard() -> (Arc<MemoryKeyValueStore>, ReloadGuard) {
        let store = Arc::new(MemoryKeyValueStore::new());
        let guard = ReloadGuard::from_config(store.clone(), &GuardConfig::default());
        (store, guard)
    }

    #[test]
    fn test_one_reload_per_session() {
        let (_, guard) = guard();
        assert_eq!(guard.count(), 0);
        assert!(guard.is_reload_allowed());
        assert!(!guard.should_block_reload());

        assert_eq!(guard.increment().unwrap(), 1);
        assert!(!guard.is_reload_allowed());
        assert!(guard.should_block_reload());

        // Stays blocked no matter how often it is asked.
        assert_eq!(guard.increment().unwrap(), 2);
        assert!(guard.should_block_reload());

        guard.reset().unwrap();
        assert_eq!(guard.count(), 0);
        assert!(guard.is_reload_allowed());
    }

    #[test]
    fn test_malformed_count_reads_as_zero() {
        let (store, guard) = guard();
        store.set(RELOAD_COUNT_KEY, "many").unwrap();
        assert_eq!(guard.count(), 0);
        assert!(guard.is_reload_allowed());
        assert_eq!(guard.increment().unwrap(), 1);
        assert_eq!(store.get(RELOAD_COUNT_KEY).as_deref(), Some("1"));
    }

    #[test]
    fn test_higher_ceiling() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let guard = ReloadGuard::new(store, 3);
        for expected in 1..=3 {
            assert!(guard.is_reload_allowed());
            assert_eq!(guard.increment().unwrap(), expected);
        }
        assert!(guard.should_block_reload());
    }
}
