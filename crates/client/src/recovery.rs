//! Page-side recovery.
//!
//! Full recovery is the emergency path: it clears every cache bucket and
//! unregisters every worker, unlike the worker's own activation cleanup
//! which only removes buckets of other versions. Every step is best effort;
//! failures are logged and the sequence carries on to the reload.

use crate::flags::RecoveryFlags;
use crate::guard::ReloadGuard;
use crate::reload::PageReloader;
use deeds_core::{WorkerContainer, WorkerMessage};
use deeds_storage::CacheStorage;
use futures::future::join_all;
use std::sync::Arc;

/// What a full recovery removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub caches_deleted: usize,
    pub registrations_removed: usize,
}

pub struct Recovery {
    caches: Option<Arc<dyn CacheStorage>>,
    container: Option<Arc<dyn WorkerContainer>>,
    guard: ReloadGuard,
    flags: RecoveryFlags,
    reloader: Arc<dyn PageReloader>,
}

impl Recovery {
    /// `caches` and `container` are `None` on platforms without Cache
    /// Storage or service worker support; the matching steps become no-ops.
    pub fn new(
        caches: Option<Arc<dyn CacheStorage>>,
        container: Option<Arc<dyn WorkerContainer>>,
        guard: ReloadGuard,
        flags: RecoveryFlags,
        reloader: Arc<dyn PageReloader>,
    ) -> Self {
        Self {
            caches,
            container,
            guard,
            flags,
            reloader,
        }
    }

    pub fn guard(&self) -> &ReloadGuard {
        &self.guard
    }

    pub fn flags(&self) -> &RecoveryFlags {
        &self.flags
    }

    /// Delete every cache bucket. Returns how many were deleted.
    pub async fn clear_service_worker_caches(&self) -> usize {
        let Some(caches) = &self.caches else {
            return 0;
        };

        let names = match caches.keys().await {
            Ok(names) => names,
            Err(e) => {
                tracing::error!(error = %e, "Error clearing caches");
                return 0;
            }
        };

        let results = join_all(names.iter().map(|name| caches.delete(name))).await;
        let mut deleted = 0;
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(bucket = %name, error = %e, "Error deleting cache"),
            }
        }
        tracing::info!(deleted, "All caches cleared");
        deleted
    }

    /// Unregister every registration for the origin. Returns how many were
    /// removed.
    pub async fn unregister_service_workers(&self) -> usize {
        let Some(container) = &self.container else {
            return 0;
        };

        let registrations = match container.registrations().await {
            Ok(registrations) => registrations,
            Err(e) => {
                tracing::error!(error = %e, "Error unregistering service workers");
                return 0;
            }
        };

        let results = join_all(
            registrations
                .iter()
                .map(|registration| container.unregister(&registration.scope)),
        )
        .await;
        let mut removed = 0;
        for (registration, result) in registrations.iter().zip(results) {
            match result {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(
                    scope = %registration.scope,
                    error = %e,
                    "Error unregistering service worker"
                ),
            }
        }
        tracing::info!(removed, "All service workers unregistered");
        removed
    }

    /// Send SKIP_WAITING to the waiting worker, if there is one.
    pub async fn activate_waiting_service_worker(&self) -> bool {
        let Some(container) = &self.container else {
            return false;
        };

        let waiting = match container.registration().await {
            Ok(registration) => registration.and_then(|r| r.waiting),
            Err(e) => {
                tracing::error!(error = %e, "Error activating waiting service worker");
                return false;
            }
        };
        let Some(waiting) = waiting else {
            return false;
        };

        match container
            .post_message(waiting.id, WorkerMessage::SkipWaiting.to_value())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(worker = %waiting.id, error = %e, "Error activating waiting service worker");
                false
            }
        }
    }

    /// Cooldown, clear caches and unregister workers, reset the guard and
    /// the attempted flag, then reload.
    pub async fn perform_full_recovery(&self) -> RecoveryReport {
        tracing::info!("Starting full recovery process");

        // Cooldown first so a watchdog armed by the reload stays quiet.
        if let Err(e) = self.flags.set_recovery_cooldown() {
            tracing::error!(error = %e, "Failed to set recovery cooldown");
        }

        let (caches_deleted, registrations_removed) = tokio::join!(
            self.clear_service_worker_caches(),
            self.unregister_service_workers()
        );

        if let Err(e) = self.guard.reset() {
            tracing::error!(error = %e, "Failed to reset reload count");
        }
        if let Err(e) = self.flags.clear_recovery_attempted() {
            tracing::error!(error = %e, "Failed to clear recovery flag");
        }

        self.reloader.reload();
        RecoveryReport {
            caches_deleted,
            registrations_removed,
        }
    }
}
