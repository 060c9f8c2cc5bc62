//! Shared fixtures for page-side integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use deeds_client::{Recovery, RecordingReloader, RecoveryFlags, ReloadGuard, UpdateMonitor};
use deeds_core::config::AppConfig;
use deeds_core::{ManualClock, Request, Response, WorkerContainer};
use deeds_storage::{CacheStorage, KeyValueStores, MemoryCacheStorage};
use deeds_worker::{LocalContainer, Network, NetworkError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const START_MILLIS: i64 = 1_700_000_000_000;

/// Origin that serves the app shell for every URL.
pub struct ShellNetwork;

#[async_trait]
impl Network for ShellNetwork {
    async fn fetch(&self, _request: &Request) -> Result<Response, NetworkError> {
        Ok(Response::ok("<html>shell</html>"))
    }
}

/// Everything one browser tab sees.
pub struct Page {
    pub config: AppConfig,
    pub stores: KeyValueStores,
    pub clock: ManualClock,
    pub caches: Arc<MemoryCacheStorage>,
    pub container: Arc<LocalContainer>,
    pub reloader: Arc<RecordingReloader>,
}

impl Page {
    pub fn new() -> Self {
        let config = AppConfig::for_testing();
        let caches = Arc::new(MemoryCacheStorage::new());
        let container = Arc::new(LocalContainer::new(
            config.clone(),
            caches.clone() as Arc<dyn CacheStorage>,
            Arc::new(ShellNetwork),
        ));
        Self {
            config,
            stores: KeyValueStores::in_memory(),
            clock: ManualClock::new(START_MILLIS),
            caches,
            container,
            reloader: Arc::new(RecordingReloader::new()),
        }
    }

    pub fn guard(&self) -> ReloadGuard {
        ReloadGuard::from_config(self.stores.session.clone(), &self.config.guard)
    }

    pub fn flags(&self) -> RecoveryFlags {
        RecoveryFlags::from_config(
            self.stores.session.clone(),
            Arc::new(self.clock.clone()),
            &self.config.guard,
        )
    }

    pub fn platform(&self) -> Option<Arc<dyn WorkerContainer>> {
        Some(self.container.clone() as Arc<dyn WorkerContainer>)
    }

    pub async fn mount_monitor(&self) -> UpdateMonitor {
        UpdateMonitor::mount(
            self.platform(),
            self.stores.local.clone(),
            Arc::new(self.clock.clone()),
            self.guard(),
            self.reloader.clone(),
            &self.config.guard,
        )
        .await
    }

    pub fn recovery(&self) -> Recovery {
        Recovery::new(
            Some(self.caches.clone() as Arc<dyn CacheStorage>),
            self.platform(),
            self.guard(),
            self.flags(),
            self.reloader.clone(),
        )
    }
}

/// Poll `condition` until it holds, failing the test after a few seconds.
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
