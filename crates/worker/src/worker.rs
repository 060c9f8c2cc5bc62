//! The service worker controller.
//!
//! A [`ServiceWorker`] owns one cache version. Its lifecycle is the explicit
//! state machine in [`WorkerState`]: the hosting container drives
//! `install`, then `activate`, and only a worker in `activating` or
//! `controlling` answers fetches.

use crate::background::BackgroundTasks;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::network::Network;
use deeds_core::config::{AppConfig, CacheConfig, RouteConfig};
use deeds_core::{
    Request, ResourceClass, Response, WorkerHandle, WorkerId, WorkerMessage, WorkerState, classify,
};
use deeds_storage::CacheStorage;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;

/// Outcome of the install step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Precache paths stored in the bucket.
    pub cached: Vec<String>,
    /// Precache paths that could not be fetched or stored.
    pub failed: Vec<String>,
}

/// Outcome of the activate step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActivateReport {
    /// Stale buckets removed.
    pub deleted: Vec<String>,
}

pub struct ServiceWorker {
    id: WorkerId,
    cache: CacheConfig,
    routes: RouteConfig,
    auto_skip_waiting: bool,
    bucket: String,
    caches: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
    background: BackgroundTasks,
}

impl ServiceWorker {
    pub fn new(
        config: &AppConfig,
        caches: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            id: WorkerId::new(),
            bucket: config.cache.bucket_name(),
            cache: config.cache.clone(),
            routes: config.routes.clone(),
            auto_skip_waiting: config.install.auto_skip_waiting,
            caches,
            network,
            state: Mutex::new(WorkerState::Idle),
            skip_waiting: AtomicBool::new(false),
            background: BackgroundTasks::new(),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Cache version this worker owns.
    pub fn version(&self) -> &str {
        &self.cache.version
    }

    /// Name of the bucket this worker writes to.
    pub fn bucket_name(&self) -> &str {
        &self.bucket
    }

    pub fn state(&self) -> WorkerState {
        *self.lock_state()
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            id: self.id,
            state: self.state(),
        }
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
        // The guarded value is a Copy enum; a panic mid-update cannot leave
        // it half-written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self, next: WorkerState) -> WorkerResult<()> {
        let mut state = self.lock_state();
        let from = *state;
        *state = from.transition(next)?;
        tracing::debug!(worker = %self.id, from = %from, to = %next, "Worker state changed");
        Ok(())
    }

    /// Retire this worker. Redundant workers never handle events again.
    pub fn mark_redundant(&self) {
        let mut state = self.lock_state();
        if !state.is_terminal() {
            tracing::info!(worker = %self.id, from = %*state, "Worker became redundant");
            *state = WorkerState::Redundant;
        }
    }

    /// Precache the navigation fallback documents.
    ///
    /// Individual precache failures are logged and reported but never fail
    /// the install. Failing to open the bucket does.
    #[instrument(skip(self), fields(worker = %self.id, bucket = %self.bucket))]
    pub async fn install(&self) -> WorkerResult<InstallReport> {
        self.transition(WorkerState::Installing)?;
        tracing::info!(version = %self.cache.version, "Installing service worker");

        if let Err(e) = self.caches.open(&self.bucket).await {
            tracing::error!(error = %e, "Failed to open cache bucket");
            self.mark_redundant();
            return Err(e.into());
        }

        let results = join_all(
            self.cache
                .precache_urls
                .iter()
                .map(|path| self.precache(path)),
        )
        .await;

        let mut report = InstallReport::default();
        for (path, result) in self.cache.precache_urls.iter().zip(results) {
            match result {
                Ok(()) => report.cached.push(path.clone()),
                Err(e) => {
                    metrics::PRECACHE_FAILURES.inc();
                    tracing::warn!(path = %path, error = %e, "Failed to precache resource");
                    report.failed.push(path.clone());
                }
            }
        }

        self.transition(WorkerState::Waiting)?;
        if self.auto_skip_waiting {
            self.skip_waiting();
        }

        tracing::info!(
            cached = report.cached.len(),
            failed = report.failed.len(),
            "Service worker installed"
        );
        Ok(report)
    }

    async fn precache(&self, path: &str) -> WorkerResult<()> {
        let request = Request::for_path(&self.cache.origin, path)?;
        let response = self.network.fetch(&request).await?;
        if !response.is_ok() {
            return Err(WorkerError::UnexpectedStatus {
                url: request.url.to_string(),
                status: response.status,
            });
        }
        self.caches.put(&self.bucket, &request, &response).await?;
        Ok(())
    }

    /// Handle a message posted by a page. Unknown messages are ignored.
    pub fn handle_message(&self, message: &serde_json::Value) -> Option<WorkerMessage> {
        match WorkerMessage::from_value(message) {
            Some(WorkerMessage::SkipWaiting) => {
                tracing::info!(worker = %self.id, "Received SKIP_WAITING message");
                self.skip_waiting();
                Some(WorkerMessage::SkipWaiting)
            }
            None => {
                tracing::debug!(worker = %self.id, message = %message, "Ignoring unknown message");
                None
            }
        }
    }

    /// Take over as the already activated worker of an earlier session.
    ///
    /// Walks the lifecycle without precaching or bucket cleanup; the bucket
    /// is expected to exist already.
    pub fn resume(&self) -> WorkerResult<()> {
        for next in [
            WorkerState::Installing,
            WorkerState::Waiting,
            WorkerState::Activating,
            WorkerState::Controlling,
        ] {
            self.transition(next)?;
        }
        tracing::info!(worker = %self.id, bucket = %self.bucket, "Resumed service worker");
        Ok(())
    }

    /// Ask to leave the waiting phase as soon as the container allows.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Delete every bucket not owned by this version, then claim clients.
    ///
    /// Deletion failures are logged and skipped. Only the two state
    /// transitions can fail.
    #[instrument(skip(self), fields(worker = %self.id, bucket = %self.bucket))]
    pub async fn activate(&self) -> WorkerResult<ActivateReport> {
        self.transition(WorkerState::Activating)?;
        tracing::info!(version = %self.cache.version, "Activating service worker");

        let names = match self.caches.keys().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list cache buckets, skipping cleanup");
                Vec::new()
            }
        };

        let stale: Vec<String> = names.into_iter().filter(|n| *n != self.bucket).collect();
        let results = join_all(stale.iter().map(|name| self.caches.delete(name))).await;

        let mut report = ActivateReport::default();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(true) => {
                    metrics::STALE_BUCKETS_DELETED.inc();
                    tracing::info!(stale = %name, "Deleted old cache");
                    report.deleted.push(name);
                }
                Ok(false) => tracing::debug!(stale = %name, "Old cache already gone"),
                Err(e) => tracing::warn!(stale = %name, error = %e, "Failed to delete old cache"),
            }
        }

        tracing::info!("Claiming clients");
        self.transition(WorkerState::Controlling)?;
        Ok(report)
    }

    /// Answer an intercepted request according to its resource class.
    pub async fn fetch(&self, request: &Request) -> WorkerResult<Response> {
        let state = self.state();
        if !state.handles_fetch() {
            return Err(WorkerError::NotControlling { id: self.id, state });
        }

        let class = classify(request, &self.routes);
        metrics::FETCHES_TOTAL
            .with_label_values(&[class.as_str()])
            .inc();
        tracing::debug!(class = %class, url = %request.url, "Routing fetch");

        match class {
            ResourceClass::Bundle | ResourceClass::Passthrough => {
                self.network_only(request, class).await
            }
            ResourceClass::Navigation => self.network_first(request).await,
            ResourceClass::StaticAsset => self.cache_first(request).await,
        }
    }

    async fn network_only(&self, request: &Request, class: ResourceClass) -> WorkerResult<Response> {
        self.network.fetch(request).await.map_err(|e| {
            tracing::error!(class = %class, url = %request.url, error = %e, "Network fetch failed");
            WorkerError::Network(e)
        })
    }

    async fn network_first(&self, request: &Request) -> WorkerResult<Response> {
        let err = match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.store_in_background(request, &response);
                }
                return Ok(response);
            }
            Err(e) => e,
        };

        tracing::warn!(url = %request.url, error = %err, "Navigation failed, falling back to cache");
        let class = ResourceClass::Navigation.as_str();
        match self.caches.match_any(request).await {
            Ok(Some(cached)) => {
                metrics::CACHE_HITS.with_label_values(&[class]).inc();
                metrics::NAVIGATION_FALLBACKS
                    .with_label_values(&["cached"])
                    .inc();
                return Ok(cached);
            }
            Ok(None) => {
                metrics::CACHE_MISSES.with_label_values(&[class]).inc();
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "Cache lookup failed");
            }
        }

        metrics::NAVIGATION_FALLBACKS
            .with_label_values(&["offline"])
            .inc();
        Ok(Response::offline())
    }

    async fn cache_first(&self, request: &Request) -> WorkerResult<Response> {
        let class = ResourceClass::StaticAsset.as_str();
        match self.caches.match_any(request).await {
            Ok(Some(cached)) => {
                metrics::CACHE_HITS.with_label_values(&[class]).inc();
                return Ok(cached);
            }
            Ok(None) => metrics::CACHE_MISSES.with_label_values(&[class]).inc(),
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "Cache lookup failed, treating as miss");
            }
        }

        let response = self
            .network_only(request, ResourceClass::StaticAsset)
            .await?;
        if response.is_ok() {
            self.store_in_background(request, &response);
        }
        Ok(response)
    }

    fn store_in_background(&self, request: &Request, response: &Response) {
        let caches = self.caches.clone();
        let bucket = self.bucket.clone();
        let request = request.clone();
        let response = response.clone();
        self.background.spawn("cache-put", async move {
            caches.put(&bucket, &request, &response).await.map_err(|e| {
                format!("{bucket}: {}: {e}", request.url)
            })
        });
    }
}

impl std::fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("id", &self.id)
            .field("bucket", &self.bucket)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use async_trait::async_trait;
    use deeds_storage::MemoryCacheStorage;
    use serde_json::json;

    struct Unreachable;

    #[async_trait]
    impl Network for Unreachable {
        async fn fetch(&self, _request: &Request) -> Result<Response, NetworkError> {
            Err(NetworkError::Offline)
        }
    }

    fn worker() -> ServiceWorker {
        ServiceWorker::new(
            &AppConfig::for_testing(),
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(Unreachable),
        )
    }

    #[tokio::test]
    async fn test_install_survives_offline_precache() {
        let worker = worker();
        let report = worker.install().await.unwrap();
        assert!(report.cached.is_empty());
        assert_eq!(report.failed, vec!["/", "/index.html"]);
        assert_eq!(worker.state(), WorkerState::Waiting);
        assert!(!worker.skip_waiting_requested());
    }

    #[tokio::test]
    async fn test_fetch_rejected_before_activation() {
        let worker = worker();
        let req = Request::navigate("https://deeds.example.test/").unwrap();
        assert!(matches!(
            worker.fetch(&req).await,
            Err(WorkerError::NotControlling {
                state: WorkerState::Idle,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_activate_requires_install() {
        let worker = worker();
        assert!(matches!(worker.activate().await, Err(WorkerError::Core(_))));
    }

    #[test]
    fn test_skip_waiting_message() {
        let worker = worker();
        assert_eq!(worker.handle_message(&json!({"type": "PING"})), None);
        assert!(!worker.skip_waiting_requested());
        assert_eq!(
            worker.handle_message(&json!({"type": "SKIP_WAITING"})),
            Some(WorkerMessage::SkipWaiting)
        );
        assert!(worker.skip_waiting_requested());
    }

    #[test]
    fn test_mark_redundant_is_idempotent() {
        let worker = worker();
        worker.mark_redundant();
        worker.mark_redundant();
        assert_eq!(worker.state(), WorkerState::Redundant);
    }
}
