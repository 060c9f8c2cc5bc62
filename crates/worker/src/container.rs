//! In-process worker container.
//!
//! [`LocalContainer`] plays the platform's part: it hosts one registration,
//! runs install and activate in platform order, holds the installing,
//! waiting and active slots, and tells pages about lifecycle changes over a
//! broadcast channel.

use crate::error::{WorkerError, WorkerResult};
use crate::network::Network;
use crate::worker::{ActivateReport, InstallReport, ServiceWorker};
use async_trait::async_trait;
use deeds_core::config::AppConfig;
use deeds_core::{
    ContainerEvent, RegistrationInfo, Request, Response, WorkerContainer, WorkerId,
    WorkerMessage, WorkerState,
};
use deeds_storage::CacheStorage;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Result of registering a new worker version.
#[derive(Debug)]
pub struct InstallOutcome {
    pub worker: Arc<ServiceWorker>,
    pub report: InstallReport,
    /// Set when the worker was activated right away, either because nothing
    /// controlled the scope yet or because it asked to skip waiting.
    pub activated: Option<ActivateReport>,
}

#[derive(Default)]
struct Slots {
    registered: bool,
    installing: Option<Arc<ServiceWorker>>,
    waiting: Option<Arc<ServiceWorker>>,
    active: Option<Arc<ServiceWorker>>,
    controller: Option<Arc<ServiceWorker>>,
}

impl Slots {
    fn find(&self, id: WorkerId) -> Option<Arc<ServiceWorker>> {
        [&self.installing, &self.waiting, &self.active, &self.controller]
            .into_iter()
            .flatten()
            .find(|w| w.id() == id)
            .cloned()
    }
}

pub struct LocalContainer {
    config: AppConfig,
    scope: String,
    caches: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    slots: Mutex<Slots>,
    /// Serializes install and activation so slot updates happen in order.
    lifecycle: tokio::sync::Mutex<()>,
    events: broadcast::Sender<ContainerEvent>,
}

impl LocalContainer {
    pub fn new(
        config: AppConfig,
        caches: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> Self {
        let scope = format!("{}/", config.cache.origin.trim_end_matches('/'));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            scope,
            caches,
            network,
            slots: Mutex::new(Slots::default()),
            lifecycle: tokio::sync::Mutex::new(()),
            events,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn caches(&self) -> &Arc<dyn CacheStorage> {
        &self.caches
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ContainerEvent) {
        tracing::debug!(event = ?event, "Container event");
        // No subscribers is fine; pages may not be listening yet.
        let _ = self.events.send(event);
    }

    /// Mark a worker redundant and let its pending cache writes land before
    /// the container lets go of it.
    async fn retire(&self, worker: &ServiceWorker) {
        worker.mark_redundant();
        self.emit(ContainerEvent::StateChange {
            worker: worker.id(),
            state: WorkerState::Redundant,
        });
        worker.background().drain().await;
    }

    pub fn installing_worker(&self) -> Option<Arc<ServiceWorker>> {
        self.slots().installing.clone()
    }

    pub fn waiting_worker(&self) -> Option<Arc<ServiceWorker>> {
        self.slots().waiting.clone()
    }

    pub fn controlling_worker(&self) -> Option<Arc<ServiceWorker>> {
        self.slots().controller.clone()
    }

    /// Pick up the configured version where an earlier session left it.
    ///
    /// When the version's bucket already exists and nothing is registered
    /// yet, a worker for it becomes the active controller straight away:
    /// nothing is precached, no other bucket is touched and no events are
    /// emitted, since the page loads already controlled. Returns `None`
    /// when there is nothing to resume.
    pub async fn resume(&self) -> WorkerResult<Option<Arc<ServiceWorker>>> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.slots().registered {
            return Ok(None);
        }

        let worker = Arc::new(ServiceWorker::new(
            &self.config,
            self.caches.clone(),
            self.network.clone(),
        ));
        if !self.caches.has(worker.bucket_name()).await? {
            tracing::debug!(bucket = %worker.bucket_name(), "No cache bucket to resume");
            return Ok(None);
        }
        worker.resume()?;

        let mut slots = self.slots();
        slots.registered = true;
        slots.active = Some(worker.clone());
        slots.controller = Some(worker.clone());
        Ok(Some(worker))
    }

    /// Register the configured cache version.
    pub async fn register(&self) -> WorkerResult<InstallOutcome> {
        let config = self.config.clone();
        self.install_worker(config).await
    }

    /// Register a worker that owns `version` instead of the configured one.
    pub async fn register_version(&self, version: &str) -> WorkerResult<InstallOutcome> {
        let mut config = self.config.clone();
        config.cache = config.cache.with_version(version);
        self.install_worker(config).await
    }

    async fn install_worker(&self, config: AppConfig) -> WorkerResult<InstallOutcome> {
        let _lifecycle = self.lifecycle.lock().await;

        let worker = Arc::new(ServiceWorker::new(
            &config,
            self.caches.clone(),
            self.network.clone(),
        ));
        let replaced = {
            let mut slots = self.slots();
            slots.registered = true;
            slots.installing.replace(worker.clone())
        };
        if let Some(previous) = replaced {
            self.retire(&previous).await;
        }
        tracing::info!(worker = %worker.id(), version = %worker.version(), "Update found");
        self.emit(ContainerEvent::UpdateFound {
            worker: worker.id(),
        });

        let report = match worker.install().await {
            Ok(report) => report,
            Err(e) => {
                {
                    let mut slots = self.slots();
                    if slots.installing.as_ref().is_some_and(|w| w.id() == worker.id()) {
                        slots.installing = None;
                    }
                }
                self.retire(&worker).await;
                return Err(e);
            }
        };

        let (replaced, has_active) = {
            let mut slots = self.slots();
            if slots.installing.as_ref().is_some_and(|w| w.id() == worker.id()) {
                slots.installing = None;
            }
            (slots.waiting.replace(worker.clone()), slots.active.is_some())
        };
        if let Some(previous) = replaced {
            self.retire(&previous).await;
        }
        self.emit(ContainerEvent::StateChange {
            worker: worker.id(),
            state: WorkerState::Waiting,
        });

        let activated = if !has_active || worker.skip_waiting_requested() {
            self.promote_waiting().await?
        } else {
            tracing::info!(worker = %worker.id(), "New worker waiting for SKIP_WAITING");
            None
        };

        Ok(InstallOutcome {
            worker,
            report,
            activated,
        })
    }

    /// Activate the waiting worker and hand it control. The caller must hold
    /// the lifecycle lock.
    ///
    /// The previous controller keeps serving fetches until the new worker
    /// has activated, and is retired only once control has moved. If
    /// activation fails it stays active.
    async fn promote_waiting(&self) -> WorkerResult<Option<ActivateReport>> {
        let (worker, previous) = {
            let mut slots = self.slots();
            let Some(worker) = slots.waiting.take() else {
                return Ok(None);
            };
            let previous = slots.active.replace(worker.clone());
            (worker, previous)
        };

        // Writes the old version already started land before activation
        // looks at the bucket list.
        if let Some(previous) = &previous {
            previous.background().drain().await;
        }
        self.emit(ContainerEvent::StateChange {
            worker: worker.id(),
            state: WorkerState::Activating,
        });

        let report = match worker.activate().await {
            Ok(report) => report,
            Err(e) => {
                {
                    let mut slots = self.slots();
                    if slots.active.as_ref().is_some_and(|w| w.id() == worker.id()) {
                        slots.active = previous;
                    }
                }
                self.retire(&worker).await;
                return Err(e);
            }
        };

        self.slots().controller = Some(worker.clone());
        if let Some(previous) = previous {
            self.retire(&previous).await;
        }
        self.emit(ContainerEvent::StateChange {
            worker: worker.id(),
            state: WorkerState::Controlling,
        });
        tracing::info!(worker = %worker.id(), "Controller changed");
        self.emit(ContainerEvent::ControllerChange {
            controller: Some(worker.id()),
        });
        Ok(Some(report))
    }

    /// Deliver a message to a worker. A SKIP_WAITING sent to the waiting
    /// worker activates it.
    pub async fn post(
        &self,
        worker: WorkerId,
        message: &serde_json::Value,
    ) -> WorkerResult<Option<ActivateReport>> {
        let target = self
            .slots()
            .find(worker)
            .ok_or(WorkerError::UnknownWorker(worker))?;

        if target.handle_message(message) != Some(WorkerMessage::SkipWaiting) {
            return Ok(None);
        }

        let _lifecycle = self.lifecycle.lock().await;
        let is_waiting = self
            .slots()
            .waiting
            .as_ref()
            .is_some_and(|w| w.id() == worker);
        if is_waiting {
            self.promote_waiting().await
        } else {
            Ok(None)
        }
    }

    /// Answer a page request: through the controlling worker when there is
    /// one, straight from the network otherwise.
    pub async fn fetch(&self, request: &Request) -> WorkerResult<Response> {
        let controller = self.controlling_worker();
        match controller {
            Some(worker) if worker.state().handles_fetch() => worker.fetch(request).await,
            _ => Ok(self.network.fetch(request).await?),
        }
    }

    /// Wait for background cache writes of every hosted worker.
    pub async fn drain_background(&self) {
        let workers: Vec<Arc<ServiceWorker>> = {
            let slots = self.slots();
            [&slots.installing, &slots.waiting, &slots.active, &slots.controller]
                .into_iter()
                .flatten()
                .cloned()
                .collect()
        };
        for worker in workers {
            worker.background().drain().await;
        }
    }

    fn snapshot(&self) -> Option<RegistrationInfo> {
        let slots = self.slots();
        if !slots.registered {
            return None;
        }
        Some(RegistrationInfo {
            scope: self.scope.clone(),
            installing: slots.installing.as_ref().map(|w| w.handle()),
            waiting: slots.waiting.as_ref().map(|w| w.handle()),
            active: slots.active.as_ref().map(|w| w.handle()),
        })
    }
}

#[async_trait]
impl WorkerContainer for LocalContainer {
    async fn registration(&self) -> deeds_core::Result<Option<RegistrationInfo>> {
        Ok(self.snapshot())
    }

    async fn registrations(&self) -> deeds_core::Result<Vec<RegistrationInfo>> {
        Ok(self.snapshot().into_iter().collect())
    }

    async fn unregister(&self, scope: &str) -> deeds_core::Result<bool> {
        if scope != self.scope {
            return Ok(false);
        }

        let _lifecycle = self.lifecycle.lock().await;
        let retired: Vec<Arc<ServiceWorker>> = {
            let mut slots = self.slots();
            if !slots.registered {
                return Ok(false);
            }
            let taken = std::mem::take(&mut *slots);
            [taken.installing, taken.waiting, taken.active]
                .into_iter()
                .flatten()
                .collect()
        };
        for worker in &retired {
            self.retire(worker).await;
        }
        tracing::info!(scope = %scope, "Service worker unregistered");
        Ok(true)
    }

    async fn post_message(
        &self,
        worker: WorkerId,
        message: serde_json::Value,
    ) -> deeds_core::Result<()> {
        self.post(worker, &message).await?;
        Ok(())
    }

    fn controller(&self) -> Option<WorkerId> {
        self.slots().controller.as_ref().map(|w| w.id())
    }

    fn subscribe(&self) -> broadcast::Receiver<ContainerEvent> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for LocalContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalContainer")
            .field("scope", &self.scope)
            .field("controller", &self.controller())
            .finish()
    }
}
