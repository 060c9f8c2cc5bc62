//! Update detection for a mounted page.
//!
//! [`UpdateMonitor`] watches the worker container and publishes an
//! [`UpdateStatus`] snapshot over a `watch` channel. It reports a waiting
//! update, flags a potentially stale app from the time since the last
//! check, and turns controller changes into at most one automatic reload
//! per session through the [`ReloadGuard`].

use crate::error::ClientResult;
use crate::guard::ReloadGuard;
use crate::reload::PageReloader;
use deeds_core::config::GuardConfig;
use deeds_core::keys::LAST_UPDATE_CHECK_KEY;
use deeds_core::{Clock, ContainerEvent, WorkerContainer, WorkerId, WorkerMessage, WorkerState};
use deeds_storage::KeyValueStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Flags surfaced to the presentation layer. The three are independent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UpdateStatus {
    /// A newly installed worker is waiting to take over.
    pub update_available: bool,
    /// The last update check is older than the staleness window.
    pub is_stale: bool,
    /// A controller change arrived after the reload ceiling was reached.
    pub reload_blocked: bool,
}

impl UpdateStatus {
    pub fn any(&self) -> bool {
        self.update_available || self.is_stale || self.reload_blocked
    }
}

pub struct UpdateMonitor {
    container: Option<Arc<dyn WorkerContainer>>,
    status: Arc<watch::Sender<UpdateStatus>>,
    listener: Option<JoinHandle<()>>,
}

impl UpdateMonitor {
    /// Start monitoring. With no container (no service worker support) the
    /// monitor is inert and every flag stays false.
    pub async fn mount(
        container: Option<Arc<dyn WorkerContainer>>,
        local: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        guard: ReloadGuard,
        reloader: Arc<dyn PageReloader>,
        config: &GuardConfig,
    ) -> Self {
        let (tx, _) = watch::channel(UpdateStatus::default());
        let status = Arc::new(tx);

        let Some(platform) = container.clone() else {
            tracing::debug!("Service workers unsupported, update monitor inert");
            return Self {
                container,
                status,
                listener: None,
            };
        };

        // Subscribe before reading the registration so nothing in between
        // is missed. The controller is read in the same step: queued events
        // are judged against it and against the controller changes they
        // carry, never against a later reading.
        let events = platform.subscribe();
        let controlled = platform.controller().is_some();

        match platform.registration().await {
            Ok(Some(registration)) if registration.waiting.is_some() => {
                status.send_modify(|s| s.update_available = true);
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Error checking for service worker updates"),
        }

        check_staleness(local.as_ref(), clock.as_ref(), config.staleness_window(), &status);

        let listener = tokio::spawn(listen(
            events,
            controlled,
            guard,
            reloader,
            status.clone(),
        ));

        Self {
            container,
            status,
            listener: Some(listener),
        }
    }

    pub fn status(&self) -> UpdateStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<UpdateStatus> {
        self.status.subscribe()
    }

    /// Ask the waiting worker, if any, to skip waiting. Returns whether a
    /// message was sent. Never forces activation.
    pub async fn activate_update(&self) -> ClientResult<bool> {
        let Some(container) = &self.container else {
            return Ok(false);
        };
        let Some(waiting) = container.registration().await?.and_then(|r| r.waiting) else {
            return Ok(false);
        };

        tracing::info!(worker = %waiting.id, "Activating waiting service worker");
        container
            .post_message(waiting.id, WorkerMessage::SkipWaiting.to_value())
            .await?;
        Ok(true)
    }

    /// Stop listening. Work already handed to the platform is not cancelled.
    pub fn unmount(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl Drop for UpdateMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn check_staleness(
    local: &dyn KeyValueStore,
    clock: &dyn Clock,
    window: Duration,
    status: &watch::Sender<UpdateStatus>,
) {
    let now = clock.now_millis();
    let window = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);

    let last = local
        .get(LAST_UPDATE_CHECK_KEY)
        .and_then(|v| v.trim().parse::<i64>().ok());
    if let Some(last) = last
        && now.saturating_sub(last) > window
    {
        tracing::info!(last_check = last, "App may be stale");
        status.send_modify(|s| s.is_stale = true);
    }

    if let Err(e) = local.set(LAST_UPDATE_CHECK_KEY, &now.to_string()) {
        tracing::warn!(error = %e, "Failed to record update check");
    }
}

async fn listen(
    mut events: broadcast::Receiver<ContainerEvent>,
    mut controlled: bool,
    guard: ReloadGuard,
    reloader: Arc<dyn PageReloader>,
    status: Arc<watch::Sender<UpdateStatus>>,
) {
    let mut installing: Option<WorkerId> = None;

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Update monitor lagged behind container events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            ContainerEvent::UpdateFound { worker } => installing = Some(worker),
            ContainerEvent::StateChange {
                worker,
                state: WorkerState::Waiting,
            } if installing == Some(worker) && controlled => {
                tracing::info!(worker = %worker, "Update available");
                status.send_modify(|s| s.update_available = true);
            }
            ContainerEvent::StateChange { .. } => {}
            ContainerEvent::ControllerChange { controller } => {
                controlled = controller.is_some();
                on_controller_change(&guard, reloader.as_ref(), &status);
            }
        }
    }
}

fn on_controller_change(
    guard: &ReloadGuard,
    reloader: &dyn PageReloader,
    status: &watch::Sender<UpdateStatus>,
) {
    tracing::info!("Controller changed");

    if guard.should_block_reload() {
        tracing::warn!(
            count = guard.count(),
            ceiling = guard.ceiling(),
            "Reload blocked, maximum reloads reached"
        );
        status.send_modify(|s| s.reload_blocked = true);
        return;
    }

    if let Err(e) = guard.increment() {
        tracing::warn!(error = %e, "Failed to record reload");
    }
    tracing::info!("Reloading page after service worker activation");
    reloader.reload();
}
