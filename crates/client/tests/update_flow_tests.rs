//! Update detection and reload guarding against a live local container.

mod common;

use async_trait::async_trait;
use common::{Page, START_MILLIS, eventually};
use deeds_client::{AppShell, RecoveryContext, ShellView, StartupPhase, UpdateMonitor};
use deeds_core::keys::{LAST_UPDATE_CHECK_KEY, RELOAD_COUNT_KEY};
use deeds_core::{ContainerEvent, RegistrationInfo, WorkerContainer, WorkerId};
use deeds_storage::KeyValueStore;
use deeds_worker::LocalContainer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Container whose registration lookup lets a first install run to
/// completion before answering.
struct InstallDuringLookup {
    inner: Arc<LocalContainer>,
}

#[async_trait]
impl WorkerContainer for InstallDuringLookup {
    async fn registration(&self) -> deeds_core::Result<Option<RegistrationInfo>> {
        if self.inner.controller().is_none() {
            self.inner.register().await?;
        }
        self.inner.registration().await
    }

    async fn registrations(&self) -> deeds_core::Result<Vec<RegistrationInfo>> {
        self.inner.registrations().await
    }

    async fn unregister(&self, scope: &str) -> deeds_core::Result<bool> {
        self.inner.unregister(scope).await
    }

    async fn post_message(
        &self,
        worker: WorkerId,
        message: serde_json::Value,
    ) -> deeds_core::Result<()> {
        self.inner.post_message(worker, message).await
    }

    fn controller(&self) -> Option<WorkerId> {
        self.inner.controller()
    }

    fn subscribe(&self) -> broadcast::Receiver<ContainerEvent> {
        self.inner.subscribe()
    }
}

#[tokio::test]
async fn second_controller_change_is_blocked() {
    let page = Page::new();
    let monitor = page.mount_monitor().await;
    let mut status = monitor.subscribe();

    // First install claims the page: one automatic reload.
    page.container.register().await.unwrap();
    eventually(|| async { page.reloader.count() == 1 }).await;
    assert_eq!(page.guard().count(), 1);
    assert!(!monitor.status().reload_blocked);

    // A new version shows up while the page is controlled.
    page.container.register_version("v5").await.unwrap();
    status.wait_for(|s| s.update_available).await.unwrap();

    // Activating it changes the controller again, same session.
    assert!(monitor.activate_update().await.unwrap());
    status.wait_for(|s| s.reload_blocked).await.unwrap();

    assert_eq!(page.reloader.count(), 1);
    assert_eq!(page.guard().count(), 1);
    assert_eq!(
        page.stores.session.get(RELOAD_COUNT_KEY).as_deref(),
        Some("1")
    );

    let mut shell = AppShell::new(Arc::new(page.clock.clone()));
    shell.observe(monitor.status());
    assert_eq!(
        shell.view(StartupPhase::Ready),
        ShellView::Recovery(RecoveryContext::UpdateFailed)
    );
}

#[tokio::test]
async fn waiting_worker_on_mount_is_an_update() {
    let page = Page::new();
    page.container.register().await.unwrap();
    page.container.register_version("v5").await.unwrap();

    let monitor = page.mount_monitor().await;
    assert!(monitor.status().update_available);
    assert!(!monitor.status().reload_blocked);
}

#[tokio::test]
async fn first_install_is_not_an_update() {
    let page = Page::new();
    let monitor = page.mount_monitor().await;

    page.container.register().await.unwrap();
    eventually(|| async { page.reloader.count() == 1 }).await;

    assert!(!monitor.status().update_available);
    assert!(!monitor.activate_update().await.unwrap());
}

#[tokio::test]
async fn first_install_during_mount_is_not_an_update() {
    let page = Page::new();
    let platform: Arc<dyn WorkerContainer> = Arc::new(InstallDuringLookup {
        inner: page.container.clone(),
    });

    let monitor = UpdateMonitor::mount(
        Some(platform),
        page.stores.local.clone(),
        Arc::new(page.clock.clone()),
        page.guard(),
        page.reloader.clone(),
        &page.config.guard,
    )
    .await;

    // The install finished before the listener started; its queued events
    // still end in exactly one guarded reload.
    assert!(page.container.controller().is_some());
    eventually(|| async { page.reloader.count() == 1 }).await;

    assert_eq!(monitor.status(), Default::default());
}

#[tokio::test]
async fn activate_update_only_messages_waiting_worker() {
    let page = Page::new();
    let v4 = page.container.register().await.unwrap().worker;
    let monitor = page.mount_monitor().await;

    assert!(!monitor.activate_update().await.unwrap());
    assert_eq!(page.container.controller(), Some(v4.id()));
}

#[tokio::test]
async fn stale_after_more_than_an_hour() {
    let page = Page::new();
    let hour = 3_600_000;
    page.stores
        .local
        .set(LAST_UPDATE_CHECK_KEY, &(START_MILLIS - hour - 1).to_string())
        .unwrap();

    let monitor = page.mount_monitor().await;
    assert!(monitor.status().is_stale);
    assert!(!monitor.status().update_available);
    assert_eq!(
        page.stores.local.get(LAST_UPDATE_CHECK_KEY),
        Some(START_MILLIS.to_string())
    );
}

#[tokio::test]
async fn exactly_one_hour_is_not_stale() {
    let page = Page::new();
    page.stores
        .local
        .set(LAST_UPDATE_CHECK_KEY, &(START_MILLIS - 3_600_000).to_string())
        .unwrap();

    let monitor = page.mount_monitor().await;
    assert!(!monitor.status().is_stale);
}

#[tokio::test]
async fn first_visit_records_check_without_staleness() {
    let page = Page::new();
    let monitor = page.mount_monitor().await;

    assert!(!monitor.status().is_stale);
    assert_eq!(
        page.stores.local.get(LAST_UPDATE_CHECK_KEY),
        Some(START_MILLIS.to_string())
    );
}

#[tokio::test]
async fn unsupported_platform_is_inert() {
    let page = Page::new();
    page.stores
        .local
        .set(LAST_UPDATE_CHECK_KEY, "0")
        .unwrap();

    let monitor = UpdateMonitor::mount(
        None,
        page.stores.local.clone(),
        Arc::new(page.clock.clone()),
        page.guard(),
        page.reloader.clone(),
        &page.config.guard,
    )
    .await;

    assert_eq!(monitor.status(), Default::default());
    assert!(!monitor.activate_update().await.unwrap());
    assert_eq!(page.stores.local.get(LAST_UPDATE_CHECK_KEY).as_deref(), Some("0"));
}

#[tokio::test]
async fn unmounted_monitor_ignores_controller_changes() {
    let page = Page::new();
    let monitor = page.mount_monitor().await;
    monitor.unmount();

    page.container.register().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(page.reloader.count(), 0);
    assert_eq!(page.guard().count(), 0);
}
