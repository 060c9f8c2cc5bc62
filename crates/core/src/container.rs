//! The platform seam between a page and its service worker registration.

use crate::lifecycle::{RegistrationInfo, WorkerId};
use crate::message::ContainerEvent;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Page-side view of the service worker platform (`navigator.serviceWorker`).
///
/// The page never owns worker lifecycles; it can read registration
/// snapshots, post messages, unregister, and listen for lifecycle events.
#[async_trait]
pub trait WorkerContainer: Send + Sync + 'static {
    /// Registration controlling this page's scope, if any.
    async fn registration(&self) -> crate::Result<Option<RegistrationInfo>>;

    /// All registrations for this origin.
    async fn registrations(&self) -> crate::Result<Vec<RegistrationInfo>>;

    /// Unregister the registration for `scope`. Returns false if none existed.
    async fn unregister(&self, scope: &str) -> crate::Result<bool>;

    /// Post a structured message to a worker.
    async fn post_message(&self, worker: WorkerId, message: serde_json::Value)
    -> crate::Result<()>;

    /// Worker currently controlling the page.
    fn controller(&self) -> Option<WorkerId>;

    /// Subscribe to lifecycle events. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<ContainerEvent>;
}
