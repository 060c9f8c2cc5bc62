//! Page <-> worker message protocol and lifecycle events.

use crate::lifecycle::{WorkerId, WorkerState};
use serde::{Deserialize, Serialize};

/// Messages a page may post to a worker.
///
/// Wire shape: `{"type": "SKIP_WAITING"}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Leave the waiting state and activate now.
    SkipWaiting,
}

impl WorkerMessage {
    pub fn to_value(self) -> serde_json::Value {
        // Serializing a unit variant with an internal tag cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Interpret an arbitrary posted value. Anything that is not a known
    /// message shape yields `None` and should be ignored by the receiver.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Lifecycle events a container delivers to pages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ContainerEvent {
    /// A new worker started installing for the registration.
    UpdateFound { worker: WorkerId },
    /// A worker changed lifecycle state.
    StateChange { worker: WorkerId, state: WorkerState },
    /// A different worker now controls the page.
    ControllerChange { controller: Option<WorkerId> },
}
