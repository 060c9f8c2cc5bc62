//! Worker identity and lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an installed worker version.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(Uuid);

impl WorkerId {
    /// Generate a new random worker ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidWorkerId(format!("{s}: {e}")))
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkerId({})", self.0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Worker lifecycle state.
///
/// ```text
/// idle -> installing -> waiting -> activating -> controlling
///   \_________\____________\___________\______________\-> redundant
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Registered, install not started.
    Idle,
    /// Install handler running (precaching).
    Installing,
    /// Installed; waiting for a skip-waiting trigger.
    Waiting,
    /// Activate handler running (stale bucket cleanup, claim).
    Activating,
    /// Active and intercepting requests for its clients.
    Controlling,
    /// Replaced, unregistered, or failed to install.
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Installing => "installing",
            Self::Waiting => "waiting",
            Self::Activating => "activating",
            Self::Controlling => "controlling",
            Self::Redundant => "redundant",
        }
    }

    /// Check whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Idle, Installing)
                | (Installing, Waiting)
                | (Waiting, Activating)
                | (Activating, Controlling)
                | (Idle | Installing | Waiting | Activating | Controlling, Redundant)
        )
    }

    /// Apply a transition, rejecting anything the platform would not allow.
    pub fn transition(self, next: WorkerState) -> crate::Result<WorkerState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(crate::Error::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Whether the worker may answer fetch events.
    pub fn handles_fetch(&self) -> bool {
        matches!(self, Self::Activating | Self::Controlling)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Redundant)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page-visible reference to a worker. The page never owns the worker;
/// it can only observe its state and post messages to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHandle {
    pub id: WorkerId,
    pub state: WorkerState,
}

/// Snapshot of a registration as seen from a page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationInfo {
    pub scope: String,
    pub installing: Option<WorkerHandle>,
    pub waiting: Option<WorkerHandle>,
    pub active: Option<WorkerHandle>,
}
