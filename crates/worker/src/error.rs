//! Error types for the worker.

use deeds_core::{WorkerId, WorkerState};
use deeds_storage::StorageError;
use thiserror::Error;

/// Failure to obtain a response from the network.
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    #[error("network unreachable")]
    Offline,

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {message}")]
    Failed { url: String, message: String },
}

/// Worker error type.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] deeds_core::Error),

    #[error("worker {id} is {state} and does not handle fetch events")]
    NotControlling { id: WorkerId, state: WorkerState },

    #[error("{url} answered with status {status}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("no worker with id {0}")]
    UnknownWorker(WorkerId),
}

impl From<WorkerError> for deeds_core::Error {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Core(e) => e,
            other => deeds_core::Error::Container(other.to_string()),
        }
    }
}

/// Result type alias for worker operations.
pub type WorkerResult<T> = std::result::Result<T, WorkerError>;
