//! Error types for the core domain.

use crate::lifecycle::WorkerState;
use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: WorkerState, to: WorkerState },

    #[error("invalid worker ID: {0}")]
    InvalidWorkerId(String),

    #[error("worker container error: {0}")]
    Container(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
