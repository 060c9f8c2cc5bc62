//! Error types for the page-side client.

use deeds_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] deeds_core::Error),
}

/// Result type alias for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;
