//! Network access seam.

use crate::error::NetworkError;
use async_trait::async_trait;
use deeds_core::{Request, Response};

/// Something that can fetch a request from the origin.
///
/// A non-2xx response is still a successful fetch; only transport failures
/// are errors.
#[async_trait]
pub trait Network: Send + Sync + 'static {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}
