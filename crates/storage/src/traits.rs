//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use deeds_core::{Request, Response};

/// Maximum bucket name length.
pub const MAX_BUCKET_NAME_LEN: usize = 128;

/// Named request -> response buckets (the Cache Storage API).
///
/// Bucket names are opaque to the store; the worker embeds its version tag
/// in the name. All methods may be called concurrently from the worker and
/// from page-side recovery, so a `put` racing a `delete` of the same bucket
/// must either land or fail cleanly.
#[async_trait]
pub trait CacheStorage: Send + Sync + 'static {
    /// Names of all existing buckets.
    async fn keys(&self) -> StorageResult<Vec<String>>;

    /// Check if a bucket exists.
    async fn has(&self, bucket: &str) -> StorageResult<bool>;

    /// Open a bucket, creating it if it does not exist.
    async fn open(&self, bucket: &str) -> StorageResult<()>;

    /// Delete a bucket and everything in it.
    ///
    /// Returns `false` if the bucket did not exist.
    async fn delete(&self, bucket: &str) -> StorageResult<bool>;

    /// Store a response for a request, replacing any previous entry.
    /// The bucket is created if missing.
    async fn put(&self, bucket: &str, request: &Request, response: &Response)
    -> StorageResult<()>;

    /// Look up a request in one bucket. A missing bucket is a miss.
    async fn match_in(&self, bucket: &str, request: &Request) -> StorageResult<Option<Response>>;

    /// Request URLs stored in a bucket.
    async fn entries(&self, bucket: &str) -> StorageResult<Vec<String>>;

    /// Get the name of this storage backend.
    ///
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Look up a request across every bucket, in `keys()` order.
    async fn match_any(&self, request: &Request) -> StorageResult<Option<Response>> {
        for bucket in self.keys().await? {
            if let Some(response) = self.match_in(&bucket, request).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Verify the backend is usable.
    ///
    /// The default implementation returns Ok(()), suitable for in-memory backends.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Reject bucket names that are empty, oversized, or could escape a
/// filesystem root.
pub fn validate_bucket_name(name: &str) -> StorageResult<()> {
    if name.is_empty() || name.len() > MAX_BUCKET_NAME_LEN {
        return Err(StorageError::InvalidBucketName(format!(
            "bucket name must be 1-{MAX_BUCKET_NAME_LEN} bytes: {name:?}"
        )));
    }
    if name == "." || name == ".." || name.starts_with('.') {
        return Err(StorageError::InvalidBucketName(format!(
            "bucket name may not start with '.': {name}"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(StorageError::InvalidBucketName(format!(
            "bucket name contains unsupported characters: {name}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_bucket_name() {
        assert!(validate_bucket_name("deeds-cache-v4").is_ok());
        assert!(validate_bucket_name("workbox_precache.v2").is_ok());

        for bad in ["", ".", "..", ".hidden", "a/b", "a\\b", "caché"] {
            assert!(
                matches!(
                    validate_bucket_name(bad),
                    Err(StorageError::InvalidBucketName(_))
                ),
                "expected {bad:?} to be rejected"
            );
        }
        assert!(validate_bucket_name(&"a".repeat(MAX_BUCKET_NAME_LEN + 1)).is_err());
    }
}
