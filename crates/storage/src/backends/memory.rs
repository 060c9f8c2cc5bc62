//! In-memory cache storage backend.

use crate::error::StorageResult;
use crate::traits::{CacheStorage, validate_bucket_name};
use async_trait::async_trait;
use dashmap::DashMap;
use deeds_core::{Request, Response};
use std::collections::HashMap;
use tracing::instrument;

/// Cache storage held in process memory. Lost on drop.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    buckets: DashMap<String, HashMap<String, Response>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn keys(&self) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = self.buckets.iter().map(|b| b.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn has(&self, bucket: &str) -> StorageResult<bool> {
        Ok(self.buckets.contains_key(bucket))
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn open(&self, bucket: &str) -> StorageResult<()> {
        validate_bucket_name(bucket)?;
        self.buckets.entry(bucket.to_string()).or_default();
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn delete(&self, bucket: &str) -> StorageResult<bool> {
        Ok(self.buckets.remove(bucket).is_some())
    }

    #[instrument(skip(self, request, response), fields(backend = "memory", url = %request.url))]
    async fn put(
        &self,
        bucket: &str,
        request: &Request,
        response: &Response,
    ) -> StorageResult<()> {
        validate_bucket_name(bucket)?;
        self.buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(request.cache_key().to_string(), response.clone());
        Ok(())
    }

    async fn match_in(&self, bucket: &str, request: &Request) -> StorageResult<Option<Response>> {
        Ok(self
            .buckets
            .get(bucket)
            .and_then(|entries| entries.get(request.cache_key()).cloned()))
    }

    async fn entries(&self, bucket: &str) -> StorageResult<Vec<String>> {
        let mut urls: Vec<String> = self
            .buckets
            .get(bucket)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        urls.sort();
        Ok(urls)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
