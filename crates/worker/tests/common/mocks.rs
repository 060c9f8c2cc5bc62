//! Test doubles for the network and cache storage seams.

use async_trait::async_trait;
use dashmap::DashMap;
use deeds_core::{Request, Response};
use deeds_storage::{CacheStorage, MemoryCacheStorage, StorageError, StorageResult};
use deeds_worker::{Network, NetworkError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Network answering from a table of scripted responses.
///
/// Unknown URLs get a 404 while online. When offline every fetch fails.
#[derive(Default)]
pub struct ScriptedNetwork {
    responses: DashMap<String, Response>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offline() -> Self {
        let network = Self::default();
        network.set_offline(true);
        network
    }

    pub fn respond(&self, path: &str, response: Response) {
        self.responses
            .insert(super::request(path).cache_key().to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Offline);
        }
        Ok(self
            .responses
            .get(request.cache_key())
            .map(|r| r.value().clone())
            .unwrap_or_else(|| Response::new(404, "Not Found", "")))
    }
}

/// Memory cache storage that records reads and can be told to fail.
#[derive(Default)]
pub struct InstrumentedCacheStorage {
    inner: MemoryCacheStorage,
    match_calls: AtomicUsize,
    fail_puts: AtomicBool,
    fail_reads: AtomicBool,
    undeletable: Mutex<HashSet<String>>,
    keys_gate: Mutex<Option<Arc<Notify>>>,
}

impl InstrumentedCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lookups made against any bucket.
    pub fn match_calls(&self) -> usize {
        self.match_calls.load(Ordering::SeqCst)
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn make_undeletable(&self, bucket: &str) {
        self.undeletable.lock().unwrap().insert(bucket.to_string());
    }

    /// Hold the next bucket listing until the returned handle is notified.
    /// Later listings are not affected.
    pub fn pause_next_keys(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.keys_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl CacheStorage for InstrumentedCacheStorage {
    async fn keys(&self) -> StorageResult<Vec<String>> {
        let gate = self.keys_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.inner.keys().await
    }

    async fn has(&self, bucket: &str) -> StorageResult<bool> {
        self.inner.has(bucket).await
    }

    async fn open(&self, bucket: &str) -> StorageResult<()> {
        self.inner.open(bucket).await
    }

    async fn delete(&self, bucket: &str) -> StorageResult<bool> {
        if self.undeletable.lock().unwrap().contains(bucket) {
            return Err(StorageError::Unavailable(format!("{bucket} is locked")));
        }
        self.inner.delete(bucket).await
    }

    async fn put(&self, bucket: &str, request: &Request, response: &Response) -> StorageResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("quota exceeded".to_string()));
        }
        self.inner.put(bucket, request, response).await
    }

    async fn match_in(&self, bucket: &str, request: &Request) -> StorageResult<Option<Response>> {
        self.match_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("read failed".to_string()));
        }
        self.inner.match_in(bucket, request).await
    }

    async fn entries(&self, bucket: &str) -> StorageResult<Vec<String>> {
        self.inner.entries(bucket).await
    }

    fn backend_name(&self) -> &'static str {
        "instrumented"
    }
}
