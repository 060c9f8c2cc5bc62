//! Local filesystem cache storage backend.
//!
//! Layout: `<root>/<bucket>/<sha256(url)>.json`, one JSON document per
//! cached response.

use crate::error::{StorageError, StorageResult};
use crate::traits::{CacheStorage, validate_bucket_name};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use deeds_core::{Request, Response};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

const ENTRY_EXTENSION: &str = "json";

/// On-disk representation of a cached response.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    url: String,
    status: u16,
    status_text: String,
    #[serde(default)]
    headers: Vec<(String, String)>,
    /// Base64-encoded body.
    body: String,
}

impl StoredEntry {
    fn from_response(url: &str, response: &Response) -> Self {
        Self {
            url: url.to_string(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: general_purpose::STANDARD.encode(&response.body),
        }
    }

    fn into_response(self) -> StorageResult<Response> {
        let body = general_purpose::STANDARD
            .decode(&self.body)
            .map_err(|e| StorageError::Corrupt(format!("{}: invalid body encoding: {e}", self.url)))?;
        Ok(Response {
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            body: Bytes::from(body),
        })
    }
}

/// Cache storage persisted under a local directory.
pub struct FilesystemCacheStorage {
    root: PathBuf,
}

impl FilesystemCacheStorage {
    /// Create a new filesystem backend rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_path(&self, bucket: &str) -> StorageResult<PathBuf> {
        validate_bucket_name(bucket)?;
        Ok(self.root.join(bucket))
    }

    fn entry_path(&self, bucket: &str, url: &str) -> StorageResult<PathBuf> {
        let digest = Sha256::digest(url.as_bytes());
        let name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        Ok(self
            .bucket_path(bucket)?
            .join(format!("{name}.{ENTRY_EXTENSION}")))
    }

    async fn read_entry(path: &Path) -> StorageResult<Option<StoredEntry>> {
        match fs::read(path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[async_trait]
impl CacheStorage for FilesystemCacheStorage {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn keys(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(StorageError::Io(e)),
        };
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && validate_bucket_name(name).is_ok()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn has(&self, bucket: &str) -> StorageResult<bool> {
        let path = self.bucket_path(bucket)?;
        Ok(fs::try_exists(&path).await?)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn open(&self, bucket: &str) -> StorageResult<()> {
        let path = self.bucket_path(bucket)?;
        fs::create_dir_all(&path).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, bucket: &str) -> StorageResult<bool> {
        let path = self.bucket_path(bucket)?;
        match fs::remove_dir_all(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(
        skip(self, request, response),
        fields(backend = "filesystem", url = %request.url, size = response.body.len())
    )]
    async fn put(
        &self,
        bucket: &str,
        request: &Request,
        response: &Response,
    ) -> StorageResult<()> {
        let path = self.entry_path(bucket, request.cache_key())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec(&StoredEntry::from_response(
            request.cache_key(),
            response,
        ))?;

        // Write to a uniquely named temp file, fsync, then rename so readers
        // never observe a partial entry.
        let temp_path = path.with_extension(format!("{ENTRY_EXTENSION}.tmp.{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(backend = "filesystem", url = %request.url))]
    async fn match_in(&self, bucket: &str, request: &Request) -> StorageResult<Option<Response>> {
        let path = self.entry_path(bucket, request.cache_key())?;
        match Self::read_entry(&path).await? {
            Some(entry) if entry.url == request.cache_key() => Ok(Some(entry.into_response()?)),
            Some(entry) => Err(StorageError::Corrupt(format!(
                "entry for {} found under key of {}",
                entry.url,
                request.cache_key()
            ))),
            None => Ok(None),
        }
    }

    async fn entries(&self, bucket: &str) -> StorageResult<Vec<String>> {
        let path = self.bucket_path(bucket)?;
        let mut dir = match fs::read_dir(&path).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut urls = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(stored) = Self::read_entry(&path).await? {
                urls.push(stored.url);
            }
        }
        urls.sort();
        Ok(urls)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let meta = fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(StorageError::Unavailable(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }
}
