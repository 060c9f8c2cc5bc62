//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Cache bucket configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Bucket name prefix (e.g., "deeds-cache-").
    #[serde(default = "default_cache_prefix")]
    pub prefix: String,
    /// Version tag appended to the prefix. Bump on every deployment so that
    /// activation can tell which buckets are stale.
    #[serde(default = "default_cache_version")]
    pub version: String,
    /// Origin the precache URLs are resolved against.
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Navigation fallback documents fetched during install.
    #[serde(default = "default_precache_urls")]
    pub precache_urls: Vec<String>,
}

fn default_cache_prefix() -> String {
    "deeds-cache-".to_string()
}

fn default_cache_version() -> String {
    "v4".to_string()
}

fn default_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_precache_urls() -> Vec<String> {
    vec!["/".to_string(), "/index.html".to_string()]
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: default_cache_prefix(),
            version: default_cache_version(),
            origin: default_origin(),
            precache_urls: default_precache_urls(),
        }
    }
}

impl CacheConfig {
    /// Name of the bucket owned by the current version.
    pub fn bucket_name(&self) -> String {
        format!("{}{}", self.prefix, self.version)
    }

    /// Same config pinned to another version tag.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..self.clone()
        }
    }

    /// Validate cache configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.version.trim().is_empty() {
            return Err("cache.version must not be empty".to_string());
        }
        if self.prefix.is_empty() {
            return Err("cache.prefix must not be empty".to_string());
        }
        url::Url::parse(&self.origin)
            .map_err(|e| format!("cache.origin is not a valid URL: {e}"))?;
        Ok(())
    }
}

/// Fetch routing configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Path suffixes of code bundles that must never be served from cache.
    #[serde(default = "default_bundle_extensions")]
    pub bundle_extensions: Vec<String>,
    /// Path prefixes of content-stable static asset directories (cache-first).
    #[serde(default = "default_static_prefixes")]
    pub static_prefixes: Vec<String>,
}

fn default_bundle_extensions() -> Vec<String> {
    vec![".js".to_string(), ".css".to_string()]
}

fn default_static_prefixes() -> Vec<String> {
    vec!["/assets/".to_string()]
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            bundle_extensions: default_bundle_extensions(),
            static_prefixes: default_static_prefixes(),
        }
    }
}

/// Install behavior.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Skip the waiting phase right after install instead of waiting for a
    /// SKIP_WAITING message from the page (default: false).
    #[serde(default)]
    pub auto_skip_waiting: bool,
}

/// Reload guard, recovery and watchdog tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Maximum automatic reloads per session.
    #[serde(default = "default_max_reloads_per_session")]
    pub max_reloads_per_session: u32,
    /// Window after a full recovery during which the watchdog stays quiet.
    #[serde(default = "default_recovery_cooldown_ms")]
    pub recovery_cooldown_ms: u64,
    /// Elapsed time since the last update check after which the app is
    /// considered potentially stale.
    #[serde(default = "default_staleness_window_secs")]
    pub staleness_window_secs: u64,
    /// Startup deadline before the app is considered stuck.
    #[serde(default = "default_watchdog_deadline_secs")]
    pub watchdog_deadline_secs: u64,
}

fn default_max_reloads_per_session() -> u32 {
    1
}

fn default_recovery_cooldown_ms() -> u64 {
    5000
}

fn default_staleness_window_secs() -> u64 {
    3600 // 1 hour
}

fn default_watchdog_deadline_secs() -> u64 {
    15
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_reloads_per_session: default_max_reloads_per_session(),
            recovery_cooldown_ms: default_recovery_cooldown_ms(),
            staleness_window_secs: default_staleness_window_secs(),
            watchdog_deadline_secs: default_watchdog_deadline_secs(),
        }
    }
}

impl GuardConfig {
    pub fn recovery_cooldown(&self) -> Duration {
        Duration::from_millis(self.recovery_cooldown_ms)
    }

    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.staleness_window_secs)
    }

    pub fn watchdog_deadline(&self) -> Duration {
        Duration::from_secs(self.watchdog_deadline_secs)
    }

    /// Validate guard configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.watchdog_deadline_secs == 0 {
            return Err("guard.watchdog_deadline_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Cache storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-process storage, lost on exit.
    Memory,
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for cache buckets and key-value files.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data"),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub routes: RouteConfig,
    #[serde(default)]
    pub install: InstallConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses memory storage and an `example.test` origin.
    pub fn for_testing() -> Self {
        Self {
            cache: CacheConfig {
                origin: "https://deeds.example.test".to_string(),
                ..CacheConfig::default()
            },
            routes: RouteConfig::default(),
            install: InstallConfig::default(),
            guard: GuardConfig::default(),
            storage: StorageConfig::Memory,
        }
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.cache.validate()?;
        self.guard.validate()?;
        Ok(())
    }
}
