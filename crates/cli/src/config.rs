//! Configuration loading.

use anyhow::{Context, Result};
use deeds_core::config::{AppConfig, StorageConfig};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::path::{Path, PathBuf};

/// Command-line overrides applied on top of file and environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub state_dir: Option<PathBuf>,
    pub origin: Option<String>,
}

/// Load configuration from an optional TOML file merged with `DEEDS_`
/// environment variables (`DEEDS_CACHE__VERSION=v5`), then apply overrides
/// and validate.
pub fn load_config(path: &Path, overrides: Overrides) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if path.exists() {
        tracing::debug!(config_path = %path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    }
    figment = figment.merge(Env::prefixed("DEEDS_").split("__"));

    let mut config: AppConfig = figment
        .extract()
        .context("failed to load configuration")?;

    if let Some(path) = overrides.state_dir {
        config.storage = StorageConfig::Filesystem { path };
    }
    if let Some(origin) = overrides.origin {
        config.cache.origin = origin;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}
