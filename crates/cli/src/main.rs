//! Command-line driver for the Deeds service worker cache lifecycle.
//!
//! Each invocation behaves like one page load against a persistent state
//! directory: cache buckets live under `<state-dir>/caches`, session and
//! local keys in `<state-dir>/session.json` and `<state-dir>/local.json`.

mod config;
mod http;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{Overrides, load_config};
use deeds_client::{RecordingReloader, Recovery, RecoveryFlags, ReloadGuard};
use deeds_core::keys::LAST_UPDATE_CHECK_KEY;
use deeds_core::{AppConfig, Request, SystemClock};
use deeds_storage::{CacheStorage, KeyValueStores};
use deeds_worker::{LocalContainer, Network, ServiceWorker, metrics};
use http::HttpNetwork;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "deeds")]
#[command(about = "Drive the Deeds service worker cache lifecycle")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DEEDS_CONFIG", default_value = "deeds.toml")]
    config: PathBuf,

    /// State directory for cache buckets and session/local keys
    #[arg(long, env = "DEEDS_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Origin the app is served from (overrides cache.origin)
    #[arg(long)]
    origin: Option<String>,

    /// Print worker metrics after the command
    #[arg(long, default_value_t = false)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the install step: precache the navigation fallback
    Install {
        /// Cache version to install (default: cache.version)
        #[arg(long)]
        version: Option<String>,
    },
    /// Install and activate a version, deleting every other version's bucket
    Activate {
        /// Cache version to activate (default: cache.version)
        #[arg(long)]
        version: Option<String>,
    },
    /// Fetch a URL through the worker's routing policy
    Fetch {
        /// Absolute URL, or a path resolved against the origin
        url: String,
        /// Treat the request as a page navigation
        #[arg(long, default_value_t = false)]
        navigate: bool,
    },
    /// List cache buckets and their entries
    Caches,
    /// Show reload guard and recovery state
    Status {
        /// Output as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Clear every cache bucket and reset the reload guard and recovery flags
    Recover,
}

/// Everything a command needs, opened from configuration.
struct Session {
    config: AppConfig,
    caches: Arc<dyn CacheStorage>,
    stores: KeyValueStores,
    network: Arc<dyn Network>,
}

impl Session {
    async fn open(config: AppConfig) -> Result<Self> {
        let caches = deeds_storage::from_config(&config.storage)
            .await
            .context("failed to open cache storage")?;
        let stores = KeyValueStores::from_config(&config.storage)
            .context("failed to open key-value stores")?;
        let network: Arc<dyn Network> = Arc::new(HttpNetwork::new()?);
        Ok(Self {
            config,
            caches,
            stores,
            network,
        })
    }

    fn config_for(&self, version: Option<String>) -> AppConfig {
        let mut config = self.config.clone();
        if let Some(version) = version {
            config.cache = config.cache.with_version(version);
        }
        config
    }

    fn container(&self, version: Option<String>) -> LocalContainer {
        LocalContainer::new(
            self.config_for(version),
            self.caches.clone(),
            self.network.clone(),
        )
    }

    fn guard(&self) -> ReloadGuard {
        ReloadGuard::from_config(self.stores.session.clone(), &self.config.guard)
    }

    fn flags(&self) -> RecoveryFlags {
        RecoveryFlags::from_config(
            self.stores.session.clone(),
            Arc::new(SystemClock),
            &self.config.guard,
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Cli {
        config,
        state_dir,
        origin,
        metrics: print_metrics,
        command,
    } = Cli::parse();

    let config = load_config(&config, Overrides { state_dir, origin })?;
    let session = Session::open(config).await?;
    metrics::register_metrics();

    match command {
        Commands::Install { version } => install(&session, version).await?,
        Commands::Activate { version } => activate(&session, version).await?,
        Commands::Fetch { url, navigate } => fetch(&session, &url, navigate).await?,
        Commands::Caches => list_caches(&session).await?,
        Commands::Status { json } => status(&session, json)?,
        Commands::Recover => recover(&session).await,
    }

    if print_metrics {
        print!("{}", metrics::render().context("failed to render metrics")?);
    }
    Ok(())
}

async fn install(session: &Session, version: Option<String>) -> Result<()> {
    let config = session.config_for(version);
    let worker = ServiceWorker::new(&config, session.caches.clone(), session.network.clone());
    let report = worker.install().await.context("install failed")?;

    println!(
        "Installed {} into {}: cached {}, failed {}",
        worker.version(),
        worker.bucket_name(),
        report.cached.len(),
        report.failed.len()
    );
    for path in &report.failed {
        println!("  failed: {path}");
    }
    Ok(())
}

async fn activate(session: &Session, version: Option<String>) -> Result<()> {
    let container = session.container(version);
    let outcome = container.register().await.context("activation failed")?;

    println!(
        "Activated {} ({}): cached {}, failed {}",
        outcome.worker.version(),
        outcome.worker.bucket_name(),
        outcome.report.cached.len(),
        outcome.report.failed.len()
    );
    if let Some(activated) = outcome.activated {
        for name in &activated.deleted {
            println!("  deleted {name}");
        }
    }
    Ok(())
}

async fn fetch(session: &Session, url: &str, navigate: bool) -> Result<()> {
    let absolute = if url.starts_with('/') {
        Request::for_path(&session.config.cache.origin, url)?.url.to_string()
    } else {
        url.to_string()
    };
    let request = if navigate {
        Request::navigate(&absolute)?
    } else {
        Request::get(&absolute)?
    };

    // A version installed by an earlier run keeps control; only a missing
    // bucket triggers a fresh install.
    let container = session.container(None);
    if container.resume().await?.is_none() {
        container.register().await.context("worker failed to start")?;
    }

    let response = container
        .fetch(&request)
        .await
        .with_context(|| format!("fetch failed: {request}"))?;
    container.drain_background().await;

    println!("{} {}", response.status, response.status_text);
    println!("{}", String::from_utf8_lossy(&response.body));
    Ok(())
}

async fn list_caches(session: &Session) -> Result<()> {
    let buckets = session.caches.keys().await?;
    if buckets.is_empty() {
        println!("No caches.");
        return Ok(());
    }

    let current = session.config.cache.bucket_name();
    for bucket in buckets {
        let marker = if bucket == current { " (current)" } else { "" };
        println!("{bucket}{marker}");
        for url in session.caches.entries(&bucket).await? {
            println!("  {url}");
        }
    }
    Ok(())
}

fn status(session: &Session, json: bool) -> Result<()> {
    let guard = session.guard();
    let flags = session.flags();
    let last_check = session.stores.local.get(LAST_UPDATE_CHECK_KEY);

    if json {
        let value = serde_json::json!({
            "bucket": session.config.cache.bucket_name(),
            "reload_count": guard.count(),
            "reload_ceiling": guard.ceiling(),
            "reload_allowed": guard.is_reload_allowed(),
            "recovery_cooldown": flags.is_in_recovery_cooldown(),
            "recovery_attempted": flags.has_recovery_been_attempted(),
            "last_update_check": last_check,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Bucket:             {}", session.config.cache.bucket_name());
    println!("Reload count:       {}/{}", guard.count(), guard.ceiling());
    println!(
        "Reload allowed:     {}",
        if guard.is_reload_allowed() { "yes" } else { "no" }
    );
    println!(
        "Recovery cooldown:  {}",
        if flags.is_in_recovery_cooldown() { "active" } else { "none" }
    );
    println!(
        "Recovery attempted: {}",
        if flags.has_recovery_been_attempted() { "yes" } else { "no" }
    );
    println!(
        "Last update check:  {}",
        last_check.as_deref().unwrap_or("never")
    );
    Ok(())
}

async fn recover(session: &Session) {
    // Registrations live only as long as a page process, so there is
    // nothing to unregister from here.
    let recovery = Recovery::new(
        Some(session.caches.clone()),
        None,
        session.guard(),
        session.flags(),
        Arc::new(RecordingReloader::new()),
    );
    let report = recovery.perform_full_recovery().await;
    println!(
        "Recovery complete: {} caches deleted, {} registrations removed",
        report.caches_deleted, report.registrations_removed
    );
}
