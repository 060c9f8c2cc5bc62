//! Prometheus metrics for the worker.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Registry holding every worker metric.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Fetch routing
pub static FETCHES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("deeds_sw_fetches_total", "Intercepted requests by resource class"),
        &["class"],
    )
    .expect("metric creation failed")
});

pub static CACHE_HITS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("deeds_sw_cache_hits_total", "Requests answered from a cache bucket"),
        &["class"],
    )
    .expect("metric creation failed")
});

pub static CACHE_MISSES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("deeds_sw_cache_misses_total", "Cache lookups that found nothing"),
        &["class"],
    )
    .expect("metric creation failed")
});

pub static NAVIGATION_FALLBACKS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "deeds_sw_navigation_fallbacks_total",
            "Navigations served without the network (cached or offline)",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

// Cache maintenance
pub static BACKGROUND_WRITE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "deeds_sw_background_write_failures_total",
        "Best-effort cache writes that failed",
    )
    .expect("metric creation failed")
});

pub static PRECACHE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "deeds_sw_precache_failures_total",
        "Precache URLs that could not be stored during install",
    )
    .expect("metric creation failed")
});

pub static STALE_BUCKETS_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "deeds_sw_stale_buckets_deleted_total",
        "Old-version cache buckets removed on activation",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(FETCHES_TOTAL.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_HITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_MISSES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(NAVIGATION_FALLBACKS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BACKGROUND_WRITE_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PRECACHE_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(STALE_BUCKETS_DELETED.clone()))
            .expect("metric registration failed");
    });
}

/// Render the registry in the Prometheus text exposition format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
