//! Resource classification for fetch routing.

use crate::config::RouteConfig;
use crate::request::Request;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which caching strategy applies to a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    /// Script or stylesheet bundle: network only, never cached.
    Bundle,
    /// HTML document: network first, cache fallback, synthetic offline page.
    Navigation,
    /// Static asset directory: cache first, network fill.
    StaticAsset,
    /// Everything else: network only.
    Passthrough,
}

impl ResourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bundle => "bundle",
            Self::Navigation => "navigation",
            Self::StaticAsset => "static_asset",
            Self::Passthrough => "passthrough",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a request. Rules are checked in order, so a `.js` file under a
/// static prefix is still a bundle.
pub fn classify(request: &Request, routes: &RouteConfig) -> ResourceClass {
    let path = request.path();

    if routes
        .bundle_extensions
        .iter()
        .any(|ext| path.ends_with(ext.as_str()))
    {
        return ResourceClass::Bundle;
    }

    if request.is_navigation() {
        return ResourceClass::Navigation;
    }

    if routes
        .static_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
    {
        return ResourceClass::StaticAsset;
    }

    ResourceClass::Passthrough
}
