//! Intercepted requests and the responses served for them.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Fetch mode of an intercepted request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level page navigation.
    Navigate,
    SameOrigin,
    #[default]
    NoCors,
    Cors,
}

/// What the requested resource will be used as.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    #[default]
    Empty,
}

/// A request intercepted by the worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub url: Url,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub mode: RequestMode,
    #[serde(default)]
    pub destination: Destination,
}

fn default_method() -> String {
    "GET".to_string()
}

impl Request {
    /// A plain subresource GET for `url`.
    pub fn get(url: &str) -> crate::Result<Self> {
        let url = Url::parse(url).map_err(|e| crate::Error::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self {
            url,
            method: default_method(),
            mode: RequestMode::default(),
            destination: Destination::default(),
        })
    }

    /// A top-level document navigation to `url`.
    pub fn navigate(url: &str) -> crate::Result<Self> {
        Ok(Self {
            mode: RequestMode::Navigate,
            destination: Destination::Document,
            ..Self::get(url)?
        })
    }

    /// Resolve `path` against `origin` and build a GET for it.
    pub fn for_path(origin: &str, path: &str) -> crate::Result<Self> {
        let base =
            Url::parse(origin).map_err(|e| crate::Error::InvalidUrl(format!("{origin}: {e}")))?;
        let url = base
            .join(path)
            .map_err(|e| crate::Error::InvalidUrl(format!("{path}: {e}")))?;
        Self::get(url.as_str())
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Key under which a response for this request is cached.
    pub fn cache_key(&self) -> &str {
        self.url.as_str()
    }

    /// Whether the browser is asking for an HTML document.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate || self.destination == Destination::Document
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Body served when a navigation fails and nothing is cached.
pub const OFFLINE_BODY: &str = "Offline - please check your connection";

/// A response as stored in or served from a cache bucket.
///
/// Cloning is cheap: the body is reference counted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, status_text: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// 200 OK with the given body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, "OK", body)
    }

    /// The synthetic response for an unreachable navigation with no cache entry.
    pub fn offline() -> Self {
        Self::new(503, "Service Unavailable", OFFLINE_BODY)
            .with_header("Content-Type", "text/plain")
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_detection() {
        let nav = Request::navigate("https://deeds.example.test/").unwrap();
        assert!(nav.is_navigation());

        let doc = Request::get("https://deeds.example.test/feed")
            .unwrap()
            .with_destination(Destination::Document);
        assert!(doc.is_navigation());

        let img = Request::get("https://deeds.example.test/assets/logo.png")
            .unwrap()
            .with_destination(Destination::Image);
        assert!(!img.is_navigation());
    }

    #[test]
    fn test_for_path_resolves_against_origin() {
        let req = Request::for_path("https://deeds.example.test", "/index.html").unwrap();
        assert_eq!(req.cache_key(), "https://deeds.example.test/index.html");
        assert_eq!(req.path(), "/index.html");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(matches!(
            Request::get("not a url"),
            Err(crate::Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_offline_response_shape() {
        let resp = Response::offline();
        assert_eq!(resp.status, 503);
        assert_eq!(resp.status_text, "Service Unavailable");
        assert_eq!(resp.header("content-type"), Some("text/plain"));
        assert_eq!(resp.body.as_ref(), OFFLINE_BODY.as_bytes());
        assert!(!resp.is_ok());
    }

    #[test]
    fn test_ok_range() {
        assert!(Response::new(204, "No Content", "").is_ok());
        assert!(!Response::new(304, "Not Modified", "").is_ok());
        assert!(!Response::new(404, "Not Found", "").is_ok());
    }
}
