//! Network access over HTTP.

use async_trait::async_trait;
use deeds_core::{Request, Response};
use deeds_worker::{Network, NetworkError};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`Network`] backed by a `reqwest` client.
#[derive(Clone)]
pub struct HttpNetwork {
    http: reqwest::Client,
}

impl HttpNetwork {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let url = request.url.to_string();
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            NetworkError::Failed {
                url: url.clone(),
                message: format!("invalid method {}: {e}", request.method),
            }
        })?;

        let mut builder = self.http.request(method, request.url.clone());
        if request.is_navigation() {
            builder = builder.header("Accept", "text/html");
        }

        let response = builder.send().await.map_err(|e| classify_error(&url, e))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_error(&url, e))?;

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

fn classify_error(url: &str, err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_connect() {
        NetworkError::Offline
    } else {
        NetworkError::Failed {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
