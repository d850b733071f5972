//! HTTP client abstraction for testability.
//!
//! Backends talk to the network through [`HttpFetch`] so tests can inject
//! scripted responses. The production implementation is [`ReqwestFetch`].

use super::types::RemoteError;
use std::future::Future;
use std::time::Duration;
use tracing::{trace, warn};

/// Default User-Agent for requests. Some CDN edges reject requests
/// without one.
const DEFAULT_USER_AGENT: &str = concat!("satloop/", env!("CARGO_PKG_VERSION"));

/// Async HTTP operations needed by the remote backends.
pub trait HttpFetch: Send + Sync {
    /// Performs a GET, returning the body on 2xx.
    fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, RemoteError>> + Send;

    /// Performs a HEAD, returning `Ok(true)` on 2xx and `Ok(false)` on 404.
    fn head(&self, url: &str) -> impl Future<Output = Result<bool, RemoteError>> + Send;
}

/// Production HTTP client backed by reqwest.
///
/// Tuned for parallel imagery download: pooled keep-alive connections and
/// TCP nodelay, mirroring the remote store's transfer profile.
#[derive(Clone)]
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    /// Creates a client with the default 30 second timeout.
    pub fn new() -> Result<Self, RemoteError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Creates a client with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| RemoteError::Fatal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn classify(status: reqwest::StatusCode, url: &str) -> RemoteError {
        if status == reqwest::StatusCode::NOT_FOUND {
            RemoteError::NotFound
        } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            RemoteError::RateLimited(format!("HTTP 429 from {}", url))
        } else if status.is_server_error() {
            RemoteError::Transient(format!("HTTP {} from {}", status, url))
        } else if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            RemoteError::Fatal(format!("HTTP {} from {} (check credentials)", status, url))
        } else {
            RemoteError::Transient(format!("HTTP {} from {}", status, url))
        }
    }

    fn classify_transport(err: reqwest::Error, url: &str) -> RemoteError {
        if err.is_timeout() || err.is_connect() {
            RemoteError::Transient(format!("request to {} failed: {}", url, err))
        } else {
            RemoteError::Fatal(format!("request to {} failed: {}", url, err))
        }
    }
}

impl HttpFetch for ReqwestFetch {
    async fn get(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        trace!(url, "HTTP GET");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::classify_transport(e, url))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "HTTP error status");
            return Err(Self::classify(status, url));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Transient(format!("failed to read body from {}: {}", url, e)))?;
        trace!(url, bytes = bytes.len(), "HTTP body read");
        Ok(bytes.to_vec())
    }

    async fn head(&self, url: &str) -> Result<bool, RemoteError> {
        trace!(url, "HTTP HEAD");

        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| Self::classify_transport(e, url))?;

        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(Self::classify(status, url))
        }
    }
}
