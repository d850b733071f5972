//! CDN backend: HTTP access to a mirror that serves the same key layout.

use super::http::HttpFetch;
use super::retry::RetryPolicy;
use super::types::{FetchError, FetchReceipt, RemoteStore};
use super::write_atomic;
use crate::product::ProductKey;
use crate::timeindex;
use std::path::Path;
use tracing::debug;

/// Remote store over a CDN mirror of the imagery archive.
///
/// Behaves identically to the object-store backend apart from the base
/// URL; edges are more likely to answer 429, which the shared retry
/// policy already treats as retryable.
pub struct CdnBackend<C> {
    http: C,
    base_url: String,
    policy: RetryPolicy,
}

impl<C: HttpFetch> CdnBackend<C> {
    /// Creates a backend for the given CDN base URL.
    pub fn new(http: C, base_url: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            policy,
        }
    }
}

impl<C: HttpFetch> RemoteStore for CdnBackend<C> {
    fn name(&self) -> &str {
        "cdn"
    }

    async fn exists(&self, key: &ProductKey) -> Result<bool, FetchError> {
        let url = timeindex::cdn_url(&self.base_url, key);
        let (found, _) = self.policy.run("head", || self.http.head(&url)).await?;
        Ok(found)
    }

    async fn fetch(&self, key: &ProductKey, dest: &Path) -> Result<FetchReceipt, FetchError> {
        let url = timeindex::cdn_url(&self.base_url, key);
        let (bytes, attempts) = self.policy.run("fetch", || self.http.get(&url)).await?;
        let bytes_written = write_atomic(dest, &bytes).await?;

        debug!(%key, url, bytes_written, attempts, "object fetched from cdn");
        Ok(FetchReceipt {
            bytes_written,
            attempts,
        })
    }
}
