//! Object-storage backend: anonymous HTTP access to a bucket endpoint.

use super::http::HttpFetch;
use super::retry::RetryPolicy;
use super::types::{FetchError, FetchReceipt, RemoteStore};
use super::write_atomic;
use crate::product::ProductKey;
use crate::timeindex;
use std::path::Path;
use tracing::debug;

/// Remote store over a public object-storage bucket.
///
/// Objects are addressed as `{endpoint}/{remote_key}`; existence checks
/// use HEAD (the bucket's list/head semantics), downloads use GET.
pub struct ObjectStoreBackend<C> {
    http: C,
    endpoint: String,
    policy: RetryPolicy,
}

impl<C: HttpFetch> ObjectStoreBackend<C> {
    /// Creates a backend for the given bucket endpoint, e.g.
    /// `https://imagery-archive.s3.amazonaws.com`.
    pub fn new(http: C, endpoint: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            policy,
        }
    }

    fn url(&self, key: &ProductKey) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            timeindex::remote_key(key)
        )
    }
}

impl<C: HttpFetch> RemoteStore for ObjectStoreBackend<C> {
    fn name(&self) -> &str {
        "object-store"
    }

    async fn exists(&self, key: &ProductKey) -> Result<bool, FetchError> {
        let url = self.url(key);
        let (found, _) = self.policy.run("head", || self.http.head(&url)).await?;
        Ok(found)
    }

    async fn fetch(&self, key: &ProductKey, dest: &Path) -> Result<FetchReceipt, FetchError> {
        let url = self.url(key);
        let (bytes, attempts) = self.policy.run("fetch", || self.http.get(&url)).await?;
        let bytes_written = write_atomic(dest, &bytes).await?;

        debug!(%key, url, bytes_written, attempts, "object fetched");
        Ok(FetchReceipt {
            bytes_written,
            attempts,
        })
    }
}
