//! Remote store trait and error taxonomy.

use crate::product::ProductKey;
use std::future::Future;
use std::path::Path;
use thiserror::Error;

/// Classification of a single remote attempt.
///
/// [`RemoteError::RateLimited`] and [`RemoteError::Transient`] are retried
/// per the backoff policy; [`RemoteError::NotFound`] and
/// [`RemoteError::Fatal`] surface immediately.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    /// Object does not exist (404-equivalent). Never retried.
    #[error("object not found")]
    NotFound,

    /// Remote signalled a rate limit (429-equivalent)
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Network timeout or 5xx-equivalent server error
    #[error("transient error: {0}")]
    Transient(String),

    /// Malformed credentials or other non-recoverable condition
    #[error("fatal remote error: {0}")]
    Fatal(String),
}

impl RemoteError {
    /// Returns true if the retry policy may re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Transient(_))
    }
}

/// Terminal outcome of a fetch or existence check after retry handling.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Object does not exist remotely; recorded as a permanent gap
    #[error("object not found")]
    NotFound,

    /// Retries exhausted; per-key failure, not fatal to the batch
    #[error("fetch failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    /// Non-retryable remote condition
    #[error("fatal remote error: {0}")]
    Fatal(String),

    /// Local filesystem error while landing the download
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a successful fetch produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchReceipt {
    /// Bytes written to the destination file
    pub bytes_written: u64,
    /// Attempts made, including the successful one
    pub attempts: u32,
}

/// Capability to check existence of and download a remote object.
///
/// `exists` and `fetch` take the canonical [`ProductKey`] and nothing
/// else; the backend derives its own locator. Implementations apply the
/// shared retry policy internally, so callers see only terminal outcomes.
pub trait RemoteStore: Send + Sync {
    /// Returns the backend's name for logging.
    fn name(&self) -> &str;

    /// Checks whether the object for `key` exists remotely.
    fn exists(&self, key: &ProductKey) -> impl Future<Output = Result<bool, FetchError>> + Send;

    /// Downloads the object for `key` to `dest`, returning bytes written
    /// and the attempt count.
    ///
    /// The file appears at `dest` atomically: a failed or interrupted
    /// fetch never leaves a partial file visible.
    fn fetch(
        &self,
        key: &ProductKey,
        dest: &Path,
    ) -> impl Future<Output = Result<FetchReceipt, FetchError>> + Send;
}
