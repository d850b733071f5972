//! Remote store capability: existence checks and resilient downloads.
//!
//! Two backends implement the single [`RemoteStore`] trait — an
//! object-storage bucket ([`ObjectStoreBackend`]) and a CDN mirror
//! ([`CdnBackend`]) — sharing one retry policy and one HTTP abstraction.
//! Both take a canonical [`crate::product::ProductKey`]; there are no
//! per-call-site parameter variants.

mod cdn;
mod http;
mod object_store;
mod retry;
mod types;

pub use cdn::CdnBackend;
pub use http::{HttpFetch, ReqwestFetch};
pub use object_store::ObjectStoreBackend;
pub use retry::RetryPolicy;
pub use types::{FetchError, FetchReceipt, RemoteError, RemoteStore};

#[cfg(test)]
pub use http::tests::MockHttpFetch;

use std::io;
use std::path::{Path, PathBuf};

/// Writes `bytes` to `dest` via a temporary sibling and an atomic rename.
///
/// A crash mid-download can leave a stale `.part` file behind but never a
/// truncated file at `dest`, so the inventory only ever sees complete
/// objects.
pub(crate) async fn write_atomic(dest: &Path, bytes: &[u8]) -> io::Result<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let part = part_path(dest);
    tokio::fs::write(&part, bytes).await?;
    tokio::fs::rename(&part, dest).await?;
    Ok(bytes.len() as u64)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Scripted in-memory [`RemoteStore`] for tests above the remote layer.
///
/// Each key carries one canned response: bytes to deliver or a permanent
/// absence. Unknown keys report not found.
#[cfg(test)]
pub(crate) mod tests_support {
    use super::{write_atomic, FetchError, FetchReceipt, RemoteStore};
    use crate::product::ProductKey;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    pub struct ScriptedRemote {
        responses: Mutex<HashMap<ProductKey, Option<Vec<u8>>>>,
    }

    impl ScriptedRemote {
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
            }
        }

        /// Key exists remotely and fetches deliver `bytes`.
        pub fn script_ok(&mut self, key: &ProductKey, bytes: Vec<u8>) {
            self.responses.lock().unwrap().insert(*key, Some(bytes));
        }

        /// Key is permanently absent from the remote.
        pub fn script_not_found(&mut self, key: &ProductKey) {
            self.responses.lock().unwrap().insert(*key, None);
        }
    }

    impl RemoteStore for ScriptedRemote {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn exists(&self, key: &ProductKey) -> Result<bool, FetchError> {
            Ok(matches!(
                self.responses.lock().unwrap().get(key),
                Some(Some(_))
            ))
        }

        async fn fetch(&self, key: &ProductKey, dest: &Path) -> Result<FetchReceipt, FetchError> {
            let bytes = match self.responses.lock().unwrap().get(key) {
                Some(Some(bytes)) => bytes.clone(),
                _ => return Err(FetchError::NotFound),
            };
            let written = write_atomic(dest, &bytes).await?;
            Ok(FetchReceipt {
                bytes_written: written,
                attempts: 1,
            })
        }
    }
}
