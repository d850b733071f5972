//! Gap detection and concurrent fetch of missing products.
//!
//! A reconciliation run moves through three phases:
//!
//! 1. **Planning** — derive the expected timeline and diff it against the
//!    inventory; keys with a Fresh record need no work.
//! 2. **Fetching** — dispatch each gap to the remote store through a
//!    bounded worker pool, at most once per key per run.
//! 3. **Settled** — every key has a terminal outcome; the full manifest
//!    is returned, never a silent subset.
//!
//! Per-key failures (not found, retries exhausted) are recorded and do
//! not abort sibling fetches. Only an inventory failure is fatal: without
//! a durable inventory no reconciliation can proceed safely.

mod manifest;

pub use manifest::{FetchOutcome, ReconcileManifest};

use crate::inventory::{Inventory, LocalRecord, RecordStatus, StoreError};
use crate::product::{Band, ProductKey, ProductType, Satellite};
use crate::remote::{FetchError, RemoteStore};
use crate::timeindex;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What to reconcile: one product timeline over a half-open window.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileRequest {
    /// Which satellite
    pub satellite: Satellite,
    /// Which scan sector
    pub product: ProductType,
    /// Window start (inclusive, aligned up to the cadence grid)
    pub start: DateTime<Utc>,
    /// Window end (exclusive)
    pub end: DateTime<Utc>,
    /// Band override; the product default applies when `None`
    pub band: Option<Band>,
}

impl ReconcileRequest {
    /// Expands the request into the expected key set, in timestamp order.
    pub fn expected_keys(&self) -> Vec<ProductKey> {
        let band = self.band.unwrap_or_else(|| self.product.default_band());
        timeindex::expected_timestamps(self.product, self.start, self.end)
            .into_iter()
            .map(|ts| ProductKey::new(self.satellite, self.product, ts, band))
            .collect()
    }
}

/// Drives reconciliation runs against one remote backend and one inventory.
///
/// The manager is the only component that mutates the inventory. Fetch
/// concurrency is bounded by a semaphore sized for the remote's rate
/// limits, independent of the interpolation pool.
pub struct ReconcileManager<R> {
    remote: Arc<R>,
    inventory: Arc<Inventory>,
    cache_root: PathBuf,
    concurrency: usize,
}

impl<R: RemoteStore + 'static> ReconcileManager<R> {
    /// Creates a manager.
    ///
    /// `concurrency` bounds simultaneous fetches; it must be at least 1.
    pub fn new(
        remote: Arc<R>,
        inventory: Arc<Inventory>,
        cache_root: PathBuf,
        concurrency: usize,
    ) -> Self {
        assert!(concurrency >= 1, "fetch concurrency must be >= 1");
        Self {
            remote,
            inventory,
            cache_root,
            concurrency,
        }
    }

    /// Runs one reconciliation pass and returns the total outcome set.
    ///
    /// Idempotent: a second run over an unchanged range finds no gaps and
    /// only re-attempts keys that previously ended Failed or NotFound.
    /// Cancellation stops dispatching new fetches, lets in-flight ones
    /// finish, and marks undispatched keys Skipped.
    pub async fn reconcile(
        &self,
        request: &ReconcileRequest,
        cancel: &CancellationToken,
    ) -> Result<ReconcileManifest, StoreError> {
        // Planning
        let expected = request.expected_keys();
        info!(
            satellite = %request.satellite,
            product = %request.product,
            expected = expected.len(),
            "reconcile: planning"
        );

        let mut manifest = ReconcileManifest::new();
        let mut gaps = Vec::new();
        for key in expected {
            match self.inventory.lookup(&key)? {
                Some(record) if record.status == RecordStatus::Fresh => {
                    manifest.insert(key, FetchOutcome::AlreadyPresent);
                }
                _ => gaps.push(key),
            }
        }

        info!(gaps = gaps.len(), "reconcile: fetching");

        // Fetching: each gap dispatched exactly once, bounded by the pool.
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<Result<(ProductKey, FetchOutcome), StoreError>> = JoinSet::new();

        for key in gaps {
            let remote = Arc::clone(&self.remote);
            let inventory = Arc::clone(&self.inventory);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let dest = timeindex::local_path(&self.cache_root, &key);

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("fetch semaphore closed");

                if cancel.is_cancelled() {
                    return Ok((key, FetchOutcome::Skipped));
                }

                match remote.fetch(&key, &dest).await {
                    Ok(receipt) => {
                        let checksum = checksum_file(&dest).await?;
                        inventory.upsert(&LocalRecord::fresh(
                            key,
                            dest,
                            receipt.bytes_written,
                            checksum,
                        ))?;
                        debug!(%key, attempts = receipt.attempts, "gap filled");
                        Ok((
                            key,
                            FetchOutcome::Fetched {
                                bytes_written: receipt.bytes_written,
                                attempts: receipt.attempts,
                            },
                        ))
                    }
                    Err(FetchError::NotFound) => {
                        debug!(%key, "remote object missing; permanent gap");
                        Ok((key, FetchOutcome::NotFound))
                    }
                    Err(err) => {
                        let attempts = match &err {
                            FetchError::Exhausted { attempts, .. } => *attempts,
                            _ => 1,
                        };
                        warn!(%key, error = %err, "fetch failed; key retained for next run");
                        inventory.upsert(&LocalRecord::failed(key, dest))?;
                        Ok((
                            key,
                            FetchOutcome::Failed {
                                attempts,
                                error: err.to_string(),
                            },
                        ))
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (key, outcome) = joined.expect("fetch task panicked")?;
            manifest.insert(key, outcome);
        }

        // Settled
        info!(
            already_present = manifest.already_present(),
            fetched = manifest.fetched(),
            not_found = manifest.not_found(),
            failed = manifest.failed(),
            skipped = manifest.skipped(),
            "reconcile: settled"
        );
        Ok(manifest)
    }
}

/// Hex-encoded sha256 of a file's contents.
async fn checksum_file(path: &std::path::Path) -> Result<String, StoreError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{FetchReceipt, RemoteError};
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted remote store for manager tests.
    ///
    /// Tracks concurrent dispatch and per-key call counts so tests can
    /// assert the at-most-once and bounded-pool properties.
    struct ScriptedRemote {
        /// Per-key canned responses; keys not listed succeed with `b"img"`.
        responses: Mutex<HashMap<ProductKey, Vec<Result<Vec<u8>, RemoteError>>>>,
        calls_per_key: Mutex<HashMap<ProductKey, usize>>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl ScriptedRemote {
        fn ok() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                calls_per_key: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }
        }

        fn script(self, key: ProductKey, responses: Vec<Result<Vec<u8>, RemoteError>>) -> Self {
            self.responses.lock().unwrap().insert(key, responses);
            self
        }

        fn calls_for(&self, key: &ProductKey) -> usize {
            *self.calls_per_key.lock().unwrap().get(key).unwrap_or(&0)
        }
    }

    impl RemoteStore for ScriptedRemote {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn exists(&self, key: &ProductKey) -> Result<bool, FetchError> {
            let responses = self.responses.lock().unwrap();
            match responses.get(key).and_then(|r| r.first()) {
                Some(Err(RemoteError::NotFound)) => Ok(false),
                _ => Ok(true),
            }
        }

        async fn fetch(&self, key: &ProductKey, dest: &Path) -> Result<FetchReceipt, FetchError> {
            *self.calls_per_key.lock().unwrap().entry(*key).or_insert(0) += 1;

            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            // One attempt-loop per call, mirroring backend retry handling
            let responses = self
                .responses
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .unwrap_or_else(|| vec![Ok(b"img".to_vec())]);

            let mut attempts = 0;
            let mut last = None;
            for response in responses {
                attempts += 1;
                match response {
                    Ok(bytes) => {
                        let written = crate::remote::write_atomic(dest, &bytes).await?;
                        return Ok(FetchReceipt {
                            bytes_written: written,
                            attempts,
                        });
                    }
                    Err(RemoteError::NotFound) => return Err(FetchError::NotFound),
                    Err(err) => last = Some(err),
                }
            }
            Err(FetchError::Exhausted {
                attempts,
                last_error: last
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "empty script".into()),
            })
        }
    }

    fn ts(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 12, m, 0).unwrap()
    }

    fn request() -> ReconcileRequest {
        ReconcileRequest {
            satellite: Satellite::GoesEast,
            product: ProductType::Conus,
            start: ts(0),
            end: ts(20),
            band: None,
        }
    }

    fn manager(remote: ScriptedRemote, temp: &TempDir) -> ReconcileManager<ScriptedRemote> {
        ReconcileManager::new(
            Arc::new(remote),
            Arc::new(Inventory::open_in_memory().unwrap()),
            temp.path().to_path_buf(),
            2,
        )
    }

    #[tokio::test]
    async fn test_fetches_all_gaps_when_inventory_empty() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(ScriptedRemote::ok(), &temp);

        let manifest = mgr
            .reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(manifest.len(), 4); // 12:00, 12:05, 12:10, 12:15
        assert_eq!(manifest.fetched(), 4);
        assert!(manifest.is_complete());
        assert_eq!(mgr.inventory.len().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_second_run_finds_no_gaps() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(ScriptedRemote::ok(), &temp);
        let cancel = CancellationToken::new();

        mgr.reconcile(&request(), &cancel).await.unwrap();
        let second = mgr.reconcile(&request(), &cancel).await.unwrap();

        assert_eq!(second.already_present(), 4);
        assert_eq!(second.fetched(), 0);
        // No key was dispatched a second time
        for (key, _) in second.iter() {
            assert_eq!(mgr.remote.calls_for(key), 1);
        }
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let temp = TempDir::new().unwrap();
        let bad_key = ProductKey::with_default_band(Satellite::GoesEast, ProductType::Conus, ts(5));
        let remote = ScriptedRemote::ok().script(
            bad_key,
            vec![
                Err(RemoteError::Transient("503".into())),
                Err(RemoteError::Transient("503".into())),
            ],
        );
        let mgr = manager(remote, &temp);

        let manifest = mgr
            .reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(manifest.len(), 4);
        assert_eq!(manifest.fetched(), 3);
        assert_eq!(manifest.failed(), 1);
        assert!(matches!(
            manifest.get(&bad_key),
            Some(FetchOutcome::Failed { .. })
        ));
        // Failed key retained in the inventory, not silently dropped
        assert_eq!(
            mgr.inventory.lookup(&bad_key).unwrap().unwrap().status,
            RecordStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_failed_key_reattempted_next_run() {
        let temp = TempDir::new().unwrap();
        let bad_key = ProductKey::with_default_band(Satellite::GoesEast, ProductType::Conus, ts(5));
        // Run 1: every attempt at the key fails with a transient error
        let remote = Arc::new(ScriptedRemote::ok().script(
            bad_key,
            vec![
                Err(RemoteError::Transient("503".into())),
                Err(RemoteError::Transient("503".into())),
            ],
        ));
        let mgr = ReconcileManager::new(
            Arc::clone(&remote),
            Arc::new(Inventory::open_in_memory().unwrap()),
            temp.path().to_path_buf(),
            2,
        );
        let cancel = CancellationToken::new();

        let first = mgr.reconcile(&request(), &cancel).await.unwrap();
        assert_eq!(first.failed(), 1);
        assert_eq!(first.fetched(), 3);

        // Upstream recovers; re-running only re-attempts the failed key
        remote
            .responses
            .lock()
            .unwrap()
            .insert(bad_key, vec![Ok(b"late".to_vec())]);
        let second = mgr.reconcile(&request(), &cancel).await.unwrap();
        assert_eq!(second.already_present(), 3);
        assert_eq!(second.fetched(), 1);
        assert!(second.is_complete());
    }

    #[tokio::test]
    async fn test_not_found_is_permanent_gap() {
        let temp = TempDir::new().unwrap();
        let missing = ProductKey::with_default_band(Satellite::GoesEast, ProductType::Conus, ts(10));
        let remote = ScriptedRemote::ok().script(missing, vec![Err(RemoteError::NotFound)]);
        let mgr = manager(remote, &temp);

        let manifest = mgr
            .reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(manifest.not_found(), 1);
        assert_eq!(manifest.fetched(), 3);
        // NotFound leaves no inventory record
        assert!(mgr.inventory.lookup(&missing).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_checksum_recorded_on_fetch() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(ScriptedRemote::ok(), &temp);

        mgr.reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();

        let key = ProductKey::with_default_band(Satellite::GoesEast, ProductType::Conus, ts(0));
        let record = mgr.inventory.lookup(&key).unwrap().unwrap();
        assert_eq!(record.checksum, hex::encode(Sha256::digest(b"img")));
        assert_eq!(record.size_bytes, 3);
        assert!(record.local_path.exists());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let temp = TempDir::new().unwrap();
        let mgr = ReconcileManager::new(
            Arc::new(ScriptedRemote::ok()),
            Arc::new(Inventory::open_in_memory().unwrap()),
            temp.path().to_path_buf(),
            2,
        );
        let wide = ReconcileRequest {
            end: ts(59),
            ..request()
        };

        mgr.reconcile(&wide, &CancellationToken::new())
            .await
            .unwrap();

        assert!(mgr.remote.peak_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancellation_skips_undispatched_keys() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(ScriptedRemote::ok(), &temp);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let manifest = mgr.reconcile(&request(), &cancel).await.unwrap();

        // Manifest still total: every expected key has an outcome
        assert_eq!(manifest.len(), 4);
        assert_eq!(manifest.skipped(), 4);
        assert!(mgr.inventory.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_band_override() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(ScriptedRemote::ok(), &temp);
        let req = ReconcileRequest {
            band: Some(Band(8)),
            ..request()
        };

        let manifest = mgr
            .reconcile(&req, &CancellationToken::new())
            .await
            .unwrap();

        for (key, _) in manifest.iter() {
            assert_eq!(key.band, Band(8));
        }
    }
}
