//! High-level facade over the reconciliation and interpolation pipelines.
//!
//! [`SatloopService`] wires the inventory, remote backend, tile cache and
//! worker pools from one [`SatloopConfig`] and exposes the three
//! operations callers need: reconcile a window, report coverage, and
//! interpolate the frames a window holds.
//!
//! # Example
//!
//! ```ignore
//! use satloop::config::SatloopConfig;
//! use satloop::remote::{CdnBackend, ReqwestFetch, RetryPolicy};
//! use satloop::service::SatloopService;
//!
//! let config = SatloopConfig::new("/var/lib/satloop");
//! let remote = CdnBackend::new(
//!     ReqwestFetch::new()?,
//!     config.cdn_base_url(),
//!     RetryPolicy::default(),
//! );
//! let service = SatloopService::new(config, remote)?;
//! ```

use crate::batch::{BatchConfig, BatchManifest, BatchQueue, EmittedFrame};
use crate::config::SatloopConfig;
use crate::frame::{Frame, TileError};
use crate::interp::Interpolator;
use crate::inventory::{Inventory, RecordStatus, StoreError};
use crate::reconcile::{ReconcileManager, ReconcileManifest, ReconcileRequest};
use crate::remote::RemoteStore;
use crate::tilecache::{TileCache, TileCacheError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors surfaced by the service facade.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    /// Inventory access failed
    #[error("inventory error: {0}")]
    Store(#[from] StoreError),

    /// Tile cache could not be opened
    #[error("tile cache error: {0}")]
    TileCache(#[from] TileCacheError),

    /// A cached frame could not be read
    #[error("frame error: {0}")]
    Frame(#[from] TileError),

    /// Fewer than two frames were available for interpolation
    #[error("interpolation needs at least 2 fresh frames, found {found}")]
    InsufficientFrames {
        /// Fresh frames found in the window
        found: usize,
    },
}

/// Coverage of one product timeline window against the local inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageReport {
    /// Keys the cadence grid expects in the window
    pub expected: usize,
    /// Keys with a Fresh local record
    pub fresh: usize,
    /// Keys whose last fetch ended Failed
    pub failed: usize,
    /// Keys with no usable local record
    pub missing: usize,
    /// Of the missing keys, how many the remote reports available.
    /// `None` when the remote was not probed.
    pub remote_available: Option<usize>,
}

impl CoverageReport {
    /// Returns true when every expected key is locally Fresh.
    pub fn is_complete(&self) -> bool {
        self.fresh == self.expected
    }
}

/// Facade wiring the pipeline components behind three operations.
pub struct SatloopService<R> {
    config: SatloopConfig,
    remote: Arc<R>,
    inventory: Arc<Inventory>,
}

impl<R: RemoteStore + 'static> SatloopService<R> {
    /// Opens the durable state under the configured cache root.
    pub fn new(config: SatloopConfig, remote: R) -> Result<Self, ServiceError> {
        std::fs::create_dir_all(config.storage().cache_root())
            .map_err(StoreError::Io)?;
        let inventory = Inventory::open(&config.storage().inventory_path())?;
        info!(
            cache_root = %config.storage().cache_root().display(),
            remote = remote.name(),
            "service ready"
        );
        Ok(Self {
            config,
            remote: Arc::new(remote),
            inventory: Arc::new(inventory),
        })
    }

    /// The durable inventory backing this service.
    pub fn inventory(&self) -> &Arc<Inventory> {
        &self.inventory
    }

    /// Fills gaps in one timeline window; returns a total outcome set.
    pub async fn reconcile(
        &self,
        request: &ReconcileRequest,
        cancel: &CancellationToken,
    ) -> Result<ReconcileManifest, ServiceError> {
        let manager = ReconcileManager::new(
            Arc::clone(&self.remote),
            Arc::clone(&self.inventory),
            self.config.storage().cache_root().to_path_buf(),
            self.config.fetch().concurrency(),
        );
        Ok(manager.reconcile(request, cancel).await?)
    }

    /// Reports local coverage of a window without fetching anything.
    ///
    /// With `probe_remote` set, each missing key is checked against the
    /// remote so callers can distinguish fillable gaps from permanent
    /// ones.
    pub async fn status(
        &self,
        request: &ReconcileRequest,
        probe_remote: bool,
    ) -> Result<CoverageReport, ServiceError> {
        let expected = request.expected_keys();
        let mut fresh = 0;
        let mut failed = 0;
        let mut missing_keys = Vec::new();

        for key in &expected {
            match self.inventory.lookup(key)? {
                Some(record) if record.status == RecordStatus::Fresh => fresh += 1,
                Some(record) if record.status == RecordStatus::Failed => {
                    failed += 1;
                    missing_keys.push(*key);
                }
                _ => missing_keys.push(*key),
            }
        }

        let missing = missing_keys.len();
        let remote_available = if probe_remote {
            let mut available = 0;
            for key in &missing_keys {
                match self.remote.exists(key).await {
                    Ok(true) => available += 1,
                    Ok(false) => {}
                    Err(err) => warn!(key = %key, error = %err, "remote probe failed"),
                }
            }
            Some(available)
        } else {
            None
        };

        Ok(CoverageReport {
            expected: expected.len(),
            fresh,
            failed,
            missing,
            remote_available,
        })
    }

    /// Interpolates between the Fresh frames of a window.
    ///
    /// Frames are loaded in timestamp order and every consecutive pair is
    /// interpolated; in-between frames arrive on `emit` in input order.
    /// Keys without a Fresh record are skipped, so a gap in coverage
    /// means the pair spanning it blends across a longer interval.
    pub async fn interpolate<I: Interpolator + 'static>(
        &self,
        request: &ReconcileRequest,
        interpolator: Arc<I>,
        emit: mpsc::Sender<EmittedFrame>,
        cancel: &CancellationToken,
    ) -> Result<BatchManifest, ServiceError> {
        let band = request
            .band
            .unwrap_or_else(|| request.product.default_band());
        let records = self.inventory.range(
            request.satellite,
            request.product,
            request.start,
            request.end,
        )?;

        let mut frames = Vec::new();
        for record in records
            .iter()
            .filter(|r| r.status == RecordStatus::Fresh && r.key.band == band)
        {
            frames.push(Frame::load(&record.local_path)?);
        }

        if frames.len() < 2 {
            return Err(ServiceError::InsufficientFrames {
                found: frames.len(),
            });
        }
        info!(frames = frames.len(), model = interpolator.model_id(), "interpolating window");

        let cache = Arc::new(TileCache::open(
            self.config.storage().tile_cache_root(),
            self.config.storage().tile_cache_bytes(),
        )?);
        let queue = BatchQueue::new(
            interpolator,
            cache,
            BatchConfig {
                tile_size: self.config.interp().tile_size(),
                overlap: self.config.interp().overlap(),
                concurrency: self.config.interp().concurrency(),
            },
        );
        Ok(queue.run(frames, emit, cancel).await)
    }
}
