//! Integration tests for the reconcile-then-interpolate pipeline.
//!
//! These tests verify the complete workflow through the service facade:
//! - Gap detection against a durable inventory
//! - Fetching with at-most-once semantics per run
//! - Coverage reporting before and after reconciliation
//! - Tiled interpolation over the reconciled frames

use chrono::{TimeZone, Utc};
use image::RgbaImage;
use satloop::config::SatloopConfig;
use satloop::interp::BlendInterpolator;
use satloop::product::{ProductKey, ProductType, Satellite};
use satloop::reconcile::{FetchOutcome, ReconcileRequest};
use satloop::remote::{FetchError, FetchReceipt, RemoteStore};
use satloop::service::SatloopService;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Helpers
// =============================================================================

/// In-memory remote whose holdings can change between reconcile runs.
struct MutableRemote {
    objects: Arc<Mutex<HashMap<ProductKey, Vec<u8>>>>,
    calls: Arc<Mutex<HashMap<ProductKey, usize>>>,
}

impl MutableRemote {
    fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Handle for mutating holdings after the service takes ownership.
    fn objects(&self) -> Arc<Mutex<HashMap<ProductKey, Vec<u8>>>> {
        Arc::clone(&self.objects)
    }

    /// Handle for reading per-key fetch counts after the service takes
    /// ownership.
    fn calls(&self) -> Arc<Mutex<HashMap<ProductKey, usize>>> {
        Arc::clone(&self.calls)
    }
}

impl RemoteStore for MutableRemote {
    fn name(&self) -> &str {
        "mutable"
    }

    async fn exists(&self, key: &ProductKey) -> Result<bool, FetchError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn fetch(&self, key: &ProductKey, dest: &Path) -> Result<FetchReceipt, FetchError> {
        *self.calls.lock().unwrap().entry(*key).or_insert(0) += 1;
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(FetchError::NotFound)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        Ok(FetchReceipt {
            bytes_written: bytes.len() as u64,
            attempts: 1,
        })
    }
}

fn png_bytes(value: u8) -> Vec<u8> {
    let img = RgbaImage::from_pixel(24, 24, image::Rgba([value, value, value, 255]));
    let mut cursor = std::io::Cursor::new(Vec::new());
    img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
    cursor.into_inner()
}

fn request() -> ReconcileRequest {
    ReconcileRequest {
        satellite: Satellite::GoesWest,
        product: ProductType::Conus,
        start: Utc.with_ymd_and_hms(2024, 5, 2, 14, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2024, 5, 2, 14, 20, 0).unwrap(),
        band: None,
    }
}

// =============================================================================
// Integration Tests
// =============================================================================

#[tokio::test]
async fn test_reconcile_fills_only_gaps_across_runs() {
    let temp = TempDir::new().unwrap();
    let request = request();
    let keys = request.expected_keys();
    assert_eq!(keys.len(), 4);

    // Three of four timestamps are available upstream
    let remote = MutableRemote::new();
    let objects = remote.objects();
    for (i, key) in keys.iter().enumerate().take(3) {
        objects
            .lock()
            .unwrap()
            .insert(*key, png_bytes((i * 60) as u8));
    }

    let service =
        SatloopService::new(SatloopConfig::new(temp.path().join("cache")), remote).unwrap();
    let cancel = CancellationToken::new();

    let first = service.reconcile(&request, &cancel).await.unwrap();
    assert_eq!(first.fetched(), 3);
    assert_eq!(first.not_found(), 1);
    assert!(!first.is_complete());

    let report = service.status(&request, true).await.unwrap();
    assert_eq!(report.fresh, 3);
    assert_eq!(report.missing, 1);
    assert_eq!(report.remote_available, Some(0));

    // The late timestamp appears upstream; a second run fetches only it
    objects.lock().unwrap().insert(keys[3], png_bytes(180));
    let second = service.reconcile(&request, &cancel).await.unwrap();
    assert_eq!(second.already_present(), 3);
    assert_eq!(second.fetched(), 1);
    assert!(matches!(
        second.get(&keys[3]),
        Some(FetchOutcome::Fetched { .. })
    ));

    assert!(service.status(&request, false).await.unwrap().is_complete());
}

#[tokio::test]
async fn test_fresh_keys_are_never_refetched() {
    let temp = TempDir::new().unwrap();
    let request = request();
    let remote = MutableRemote::new();
    let objects = remote.objects();
    for key in request.expected_keys() {
        objects.lock().unwrap().insert(key, png_bytes(10));
    }

    let service =
        SatloopService::new(SatloopConfig::new(temp.path().join("cache")), remote).unwrap();
    let cancel = CancellationToken::new();

    service.reconcile(&request, &cancel).await.unwrap();
    service.reconcile(&request, &cancel).await.unwrap();

    // Every record points at a complete file on disk
    for key in request.expected_keys() {
        let record = service.inventory().lookup(&key).unwrap().unwrap();
        assert!(record.local_path.exists());
    }
}

#[tokio::test]
async fn test_reconciled_window_interpolates_in_order() {
    let temp = TempDir::new().unwrap();
    let request = request();
    let remote = MutableRemote::new();
    let objects = remote.objects();
    for (i, key) in request.expected_keys().iter().enumerate() {
        objects
            .lock()
            .unwrap()
            .insert(*key, png_bytes((i * 50) as u8));
    }

    let service =
        SatloopService::new(SatloopConfig::new(temp.path().join("cache")), remote).unwrap();
    let cancel = CancellationToken::new();
    service.reconcile(&request, &cancel).await.unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    let manifest = service
        .interpolate(&request, Arc::new(BlendInterpolator), tx, &cancel)
        .await
        .unwrap();
    assert_eq!(manifest.done(), 3);

    let mut emitted = Vec::new();
    while let Some(frame) = rx.recv().await {
        emitted.push(frame);
    }
    let indices: Vec<usize> = emitted.iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    // Pair 0 blends gray 0 and gray 50
    assert_eq!(emitted[0].frame.image.get_pixel(5, 5).0[0], 25);
}

#[tokio::test]
async fn test_at_most_once_fetch_across_runs() {
    let temp = TempDir::new().unwrap();
    let request = request();
    let remote = MutableRemote::new();
    let objects = remote.objects();
    let calls = remote.calls();
    let keys = request.expected_keys();
    for key in &keys {
        objects.lock().unwrap().insert(*key, png_bytes(33));
    }

    let service =
        SatloopService::new(SatloopConfig::new(temp.path().join("cache")), remote).unwrap();
    let cancel = CancellationToken::new();
    service.reconcile(&request, &cancel).await.unwrap();
    service.reconcile(&request, &cancel).await.unwrap();

    for key in &keys {
        assert_eq!(*calls.lock().unwrap().get(key).unwrap(), 1);
    }
}
