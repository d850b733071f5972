//! Content-addressed memo of interpolated tiles.
//!
//! The key is a hash of the two input tiles' pixel content plus the model
//! identifier — not a positional index — so identical tile content across
//! different frame pairs or runs dedupes naturally. Entries are written
//! once via temp-file-plus-rename and never mutated, which is why
//! interpolation workers can share the cache without read locks.
//!
//! The cache is advisory: a miss (or an unreadable entry) always falls
//! through to recomputation; it is never the sole source of truth.

use image::RgbaImage;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from tile cache writes. Reads never error; they miss.
#[derive(Debug, Error)]
pub enum TileCacheError {
    /// I/O failure writing an entry
    #[error("tile cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be encoded
    #[error("tile cache encode error: {0}")]
    Encode(#[from] image::ImageError),
}

/// Computes the content hash for an interpolation pair.
///
/// Dimensions and raw pixels of both tiles feed the hash so two tiles
/// with equal bytes but different shapes never collide.
pub fn content_key(a: &RgbaImage, b: &RgbaImage, model_id: &str) -> String {
    let mut hasher = Sha256::new();
    for tile in [a, b] {
        hasher.update(tile.width().to_le_bytes());
        hasher.update(tile.height().to_le_bytes());
        hasher.update(tile.as_raw());
    }
    hasher.update(model_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Disk-backed memo of `interpolate(tileA, tileB) -> tile` results.
///
/// Entries fan out under the root by hash prefix. The in-memory index is
/// rebuilt by scanning on open, so the cache survives restarts. Size is
/// bounded by mtime-ordered eviction down to 90% of the limit.
pub struct TileCache {
    root: PathBuf,
    max_size_bytes: u64,
    index: Mutex<HashMap<String, PathBuf>>,
    current_size: Mutex<u64>,
}

impl TileCache {
    /// Opens (or creates) a cache rooted at `root`.
    pub fn open(root: PathBuf, max_size_bytes: u64) -> Result<Self, TileCacheError> {
        fs::create_dir_all(&root)?;

        let cache = Self {
            root,
            max_size_bytes,
            index: Mutex::new(HashMap::new()),
            current_size: Mutex::new(0),
        };
        cache.scan()?;
        cache.evict_if_over_limit()?;
        Ok(cache)
    }

    /// Looks up the memoized result for an interpolation pair.
    pub fn get(&self, a: &RgbaImage, b: &RgbaImage, model_id: &str) -> Option<RgbaImage> {
        self.get_by_key(&content_key(a, b, model_id))
    }

    /// Looks up an entry by its precomputed content key.
    pub fn get_by_key(&self, key: &str) -> Option<RgbaImage> {
        let path = self.index.lock().unwrap().get(key).cloned()?;

        match image::open(&path) {
            Ok(img) => {
                debug!(key, "tile cache hit");
                Some(img.to_rgba8())
            }
            Err(err) => {
                // Unreadable entry: drop it and treat as a miss
                warn!(key, error = %err, "evicting unreadable tile cache entry");
                self.index.lock().unwrap().remove(key);
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Memoizes an interpolation result.
    ///
    /// Entries are write-once: if the key is already present the existing
    /// entry wins and the new bytes are discarded.
    pub fn put(
        &self,
        a: &RgbaImage,
        b: &RgbaImage,
        model_id: &str,
        result: &RgbaImage,
    ) -> Result<(), TileCacheError> {
        self.put_by_key(&content_key(a, b, model_id), result)
    }

    /// Memoizes a result under a precomputed content key.
    pub fn put_by_key(&self, key: &str, result: &RgbaImage) -> Result<(), TileCacheError> {
        if self.index.lock().unwrap().contains_key(key) {
            return Ok(());
        }

        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut encoded = Cursor::new(Vec::new());
        result.write_to(&mut encoded, image::ImageFormat::Png)?;
        let bytes = encoded.into_inner();

        let part = path.with_extension("png.part");
        fs::write(&part, &bytes)?;
        fs::rename(&part, &path)?;

        // Two workers can race past the membership check above; the entry
        // lands on disk once, so only the first insert counts its bytes.
        let raced = self
            .index
            .lock()
            .unwrap()
            .insert(key.to_string(), path)
            .is_some();
        if !raced {
            *self.current_size.lock().unwrap() += bytes.len() as u64;
        }

        self.evict_if_over_limit()?;
        Ok(())
    }

    /// Returns the number of memoized entries.
    pub fn entry_count(&self) -> usize {
        self.index.lock().unwrap().len()
    }

    /// Returns the tracked size of all entries in bytes.
    pub fn size_bytes(&self) -> u64 {
        *self.current_size.lock().unwrap()
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        // Fan out by hash prefix to keep directories small
        self.root.join(&key[..2]).join(format!("{}.png", key))
    }

    fn scan(&self) -> Result<(), TileCacheError> {
        let mut index = self.index.lock().unwrap();
        let mut total = 0u64;

        for shard in fs::read_dir(&self.root)? {
            let shard = shard?.path();
            if !shard.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&shard)? {
                let path = entry?.path();
                if path.extension().and_then(|s| s.to_str()) != Some("png") {
                    continue;
                }
                let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if let Ok(metadata) = fs::metadata(&path) {
                    total += metadata.len();
                    index.insert(key.to_string(), path);
                }
            }
        }

        *self.current_size.lock().unwrap() = total;
        debug!(entries = index.len(), bytes = total, "tile cache scanned");
        Ok(())
    }

    /// Evicts oldest entries (by mtime) until under 90% of the limit.
    fn evict_if_over_limit(&self) -> Result<(), TileCacheError> {
        if self.size_bytes() <= self.max_size_bytes {
            return Ok(());
        }
        let target = (self.max_size_bytes as f64 * 0.9) as u64;

        let mut entries: Vec<(String, PathBuf, SystemTime, u64)> = Vec::new();
        for (key, path) in self.index.lock().unwrap().iter() {
            if let Ok(metadata) = fs::metadata(path) {
                if let Ok(modified) = metadata.modified() {
                    entries.push((key.clone(), path.clone(), modified, metadata.len()));
                }
            }
        }
        entries.sort_by_key(|(_, _, modified, _)| *modified);

        let mut evicted = 0usize;
        for (key, path, _, size) in entries {
            if self.size_bytes() <= target {
                break;
            }
            if fs::remove_file(&path).is_ok() {
                self.index.lock().unwrap().remove(&key);
                let mut current = self.current_size.lock().unwrap();
                *current = current.saturating_sub(size);
                evicted += 1;
            }
        }

        info!(
            evicted,
            remaining_bytes = self.size_bytes(),
            "tile cache eviction complete"
        );
        Ok(())
    }
}
