//! Configuration types for pipeline components.
//!
//! Each struct groups the knobs for one concern, carries sensible
//! defaults, and exposes `with_*` builders for customization.
//!
//! # Example
//!
//! ```
//! use satloop::config::{FetchConfig, InterpConfig};
//!
//! let fetch = FetchConfig::new().with_concurrency(16);
//! assert_eq!(fetch.concurrency(), 16);
//!
//! let interp = InterpConfig::default();
//! assert_eq!(interp.tile_size(), 512);
//! ```

use std::path::{Path, PathBuf};

/// Default concurrent fetch slots
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;
/// Default concurrent interpolation slots
pub const DEFAULT_INTERP_CONCURRENCY: usize = 2;
/// Default tile edge in pixels
pub const DEFAULT_TILE_SIZE: u32 = 512;
/// Default tile overlap in pixels
pub const DEFAULT_TILE_OVERLAP: u32 = 32;
/// Default tile cache bound: 2 GiB
pub const DEFAULT_TILE_CACHE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Configuration for imagery fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Maximum number of concurrent fetches
    concurrency: usize,
}

impl FetchConfig {
    /// Create a new fetch configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of concurrent fetches.
    ///
    /// Bounds how many remote transfers run at once across a
    /// reconciliation pass. Default: 4.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Get the maximum number of concurrent fetches.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }
}

/// Configuration for tiled frame interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpConfig {
    /// Tile edge length in pixels
    tile_size: u32,
    /// Overlap margin between neighboring tiles
    overlap: u32,
    /// Maximum number of concurrent interpolation calls
    concurrency: usize,
}

impl InterpConfig {
    /// Create a new interpolation configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tile edge length in pixels.
    ///
    /// Full frames are split into tiles of this size so the interpolation
    /// model works within its memory envelope. Default: 512.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Set the overlap margin between neighboring tiles.
    ///
    /// Must be large enough to cover the model's receptive-field bleed
    /// and strictly smaller than the tile size. Default: 32.
    pub fn with_overlap(mut self, overlap: u32) -> Self {
        self.overlap = overlap;
        self
    }

    /// Set the maximum number of concurrent interpolation calls.
    ///
    /// Independent of the fetch bound; interpolation is typically
    /// GPU- or memory-limited. Default: 2.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Get the tile edge length.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Get the overlap margin.
    pub fn overlap(&self) -> u32 {
        self.overlap
    }

    /// Get the interpolation concurrency bound.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

impl Default for InterpConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            overlap: DEFAULT_TILE_OVERLAP,
            concurrency: DEFAULT_INTERP_CONCURRENCY,
        }
    }
}

/// Filesystem layout for durable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Root directory for fetched imagery
    cache_root: PathBuf,
    /// Tile cache bound in bytes
    tile_cache_bytes: u64,
}

impl StorageConfig {
    /// Create a storage layout rooted at `cache_root`.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            tile_cache_bytes: DEFAULT_TILE_CACHE_BYTES,
        }
    }

    /// Set the tile cache size bound in bytes.
    ///
    /// When exceeded, oldest entries are evicted until usage drops to
    /// 90% of this bound. Default: 2 GiB.
    pub fn with_tile_cache_bytes(mut self, bytes: u64) -> Self {
        self.tile_cache_bytes = bytes;
        self
    }

    /// Root directory for fetched imagery.
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Inventory database path, under the cache root.
    pub fn inventory_path(&self) -> PathBuf {
        self.cache_root.join("inventory.db")
    }

    /// Tile cache directory, under the cache root.
    pub fn tile_cache_root(&self) -> PathBuf {
        self.cache_root.join("tiles")
    }

    /// Tile cache size bound in bytes.
    pub fn tile_cache_bytes(&self) -> u64 {
        self.tile_cache_bytes
    }
}

/// Top-level configuration for the pipeline service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SatloopConfig {
    /// Base URL of the imagery CDN
    cdn_base_url: String,
    /// Durable state layout
    storage: StorageConfig,
    /// Fetch knobs
    fetch: FetchConfig,
    /// Interpolation knobs
    interp: InterpConfig,
}

impl SatloopConfig {
    /// Default public CDN endpoint
    pub const DEFAULT_CDN_BASE_URL: &'static str = "https://cdn.star.nesdis.noaa.gov";

    /// Create a configuration with storage rooted at `cache_root`.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cdn_base_url: Self::DEFAULT_CDN_BASE_URL.to_string(),
            storage: StorageConfig::new(cache_root),
            fetch: FetchConfig::default(),
            interp: InterpConfig::default(),
        }
    }

    /// Set the imagery CDN base URL.
    pub fn with_cdn_base_url(mut self, url: impl Into<String>) -> Self {
        self.cdn_base_url = url.into();
        self
    }

    /// Replace the storage layout.
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Replace the fetch knobs.
    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    /// Replace the interpolation knobs.
    pub fn with_interp(mut self, interp: InterpConfig) -> Self {
        self.interp = interp;
        self
    }

    /// Imagery CDN base URL.
    pub fn cdn_base_url(&self) -> &str {
        &self.cdn_base_url
    }

    /// Durable state layout.
    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// Fetch knobs.
    pub fn fetch(&self) -> &FetchConfig {
        &self.fetch
    }

    /// Interpolation knobs.
    pub fn interp(&self) -> &InterpConfig {
        &self.interp
    }
}
