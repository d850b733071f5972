//! Bounded-concurrency interpolation of consecutive frame pairs.
//!
//! The batch queue turns an ordered frame sequence into interpolated
//! in-between frames. Each pair is tiled, looked up in the tile cache,
//! and cache misses go to the interpolation collaborator through a
//! bounded worker pool. Workers finish in any order; a reorder buffer
//! keyed by pair index guarantees frames are emitted strictly in input
//! order.
//!
//! A failing tile marks its pair Failed without halting sibling pairs;
//! the final manifest is total over all pairs.

use crate::frame::{self, Frame, Tile};
use crate::interp::Interpolator;
use crate::tilecache::TileCache;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tiling and concurrency knobs for one interpolation run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Tile edge length in pixels
    pub tile_size: u32,
    /// Overlap margin shared between neighboring tiles; must cover the
    /// model's receptive-field bleed
    pub overlap: u32,
    /// Bound on simultaneous interpolation calls
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            tile_size: 512,
            overlap: 32,
            concurrency: 2,
        }
    }
}

/// Terminal outcome for one frame pair.
#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    /// Interpolated frame was produced and emitted
    Done {
        /// Tiles served from the cache
        cached_tiles: usize,
        /// Tiles computed by the interpolator
        computed_tiles: usize,
    },
    /// A tile failed; no frame emitted for this pair
    Failed {
        /// What went wrong
        error: String,
    },
    /// Run was cancelled before this pair was processed
    Skipped,
}

/// Complete outcome set for a batch run, ordered by pair index.
#[derive(Debug, Default)]
pub struct BatchManifest {
    outcomes: BTreeMap<usize, PairOutcome>,
}

impl BatchManifest {
    /// Returns the outcome for a pair index.
    pub fn get(&self, index: usize) -> Option<&PairOutcome> {
        self.outcomes.get(&index)
    }

    /// Iterates outcomes in pair order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &PairOutcome)> {
        self.outcomes.iter().map(|(i, o)| (*i, o))
    }

    /// Total number of pairs.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true if no pairs were processed.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Pairs that produced a frame.
    pub fn done(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, PairOutcome::Done { .. }))
            .count()
    }

    /// Pairs that failed.
    pub fn failed(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, PairOutcome::Failed { .. }))
            .count()
    }

    /// Pairs skipped by cancellation.
    pub fn skipped(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, PairOutcome::Skipped))
            .count()
    }
}

/// An interpolated frame leaving the queue, in input order.
#[derive(Debug)]
pub struct EmittedFrame {
    /// Index of the source pair (frame `index` and `index + 1`)
    pub index: usize,
    /// The interpolated in-between frame
    pub frame: Frame,
}

/// Schedules per-pair, per-tile interpolation over a bounded pool.
pub struct BatchQueue<I> {
    interpolator: Arc<I>,
    cache: Arc<TileCache>,
    config: BatchConfig,
}

impl<I: Interpolator + 'static> BatchQueue<I> {
    /// Creates a queue over one interpolator and one shared tile cache.
    pub fn new(interpolator: Arc<I>, cache: Arc<TileCache>, config: BatchConfig) -> Self {
        assert!(config.concurrency >= 1, "interp concurrency must be >= 1");
        Self {
            interpolator,
            cache,
            config,
        }
    }

    /// Interpolates every consecutive pair in `frames`.
    ///
    /// In-between frames are sent on `emit` strictly in pair order; the
    /// reorder buffer holds out-of-order completions until their turn.
    /// The returned manifest has a terminal outcome for every pair even
    /// when the run is cancelled mid-way.
    pub async fn run(
        &self,
        frames: Vec<Frame>,
        emit: mpsc::Sender<EmittedFrame>,
        cancel: &CancellationToken,
    ) -> BatchManifest {
        let pair_count = frames.len().saturating_sub(1);
        info!(
            frames = frames.len(),
            pairs = pair_count,
            tile_size = self.config.tile_size,
            overlap = self.config.overlap,
            "batch run starting"
        );

        let frames = Arc::new(frames);
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks: JoinSet<(usize, PairOutcome, Option<Frame>)> = JoinSet::new();

        for index in 0..pair_count {
            let frames = Arc::clone(&frames);
            let interpolator = Arc::clone(&self.interpolator);
            let cache = Arc::clone(&self.cache);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let config = self.config.clone();

            tasks.spawn(async move {
                if cancel.is_cancelled() {
                    return (index, PairOutcome::Skipped, None);
                }
                match interpolate_pair(
                    &frames[index],
                    &frames[index + 1],
                    interpolator.as_ref(),
                    &cache,
                    &config,
                    &semaphore,
                )
                .await
                {
                    Ok((frame, cached, computed)) => (
                        index,
                        PairOutcome::Done {
                            cached_tiles: cached,
                            computed_tiles: computed,
                        },
                        Some(frame),
                    ),
                    Err(err) => {
                        warn!(pair = index, error = %err, "pair failed");
                        (index, PairOutcome::Failed { error: err }, None)
                    }
                }
            });
        }

        // Reorder buffer: completions arrive in any order, emission is
        // strictly by pair index.
        let mut manifest = BatchManifest::default();
        let mut buffer: BTreeMap<usize, Option<Frame>> = BTreeMap::new();
        let mut next_emit = 0;

        while let Some(joined) = tasks.join_next().await {
            let (index, outcome, maybe_frame) = joined.expect("pair task panicked");
            manifest.outcomes.insert(index, outcome);
            buffer.insert(index, maybe_frame);

            while let Some(slot) = buffer.remove(&next_emit) {
                if let Some(frame) = slot {
                    debug!(pair = next_emit, "emitting interpolated frame");
                    // Receiver gone means the caller stopped consuming;
                    // keep settling outcomes regardless.
                    let _ = emit
                        .send(EmittedFrame {
                            index: next_emit,
                            frame,
                        })
                        .await;
                }
                next_emit += 1;
            }
        }

        info!(
            done = manifest.done(),
            failed = manifest.failed(),
            skipped = manifest.skipped(),
            "batch run settled"
        );
        manifest
    }
}

/// Interpolates one frame pair tile-by-tile.
///
/// Returns the merged frame plus cache hit/computed counts. Any tile
/// error fails the whole pair.
async fn interpolate_pair<I: Interpolator>(
    a: &Frame,
    b: &Frame,
    interpolator: &I,
    cache: &TileCache,
    config: &BatchConfig,
    semaphore: &Semaphore,
) -> Result<(Frame, usize, usize), String> {
    if a.dims() != b.dims() {
        return Err(format!(
            "frame dimensions differ: {}x{} vs {}x{}",
            a.dims().width,
            a.dims().height,
            b.dims().width,
            b.dims().height
        ));
    }

    let tiles_a = frame::split(a, config.tile_size, config.overlap).map_err(|e| e.to_string())?;
    let tiles_b = frame::split(b, config.tile_size, config.overlap).map_err(|e| e.to_string())?;

    let mut cached = 0;
    let mut computed = 0;
    let mut out_tiles: Vec<Tile> = Vec::with_capacity(tiles_a.len());

    for (tile_a, tile_b) in tiles_a.iter().zip(&tiles_b) {
        let result = match cache.get(&tile_a.image, &tile_b.image, interpolator.model_id()) {
            Some(hit) => {
                cached += 1;
                hit
            }
            None => {
                let _permit = semaphore.acquire().await.expect("interp semaphore closed");
                let result = interpolator
                    .interpolate(&tile_a.image, &tile_b.image)
                    .await
                    .map_err(|e| e.to_string())?;
                computed += 1;

                if let Err(err) =
                    cache.put(&tile_a.image, &tile_b.image, interpolator.model_id(), &result)
                {
                    // Advisory cache: a failed write costs recomputation later
                    warn!(error = %err, "tile cache write failed");
                }
                result
            }
        };

        if result.dimensions() != (tile_a.rect.width, tile_a.rect.height) {
            return Err(format!(
                "tile mismatch at ({}, {}): interpolator returned {}x{}, expected {}x{}",
                tile_a.rect.x,
                tile_a.rect.y,
                result.width(),
                result.height(),
                tile_a.rect.width,
                tile_a.rect.height
            ));
        }

        out_tiles.push(Tile {
            rect: tile_a.rect,
            overlap: tile_a.overlap,
            image: result,
        });
    }

    let merged = frame::merge(&out_tiles, a.dims()).map_err(|e| e.to_string())?;
    Ok((merged, cached, computed))
}
