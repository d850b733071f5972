//! Frames and overlap tiling.
//!
//! Large frames are split into overlapping tiles sized for the
//! interpolation transform, then reassembled with a linear cross-fade
//! across the overlap bands so seams are not visible. The grid is
//! deterministic and row-major; reassembly depends on tile rects, not on
//! ordering of the input slice, but [`split`] always yields row-major
//! order. Adjacent cross-fade weights sum to exactly 1, so
//! `merge(split(frame))` reproduces the frame bit-for-bit outside the
//! overlap bands and within rounding inside them.

use image::RgbaImage;
use std::path::Path;
use thiserror::Error;

/// Errors from frame loading and tile reassembly.
#[derive(Debug, Error)]
pub enum TileError {
    /// Frame file could not be read
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame file could not be decoded
    #[error("frame decode error: {0}")]
    Decode(#[from] image::ImageError),

    /// An interpolated tile's dimensions differ from its source rect
    #[error("tile mismatch at ({x}, {y}): expected {expected_w}x{expected_h}, got {actual_w}x{actual_h}")]
    Mismatch {
        x: u32,
        y: u32,
        expected_w: u32,
        expected_h: u32,
        actual_w: u32,
        actual_h: u32,
    },

    /// Tile sizing parameters are unusable
    #[error("invalid tiling: {0}")]
    InvalidTiling(String),
}

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDims {
    pub width: u32,
    pub height: u32,
}

/// A decoded raster owned by the pipeline for one interpolation run.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixel data, RGBA8
    pub image: RgbaImage,
}

impl Frame {
    /// Wraps an already-decoded image.
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Loads and decodes a frame from disk.
    pub fn load(path: &Path) -> Result<Self, TileError> {
        let image = image::open(path)?.to_rgba8();
        Ok(Self { image })
    }

    /// Encodes the frame as PNG at `path`.
    pub fn save(&self, path: &Path) -> Result<(), TileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.image.save(path)?;
        Ok(())
    }

    /// Returns the frame's dimensions.
    pub fn dims(&self) -> FrameDims {
        FrameDims {
            width: self.image.width(),
            height: self.image.height(),
        }
    }
}

/// Placement of a tile within its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    /// Origin offset, left edge
    pub x: u32,
    /// Origin offset, top edge
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One rectangular sub-region of a frame.
///
/// The overlap margin is constant across all tiles of a run and must be
/// at least the interpolation model's receptive-field bleed.
#[derive(Debug, Clone)]
pub struct Tile {
    /// Where this tile sits in the frame
    pub rect: TileRect,
    /// Overlap margin shared with neighboring tiles
    pub overlap: u32,
    /// Pixel data for the rect
    pub image: RgbaImage,
}

/// Returns the left edges of the tile grid along one axis.
///
/// Tiles step by `tile_size - overlap`; the final tile is clipped to the
/// frame bound rather than padded past it.
fn grid_positions(extent: u32, tile_size: u32, overlap: u32) -> Vec<u32> {
    let step = tile_size - overlap;
    let mut positions = vec![0];
    let mut x = 0;
    while x + tile_size < extent {
        x += step;
        positions.push(x);
    }
    positions
}

/// Splits a frame into an overlapping row-major tile grid.
///
/// Requires `overlap < tile_size`; an overlap of zero yields a plain
/// non-overlapping grid. Edge tiles are clipped to the frame bounds; no
/// padding is ever invented beyond the image edge.
pub fn split(frame: &Frame, tile_size: u32, overlap: u32) -> Result<Vec<Tile>, TileError> {
    if tile_size == 0 {
        return Err(TileError::InvalidTiling("tile size must be > 0".into()));
    }
    if overlap >= tile_size {
        return Err(TileError::InvalidTiling(format!(
            "overlap {} must be smaller than tile size {}",
            overlap, tile_size
        )));
    }

    let dims = frame.dims();
    let mut tiles = Vec::new();
    for &y in &grid_positions(dims.height, tile_size, overlap) {
        for &x in &grid_positions(dims.width, tile_size, overlap) {
            let width = tile_size.min(dims.width - x);
            let height = tile_size.min(dims.height - y);
            let image =
                image::imageops::crop_imm(&frame.image, x, y, width, height).to_image();
            tiles.push(Tile {
                rect: TileRect {
                    x,
                    y,
                    width,
                    height,
                },
                overlap,
                image,
            });
        }
    }
    Ok(tiles)
}

/// Cross-fade weight for position `i` within a tile edge.
///
/// Ramps linearly over the overlap band so that the weights of two
/// adjacent tiles sum to exactly 1 at every shared pixel.
fn edge_weight(i: u32, extent: u32, overlap: u32, ramp_low: bool, ramp_high: bool) -> f64 {
    let band = f64::from(overlap + 1);
    let mut weight: f64 = 1.0;
    if ramp_low && i < overlap {
        weight = weight.min(f64::from(i + 1) / band);
    }
    if ramp_high && i >= extent.saturating_sub(overlap) {
        weight = weight.min(f64::from(extent - i) / band);
    }
    weight
}

/// Reassembles tiles into a full frame, blending overlap bands.
///
/// Inverse of [`split`]: non-overlap regions are copied exactly, overlap
/// regions get a linear cross-fade. Fails with [`TileError::Mismatch`]
/// if any tile's pixel data disagrees with its rect.
pub fn merge(tiles: &[Tile], dims: FrameDims) -> Result<Frame, TileError> {
    let (w, h) = (dims.width as usize, dims.height as usize);
    let mut acc = vec![0f64; w * h * 4];
    let mut weights = vec![0f64; w * h];

    for tile in tiles {
        let rect = tile.rect;
        if tile.image.width() != rect.width || tile.image.height() != rect.height {
            return Err(TileError::Mismatch {
                x: rect.x,
                y: rect.y,
                expected_w: rect.width,
                expected_h: rect.height,
                actual_w: tile.image.width(),
                actual_h: tile.image.height(),
            });
        }

        // Only edges shared with a neighbor get a ramp; frame borders keep
        // full weight.
        let ramp_left = rect.x > 0;
        let ramp_right = rect.x + rect.width < dims.width;
        let ramp_top = rect.y > 0;
        let ramp_bottom = rect.y + rect.height < dims.height;

        for ty in 0..rect.height {
            let wy = edge_weight(ty, rect.height, tile.overlap, ramp_top, ramp_bottom);
            for tx in 0..rect.width {
                let wx = edge_weight(tx, rect.width, tile.overlap, ramp_left, ramp_right);
                let weight = wx * wy;

                let px = tile.image.get_pixel(tx, ty).0;
                let idx = (rect.y + ty) as usize * w + (rect.x + tx) as usize;
                for c in 0..4 {
                    acc[idx * 4 + c] += weight * f64::from(px[c]);
                }
                weights[idx] += weight;
            }
        }
    }

    let mut out = RgbaImage::new(dims.width, dims.height);
    for y in 0..dims.height {
        for x in 0..dims.width {
            let idx = y as usize * w + x as usize;
            let total = weights[idx];
            let mut px = [0u8; 4];
            if total > 0.0 {
                for c in 0..4 {
                    px[c] = (acc[idx * 4 + c] / total).round().clamp(0.0, 255.0) as u8;
                }
            }
            out.put_pixel(x, y, image::Rgba(px));
        }
    }
    Ok(Frame::new(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pixel gradient so every position has a distinct value.
    fn test_frame(width: u32, height: u32) -> Frame {
        let image = RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([
                (x % 256) as u8,
                (y % 256) as u8,
                ((x + y) % 256) as u8,
                255,
            ])
        });
        Frame::new(image)
    }

    #[test]
    fn test_grid_positions_exact_fit() {
        assert_eq!(grid_positions(256, 128, 0), vec![0, 128]);
    }

    #[test]
    fn test_grid_positions_with_overlap() {
        assert_eq!(grid_positions(512, 128, 16), vec![0, 112, 224, 336, 448]);
    }

    #[test]
    fn test_grid_positions_small_frame() {
        assert_eq!(grid_positions(100, 128, 16), vec![0]);
    }

    #[test]
    fn test_split_row_major_and_clipped() {
        let frame = test_frame(512, 512);
        let tiles = split(&frame, 128, 16).unwrap();

        assert_eq!(tiles.len(), 25); // 5x5 grid
        assert_eq!(tiles[0].rect, TileRect { x: 0, y: 0, width: 128, height: 128 });
        // Second tile in the first row: row-major ordering
        assert_eq!(tiles[1].rect.x, 112);
        assert_eq!(tiles[1].rect.y, 0);
        // Last tile is clipped to the frame bound
        let last = &tiles[24].rect;
        assert_eq!((last.x, last.y), (448, 448));
        assert_eq!((last.width, last.height), (64, 64));
    }

    #[test]
    fn test_split_rejects_bad_params() {
        let frame = test_frame(64, 64);
        assert!(split(&frame, 0, 0).is_err());
        assert!(split(&frame, 32, 32).is_err());
        assert!(split(&frame, 32, 40).is_err());
    }

    #[test]
    fn test_merge_split_round_trip_no_overlap() {
        let frame = test_frame(256, 192);
        let tiles = split(&frame, 64, 0).unwrap();
        let merged = merge(&tiles, frame.dims()).unwrap();

        assert_eq!(merged.image.as_raw(), frame.image.as_raw());
    }

    #[test]
    fn test_merge_split_exact_outside_overlap_bands() {
        let frame = test_frame(512, 512);
        let overlap = 16;
        let tiles = split(&frame, 128, overlap).unwrap();
        let merged = merge(&tiles, frame.dims()).unwrap();

        // Overlap bands are where two tiles share pixels: the `overlap`
        // columns/rows before each interior tile edge.
        let step = 128 - overlap;
        let in_band = |v: u32| {
            (1..5).any(|k| {
                let edge = k * step;
                v >= edge && v < edge + overlap
            })
        };

        for y in 0..512 {
            for x in 0..512 {
                if !in_band(x) && !in_band(y) {
                    assert_eq!(
                        merged.image.get_pixel(x, y),
                        frame.image.get_pixel(x, y),
                        "pixel mismatch outside overlap at ({}, {})",
                        x,
                        y
                    );
                }
            }
        }
    }

    #[test]
    fn test_merge_split_within_tolerance_everywhere() {
        let frame = test_frame(512, 512);
        let tiles = split(&frame, 128, 16).unwrap();
        let merged = merge(&tiles, frame.dims()).unwrap();

        for (a, b) in merged.image.as_raw().iter().zip(frame.image.as_raw()) {
            assert!(a.abs_diff(*b) <= 1, "blend drifted more than 1 LSB");
        }
    }

    #[test]
    fn test_merge_rejects_mismatched_tile() {
        let frame = test_frame(128, 128);
        let mut tiles = split(&frame, 64, 8).unwrap();
        tiles[0].image = RgbaImage::new(10, 10);

        let err = merge(&tiles, frame.dims()).unwrap_err();
        assert!(matches!(err, TileError::Mismatch { .. }));
    }

    #[test]
    fn test_split_deterministic() {
        let frame = test_frame(300, 200);
        let a = split(&frame, 96, 12).unwrap();
        let b = split(&frame, 96, 12).unwrap();

        assert_eq!(a.len(), b.len());
        for (ta, tb) in a.iter().zip(&b) {
            assert_eq!(ta.rect, tb.rect);
            assert_eq!(ta.image.as_raw(), tb.image.as_raw());
        }
    }

    #[test]
    fn test_frame_save_load_round_trip() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("frames/f0.png");
        let frame = test_frame(32, 32);

        frame.save(&path).unwrap();
        let loaded = Frame::load(&path).unwrap();

        assert_eq!(loaded.image.as_raw(), frame.image.as_raw());
    }
}
