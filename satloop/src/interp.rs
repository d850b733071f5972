//! Interpolation collaborator contract.
//!
//! The interpolation model is a black box: given two equally-sized tiles
//! it returns one in-between tile of the same dimensions, or an error.
//! The pipeline only depends on the [`Interpolator`] trait, so swapping
//! the external binary (or replacing it with the built-in blend) never
//! touches the batch queue.

use image::RgbaImage;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors from an interpolation call.
#[derive(Debug, Error)]
pub enum InterpError {
    /// Input tiles have different dimensions
    #[error("input tiles differ: {a_w}x{a_h} vs {b_w}x{b_h}")]
    InputMismatch {
        a_w: u32,
        a_h: u32,
        b_w: u32,
        b_h: u32,
    },

    /// Worker binary exited non-zero
    #[error("interpolation process failed ({status}): {stderr}")]
    Process { status: String, stderr: String },

    /// Output file could not be decoded
    #[error("interpolation output decode failed: {0}")]
    Decode(#[from] image::ImageError),

    /// Scratch I/O failed
    #[error("interpolation I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A transform producing the in-between tile for a pair of tiles.
///
/// Implementations must be safe to call from many workers at once.
pub trait Interpolator: Send + Sync {
    /// Identifier baked into tile cache keys; changing the model (or its
    /// weights) must change this string.
    fn model_id(&self) -> &str;

    /// Produces the midpoint tile for `a` and `b`.
    fn interpolate(
        &self,
        a: &RgbaImage,
        b: &RgbaImage,
    ) -> impl Future<Output = Result<RgbaImage, InterpError>> + Send;
}

fn check_dims(a: &RgbaImage, b: &RgbaImage) -> Result<(), InterpError> {
    if a.dimensions() != b.dimensions() {
        return Err(InterpError::InputMismatch {
            a_w: a.width(),
            a_h: a.height(),
            b_w: b.width(),
            b_h: b.height(),
        });
    }
    Ok(())
}

/// Built-in per-pixel average.
///
/// No motion estimation — usable as a fallback and as the deterministic
/// model in tests.
pub struct BlendInterpolator;

impl Interpolator for BlendInterpolator {
    fn model_id(&self) -> &str {
        "blend-v1"
    }

    async fn interpolate(&self, a: &RgbaImage, b: &RgbaImage) -> Result<RgbaImage, InterpError> {
        check_dims(a, b)?;

        let out = RgbaImage::from_fn(a.width(), a.height(), |x, y| {
            let pa = a.get_pixel(x, y).0;
            let pb = b.get_pixel(x, y).0;
            let mut px = [0u8; 4];
            for c in 0..4 {
                px[c] = ((u16::from(pa[c]) + u16::from(pb[c])) / 2) as u8;
            }
            image::Rgba(px)
        });
        Ok(out)
    }
}

/// Out-of-process interpolation worker.
///
/// Invokes the configured binary once per tile pair with a fixed argv
/// contract:
///
/// ```text
/// <binary> --input-a <a.png> --input-b <b.png> --output <out.png>
/// ```
///
/// Scratch files live in a per-call temp directory and are removed when
/// the call returns.
pub struct SubprocessInterpolator {
    binary: PathBuf,
    model_id: String,
}

impl SubprocessInterpolator {
    /// Creates a worker for the given binary.
    ///
    /// `model_id` should name the binary and its weights, e.g.
    /// `rife-v4.6`, since it keys the tile cache.
    pub fn new(binary: PathBuf, model_id: impl Into<String>) -> Self {
        Self {
            binary,
            model_id: model_id.into(),
        }
    }
}

impl Interpolator for SubprocessInterpolator {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn interpolate(&self, a: &RgbaImage, b: &RgbaImage) -> Result<RgbaImage, InterpError> {
        check_dims(a, b)?;

        let scratch = tempfile::tempdir()?;
        let a_path = scratch.path().join("a.png");
        let b_path = scratch.path().join("b.png");
        let out_path = scratch.path().join("out.png");

        a.save(&a_path)?;
        b.save(&b_path)?;

        trace!(binary = %self.binary.display(), "spawning interpolation worker");
        let output = tokio::process::Command::new(&self.binary)
            .arg("--input-a")
            .arg(&a_path)
            .arg("--input-b")
            .arg(&b_path)
            .arg("--output")
            .arg(&out_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(InterpError::Process {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let result = image::open(&out_path)?.to_rgba8();
        debug!(model = %self.model_id, "interpolation worker finished");
        Ok(result)
    }
}
