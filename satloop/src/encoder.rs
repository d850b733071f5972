//! Video assembly from interpolated frame sequences.
//!
//! The [`Encoder`] trait is the seam for video production; the shipped
//! implementation shells out to `ffmpeg`, feeding it a numbered PNG
//! sequence written to a scratch directory.

use crate::frame::{Frame, TileError};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors from video encoding.
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    /// No frames were supplied
    #[error("cannot encode an empty frame sequence")]
    NoFrames,

    /// Writing a frame to the scratch directory failed
    #[error("frame write failed: {0}")]
    Frame(#[from] TileError),

    /// The encoder process could not be spawned or its output collected
    #[error("encoder I/O error: {0}")]
    Io(#[from] io::Error),

    /// The encoder process exited with a failure status
    #[error("encoder exited with {status}: {stderr}")]
    Process {
        /// Exit status as reported by the OS
        status: String,
        /// Trailing stderr from the process
        stderr: String,
    },
}

/// Output parameters for one encode.
#[derive(Debug, Clone)]
pub struct EncodeSpec {
    /// Video codec passed to the encoder, e.g. "libx264"
    pub codec: String,
    /// Output resolution as (width, height)
    pub resolution: (u32, u32),
    /// Output frame rate
    pub fps: u32,
    /// Destination video file
    pub output: PathBuf,
}

impl Default for EncodeSpec {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            resolution: (1920, 1080),
            fps: 30,
            output: PathBuf::from("out.mp4"),
        }
    }
}

/// Turns an ordered frame sequence into a video file.
pub trait Encoder: Send + Sync {
    /// Encodes `frames` per `spec`, returning the written output path.
    fn encode(
        &self,
        frames: &[Frame],
        spec: &EncodeSpec,
    ) -> impl std::future::Future<Output = Result<PathBuf, EncodeError>> + Send;
}

/// [`Encoder`] backed by an external `ffmpeg` binary.
pub struct FfmpegEncoder {
    binary: PathBuf,
}

impl FfmpegEncoder {
    /// Uses `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }

    /// Uses an explicit binary path.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for FfmpegEncoder {
    async fn encode(&self, frames: &[Frame], spec: &EncodeSpec) -> Result<PathBuf, EncodeError> {
        if frames.is_empty() {
            return Err(EncodeError::NoFrames);
        }

        let scratch = TempDir::new()?;
        for (index, frame) in frames.iter().enumerate() {
            frame.save(&scratch.path().join(format!("frame_{:06}.png", index)))?;
        }
        debug!(frames = frames.len(), dir = %scratch.path().display(), "frame sequence written");

        let pattern = scratch.path().join("frame_%06d.png");
        let args = ffmpeg_args(spec, &pattern);
        info!(binary = %self.binary.display(), output = %spec.output.display(), "encoding video");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(EncodeError::Process {
                status: output.status.to_string(),
                stderr: tail,
            });
        }

        Ok(spec.output.clone())
    }
}

/// Builds the ffmpeg argument list for a PNG-sequence encode.
fn ffmpeg_args(spec: &EncodeSpec, pattern: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-framerate".to_string(),
        spec.fps.to_string(),
        "-i".to_string(),
        pattern.display().to_string(),
        "-c:v".to_string(),
        spec.codec.clone(),
        "-s".to_string(),
        format!("{}x{}", spec.resolution.0, spec.resolution.1),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        spec.output.display().to_string(),
    ]
}
