//! Interpolate command - generate in-between frames for a window.
//!
//! Interpolated frames are written as a numbered PNG sequence; with
//! `--video` set they are additionally assembled into a clip via ffmpeg.

use super::common::{StoreArgs, WindowArgs};
use crate::error::CliError;
use clap::Args;
use satloop::config::InterpConfig;
use satloop::encoder::{EncodeSpec, Encoder, FfmpegEncoder};
use satloop::frame::Frame;
use satloop::interp::{BlendInterpolator, Interpolator, SubprocessInterpolator};
use satloop::service::SatloopService;
use satloop::remote::RemoteStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Arguments for the interpolate command.
#[derive(Debug, Args)]
pub struct InterpolateArgs {
    #[command(flatten)]
    pub window: WindowArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Directory for the interpolated PNG sequence
    #[arg(long, default_value = "frames")]
    pub output_dir: PathBuf,

    /// Tile edge length in pixels
    #[arg(long, default_value_t = 512)]
    pub tile_size: u32,

    /// Overlap margin between neighboring tiles
    #[arg(long, default_value_t = 32)]
    pub overlap: u32,

    /// Maximum concurrent interpolation calls
    #[arg(long, default_value_t = 2)]
    pub interp_concurrency: usize,

    /// External interpolation model binary; linear blend when omitted
    #[arg(long)]
    pub model_binary: Option<PathBuf>,

    /// Cache key naming the model and its weights, e.g. rife-v4.6;
    /// defaults to the binary's file stem
    #[arg(long, requires = "model_binary")]
    pub model_id: Option<String>,

    /// Also encode the frames into a video at this path
    #[arg(long)]
    pub video: Option<PathBuf>,

    /// Output frame rate for the video
    #[arg(long, default_value_t = 30)]
    pub fps: u32,
}

/// Run the interpolate command.
pub async fn run(args: InterpolateArgs, cancel: CancellationToken) -> Result<(), CliError> {
    let request = args.window.to_request()?;
    let config = args.store.to_config().with_interp(
        InterpConfig::new()
            .with_tile_size(args.tile_size)
            .with_overlap(args.overlap)
            .with_concurrency(args.interp_concurrency),
    );
    let service = args.store.create_service(config)?;

    std::fs::create_dir_all(&args.output_dir).map_err(|error| CliError::FileWrite {
        path: args.output_dir.display().to_string(),
        error,
    })?;

    let frames = match &args.model_binary {
        Some(binary) => {
            let model_id = args.model_id.clone().unwrap_or_else(|| {
                binary
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "model".to_string())
            });
            let model = SubprocessInterpolator::new(binary.clone(), model_id);
            println!("Interpolating with model '{}'", model.model_id());
            interpolate_window(&service, &request, Arc::new(model), &args, &cancel).await?
        }
        None => {
            println!("Interpolating with linear blend");
            interpolate_window(&service, &request, Arc::new(BlendInterpolator), &args, &cancel)
                .await?
        }
    };

    println!("{} frames written to {}", frames.len(), args.output_dir.display());

    if let Some(video) = &args.video {
        if frames.is_empty() {
            return Err(CliError::InvalidArgument(
                "no frames were produced, nothing to encode".to_string(),
            ));
        }
        let (width, height) = frames[0].image.dimensions();
        let spec = EncodeSpec {
            codec: "libx264".to_string(),
            resolution: (width, height),
            fps: args.fps,
            output: video.clone(),
        };
        let path = FfmpegEncoder::new().encode(&frames, &spec).await?;
        println!("Video written to {}", path.display());
    }

    Ok(())
}

/// Runs the batch and drains emitted frames to disk, keeping them for
/// optional encoding.
async fn interpolate_window<R, I>(
    service: &SatloopService<R>,
    request: &satloop::reconcile::ReconcileRequest,
    interpolator: Arc<I>,
    args: &InterpolateArgs,
    cancel: &CancellationToken,
) -> Result<Vec<Frame>, CliError>
where
    R: RemoteStore + 'static,
    I: Interpolator + 'static,
{
    let (tx, mut rx) = mpsc::channel(16);
    let run = service.interpolate(request, interpolator, tx, cancel);
    tokio::pin!(run);

    let mut frames = Vec::new();
    let manifest = loop {
        tokio::select! {
            emitted = rx.recv() => {
                if let Some(emitted) = emitted {
                    let path = args.output_dir.join(format!("frame_{:04}.png", emitted.index));
                    emitted.frame.save(&path).map_err(|e| CliError::FileWrite {
                        path: path.display().to_string(),
                        error: std::io::Error::other(e.to_string()),
                    })?;
                    frames.push(emitted.frame);
                }
            }
            result = &mut run => {
                break result?;
            }
        }
    };

    // Drain anything emitted after the run future resolved
    while let Ok(emitted) = rx.try_recv() {
        let path = args.output_dir.join(format!("frame_{:04}.png", emitted.index));
        emitted.frame.save(&path).map_err(|e| CliError::FileWrite {
            path: path.display().to_string(),
            error: std::io::Error::other(e.to_string()),
        })?;
        frames.push(emitted.frame);
    }

    if manifest.failed() > 0 {
        eprintln!("Warning: {} pair(s) failed to interpolate", manifest.failed());
    }
    Ok(frames)
}
