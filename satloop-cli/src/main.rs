//! Satloop CLI - Command-line interface
//!
//! This binary provides a command-line interface to the satloop library:
//! reconciling satellite product timelines against a remote store and
//! interpolating the reconciled frames into smooth sequences.

use clap::{Parser, Subcommand};
use satloop::logging::{default_log_dir, default_log_file, init_logging};
use tokio_util::sync::CancellationToken;
use tracing::info;

mod commands;
mod error;

use error::CliError;

#[derive(Parser)]
#[command(name = "satloop")]
#[command(version = satloop::VERSION)]
#[command(about = "Reconcile and interpolate satellite imagery timelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch missing imagery for a timeline window
    Reconcile(commands::reconcile::ReconcileArgs),
    /// Report local coverage of a timeline window
    Status(commands::status::StatusArgs),
    /// Generate in-between frames for a timeline window
    Interpolate(commands::interpolate::InterpolateArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _guard = match init_logging(default_log_dir(), default_log_file()) {
        Ok(guard) => guard,
        Err(e) => CliError::LoggingInit(e.to_string()).exit(),
    };
    info!(version = satloop::VERSION, "satloop starting");

    // Ctrl-C stops dispatching new work; in-flight transfers finish
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing in-flight work...");
            signal_cancel.cancel();
        }
    });

    let result = match cli.command {
        Command::Reconcile(args) => commands::reconcile::run(args, cancel).await,
        Command::Status(args) => commands::status::run(args).await,
        Command::Interpolate(args) => commands::interpolate::run(args, cancel).await,
    };

    if let Err(e) = result {
        e.exit();
    }
}
