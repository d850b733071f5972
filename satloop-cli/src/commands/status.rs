//! Status command - report local coverage of a timeline window.

use super::common::{StoreArgs, WindowArgs};
use crate::error::CliError;
use clap::Args;

/// Arguments for the status command.
#[derive(Debug, Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub window: WindowArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Probe the remote for each missing key
    #[arg(long)]
    pub probe_remote: bool,
}

/// Run the status command.
pub async fn run(args: StatusArgs) -> Result<(), CliError> {
    let request = args.window.to_request()?;
    let service = args.store.create_service(args.store.to_config())?;

    let report = service.status(&request, args.probe_remote).await?;

    println!(
        "Coverage for {} {} from {} to {}:",
        request.satellite, request.product, request.start, request.end
    );
    println!("  expected: {}", report.expected);
    println!("  fresh:    {}", report.fresh);
    println!("  failed:   {}", report.failed);
    println!("  missing:  {}", report.missing);
    if let Some(available) = report.remote_available {
        println!("  of missing, available upstream: {}", available);
    }
    if report.is_complete() {
        println!("Window is fully covered.");
    }

    Ok(())
}
