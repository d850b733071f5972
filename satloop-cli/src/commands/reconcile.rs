//! Reconcile command - fill gaps in a timeline window.

use super::common::{StoreArgs, WindowArgs};
use crate::error::CliError;
use clap::Args;
use satloop::reconcile::FetchOutcome;
use tokio_util::sync::CancellationToken;

/// Arguments for the reconcile command.
#[derive(Debug, Args)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub window: WindowArgs,

    #[command(flatten)]
    pub store: StoreArgs,
}

/// Run the reconcile command.
pub async fn run(args: ReconcileArgs, cancel: CancellationToken) -> Result<(), CliError> {
    let request = args.window.to_request()?;
    let service = args.store.create_service(args.store.to_config())?;

    println!(
        "Reconciling {} {} from {} to {}",
        request.satellite, request.product, request.start, request.end
    );

    let manifest = service.reconcile(&request, &cancel).await?;

    for (key, outcome) in manifest.iter() {
        match outcome {
            FetchOutcome::Fetched {
                bytes_written,
                attempts,
            } => println!("  fetched  {} ({} bytes, {} attempts)", key, bytes_written, attempts),
            FetchOutcome::AlreadyPresent => println!("  present  {}", key),
            FetchOutcome::NotFound => println!("  absent   {}", key),
            FetchOutcome::Failed { attempts, error } => {
                println!("  FAILED   {} after {} attempts: {}", key, attempts, error)
            }
            FetchOutcome::Skipped => println!("  skipped  {}", key),
        }
    }

    println!();
    println!(
        "{} expected: {} fetched, {} present, {} absent upstream, {} failed, {} skipped",
        manifest.len(),
        manifest.fetched(),
        manifest.already_present(),
        manifest.not_found(),
        manifest.failed(),
        manifest.skipped()
    );

    Ok(())
}
