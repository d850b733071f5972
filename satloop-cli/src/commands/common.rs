//! Shared helpers for CLI commands: argument parsing and service wiring.

use crate::error::CliError;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use clap::Args;
use satloop::config::{FetchConfig, SatloopConfig, StorageConfig};
use satloop::product::{Band, ProductType, Satellite};
use satloop::reconcile::ReconcileRequest;
use satloop::remote::{CdnBackend, ReqwestFetch, RetryPolicy};
use satloop::service::SatloopService;
use std::path::PathBuf;

/// Arguments selecting one product timeline window, shared by every command.
#[derive(Debug, Args)]
pub struct WindowArgs {
    /// Satellite: goes-east, goes-west, or himawari
    #[arg(long)]
    pub satellite: Satellite,

    /// Scan sector: full-disk, conus, or mesoscale
    #[arg(long)]
    pub product: ProductType,

    /// Window start, inclusive (e.g. 2024-05-02T12:00:00Z)
    #[arg(long, value_parser = parse_timestamp)]
    pub start: DateTime<Utc>,

    /// Window end, exclusive
    #[arg(long, value_parser = parse_timestamp)]
    pub end: DateTime<Utc>,

    /// Spectral band 1-16; defaults to the product's standard band
    #[arg(long)]
    pub band: Option<u8>,
}

impl WindowArgs {
    /// Builds the reconcile request, validating the band and window.
    pub fn to_request(&self) -> Result<ReconcileRequest, CliError> {
        if self.end <= self.start {
            return Err(CliError::InvalidArgument(
                "window end must be after start".to_string(),
            ));
        }
        let band = self
            .band
            .map(Band::new)
            .transpose()
            .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        Ok(ReconcileRequest {
            satellite: self.satellite,
            product: self.product,
            start: self.start,
            end: self.end,
            band,
        })
    }
}

/// Storage and remote arguments shared by every command.
#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Root directory for imagery, inventory, and tile cache
    #[arg(long, default_value = "satloop-cache")]
    pub cache_root: PathBuf,

    /// Imagery CDN base URL
    #[arg(long)]
    pub cdn_url: Option<String>,

    /// Maximum concurrent fetches
    #[arg(long, default_value_t = 4)]
    pub fetch_concurrency: usize,
}

impl StoreArgs {
    /// Builds the service configuration from the arguments.
    pub fn to_config(&self) -> SatloopConfig {
        let mut config = SatloopConfig::new(&self.cache_root)
            .with_storage(StorageConfig::new(&self.cache_root))
            .with_fetch(FetchConfig::new().with_concurrency(self.fetch_concurrency));
        if let Some(url) = &self.cdn_url {
            config = config.with_cdn_base_url(url.clone());
        }
        config
    }

    /// Wires a service against the configured CDN.
    pub fn create_service(
        &self,
        config: SatloopConfig,
    ) -> Result<SatloopService<CdnBackend<ReqwestFetch>>, CliError> {
        let http = ReqwestFetch::new()
            .map_err(|e| CliError::InvalidArgument(format!("http client: {}", e)))?;
        let remote = CdnBackend::new(http, config.cdn_base_url(), RetryPolicy::default());
        SatloopService::new(config, remote).map_err(CliError::ServiceCreation)
    }
}

/// Parses a UTC timestamp from RFC 3339 or `YYYY-MM-DDTHH:MM` shorthand.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| format!("unrecognized timestamp '{}', expected RFC 3339", raw))
}
