//! Satloop - satellite imagery reconciliation and frame interpolation
//!
//! This library fills gaps in local satellite product timelines from
//! remote imagery stores, then turns the reconciled frame sequences into
//! smooth animations via tiled frame interpolation.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module provides a simplified facade:
//!
//! ```ignore
//! use satloop::config::SatloopConfig;
//! use satloop::remote::{CdnBackend, ReqwestFetch, RetryPolicy};
//! use satloop::service::SatloopService;
//!
//! let config = SatloopConfig::new("/var/lib/satloop");
//! let remote = CdnBackend::new(
//!     ReqwestFetch::new()?,
//!     config.cdn_base_url(),
//!     RetryPolicy::default(),
//! );
//! let service = SatloopService::new(config, remote)?;
//!
//! // Fill gaps in a timeline window
//! let manifest = service.reconcile(&request, &cancel).await?;
//! ```

pub mod batch;
pub mod config;
pub mod encoder;
pub mod frame;
pub mod interp;
pub mod inventory;
pub mod logging;
pub mod product;
pub mod reconcile;
pub mod remote;
pub mod service;
pub mod tilecache;
pub mod timeindex;

/// Version of the satloop library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
