//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`reconcile`] - Fill gaps in a timeline window
//! - [`status`] - Report local coverage of a window
//! - [`interpolate`] - Generate in-between frames and optionally a video

pub mod common;
pub mod interpolate;
pub mod reconcile;
pub mod status;
