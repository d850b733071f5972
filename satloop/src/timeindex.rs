//! Deterministic key, path, and timeline derivation.
//!
//! Every function in this module is pure: a [`ProductKey`] maps to exactly
//! one remote object key, one CDN URL, and one local cache path, and the
//! directory-encoded timestamp round-trips through [`parse_timestamp_dir`].
//! No I/O happens here, so everything is safe to call concurrently.
//!
//! Layout is `{satellite}/{product}/{year}/{day-of-year}/{hour}` with the
//! minute and band in the file name, mirroring the remote store's own
//! nesting so that a cache directory can be eyeballed against the bucket.

use crate::product::{ProductKey, ProductType};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from timestamp-directory parsing.
#[derive(Debug, Error, PartialEq)]
pub enum TimeIndexError {
    /// Input does not match the `YYYY/DDD/HHMM` pattern
    #[error("unrecognized timestamp directory '{0}' (expected YYYY/DDD/HHMM)")]
    Parse(String),
}

/// Returns the remote object key for a product.
///
/// Format: `{sat}/{product}/{YYYY}/{DDD}/{HH}/{MM}/bandNN.png`
pub fn remote_key(key: &ProductKey) -> String {
    format!(
        "{}/{}/{:04}/{:03}/{:02}/{:02}/{}.png",
        key.satellite.slug(),
        key.product_type.slug(),
        key.timestamp.year(),
        key.timestamp.ordinal(),
        key.timestamp.hour(),
        key.timestamp.minute(),
        key.band,
    )
}

/// Returns the CDN URL for a product under the given base URL.
///
/// The CDN mirrors the object-store key layout, so this is `base` joined
/// with [`remote_key`].
pub fn cdn_url(base: &str, key: &ProductKey) -> String {
    format!("{}/{}", base.trim_end_matches('/'), remote_key(key))
}

/// Returns the local cache path for a product.
///
/// The cache root mirrors the product/year/day-of-year/hour nesting of the
/// remote store; minute and band form the file name.
pub fn local_path(cache_root: &Path, key: &ProductKey) -> PathBuf {
    cache_root
        .join(key.satellite.slug())
        .join(key.product_type.slug())
        .join(format!("{:04}", key.timestamp.year()))
        .join(format!("{:03}", key.timestamp.ordinal()))
        .join(format!("{:02}", key.timestamp.hour()))
        .join(format!(
            "{:02}_{}.png",
            key.timestamp.minute(),
            key.band
        ))
}

/// Encodes a key's timestamp as the `YYYY/DDD/HHMM` directory fragment.
pub fn timestamp_dir(key: &ProductKey) -> String {
    format!(
        "{:04}/{:03}/{:02}{:02}",
        key.timestamp.year(),
        key.timestamp.ordinal(),
        key.timestamp.hour(),
        key.timestamp.minute()
    )
}

/// Parses a `YYYY/DDD/HHMM` directory fragment back into a UTC timestamp.
///
/// Inverse of [`timestamp_dir`]; fails with [`TimeIndexError::Parse`] on
/// anything that does not match the fixed pattern, including out-of-range
/// day-of-year values.
pub fn parse_timestamp_dir(dir: &str) -> Result<DateTime<Utc>, TimeIndexError> {
    let err = || TimeIndexError::Parse(dir.to_string());

    let mut parts = dir.split('/');
    let year_s = parts.next().ok_or_else(err)?;
    let doy_s = parts.next().ok_or_else(err)?;
    let hhmm_s = parts.next().ok_or_else(err)?;
    if parts.next().is_some() {
        return Err(err());
    }

    if year_s.len() != 4 || doy_s.len() != 3 || hhmm_s.len() != 4 {
        return Err(err());
    }

    let year: i32 = year_s.parse().map_err(|_| err())?;
    let doy: u32 = doy_s.parse().map_err(|_| err())?;
    let hour: u32 = hhmm_s[..2].parse().map_err(|_| err())?;
    let minute: u32 = hhmm_s[2..].parse().map_err(|_| err())?;

    let date = NaiveDate::from_yo_opt(year, doy).ok_or_else(err)?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(err)?;

    Ok(Utc.from_utc_datetime(&date.and_time(time)))
}

/// Returns the ordered, cadence-aligned timestamps expected in a window.
///
/// The first timestamp is the earliest cadence grid point at or after
/// `start`; the window end is exclusive. Grid points are minutes since
/// midnight divisible by the product's cadence, which matches the scan
/// schedules of the supported products.
pub fn expected_timestamps(
    product: ProductType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let cadence = i64::from(product.cadence_minutes());

    // Truncate to whole minutes, then round up to the cadence grid. The
    // truncated instant may precede `start` (sub-minute starts), so the
    // cursor must be re-checked against the untruncated window start.
    let truncated = start - Duration::seconds(i64::from(start.second()))
        - Duration::nanoseconds(i64::from(start.nanosecond()));
    let minute_of_day = i64::from(truncated.hour()) * 60 + i64::from(truncated.minute());
    let remainder = minute_of_day % cadence;
    let mut cursor = if remainder == 0 {
        truncated
    } else {
        truncated + Duration::minutes(cadence - remainder)
    };
    if cursor < start {
        cursor += Duration::minutes(cadence);
    }

    let mut timestamps = Vec::new();
    while cursor < end {
        timestamps.push(cursor);
        cursor += Duration::minutes(cadence);
    }
    timestamps
}
