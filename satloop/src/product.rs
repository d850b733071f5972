//! Product identity types.
//!
//! A [`ProductKey`] uniquely identifies one satellite image product at one
//! timestamp and band. It is the join key between the expected timeline,
//! the local inventory, and the remote store, and is cheap to copy and
//! recompute — keys are never persisted on their own.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Satellites this engine knows how to index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Satellite {
    /// GOES-East (GOES-16 position)
    GoesEast,
    /// GOES-West (GOES-18 position)
    GoesWest,
    /// Himawari (JMA)
    Himawari,
}

impl Satellite {
    /// Returns the slug used in remote keys and local paths.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::GoesEast => "goes-east",
            Self::GoesWest => "goes-west",
            Self::Himawari => "himawari",
        }
    }

    fn order_index(&self) -> u8 {
        match self {
            Self::GoesEast => 0,
            Self::GoesWest => 1,
            Self::Himawari => 2,
        }
    }
}

impl fmt::Display for Satellite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl FromStr for Satellite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "goes-east" => Ok(Self::GoesEast),
            "goes-west" => Ok(Self::GoesWest),
            "himawari" => Ok(Self::Himawari),
            other => Err(format!(
                "unknown satellite '{}' (expected goes-east, goes-west, or himawari)",
                other
            )),
        }
    }
}

/// Scan sector produced by the imager.
///
/// Cadence and default band are fixed per product: the scan schedule is a
/// property of the instrument, not of any one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductType {
    /// Full-disk scan, one image every 10 minutes
    FullDisk,
    /// CONUS sector, one image every 5 minutes
    Conus,
    /// Mesoscale sector, one image every minute
    Mesoscale,
}

impl ProductType {
    /// Returns the slug used in remote keys and local paths.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::FullDisk => "full-disk",
            Self::Conus => "conus",
            Self::Mesoscale => "mesoscale",
        }
    }

    /// Returns the scan cadence in minutes.
    pub fn cadence_minutes(&self) -> u32 {
        match self {
            Self::FullDisk => 10,
            Self::Conus => 5,
            Self::Mesoscale => 1,
        }
    }

    /// Returns the band used when a key is built without an explicit band.
    ///
    /// Band 13 (clean IR) for the wide sectors, band 2 (visible red) for
    /// mesoscale, which is most often requested for daytime storm loops.
    pub fn default_band(&self) -> Band {
        match self {
            Self::FullDisk | Self::Conus => Band(13),
            Self::Mesoscale => Band(2),
        }
    }

    fn order_index(&self) -> u8 {
        match self {
            Self::FullDisk => 0,
            Self::Conus => 1,
            Self::Mesoscale => 2,
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl FromStr for ProductType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full-disk" => Ok(Self::FullDisk),
            "conus" => Ok(Self::Conus),
            "mesoscale" => Ok(Self::Mesoscale),
            other => Err(format!(
                "unknown product '{}' (expected full-disk, conus, or mesoscale)",
                other
            )),
        }
    }
}

/// Spectral band number, 1 through 16 on the ABI instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Band(pub u8);

impl Band {
    /// Creates a band, validating the 1..=16 instrument range.
    pub fn new(band: u8) -> Result<Self, String> {
        if (1..=16).contains(&band) {
            Ok(Self(band))
        } else {
            Err(format!("band {} out of range (1-16)", band))
        }
    }

    /// Returns the raw band number.
    #[inline]
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "band{:02}", self.0)
    }
}

/// Canonical identifier for one satellite image product.
///
/// Keys are immutable, hashable, and totally ordered by timestamp then
/// band (then satellite and product, so the order is consistent with
/// equality). Equal keys always derive equal remote locators and local
/// paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProductKey {
    /// Which satellite produced the image
    pub satellite: Satellite,
    /// Which scan sector
    pub product_type: ProductType,
    /// Scan start time, UTC, minute precision
    pub timestamp: DateTime<Utc>,
    /// Spectral band
    pub band: Band,
}

impl ProductKey {
    /// Creates a key with an explicit band.
    pub fn new(
        satellite: Satellite,
        product_type: ProductType,
        timestamp: DateTime<Utc>,
        band: Band,
    ) -> Self {
        Self {
            satellite,
            product_type,
            timestamp,
            band,
        }
    }

    /// Creates a key using the product's default band.
    pub fn with_default_band(
        satellite: Satellite,
        product_type: ProductType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            satellite,
            product_type,
            timestamp,
            product_type.default_band(),
        )
    }
}

impl Ord for ProductKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.band.cmp(&other.band))
            .then(self.satellite.order_index().cmp(&other.satellite.order_index()))
            .then(
                self.product_type
                    .order_index()
                    .cmp(&other.product_type.order_index()),
            )
    }
}

impl PartialOrd for ProductKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.satellite,
            self.product_type,
            self.timestamp.format("%Y-%m-%dT%H:%MZ"),
            self.band
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, h, m, 0).unwrap()
    }

    #[test]
    fn test_satellite_slug_round_trip() {
        for sat in [Satellite::GoesEast, Satellite::GoesWest, Satellite::Himawari] {
            assert_eq!(sat.slug().parse::<Satellite>().unwrap(), sat);
        }
    }

    #[test]
    fn test_product_slug_round_trip() {
        for product in [ProductType::FullDisk, ProductType::Conus, ProductType::Mesoscale] {
            assert_eq!(product.slug().parse::<ProductType>().unwrap(), product);
        }
    }

    #[test]
    fn test_unknown_satellite_rejected() {
        assert!("goes-17".parse::<Satellite>().is_err());
    }

    #[test]
    fn test_band_range() {
        assert!(Band::new(1).is_ok());
        assert!(Band::new(16).is_ok());
        assert!(Band::new(0).is_err());
        assert!(Band::new(17).is_err());
    }

    #[test]
    fn test_default_band_per_product() {
        assert_eq!(ProductType::FullDisk.default_band(), Band(13));
        assert_eq!(ProductType::Conus.default_band(), Band(13));
        assert_eq!(ProductType::Mesoscale.default_band(), Band(2));
    }

    #[test]
    fn test_cadence() {
        assert_eq!(ProductType::FullDisk.cadence_minutes(), 10);
        assert_eq!(ProductType::Conus.cadence_minutes(), 5);
        assert_eq!(ProductType::Mesoscale.cadence_minutes(), 1);
    }

    #[test]
    fn test_key_ordered_by_timestamp_then_band() {
        let a = ProductKey::new(Satellite::GoesEast, ProductType::Conus, ts(5, 0), Band(2));
        let b = ProductKey::new(Satellite::GoesEast, ProductType::Conus, ts(5, 0), Band(13));
        let c = ProductKey::new(Satellite::GoesEast, ProductType::Conus, ts(5, 5), Band(1));

        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_equal_keys_hash_equal() {
        use std::collections::HashSet;

        let a = ProductKey::with_default_band(Satellite::GoesWest, ProductType::FullDisk, ts(0, 0));
        let b = ProductKey::with_default_band(Satellite::GoesWest, ProductType::FullDisk, ts(0, 0));

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_key_display() {
        let key = ProductKey::new(Satellite::GoesEast, ProductType::Conus, ts(14, 35), Band(13));
        assert_eq!(format!("{}", key), "goes-east/conus/2024-05-02T14:35Z/band13");
    }
}
