//! Outcome manifest for a reconciliation run.

use crate::product::ProductKey;
use std::collections::BTreeMap;

/// Terminal outcome for one key in a reconciliation run.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A Fresh inventory record already covered this key
    AlreadyPresent,
    /// Fetched from the remote store this run
    Fetched {
        /// Bytes written to the local cache
        bytes_written: u64,
        /// Attempts made, including the successful one
        attempts: u32,
    },
    /// Remote store has no object for this key; permanent gap
    NotFound,
    /// Retries exhausted or fatal remote error; re-attempted next run
    Failed {
        /// Attempts made before giving up
        attempts: u32,
        /// Last error observed
        error: String,
    },
    /// Run was cancelled before this key was dispatched
    Skipped,
}

/// Complete, keyed outcome set for one reconciliation run.
///
/// Keyed by [`ProductKey`], not completion order: concurrent fetches may
/// finish out of order but the manifest is always total over the expected
/// set (Skipped entries included when a run is cancelled). Iteration is
/// timestamp-ordered via the underlying `BTreeMap`.
#[derive(Debug, Default)]
pub struct ReconcileManifest {
    outcomes: BTreeMap<ProductKey, FetchOutcome>,
}

impl ReconcileManifest {
    /// Creates an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome for a key.
    pub fn insert(&mut self, key: ProductKey, outcome: FetchOutcome) {
        self.outcomes.insert(key, outcome);
    }

    /// Returns the outcome for a key, if present.
    pub fn get(&self, key: &ProductKey) -> Option<&FetchOutcome> {
        self.outcomes.get(key)
    }

    /// Iterates outcomes in timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = (&ProductKey, &FetchOutcome)> {
        self.outcomes.iter()
    }

    /// Total number of keys in the run.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true if the manifest holds no outcomes.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    fn count(&self, pred: impl Fn(&FetchOutcome) -> bool) -> usize {
        self.outcomes.values().filter(|o| pred(o)).count()
    }

    /// Keys already Fresh before the run.
    pub fn already_present(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::AlreadyPresent))
    }

    /// Keys fetched during the run.
    pub fn fetched(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Fetched { .. }))
    }

    /// Keys absent from the remote store.
    pub fn not_found(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::NotFound))
    }

    /// Keys whose fetch failed after retries.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Failed { .. }))
    }

    /// Keys skipped due to cancellation.
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Skipped))
    }

    /// Returns true if every key ended Fresh (present or fetched).
    pub fn is_complete(&self) -> bool {
        self.outcomes.values().all(|o| {
            matches!(o, FetchOutcome::AlreadyPresent | FetchOutcome::Fetched { .. })
        })
    }
}

impl IntoIterator for ReconcileManifest {
    type Item = (ProductKey, FetchOutcome);
    type IntoIter = std::collections::btree_map::IntoIter<ProductKey, FetchOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{Band, ProductType, Satellite};
    use chrono::{TimeZone, Utc};

    fn key(m: u32) -> ProductKey {
        ProductKey::new(
            Satellite::GoesEast,
            ProductType::Conus,
            Utc.with_ymd_and_hms(2024, 5, 2, 12, m, 0).unwrap(),
            Band(13),
        )
    }

    #[test]
    fn test_counts() {
        let mut manifest = ReconcileManifest::new();
        manifest.insert(key(0), FetchOutcome::AlreadyPresent);
        manifest.insert(
            key(5),
            FetchOutcome::Fetched {
                bytes_written: 10,
                attempts: 1,
            },
        );
        manifest.insert(key(10), FetchOutcome::NotFound);
        manifest.insert(
            key(15),
            FetchOutcome::Failed {
                attempts: 4,
                error: "transient".into(),
            },
        );

        assert_eq!(manifest.len(), 4);
        assert_eq!(manifest.already_present(), 1);
        assert_eq!(manifest.fetched(), 1);
        assert_eq!(manifest.not_found(), 1);
        assert_eq!(manifest.failed(), 1);
        assert!(!manifest.is_complete());
    }

    #[test]
    fn test_iteration_is_timestamp_ordered() {
        let mut manifest = ReconcileManifest::new();
        for m in [15, 0, 10, 5] {
            manifest.insert(key(m), FetchOutcome::AlreadyPresent);
        }

        let minutes: Vec<u32> = manifest
            .iter()
            .map(|(k, _)| k.timestamp.format("%M").to_string().parse().unwrap())
            .collect();
        assert_eq!(minutes, vec![0, 5, 10, 15]);
    }

    #[test]
    fn test_complete_manifest() {
        let mut manifest = ReconcileManifest::new();
        manifest.insert(key(0), FetchOutcome::AlreadyPresent);
        manifest.insert(
            key(5),
            FetchOutcome::Fetched {
                bytes_written: 1,
                attempts: 2,
            },
        );
        assert!(manifest.is_complete());
    }
}
