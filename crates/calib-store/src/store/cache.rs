//! Opt-in per-calibration cache of stored ranges.

use crate::error::Result;
use crate::id::IdRange;
use std::collections::HashMap;
use tracing::debug;

/// Whether range scans are memoised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Scan the backend on every request (default).
    #[default]
    Disabled,
    /// Keep the range list of each calibration for the life of the store.
    ///
    /// Writes made through the same store refresh the entry; writes made by
    /// other processes are never observed.
    PerCalibration,
}

/// Range lists memoised per calibration name.
#[derive(Debug, Default)]
pub struct RangeCache {
    policy: CachePolicy,
    entries: HashMap<String, Vec<IdRange>>,
}

impl RangeCache {
    /// Creates an empty cache following `policy`.
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
        }
    }

    /// Returns the caching policy.
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Returns the cached ranges of `calibration`, calling `scan` on a miss
    /// or when caching is disabled.
    pub fn get_or_scan<F>(&mut self, calibration: &str, scan: F) -> Result<Vec<IdRange>>
    where
        F: FnOnce() -> Result<Vec<IdRange>>,
    {
        if self.policy == CachePolicy::Disabled {
            return scan();
        }
        if let Some(ranges) = self.entries.get(calibration) {
            return Ok(ranges.clone());
        }
        let ranges = scan()?;
        debug!("Cached {} ranges for {}", ranges.len(), calibration);
        self.entries.insert(calibration.to_string(), ranges.clone());
        Ok(ranges)
    }

    /// Drops the cached ranges of `calibration`.
    pub fn invalidate(&mut self, calibration: &str) {
        self.entries.remove(calibration);
    }

    /// Returns the number of cached calibrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
