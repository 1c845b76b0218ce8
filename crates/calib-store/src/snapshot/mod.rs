//! Calibration snapshots: one data set valid over one range of points.

pub mod file;

use crate::id::{IdRange, PointId, Timestamp};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Detector channel index.
pub type Channel = u32;

/// One calibration data set.
///
/// A snapshot is built by a calibration tool, handed once to the store and
/// never changed afterwards. Snapshots returned by the store are independent
/// copies.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSnapshot {
    /// Name of the calibration this data set belongs to (e.g. `"TAPS_Energy"`).
    pub calibration: String,
    /// First point the data set applies to.
    pub first: PointId,
    /// Last point the data set applies to, or open.
    pub last: PointId,
    /// Per-channel scalar values (gains, pedestals, ...).
    pub values: BTreeMap<Channel, f64>,
    /// Per-channel auxiliary parameters, typically fit results.
    pub fit_parameters: BTreeMap<Channel, Vec<f64>>,
    /// Who produced the data set.
    pub author: String,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: Timestamp,
}

impl CalibrationSnapshot {
    /// Creates an empty snapshot for `calibration` covering `[first, last]`,
    /// stamped with the current time.
    pub fn new(calibration: impl Into<String>, first: PointId, last: PointId) -> Self {
        Self {
            calibration: calibration.into(),
            first,
            last,
            values: BTreeMap::new(),
            fit_parameters: BTreeMap::new(),
            author: String::new(),
            created_at: current_timestamp_secs(),
        }
    }

    /// Sets the author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Sets the scalar value of one channel.
    pub fn with_value(mut self, channel: Channel, value: f64) -> Self {
        self.values.insert(channel, value);
        self
    }

    /// Sets the fit parameters of one channel.
    pub fn with_fit_parameters(mut self, channel: Channel, params: Vec<f64>) -> Self {
        self.fit_parameters.insert(channel, params);
        self
    }

    /// Returns `[first, last]` as a range.
    pub fn range(&self) -> IdRange {
        IdRange::new(self.first, self.last)
    }

    /// Returns true if the snapshot belongs to the simulation side.
    ///
    /// Decided by the first point alone: the last point is ignored by
    /// right-open insertion, and must carry the same flags otherwise.
    pub fn is_simulated(&self) -> bool {
        self.first.is_simulated()
    }
}

fn current_timestamp_secs() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as Timestamp)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let snapshot = CalibrationSnapshot::new("CB_Energy", PointId::new(10, 0), PointId::new(20, 0))
            .with_author("shift crew")
            .with_value(3, 1.25)
            .with_fit_parameters(3, vec![0.5, 2.0]);

        assert_eq!(snapshot.values.get(&3), Some(&1.25));
        assert_eq!(snapshot.fit_parameters.get(&3).map(Vec::len), Some(2));
        assert_eq!(snapshot.range(), IdRange::new(PointId::new(10, 0), PointId::new(20, 0)));
        assert!(snapshot.created_at > 0);
        assert!(!snapshot.is_simulated());
    }

    #[test]
    fn test_simulated_follows_first_point() {
        let snapshot =
            CalibrationSnapshot::new("CB_Energy", PointId::new(0, 0), PointId::simulated(5, 0));
        assert!(!snapshot.is_simulated());
    }

    #[test]
    fn test_is_simulated() {
        let snapshot = CalibrationSnapshot::new("CB_Energy", PointId::simulated(0, 0), PointId::OPEN);
        assert!(snapshot.is_simulated());
    }
}
