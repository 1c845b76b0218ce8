//! The calibration store: range-aware retrieval and insertion.
//!
//! # Retrieval
//!
//! For a real-data point the store looks for the stored range containing it.
//! If none does, the time-independent default (if any) is returned instead.
//! Every answer carries a `next_change` point: the consumer may reuse the
//! answer for all points before it without asking again.
//!
//! Simulated points only ever see the simulation snapshot, which never
//! changes along the stream.
//!
//! # Example
//!
//! ```rust,ignore
//! use calib_store::store::{AddMode, CalibrationStore, StoreConfig};
//!
//! let mut store = CalibrationStore::open(&StoreConfig::new("/data/calibration"))?;
//! store.add(snapshot, AddMode::RightOpen)?;
//!
//! let lookup = store.get_item("TAPS_Energy", point)?;
//! if let Some(snapshot) = lookup.snapshot {
//!     // valid until lookup.next_change
//! }
//! ```

pub mod cache;
mod insert;

pub use cache::{CachePolicy, RangeCache};

use crate::backend::{DirectoryBackend, SnapshotBackend, Slot, SyncMode};
use crate::error::Result;
use crate::id::{IdRange, PointId};
use crate::snapshot::CalibrationSnapshot;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Default tolerance for strict-range boundary repair.
///
/// Clocks of successive calibration runs may disagree by a few seconds; a
/// strict insertion whose endpoints are this close to an overlapping stored
/// range relabels that range instead of failing.
pub const DEFAULT_BOUNDARY_TOLERANCE: Duration = Duration::from_secs(2);

/// Insertion policy for a new snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMode {
    /// Overwrite the time-independent default (or the simulation snapshot).
    AsDefault,
    /// Store exactly `[first, last]`, refusing real overlaps.
    StrictRange,
    /// Store `[first, open)`, trimming neighbouring ranges as needed.
    RightOpen,
}

/// Configuration for a directory-backed store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database root folder.
    pub root: PathBuf,
    /// Range scan caching. Default: disabled.
    pub cache_policy: CachePolicy,
    /// Strict-range repair tolerance. Default: 2 seconds.
    pub boundary_tolerance: Duration,
    /// Durability of snapshot and pointer writes. Default: fsync.
    pub sync_mode: SyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("calibration"),
            cache_policy: CachePolicy::default(),
            boundary_tolerance: DEFAULT_BOUNDARY_TOLERANCE,
            sync_mode: SyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Creates a configuration rooted at `root` with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Sets the range caching policy.
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Sets the strict-range repair tolerance.
    pub fn with_boundary_tolerance(mut self, tolerance: Duration) -> Self {
        self.boundary_tolerance = tolerance;
        self
    }

    /// Sets the sync mode.
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }
}

/// Result of a retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    /// The applicable snapshot, if any.
    pub snapshot: Option<CalibrationSnapshot>,
    /// First point at which the answer may differ; open if never.
    pub next_change: PointId,
}

impl Lookup {
    /// Returns true if a snapshot was found.
    pub fn is_found(&self) -> bool {
        self.snapshot.is_some()
    }
}

/// Calibration store over a [`SnapshotBackend`].
pub struct CalibrationStore<B: SnapshotBackend = DirectoryBackend> {
    backend: B,
    cache: RangeCache,
    boundary_tolerance: Duration,
}

impl CalibrationStore<DirectoryBackend> {
    /// Opens the directory-backed store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the root folder cannot be created.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let backend = DirectoryBackend::open(&config.root, config.sync_mode)?;
        Ok(Self::with_backend(
            backend,
            config.cache_policy,
            config.boundary_tolerance,
        ))
    }
}

impl<B: SnapshotBackend> CalibrationStore<B> {
    /// Creates a store over an arbitrary backend.
    pub fn with_backend(backend: B, cache_policy: CachePolicy, boundary_tolerance: Duration) -> Self {
        Self {
            backend,
            cache: RangeCache::new(cache_policy),
            boundary_tolerance,
        }
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the strict-range repair tolerance.
    pub fn boundary_tolerance(&self) -> Duration {
        self.boundary_tolerance
    }

    /// Finds the snapshot of `calibration` applicable at `point`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read. Finding nothing is
    /// reported through [`Lookup::snapshot`], not as an error.
    pub fn get_item(&mut self, calibration: &str, point: PointId) -> Result<Lookup> {
        if point.is_simulated() {
            return Ok(Lookup {
                snapshot: self.backend.load(calibration, &Slot::Simulation)?,
                next_change: PointId::OPEN,
            });
        }

        let ranges = self.valid_ranges(calibration)?;
        let upcoming = ranges
            .iter()
            .map(|range| range.start)
            .filter(|start| *start > point)
            .min()
            .unwrap_or(PointId::OPEN);

        let containing = ranges
            .iter()
            .filter(|range| range.contains(&point))
            .max_by_key(|range| range.start);
        if let Some(range) = containing {
            let next_change = range.end_exclusive().min(upcoming);
            match self.load_range(calibration, range)? {
                Some(snapshot) => {
                    return Ok(Lookup {
                        snapshot: Some(snapshot),
                        next_change,
                    })
                }
                None => warn!("Range {} of {} holds no snapshot", range, calibration),
            }
        }

        Ok(Lookup {
            snapshot: self.backend.load(calibration, &Slot::Default)?,
            next_change: upcoming,
        })
    }

    /// Lists the points at which the applicable snapshot of `calibration`
    /// changes, strictly increasing.
    pub fn change_points(&mut self, calibration: &str) -> Result<Vec<PointId>> {
        let mut points: Vec<PointId> = self
            .valid_ranges(calibration)?
            .iter()
            .flat_map(|range| [range.start, range.end_exclusive()])
            .filter(PointId::is_bounded)
            .collect();
        points.sort();
        points.dedup();
        Ok(points)
    }

    /// Lists the stored calibration names, sorted.
    pub fn calibration_names(&self) -> Result<Vec<String>> {
        self.backend.calibrations()
    }

    /// Returns the number of stored calibration names.
    pub fn calibration_count(&self) -> Result<usize> {
        Ok(self.calibration_names()?.len())
    }

    /// Returns the number of snapshot slots stored for `calibration`: one for
    /// the simulation snapshot, one for the default, one per valid range.
    pub fn snapshot_count(&mut self, calibration: &str) -> Result<usize> {
        let mut count = self.valid_ranges(calibration)?.len();
        for slot in [Slot::Simulation, Slot::Default] {
            if self.backend.contains(calibration, &slot)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Lists the valid ranges stored for `calibration`, sorted by start.
    pub fn ranges(&mut self, calibration: &str) -> Result<Vec<IdRange>> {
        self.valid_ranges(calibration)
    }

    /// Lists the revisions written to `slot`, ascending.
    pub fn history(&self, calibration: &str, slot: &Slot) -> Result<Vec<u32>> {
        self.backend.revisions(calibration, slot)
    }

    /// Loads an older revision of `slot`.
    pub fn load_revision(
        &self,
        calibration: &str,
        slot: &Slot,
        revision: u32,
    ) -> Result<Option<CalibrationSnapshot>> {
        let snapshot = self.backend.load_revision(calibration, slot, revision)?;
        Ok(match slot {
            Slot::Range(range) => snapshot.map(|s| relabel(s, range)),
            _ => snapshot,
        })
    }

    fn valid_ranges(&mut self, calibration: &str) -> Result<Vec<IdRange>> {
        let backend = &self.backend;
        let mut ranges = self
            .cache
            .get_or_scan(calibration, || backend.ranges(calibration))?;
        ranges.retain(IdRange::is_valid);
        ranges.sort_by_key(|range| range.start);
        Ok(ranges)
    }

    fn load_range(
        &self,
        calibration: &str,
        range: &IdRange,
    ) -> Result<Option<CalibrationSnapshot>> {
        Ok(self
            .backend
            .load(calibration, &Slot::Range(*range))?
            .map(|snapshot| relabel(snapshot, range)))
    }
}

/// Replaces the endpoints of a loaded snapshot with the range it is stored
/// under, keeping the flags it was written with. The stored range wins after
/// a shrink or repair.
fn relabel(mut snapshot: CalibrationSnapshot, range: &IdRange) -> CalibrationSnapshot {
    snapshot.first = range.start.with_flags(snapshot.first.flags);
    snapshot.last = range.stop.with_flags(snapshot.last.flags);
    snapshot
}
