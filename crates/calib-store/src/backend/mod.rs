//! Persistence seam between the insertion policies and the storage medium.
//!
//! [`CalibrationStore`](crate::store::CalibrationStore) only talks to a
//! [`SnapshotBackend`]. The directory tree ([`DirectoryBackend`]) is the
//! canonical medium; [`MemoryBackend`] keeps everything in process memory.

pub mod directory;
pub mod memory;

pub use directory::{DirectoryBackend, SyncMode};
pub use memory::MemoryBackend;

use crate::error::Result;
use crate::id::IdRange;
use crate::layout::Kind;
use crate::snapshot::CalibrationSnapshot;

/// Addresses one snapshot folder of a calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The simulation snapshot.
    Simulation,
    /// The time-independent default snapshot.
    Default,
    /// The snapshot valid over a range.
    Range(IdRange),
}

impl Slot {
    /// Returns the storage kind of the slot.
    pub fn kind(&self) -> Kind {
        match self {
            Self::Simulation => Kind::Simulation,
            Self::Default => Kind::DefaultTimeIndependent,
            Self::Range(_) => Kind::TimeRanged,
        }
    }
}

/// Storage operations needed by the store.
///
/// Every slot keeps a history of revisions; writes append a revision and make
/// it the current one.
pub trait SnapshotBackend {
    /// Lists the calibration names present, sorted.
    fn calibrations(&self) -> Result<Vec<String>>;

    /// Lists the time ranges stored for `calibration`, sorted by start.
    ///
    /// Unreadable entries are reported as [`IdRange::INVALID`].
    fn ranges(&self, calibration: &str) -> Result<Vec<IdRange>>;

    /// Returns true if `slot` holds at least one revision.
    fn contains(&self, calibration: &str, slot: &Slot) -> Result<bool> {
        Ok(!self.revisions(calibration, slot)?.is_empty())
    }

    /// Loads the current revision of `slot`.
    fn load(&self, calibration: &str, slot: &Slot) -> Result<Option<CalibrationSnapshot>>;

    /// Loads a specific revision of `slot`.
    fn load_revision(
        &self,
        calibration: &str,
        slot: &Slot,
        revision: u32,
    ) -> Result<Option<CalibrationSnapshot>>;

    /// Lists the revisions of `slot`, ascending.
    fn revisions(&self, calibration: &str, slot: &Slot) -> Result<Vec<u32>>;

    /// Appends `snapshot` as the new current revision of `slot` and returns
    /// its revision number.
    fn save(&mut self, slot: &Slot, snapshot: &CalibrationSnapshot) -> Result<u32>;

    /// Re-labels the stored range `from` as `to`, keeping its revisions.
    fn rename_range(&mut self, calibration: &str, from: &IdRange, to: &IdRange) -> Result<()>;
}
