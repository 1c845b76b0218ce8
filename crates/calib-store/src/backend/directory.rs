//! Directory-tree backend: the database is a plain folder hierarchy.

use crate::backend::{SnapshotBackend, Slot};
use crate::error::Result;
use crate::id::IdRange;
use crate::layout::StorageLayout;
use crate::snapshot::file::{read_snapshot, write_snapshot};
use crate::snapshot::CalibrationSnapshot;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sync mode for snapshot and pointer files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Fsync every file before it is renamed into place (default).
    #[default]
    Fsync,
    /// No sync (fastest, lowest durability - for testing only).
    None,
}

/// Backend storing snapshots in the folder layout of [`StorageLayout`].
#[derive(Debug, Clone)]
pub struct DirectoryBackend {
    layout: StorageLayout,
    sync_mode: SyncMode,
}

impl DirectoryBackend {
    /// Opens the database at `root`, creating the folder if needed.
    pub fn open(root: impl AsRef<Path>, sync_mode: SyncMode) -> Result<Self> {
        let layout = StorageLayout::new(root);
        fs::create_dir_all(layout.root())?;
        debug!("Opened calibration database at {}", layout.root().display());
        Ok(Self { layout, sync_mode })
    }

    /// Returns the layout used by this backend.
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    fn slot_folder(&self, calibration: &str, slot: &Slot) -> PathBuf {
        match slot {
            Slot::Range(range) => self.layout.range_folder_for(calibration, range),
            other => self.layout.folder_for(calibration, other.kind()),
        }
    }
}

impl SnapshotBackend for DirectoryBackend {
    fn calibrations(&self) -> Result<Vec<String>> {
        self.layout.list_calibrations()
    }

    fn ranges(&self, calibration: &str) -> Result<Vec<IdRange>> {
        Ok(self
            .layout
            .enumerate_ranges(calibration)?
            .into_iter()
            .map(|folder| folder.range)
            .collect())
    }

    fn load(&self, calibration: &str, slot: &Slot) -> Result<Option<CalibrationSnapshot>> {
        let folder = self.slot_folder(calibration, slot);
        match self.layout.resolve_current(&folder)? {
            Some(path) => Ok(Some(read_snapshot(&path)?)),
            None => Ok(None),
        }
    }

    fn load_revision(
        &self,
        calibration: &str,
        slot: &Slot,
        revision: u32,
    ) -> Result<Option<CalibrationSnapshot>> {
        let folder = self.slot_folder(calibration, slot);
        let path = self.layout.revision_path(&folder, revision);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(read_snapshot(&path)?))
    }

    fn revisions(&self, calibration: &str, slot: &Slot) -> Result<Vec<u32>> {
        let folder = self.slot_folder(calibration, slot);
        self.layout.list_revisions(&folder)
    }

    fn save(&mut self, slot: &Slot, snapshot: &CalibrationSnapshot) -> Result<u32> {
        let folder = self.slot_folder(&snapshot.calibration, slot);
        let sync = self.sync_mode == SyncMode::Fsync;
        self.layout
            .write_revision(&folder, sync, |path| write_snapshot(path, snapshot, sync))
    }

    fn rename_range(&mut self, calibration: &str, from: &IdRange, to: &IdRange) -> Result<()> {
        self.layout.rename_range(calibration, from, to).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::PointId;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_slots() {
        let temp_dir = TempDir::new().unwrap();
        let mut backend = DirectoryBackend::open(temp_dir.path().join("db"), SyncMode::None).unwrap();
        let range = IdRange::new(PointId::new(100, 0), PointId::new(200, 0));
        let snapshot =
            CalibrationSnapshot::new("PID_Phi", range.start, range.stop).with_value(1, 2.0);

        assert_eq!(backend.save(&Slot::Range(range), &snapshot).unwrap(), 0);
        assert_eq!(backend.save(&Slot::Range(range), &snapshot.clone().with_value(1, 3.0)).unwrap(), 1);

        assert_eq!(backend.calibrations().unwrap(), vec!["PID_Phi".to_string()]);
        assert_eq!(backend.ranges("PID_Phi").unwrap(), vec![range]);
        assert_eq!(backend.revisions("PID_Phi", &Slot::Range(range)).unwrap(), vec![0, 1]);

        let current = backend.load("PID_Phi", &Slot::Range(range)).unwrap().unwrap();
        assert_eq!(current.values.get(&1), Some(&3.0));
        let first = backend.load_revision("PID_Phi", &Slot::Range(range), 0).unwrap().unwrap();
        assert_eq!(first.values.get(&1), Some(&2.0));

        assert!(backend.load("PID_Phi", &Slot::Default).unwrap().is_none());
        assert!(!backend.contains("PID_Phi", &Slot::Simulation).unwrap());
    }

    #[test]
    fn test_rename_keeps_revisions() {
        let temp_dir = TempDir::new().unwrap();
        let mut backend = DirectoryBackend::open(temp_dir.path(), SyncMode::None).unwrap();
        let from = IdRange::right_open(PointId::new(100, 0));
        let to = IdRange::new(PointId::new(100, 0), PointId::new(150, 0));
        let snapshot = CalibrationSnapshot::new("X", from.start, from.stop);
        backend.save(&Slot::Range(from), &snapshot).unwrap();

        backend.rename_range("X", &from, &to).unwrap();

        assert_eq!(backend.ranges("X").unwrap(), vec![to]);
        assert_eq!(backend.revisions("X", &Slot::Range(to)).unwrap(), vec![0]);
        assert!(backend.load("X", &Slot::Range(from)).unwrap().is_none());
    }
}
