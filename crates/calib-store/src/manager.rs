//! Lazily-initialised entry point used by calibration tools and consumers.
//!
//! The manager holds only a configuration until the first call that needs
//! the database, then opens the store and keeps it.

use crate::error::{CalibError, Result};
use crate::id::PointId;
use crate::snapshot::CalibrationSnapshot;
use crate::store::{AddMode, CalibrationStore, StoreConfig};
use std::path::Path;
use tracing::debug;

/// Advisory check consulted before ranged writes.
///
/// A typical guard refuses writes while the database folder has
/// uncommitted changes in version control. The store itself never enforces
/// it; it only protects callers going through [`CalibrationManager`].
pub trait WriteGuard {
    /// Returns an error if a write in `mode` to the database at `root`
    /// should not proceed.
    fn check(&self, root: &Path, mode: AddMode) -> Result<()>;
}

/// Guard accepting every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl WriteGuard for AllowAll {
    fn check(&self, _root: &Path, _mode: AddMode) -> Result<()> {
        Ok(())
    }
}

/// Facade over a lazily opened [`CalibrationStore`].
pub struct CalibrationManager {
    config: StoreConfig,
    guard: Box<dyn WriteGuard>,
    store: Option<CalibrationStore>,
}

impl CalibrationManager {
    /// Creates a manager that will open the store described by `config`.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_guard(config, Box::new(AllowAll))
    }

    /// Creates a manager with a custom write guard.
    pub fn with_guard(config: StoreConfig, guard: Box<dyn WriteGuard>) -> Self {
        Self {
            config,
            guard,
            store: None,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns true once the store has been opened.
    pub fn is_initialized(&self) -> bool {
        self.store.is_some()
    }

    fn store(&mut self) -> Result<&mut CalibrationStore> {
        let store = match self.store.take() {
            Some(store) => store,
            None => {
                debug!("Initialising calibration store at {}", self.config.root.display());
                CalibrationStore::open(&self.config)?
            }
        };
        Ok(self.store.insert(store))
    }

    /// Inserts `snapshot` following `mode`.
    ///
    /// # Errors
    ///
    /// Returns `CalibError::WriteRefused` if the write guard rejects a
    /// ranged write, otherwise whatever [`CalibrationStore::add`] returns.
    pub fn add(&mut self, snapshot: CalibrationSnapshot, mode: AddMode) -> Result<()> {
        if mode != AddMode::AsDefault {
            self.guard.check(&self.config.root, mode)?;
        }
        self.store()?.add(snapshot, mode)
    }

    /// Returns the snapshot of `calibration` applicable at `point` together
    /// with the point at which it may change, or `None` if nothing applies.
    pub fn get_data(
        &mut self,
        calibration: &str,
        point: PointId,
    ) -> Result<Option<(CalibrationSnapshot, PointId)>> {
        let lookup = self.store()?.get_item(calibration, point)?;
        Ok(lookup
            .snapshot
            .map(|snapshot| (snapshot, lookup.next_change)))
    }

    /// Lists the points at which the snapshot of `calibration` changes.
    pub fn change_points(&mut self, calibration: &str) -> Result<Vec<PointId>> {
        self.store()?.change_points(calibration)
    }

    /// Returns the number of stored calibration names.
    pub fn calibration_count(&mut self) -> Result<usize> {
        self.store()?.calibration_count()
    }

    /// Returns the number of snapshots stored for `calibration`.
    pub fn snapshot_count(&mut self, calibration: &str) -> Result<usize> {
        self.store()?.snapshot_count(calibration)
    }
}

impl std::fmt::Debug for CalibrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibrationManager")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Guard refusing ranged writes with a fixed reason.
#[derive(Debug, Clone)]
pub struct RefuseRanged(pub String);

impl WriteGuard for RefuseRanged {
    fn check(&self, root: &Path, mode: AddMode) -> Result<()> {
        Err(CalibError::WriteRefused(format!(
            "{:?} write to {}: {}",
            mode,
            root.display(),
            self.0
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SyncMode;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> StoreConfig {
        StoreConfig::new(dir.path().join("db")).with_sync_mode(SyncMode::None)
    }

    #[test]
    fn test_store_opened_lazily() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = CalibrationManager::new(config(&temp_dir));
        assert!(!manager.is_initialized());
        assert!(!temp_dir.path().join("db").exists());

        assert!(manager
            .get_data("CB_Energy", PointId::new(10, 0))
            .unwrap()
            .is_none());
        assert!(manager.is_initialized());
        assert!(temp_dir.path().join("db").is_dir());
    }

    #[test]
    fn test_guard_blocks_ranged_writes_only() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = CalibrationManager::with_guard(
            config(&temp_dir),
            Box::new(RefuseRanged("uncommitted changes".to_string())),
        );
        let snapshot =
            CalibrationSnapshot::new("CB_Energy", PointId::new(10, 0), PointId::new(20, 0));

        assert!(matches!(
            manager.add(snapshot.clone(), AddMode::StrictRange),
            Err(CalibError::WriteRefused(_))
        ));
        assert!(matches!(
            manager.add(snapshot.clone(), AddMode::RightOpen),
            Err(CalibError::WriteRefused(_))
        ));
        manager.add(snapshot, AddMode::AsDefault).unwrap();
        assert_eq!(manager.snapshot_count("CB_Energy").unwrap(), 1);
    }
}
