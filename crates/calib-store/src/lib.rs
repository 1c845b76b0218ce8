//! Calib Store - time-versioned calibration constants
//!
//! This crate persists calibration data sets (gains, pedestals, fit
//! parameters) that are valid over ranges of a detector event stream, and
//! answers which data set applies at a given point of that stream.
//!
//! # Components
//!
//! - [`PointId`] / [`IdRange`]: ordered stream identifiers and intervals
//! - [`CalibrationSnapshot`]: one data set and its validity
//! - [`StorageLayout`]: the directory tree the database lives in
//! - [`CalibrationStore`]: retrieval and the three insertion policies
//! - [`CalibrationManager`]: lazily opened facade
//!
//! # Example
//!
//! ```rust,ignore
//! use calib_store::{AddMode, CalibrationManager, CalibrationSnapshot, PointId, StoreConfig};
//!
//! let mut manager = CalibrationManager::new(StoreConfig::new("/data/calibration"));
//!
//! let snapshot = CalibrationSnapshot::new("TAPS_Energy", PointId::new(start, 0), PointId::OPEN)
//!     .with_author("commissioning")
//!     .with_value(0, 1.02);
//! manager.add(snapshot, AddMode::RightOpen)?;
//!
//! if let Some((snapshot, next_change)) = manager.get_data("TAPS_Energy", point)? {
//!     // reuse `snapshot` until the stream reaches `next_change`
//! }
//! ```

#![deny(missing_docs)]

pub mod backend;
pub mod error;
pub mod id;
pub mod layout;
pub mod manager;
pub mod snapshot;
pub mod store;

pub use backend::{DirectoryBackend, MemoryBackend, SnapshotBackend, Slot, SyncMode};
pub use error::{CalibError, Result};
pub use id::{IdRange, PointFlags, PointId, Timestamp};
pub use layout::{Kind, StorageLayout};
pub use manager::{AllowAll, CalibrationManager, RefuseRanged, WriteGuard};
pub use snapshot::{CalibrationSnapshot, Channel};
pub use store::{AddMode, CachePolicy, CalibrationStore, Lookup, StoreConfig};
