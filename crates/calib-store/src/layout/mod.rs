//! Directory layout of the calibration database.
//!
//! ```text
//! <root>/<calibration>/MC/current                                   (+ 0000, 0001, ...)
//! <root>/<calibration>/DataDefault/current                          (+ 0000, 0001, ...)
//! <root>/<calibration>/DataRanges/<YYYY-MM-DD>/<start>-<stop>/current (+ 0000, 0001, ...)
//! ```
//!
//! Range folders are bucketed by the day of their start point to keep the
//! directory fan-out bounded. Each folder keeps every revision written to it
//! as a numbered file; `current` names the newest one.

use crate::error::Result;
use crate::id::{IdRange, OPEN_TOKEN};
use crate::snapshot::file::write_atomic;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the pointer file inside every snapshot folder.
pub const CURRENT_POINTER: &str = "current";

/// Minimum width of a numbered revision file name.
const REVISION_WIDTH: usize = 4;

/// Storage category of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Time-independent calibration for simulated data.
    Simulation,
    /// Time-independent fallback for real data.
    DefaultTimeIndependent,
    /// Real-data calibration valid over a range of points.
    TimeRanged,
}

impl Kind {
    /// Returns the folder name used for this kind.
    pub fn folder_name(self) -> &'static str {
        match self {
            Self::Simulation => "MC",
            Self::DefaultTimeIndependent => "DataDefault",
            Self::TimeRanged => "DataRanges",
        }
    }
}

/// A range folder found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeFolder {
    /// Range parsed from the folder name; [`IdRange::INVALID`] if malformed.
    pub range: IdRange,
    /// Full folder path.
    pub path: PathBuf,
}

/// Maps calibration names, kinds and ranges to filesystem paths.
///
/// # Examples
/// ```rust,ignore
/// use calib_store::layout::{Kind, StorageLayout};
///
/// let layout = StorageLayout::new("/data/calibration");
/// let dir = layout.folder_for("TAPS_Energy", Kind::DefaultTimeIndependent);
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Creates a layout rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Returns the database root folder.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the folder holding everything stored for `calibration`.
    pub fn calibration_dir(&self, calibration: &str) -> PathBuf {
        self.root.join(calibration)
    }

    /// Returns the folder for `kind` of `calibration`.
    ///
    /// For [`Kind::TimeRanged`] this is the parent of the day buckets.
    pub fn folder_for(&self, calibration: &str, kind: Kind) -> PathBuf {
        self.calibration_dir(calibration).join(kind.folder_name())
    }

    /// Returns the leaf folder for `range` of `calibration`.
    ///
    /// # Examples
    /// ```rust,ignore
    /// use calib_store::id::{IdRange, PointId};
    /// use calib_store::layout::StorageLayout;
    ///
    /// let layout = StorageLayout::new("/db");
    /// let path = layout.range_folder_for("CB_Time", &IdRange::right_open(PointId::new(0, 0)));
    /// // /db/CB_Time/DataRanges/1970-01-01/19700101T000000_0x00000000-OPEN
    /// ```
    pub fn range_folder_for(&self, calibration: &str, range: &IdRange) -> PathBuf {
        let bucket = range
            .start
            .day_bucket()
            .unwrap_or_else(|| OPEN_TOKEN.to_string());
        self.folder_for(calibration, Kind::TimeRanged)
            .join(bucket)
            .join(range.to_string())
    }

    /// Returns the path of the `current` pointer inside a snapshot folder.
    pub fn current_file_path(&self, folder: &Path) -> PathBuf {
        folder.join(CURRENT_POINTER)
    }

    /// Returns the path of revision `revision` inside a snapshot folder.
    pub fn revision_path(&self, folder: &Path, revision: u32) -> PathBuf {
        folder.join(revision_name(revision))
    }

    /// Lists the calibration names present under the root, sorted.
    pub fn list_calibrations(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = list_subdirs(&self.root)?
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Scans the two-level day/range structure of `calibration`.
    ///
    /// Folder names that do not parse are returned with
    /// [`IdRange::INVALID`] and logged; they never fail the scan. The result
    /// is sorted by range start, invalid ranges last.
    pub fn enumerate_ranges(&self, calibration: &str) -> Result<Vec<RangeFolder>> {
        let ranges_dir = self.folder_for(calibration, Kind::TimeRanged);
        let mut folders = Vec::new();

        for (_, day_path) in list_subdirs(&ranges_dir)? {
            for (name, path) in list_subdirs(&day_path)? {
                let range = match name.parse::<IdRange>() {
                    Ok(range) => range,
                    Err(err) => {
                        warn!(
                            "Ignoring malformed range folder {}: {}",
                            path.display(),
                            err
                        );
                        IdRange::INVALID
                    }
                };
                folders.push(RangeFolder { range, path });
            }
        }

        folders.sort_by(|a, b| {
            (!a.range.is_valid(), a.range.start, &a.path).cmp(&(
                !b.range.is_valid(),
                b.range.start,
                &b.path,
            ))
        });
        Ok(folders)
    }

    /// Lists the numbered revisions inside a snapshot folder, ascending.
    pub fn list_revisions(&self, folder: &Path) -> Result<Vec<u32>> {
        let entries = match fs::read_dir(folder) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut revisions = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(revision) = entry.file_name().to_str().and_then(parse_revision_name) {
                revisions.push(revision);
            }
        }
        revisions.sort_unstable();
        Ok(revisions)
    }

    /// Resolves the `current` pointer of a snapshot folder to a file path.
    ///
    /// A missing or dangling pointer (e.g. after a crash between writing a
    /// revision and relinking) falls back to the highest revision on disk.
    /// Returns `None` if the folder holds no revision at all.
    pub fn resolve_current(&self, folder: &Path) -> Result<Option<PathBuf>> {
        let pointer = self.current_file_path(folder);
        match fs::read_to_string(&pointer) {
            Ok(content) => {
                let target = content.trim();
                if parse_revision_name(target).is_some() {
                    let path = folder.join(target);
                    if path.is_file() {
                        return Ok(Some(path));
                    }
                }
                warn!(
                    "Stale current pointer {} -> {:?}, using newest revision",
                    pointer.display(),
                    target
                );
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                if folder.is_dir() && !self.list_revisions(folder)?.is_empty() {
                    warn!(
                        "Missing current pointer in {}, using newest revision",
                        folder.display()
                    );
                }
            }
            Err(err) => return Err(err.into()),
        }

        Ok(self
            .list_revisions(folder)?
            .last()
            .map(|revision| self.revision_path(folder, *revision)))
    }

    /// Writes a new revision into `folder` and points `current` at it.
    ///
    /// `write` receives the path of the new revision file. Returns the
    /// revision number.
    pub fn write_revision<F>(&self, folder: &Path, sync: bool, write: F) -> Result<u32>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        fs::create_dir_all(folder)?;
        let revision = match self.list_revisions(folder)?.last() {
            Some(last) => last + 1,
            None => 0,
        };
        let path = self.revision_path(folder, revision);
        write(&path)?;

        let pointer = self.current_file_path(folder);
        write_atomic(&pointer, revision_name(revision).as_bytes(), sync)?;
        debug!("Wrote revision {} to {}", revision, folder.display());
        Ok(revision)
    }

    /// Moves the folder of range `from` to the folder of range `to`.
    ///
    /// An emptied day bucket is removed.
    pub fn rename_range(&self, calibration: &str, from: &IdRange, to: &IdRange) -> Result<PathBuf> {
        let source = self.range_folder_for(calibration, from);
        let target = self.range_folder_for(calibration, to);
        if source == target {
            return Ok(target);
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&source, &target)?;
        debug!(
            "Renamed range folder {} -> {}",
            source.display(),
            target.display()
        );

        if let Some(old_bucket) = source.parent() {
            if fs::read_dir(old_bucket)?.next().is_none() {
                fs::remove_dir(old_bucket)?;
            }
        }
        Ok(target)
    }
}

/// Builds a revision file name, zero-padded to four digits.
pub fn revision_name(revision: u32) -> String {
    format!("{:0width$}", revision, width = REVISION_WIDTH)
}

/// Parses a revision file name.
pub fn parse_revision_name(name: &str) -> Option<u32> {
    if name.len() < REVISION_WIDTH || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Lists non-hidden subdirectories of `dir` as `(name, path)`.
/// A missing directory yields an empty list.
fn list_subdirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = match entry.file_name().to_str() {
            Some(name) if !name.starts_with('.') => name.to_string(),
            _ => continue,
        };
        dirs.push((name, entry.path()));
    }
    Ok(dirs)
}
