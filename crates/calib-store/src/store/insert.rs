//! Insertion policies.

use crate::backend::{SnapshotBackend, Slot};
use crate::error::{CalibError, Result};
use crate::id::{IdRange, PointId};
use crate::snapshot::file::MAX_STRING_LEN;
use crate::snapshot::CalibrationSnapshot;
use crate::store::{AddMode, CalibrationStore};
use tracing::{debug, warn};

impl<B: SnapshotBackend> CalibrationStore<B> {
    /// Inserts `snapshot` following `mode`.
    ///
    /// Snapshots carrying the simulated flag always land in the simulation
    /// slot, whatever the mode.
    ///
    /// # Errors
    ///
    /// - `CalibError::Validation` if the snapshot fails a precondition.
    /// - `CalibError::RangeConflict` if a strict range overlaps a stored
    ///   range beyond the boundary tolerance.
    ///
    /// In both cases nothing is written.
    pub fn add(&mut self, snapshot: CalibrationSnapshot, mode: AddMode) -> Result<()> {
        validate(&snapshot, mode)?;
        let calibration = snapshot.calibration.clone();

        let result = if snapshot.is_simulated() {
            self.write(&Slot::Simulation, &snapshot)
        } else {
            match mode {
                AddMode::AsDefault => self.write(&Slot::Default, &snapshot),
                AddMode::StrictRange => self.add_strict_range(&snapshot),
                AddMode::RightOpen => self.add_right_open(&snapshot),
            }
        };

        self.cache.invalidate(&calibration);
        result
    }

    fn add_strict_range(&mut self, snapshot: &CalibrationSnapshot) -> Result<()> {
        let requested = snapshot.range();
        let overlapping: Vec<IdRange> = self
            .valid_ranges(&snapshot.calibration)?
            .into_iter()
            .filter(|range| !range.is_disjoint(&requested))
            .collect();

        match overlapping.as_slice() {
            [] => self.write(&Slot::Range(requested), snapshot),
            [existing] if *existing == requested => {
                debug!(
                    "Refining range {} of {}",
                    requested, snapshot.calibration
                );
                self.write(&Slot::Range(requested), snapshot)
            }
            [existing] if existing.within_tolerance(&requested, self.boundary_tolerance) => {
                warn!(
                    "Adjusting range {} of {} to {} (within {:?} tolerance)",
                    existing, snapshot.calibration, requested, self.boundary_tolerance
                );
                self.backend
                    .rename_range(&snapshot.calibration, existing, &requested)?;
                self.write(&Slot::Range(requested), snapshot)
            }
            [existing, ..] => Err(CalibError::RangeConflict {
                existing: *existing,
                requested,
            }),
        }
    }

    fn add_right_open(&mut self, snapshot: &CalibrationSnapshot) -> Result<()> {
        let first = snapshot.first;
        let ranges = self.valid_ranges(&snapshot.calibration)?;

        let Some(idx) = ranges.iter().position(|range| first <= range.stop) else {
            return self.write(&Slot::Range(IdRange::right_open(first)), snapshot);
        };
        let existing = ranges[idx];

        if first == existing.start {
            debug!(
                "Merging into range {} of {}",
                existing, snapshot.calibration
            );
            return self.write(&Slot::Range(existing), snapshot);
        }

        let new_range = if first > existing.start {
            let shrunk = IdRange::new(existing.start, first.predecessor());
            debug!(
                "Shrinking range {} of {} to {}",
                existing, snapshot.calibration, shrunk
            );
            self.backend
                .rename_range(&snapshot.calibration, &existing, &shrunk)?;
            let stop = ranges
                .get(idx + 1)
                .map(|next| next.start.predecessor())
                .unwrap_or(PointId::OPEN);
            IdRange::new(first, stop)
        } else {
            IdRange::new(first, existing.start.predecessor())
        };

        self.write(&Slot::Range(new_range), snapshot)
    }

    fn write(&mut self, slot: &Slot, snapshot: &CalibrationSnapshot) -> Result<()> {
        let revision = self.backend.save(slot, snapshot)?;
        debug!(
            "Stored {} revision {} as {:?}",
            snapshot.calibration, revision, slot
        );
        Ok(())
    }
}

fn validate(snapshot: &CalibrationSnapshot, mode: AddMode) -> Result<()> {
    let name = snapshot.calibration.as_str();
    if name.is_empty() {
        return Err(CalibError::Validation("empty calibration name".to_string()));
    }
    if name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(CalibError::Validation(format!(
            "calibration name {:?} is not a plain folder name",
            name
        )));
    }

    for (field, value) in [("calibration name", name), ("author", snapshot.author.as_str())] {
        if value.len() > MAX_STRING_LEN {
            return Err(CalibError::Validation(format!(
                "{} is {} bytes, limit is {}",
                field,
                value.len(),
                MAX_STRING_LEN
            )));
        }
    }

    let (first, last) = (snapshot.first, snapshot.last);
    if !first.is_encodable() || !last.is_encodable() {
        return Err(CalibError::Validation(format!(
            "{}: points outside years 0000-9999",
            name
        )));
    }

    let check_order = |first: PointId, last: PointId| -> Result<()> {
        if last.is_bounded() {
            if last < first {
                return Err(CalibError::Validation(format!(
                    "{}: last point {} before first point {}",
                    name, last, first
                )));
            }
            if first.flags != last.flags {
                return Err(CalibError::Validation(format!(
                    "{}: first and last points carry different flags",
                    name
                )));
            }
        }
        Ok(())
    };

    match mode {
        AddMode::AsDefault => check_order(first, last),
        AddMode::StrictRange => {
            if first.is_open() || last.is_open() {
                return Err(CalibError::Validation(format!(
                    "{}: strict range needs bounded first and last points",
                    name
                )));
            }
            check_order(first, last)
        }
        AddMode::RightOpen => {
            if first.is_open() {
                return Err(CalibError::Validation(format!(
                    "{}: right-open range needs a bounded first point",
                    name
                )));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::store::{CachePolicy, DEFAULT_BOUNDARY_TOLERANCE};
    use std::time::Duration;

    fn p(ts: i64) -> PointId {
        PointId::new(ts, 0)
    }

    fn store() -> CalibrationStore<MemoryBackend> {
        CalibrationStore::with_backend(
            MemoryBackend::new(),
            CachePolicy::PerCalibration,
            DEFAULT_BOUNDARY_TOLERANCE,
        )
    }

    fn snap(first: PointId, last: PointId) -> CalibrationSnapshot {
        CalibrationSnapshot::new("EPT_Pos", first, last)
    }

    fn ranges(store: &mut CalibrationStore<MemoryBackend>) -> Vec<IdRange> {
        store.ranges("EPT_Pos").unwrap()
    }

    #[test]
    fn test_validation_errors() {
        let mut store = store();
        let cases = [
            (CalibrationSnapshot::new("", p(0), p(1)), AddMode::AsDefault),
            (CalibrationSnapshot::new("../x", p(0), p(1)), AddMode::AsDefault),
            (snap(PointId::OPEN, p(1)), AddMode::StrictRange),
            (snap(p(0), PointId::OPEN), AddMode::StrictRange),
            (snap(p(5), p(1)), AddMode::StrictRange),
            (snap(p(0), PointId::simulated(1, 0)), AddMode::StrictRange),
            (snap(PointId::OPEN, PointId::OPEN), AddMode::RightOpen),
            (snap(p(i64::MIN / 2), p(0)), AddMode::AsDefault),
        ];
        for (snapshot, mode) in cases {
            assert!(
                matches!(store.add(snapshot.clone(), mode), Err(CalibError::Validation(_))),
                "accepted {:?} {:?}",
                snapshot.range(),
                mode
            );
        }
        assert!(store.calibration_names().unwrap().is_empty());
    }

    #[test]
    fn test_strict_disjoint_and_exact() {
        let mut store = store();
        store.add(snap(p(0), p(16)), AddMode::StrictRange).unwrap();
        store.add(snap(p(100), p(200)), AddMode::StrictRange).unwrap();
        store.add(snap(p(0), p(16)), AddMode::StrictRange).unwrap();

        assert_eq!(
            ranges(&mut store),
            vec![IdRange::new(p(0), p(16)), IdRange::new(p(100), p(200))]
        );
        assert_eq!(
            store
                .history("EPT_Pos", &Slot::Range(IdRange::new(p(0), p(16))))
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_strict_conflict_leaves_store_untouched() {
        let mut store = store();
        store.add(snap(p(0), p(16)), AddMode::StrictRange).unwrap();

        let err = store.add(snap(p(2), p(108)), AddMode::StrictRange).unwrap_err();
        match err {
            CalibError::RangeConflict {
                existing,
                requested,
            } => {
                assert_eq!(existing, IdRange::new(p(0), p(16)));
                assert_eq!(requested, IdRange::new(p(2), p(108)));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(ranges(&mut store), vec![IdRange::new(p(0), p(16))]);
    }

    #[test]
    fn test_strict_conflict_with_two_ranges() {
        let mut store = store();
        store.add(snap(p(0), p(10)), AddMode::StrictRange).unwrap();
        store.add(snap(p(11), p(20)), AddMode::StrictRange).unwrap();
        assert!(matches!(
            store.add(snap(p(1), p(19)), AddMode::StrictRange),
            Err(CalibError::RangeConflict { .. })
        ));
    }

    #[test]
    fn test_strict_within_tolerance_relabels() {
        let mut store = store();
        store.add(snap(p(1_000), p(2_000)), AddMode::StrictRange).unwrap();
        store.add(snap(p(1_001), p(1_998)), AddMode::StrictRange).unwrap();

        let repaired = IdRange::new(p(1_001), p(1_998));
        assert_eq!(ranges(&mut store), vec![repaired]);
        assert_eq!(
            store.history("EPT_Pos", &Slot::Range(repaired)).unwrap(),
            vec![0, 1]
        );
    }

    #[test]
    fn test_strict_zero_tolerance_rejects_jitter() {
        let mut store = CalibrationStore::with_backend(
            MemoryBackend::new(),
            CachePolicy::Disabled,
            Duration::ZERO,
        );
        store.add(snap(p(1_000), p(2_000)), AddMode::StrictRange).unwrap();
        assert!(store.add(snap(p(1_001), p(2_000)), AddMode::StrictRange).is_err());
    }

    #[test]
    fn test_right_open_into_empty() {
        let mut store = store();
        store.add(snap(p(5), p(6)), AddMode::RightOpen).unwrap();
        assert_eq!(ranges(&mut store), vec![IdRange::right_open(p(5))]);
    }

    #[test]
    fn test_right_open_shrinks_predecessor() {
        let mut store = store();
        store.add(snap(p(2), PointId::OPEN), AddMode::RightOpen).unwrap();
        store.add(snap(p(5), PointId::OPEN), AddMode::RightOpen).unwrap();

        assert_eq!(
            ranges(&mut store),
            vec![
                IdRange::new(p(2), p(5).predecessor()),
                IdRange::right_open(p(5))
            ]
        );
    }

    #[test]
    fn test_right_open_bounded_by_following_range() {
        let mut store = store();
        store.add(snap(p(2), p(8)), AddMode::StrictRange).unwrap();
        store.add(snap(p(20), p(30)), AddMode::StrictRange).unwrap();
        store.add(snap(p(5), PointId::OPEN), AddMode::RightOpen).unwrap();

        assert_eq!(
            ranges(&mut store),
            vec![
                IdRange::new(p(2), p(5).predecessor()),
                IdRange::new(p(5), p(20).predecessor()),
                IdRange::new(p(20), p(30)),
            ]
        );
    }

    #[test]
    fn test_right_open_before_existing_is_truncated() {
        let mut store = store();
        store.add(snap(p(50), PointId::OPEN), AddMode::RightOpen).unwrap();
        store.add(snap(p(10), PointId::OPEN), AddMode::RightOpen).unwrap();

        assert_eq!(
            ranges(&mut store),
            vec![
                IdRange::new(p(10), p(50).predecessor()),
                IdRange::right_open(p(50))
            ]
        );
    }

    #[test]
    fn test_right_open_same_start_merges() {
        let mut store = store();
        store.add(snap(p(10), p(40)), AddMode::StrictRange).unwrap();
        store.add(snap(p(10), PointId::OPEN), AddMode::RightOpen).unwrap();

        let range = IdRange::new(p(10), p(40));
        assert_eq!(ranges(&mut store), vec![range]);
        assert_eq!(store.history("EPT_Pos", &Slot::Range(range)).unwrap().len(), 2);
    }

    #[test]
    fn test_right_open_after_all_bounded_ranges() {
        let mut store = store();
        store.add(snap(p(10), p(40)), AddMode::StrictRange).unwrap();
        store.add(snap(p(41), PointId::OPEN), AddMode::RightOpen).unwrap();

        assert_eq!(
            ranges(&mut store),
            vec![IdRange::new(p(10), p(40)), IdRange::right_open(p(41))]
        );
    }

    #[test]
    fn test_simulated_ranged_goes_to_simulation_slot() {
        let mut store = store();
        let sim = snap(PointId::simulated(0, 0), PointId::simulated(10, 0));
        store.add(sim, AddMode::StrictRange).unwrap();

        assert!(ranges(&mut store).is_empty());
        assert!(store
            .get_item("EPT_Pos", PointId::simulated(1_000, 0))
            .unwrap()
            .is_found());
    }

    #[test]
    fn test_right_open_ignores_simulated_last() {
        let mut store = store();
        store
            .add(snap(p(5), PointId::simulated(9, 0)), AddMode::RightOpen)
            .unwrap();

        assert_eq!(ranges(&mut store), vec![IdRange::right_open(p(5))]);
        assert!(store.get_item("EPT_Pos", p(100)).unwrap().is_found());
        assert!(!store
            .get_item("EPT_Pos", PointId::simulated(100, 0))
            .unwrap()
            .is_found());
    }

    #[test]
    fn test_oversized_author_leaves_store_untouched() {
        let mut store = store();
        store.add(snap(p(0), PointId::OPEN), AddMode::RightOpen).unwrap();

        let long_author = "x".repeat(MAX_STRING_LEN + 1);
        let err = store
            .add(
                snap(p(100), PointId::OPEN).with_author(long_author.clone()),
                AddMode::RightOpen,
            )
            .unwrap_err();
        assert!(matches!(err, CalibError::Validation(_)));
        assert_eq!(ranges(&mut store), vec![IdRange::right_open(p(0))]);
        assert!(store.get_item("EPT_Pos", p(200)).unwrap().is_found());

        let other = CalibrationSnapshot::new("Y", p(0), p(10)).with_author(long_author);
        assert!(matches!(
            store.add(other, AddMode::StrictRange),
            Err(CalibError::Validation(_))
        ));
        assert_eq!(store.calibration_names().unwrap(), vec!["EPT_Pos".to_string()]);
        assert_eq!(store.snapshot_count("Y").unwrap(), 0);
    }

    #[test]
    fn test_author_at_limit_accepted() {
        let mut store = store();
        let snapshot = snap(p(0), p(10)).with_author("x".repeat(MAX_STRING_LEN));
        store.add(snapshot, AddMode::StrictRange).unwrap();
        assert_eq!(ranges(&mut store), vec![IdRange::new(p(0), p(10))]);
    }

    #[test]
    fn test_far_future_point_rejected() {
        let mut store = store();
        let far = PointId::new(135_536_077_748_102_400, 0);
        assert!(matches!(
            store.add(snap(far, far), AddMode::StrictRange),
            Err(CalibError::Validation(_))
        ));
        assert!(matches!(
            store.add(snap(far, PointId::OPEN), AddMode::RightOpen),
            Err(CalibError::Validation(_))
        ));
        assert!(ranges(&mut store).is_empty());
    }
}
