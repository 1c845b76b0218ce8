//! In-memory backend. Nothing survives the process.

use crate::backend::{SnapshotBackend, Slot};
use crate::error::{CalibError, Result};
use crate::id::IdRange;
use crate::snapshot::CalibrationSnapshot;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
struct CalibrationEntry {
    simulation: Vec<CalibrationSnapshot>,
    default: Vec<CalibrationSnapshot>,
    ranges: Vec<(IdRange, Vec<CalibrationSnapshot>)>,
}

impl CalibrationEntry {
    fn history(&self, slot: &Slot) -> Option<&Vec<CalibrationSnapshot>> {
        match slot {
            Slot::Simulation => Some(&self.simulation),
            Slot::Default => Some(&self.default),
            Slot::Range(range) => self
                .ranges
                .iter()
                .find(|(r, _)| r == range)
                .map(|(_, history)| history),
        }
    }

    fn history_mut(&mut self, slot: &Slot) -> &mut Vec<CalibrationSnapshot> {
        match slot {
            Slot::Simulation => &mut self.simulation,
            Slot::Default => &mut self.default,
            Slot::Range(range) => {
                let idx = match self.ranges.iter().position(|(r, _)| r == range) {
                    Some(idx) => idx,
                    None => {
                        self.ranges.push((*range, Vec::new()));
                        self.ranges.sort_by_key(|(r, _)| r.start);
                        self.ranges
                            .iter()
                            .position(|(r, _)| r == range)
                            .unwrap_or(self.ranges.len() - 1)
                    }
                };
                &mut self.ranges[idx].1
            }
        }
    }
}

/// Backend holding every revision in process memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    entries: BTreeMap<String, CalibrationEntry>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotBackend for MemoryBackend {
    fn calibrations(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn ranges(&self, calibration: &str) -> Result<Vec<IdRange>> {
        Ok(self
            .entries
            .get(calibration)
            .map(|entry| entry.ranges.iter().map(|(range, _)| *range).collect())
            .unwrap_or_default())
    }

    fn load(&self, calibration: &str, slot: &Slot) -> Result<Option<CalibrationSnapshot>> {
        Ok(self
            .entries
            .get(calibration)
            .and_then(|entry| entry.history(slot))
            .and_then(|history| history.last().cloned()))
    }

    fn load_revision(
        &self,
        calibration: &str,
        slot: &Slot,
        revision: u32,
    ) -> Result<Option<CalibrationSnapshot>> {
        Ok(self
            .entries
            .get(calibration)
            .and_then(|entry| entry.history(slot))
            .and_then(|history| history.get(revision as usize).cloned()))
    }

    fn revisions(&self, calibration: &str, slot: &Slot) -> Result<Vec<u32>> {
        Ok(self
            .entries
            .get(calibration)
            .and_then(|entry| entry.history(slot))
            .map(|history| (0..history.len() as u32).collect())
            .unwrap_or_default())
    }

    fn save(&mut self, slot: &Slot, snapshot: &CalibrationSnapshot) -> Result<u32> {
        let history = self
            .entries
            .entry(snapshot.calibration.clone())
            .or_default()
            .history_mut(slot);
        history.push(snapshot.clone());
        Ok(history.len() as u32 - 1)
    }

    fn rename_range(&mut self, calibration: &str, from: &IdRange, to: &IdRange) -> Result<()> {
        let entry = self
            .entries
            .get_mut(calibration)
            .ok_or_else(|| CalibError::Corrupt(format!("no calibration {}", calibration)))?;
        let slot = entry
            .ranges
            .iter_mut()
            .find(|(range, _)| range == from)
            .ok_or_else(|| CalibError::Corrupt(format!("no range {} in {}", from, calibration)))?;
        slot.0 = *to;
        entry.ranges.sort_by_key(|(range, _)| range.start);
        Ok(())
    }
}
