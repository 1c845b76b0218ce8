//! Closed and right-open intervals over [`PointId`].

use crate::id::point::{ParsePointIdError, PointId};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Separator between the start and stop encodings of a range.
const RANGE_SEPARATOR: char = '-';

/// Inclusive interval `[start, stop]` of point identifiers.
///
/// An open `stop` means the range is valid until superseded. A range with an
/// open `start` is invalid; it is what a malformed folder name parses to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdRange {
    /// First point covered (inclusive).
    pub start: PointId,
    /// Last point covered (inclusive), or open.
    pub stop: PointId,
}

impl IdRange {
    /// The invalid range, both endpoints open.
    pub const INVALID: IdRange = IdRange {
        start: PointId::OPEN,
        stop: PointId::OPEN,
    };

    /// Creates a range from two endpoints.
    pub const fn new(start: PointId, stop: PointId) -> Self {
        Self { start, stop }
    }

    /// Creates a range valid from `start` until superseded.
    pub const fn right_open(start: PointId) -> Self {
        Self {
            start,
            stop: PointId::OPEN,
        }
    }

    /// Returns true if the start is bounded and not after the stop.
    pub fn is_valid(&self) -> bool {
        self.start.is_bounded() && self.start <= self.stop
    }

    /// Returns true if the stop is open.
    pub fn is_right_open(&self) -> bool {
        self.stop.is_open()
    }

    /// Returns true if `point` lies inside the range.
    ///
    /// Simulated and real-data points never match each other's ranges.
    pub fn contains(&self, point: &PointId) -> bool {
        if !self.is_valid() || point.is_open() {
            return false;
        }
        if self.start.is_simulated() != point.is_simulated() {
            return false;
        }
        self.start <= *point && *point <= self.stop
    }

    /// Returns true if the closed intervals share no point.
    ///
    /// Invalid ranges are disjoint from everything.
    pub fn is_disjoint(&self, other: &IdRange) -> bool {
        if !self.is_valid() || !other.is_valid() {
            return true;
        }
        self.stop < other.start || other.stop < self.start
    }

    /// Returns true if every endpoint of `other` matches the corresponding
    /// endpoint of `self`, either exactly or within `tolerance`.
    ///
    /// Only bounded endpoints can differ by a tolerance; their timestamps are
    /// compared in whole seconds. A zero tolerance requires exact equality.
    pub fn within_tolerance(&self, other: &IdRange, tolerance: Duration) -> bool {
        endpoint_within(self.start, other.start, tolerance)
            && endpoint_within(self.stop, other.stop, tolerance)
    }

    /// Returns the point at which this range stops applying, or open.
    pub fn end_exclusive(&self) -> PointId {
        if self.stop.is_open() {
            PointId::OPEN
        } else {
            self.stop.successor()
        }
    }
}

fn endpoint_within(a: PointId, b: PointId, tolerance: Duration) -> bool {
    if a == b {
        return true;
    }
    if a.is_open() || b.is_open() || tolerance.is_zero() {
        return false;
    }
    a.timestamp.abs_diff(b.timestamp) <= tolerance.as_secs()
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.start, RANGE_SEPARATOR, self.stop)
    }
}

impl FromStr for IdRange {
    type Err = ParsePointIdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (start, stop) = s
            .split_once(RANGE_SEPARATOR)
            .ok_or_else(|| ParsePointIdError(s.to_string()))?;
        let range = IdRange::new(start.parse()?, stop.parse()?);
        if !range.is_valid() {
            return Err(ParsePointIdError(s.to_string()));
        }
        Ok(range)
    }
}
