//! Ordered event-stream identifiers.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Seconds since the Unix epoch, UTC.
pub type Timestamp = i64;

/// Width of the textual timestamp part of an encoded point, `YYYYMMDDTHHMMSS`.
const TIMESTAMP_TEXT_LEN: usize = 15;

/// Separator between timestamp and sub-order in an encoded point.
const SUB_ORDER_SEPARATOR: &str = "_0x";

/// First encodable timestamp, 0000-01-01T00:00:00 UTC.
const MIN_ENCODABLE: Timestamp = -62_167_219_200;

/// Last encodable timestamp, 9999-12-31T23:59:59 UTC.
const MAX_ENCODABLE: Timestamp = 253_402_300_799;

/// Token used for an unbounded endpoint.
pub const OPEN_TOKEN: &str = "OPEN";

/// Flags carried by a point identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PointFlags(u8);

impl PointFlags {
    /// Point comes from a simulated event stream.
    pub const SIMULATED: u8 = 0b01;
    /// Point was created outside the regular event stream.
    pub const AD_HOC: u8 = 0b10;

    /// Creates a new PointFlags with no flags set.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Creates a PointFlags from a raw u8 value.
    pub const fn from_u8(value: u8) -> Self {
        Self(value)
    }

    /// Returns the raw u8 value.
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Returns true if the simulated flag is set.
    pub const fn is_simulated(self) -> bool {
        self.0 & Self::SIMULATED != 0
    }

    /// Returns true if the ad-hoc flag is set.
    pub const fn is_ad_hoc(self) -> bool {
        self.0 & Self::AD_HOC != 0
    }

    /// Sets the simulated flag.
    pub fn set_simulated(&mut self) {
        self.0 |= Self::SIMULATED;
    }

    /// Sets the ad-hoc flag.
    pub fn set_ad_hoc(&mut self) {
        self.0 |= Self::AD_HOC;
    }
}

/// Identifier of a position in the detector event stream.
///
/// Points are totally ordered by `(timestamp, sub_order)`. Flags do not take
/// part in equality, hashing or ordering; they only route a point to the
/// simulation or real-data side of the store.
///
/// [`PointId::OPEN`] sorts after every bounded point and stands for an
/// unbounded range endpoint.
#[derive(Debug, Clone, Copy)]
pub struct PointId {
    /// Whole seconds since the Unix epoch, UTC.
    pub timestamp: Timestamp,
    /// Position within the second.
    pub sub_order: u32,
    /// Simulation / ad-hoc flags.
    pub flags: PointFlags,
}

impl PointId {
    /// The open (unbounded) point.
    pub const OPEN: PointId = PointId {
        timestamp: Timestamp::MAX,
        sub_order: u32::MAX,
        flags: PointFlags::new(),
    };

    /// Creates a real-data point.
    pub const fn new(timestamp: Timestamp, sub_order: u32) -> Self {
        Self {
            timestamp,
            sub_order,
            flags: PointFlags::new(),
        }
    }

    /// Creates a simulated point.
    pub const fn simulated(timestamp: Timestamp, sub_order: u32) -> Self {
        Self {
            timestamp,
            sub_order,
            flags: PointFlags::from_u8(PointFlags::SIMULATED),
        }
    }

    /// Returns a copy of this point carrying the given flags.
    pub const fn with_flags(mut self, flags: PointFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Returns true for the open (unbounded) point.
    pub const fn is_open(&self) -> bool {
        self.timestamp == Timestamp::MAX
    }

    /// Returns true if the point is bounded.
    pub const fn is_bounded(&self) -> bool {
        !self.is_open()
    }

    /// Returns true if the simulated flag is set.
    pub const fn is_simulated(&self) -> bool {
        self.flags.is_simulated()
    }

    /// Returns the next point in stream order.
    ///
    /// A sub-order of `u32::MAX` rolls over into the next second. The open
    /// point is its own successor.
    pub fn successor(self) -> Self {
        if self.is_open() {
            return self;
        }
        match self.sub_order.checked_add(1) {
            Some(sub_order) => Self { sub_order, ..self },
            None => Self {
                timestamp: self.timestamp + 1,
                sub_order: 0,
                flags: self.flags,
            },
        }
    }

    /// Returns the previous point in stream order. Inverse of [`successor`].
    ///
    /// [`successor`]: PointId::successor
    pub fn predecessor(self) -> Self {
        if self.is_open() {
            return self;
        }
        match self.sub_order.checked_sub(1) {
            Some(sub_order) => Self { sub_order, ..self },
            None => Self {
                timestamp: self.timestamp - 1,
                sub_order: u32::MAX,
                flags: self.flags,
            },
        }
    }

    /// Returns true if the point can be written as a fixed-width folder name
    /// component (years 0000 through 9999, or open).
    pub fn is_encodable(&self) -> bool {
        if self.is_open() {
            return true;
        }
        (MIN_ENCODABLE..=MAX_ENCODABLE).contains(&self.timestamp)
    }

    /// Returns the `YYYY-MM-DD` day bucket of the point, or `None` if open.
    pub fn day_bucket(&self) -> Option<String> {
        if self.is_open() {
            return None;
        }
        let (days, _) = div_floor(self.timestamp, 86_400);
        let (year, month, day) = civil_from_days(days);
        Some(format!("{:04}-{:02}-{:02}", year, month, day))
    }

    fn order_key(&self) -> (Timestamp, u32) {
        if self.is_open() {
            (Timestamp::MAX, u32::MAX)
        } else {
            (self.timestamp, self.sub_order)
        }
    }
}

impl PartialEq for PointId {
    fn eq(&self, other: &Self) -> bool {
        self.order_key() == other.order_key()
    }
}

impl Eq for PointId {}

impl Hash for PointId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.order_key().hash(state);
    }
}

impl PartialOrd for PointId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PointId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_open() {
            return f.write_str(OPEN_TOKEN);
        }
        let (days, secs_of_day) = div_floor(self.timestamp, 86_400);
        let (year, month, day) = civil_from_days(days);
        write!(
            f,
            "{:04}{:02}{:02}T{:02}{:02}{:02}{}{:08x}",
            year,
            month,
            day,
            secs_of_day / 3600,
            (secs_of_day % 3600) / 60,
            secs_of_day % 60,
            SUB_ORDER_SEPARATOR,
            self.sub_order
        )
    }
}

/// Error returned when a textual point encoding cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid point encoding: {0:?}")]
pub struct ParsePointIdError(pub String);

impl FromStr for PointId {
    type Err = ParsePointIdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == OPEN_TOKEN {
            return Ok(PointId::OPEN);
        }
        let err = || ParsePointIdError(s.to_string());

        let (stamp, sub_hex) = s.split_once(SUB_ORDER_SEPARATOR).ok_or_else(err)?;
        if !stamp.is_ascii() || stamp.len() != TIMESTAMP_TEXT_LEN || sub_hex.len() != 8 {
            return Err(err());
        }
        if !sub_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(err());
        }
        let sub_order = u32::from_str_radix(sub_hex, 16).map_err(|_| err())?;

        let bytes = stamp.as_bytes();
        if bytes[8] != b'T' {
            return Err(err());
        }
        let digits = |range: std::ops::Range<usize>| -> Option<i64> {
            let part = &stamp[range];
            if part.bytes().all(|b| b.is_ascii_digit()) {
                part.parse().ok()
            } else {
                None
            }
        };
        let year = digits(0..4).ok_or_else(err)?;
        let month = digits(4..6).ok_or_else(err)?;
        let day = digits(6..8).ok_or_else(err)?;
        let hour = digits(9..11).ok_or_else(err)?;
        let minute = digits(11..13).ok_or_else(err)?;
        let second = digits(13..15).ok_or_else(err)?;

        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(err());
        }
        if hour > 23 || minute > 59 || second > 59 {
            return Err(err());
        }
        let days = days_from_civil(year, month as u32, day as u32);
        // Reject dates like Feb 30 which normalise to a different day.
        if civil_from_days(days) != (year, month as u32, day as u32) {
            return Err(err());
        }

        Ok(PointId::new(
            days * 86_400 + hour * 3600 + minute * 60 + second,
            sub_order,
        ))
    }
}

fn div_floor(value: i64, divisor: i64) -> (i64, i64) {
    let mut quotient = value / divisor;
    let mut remainder = value % divisor;
    if remainder < 0 {
        quotient -= 1;
        remainder += divisor;
    }
    (quotient, remainder)
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 {
        z / 146_097
    } else {
        (z - 146_096) / 146_097
    };
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = mp + if mp < 10 { 3 } else { -9 };
    let year = y + if month <= 2 { 1 } else { 0 };
    (year, month as u32, day as u32)
}

fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let m = month as i64;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}
