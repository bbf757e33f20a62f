//! Nanosecond-precision timestamps.
//!
//! All times in Spectre are integer nanoseconds since the Unix epoch. The
//! event log segments by wall-clock hour, so [`TimestampNs::hour_start`] is
//! the canonical segment key.

use std::fmt::{self, Display};
use std::ops::{Add, Sub};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Nanoseconds in one wall-clock hour.
pub const NANOS_PER_HOUR: i64 = 3_600 * 1_000_000_000;

/// A point in time as nanoseconds since the Unix epoch.
///
/// Signed so that subtraction is total; negative values never occur for
/// observed events (validation rejects timestamps `<= 0`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TimestampNs(i64);

impl TimestampNs {
    pub const ZERO: TimestampNs = TimestampNs(0);
    pub const MAX: TimestampNs = TimestampNs(i64::MAX);

    pub fn new(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Builds a timestamp from whole seconds since the epoch.
    pub fn from_secs(secs: i64) -> Self {
        Self(secs * 1_000_000_000)
    }

    /// Builds a timestamp from whole milliseconds since the epoch.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis * 1_000_000)
    }

    pub fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn as_millis(self) -> i64 {
        self.0 / 1_000_000
    }

    /// Truncates to the start of the containing wall-clock hour.
    ///
    /// # Examples
    ///
    /// ```
    /// # use spectre_types::{TimestampNs, NANOS_PER_HOUR};
    /// let ts = TimestampNs::new(NANOS_PER_HOUR + 42);
    /// assert_eq!(ts.hour_start(), TimestampNs::new(NANOS_PER_HOUR));
    /// ```
    pub fn hour_start(self) -> Self {
        Self(self.0 - self.0.rem_euclid(NANOS_PER_HOUR))
    }

    /// Start of the hour after the containing hour (exclusive segment bound).
    pub fn next_hour_start(self) -> Self {
        Self(self.hour_start().0 + NANOS_PER_HOUR)
    }

    /// Returns `true` if `self` lies in `[start, end]` inclusive.
    pub fn in_range(self, start: TimestampNs, end: TimestampNs) -> bool {
        self >= start && self <= end
    }

    /// Saturating difference in milliseconds (`self - earlier`), floored at 0.
    pub fn lag_ms_since(self, earlier: TimestampNs) -> i64 {
        ((self.0 - earlier.0) / 1_000_000).max(0)
    }
}

impl Display for TimestampNs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::<Utc>::from_timestamp(
            self.0.div_euclid(1_000_000_000),
            self.0.rem_euclid(1_000_000_000) as u32,
        ) {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ns", self.0),
        }
    }
}

impl Add<i64> for TimestampNs {
    type Output = TimestampNs;

    fn add(self, rhs: i64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub<i64> for TimestampNs {
    type Output = TimestampNs;

    fn sub(self, rhs: i64) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl Sub for TimestampNs {
    type Output = i64;

    /// Difference in nanoseconds.
    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

impl From<i64> for TimestampNs {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<TimestampNs> for i64 {
    fn from(ts: TimestampNs) -> Self {
        ts.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_start_is_idempotent() {
        let ts = TimestampNs::new(7 * NANOS_PER_HOUR + 12_345);
        assert_eq!(ts.hour_start().hour_start(), ts.hour_start());
        assert_eq!(ts.hour_start().as_nanos() % NANOS_PER_HOUR, 0);
    }

    #[test]
    fn next_hour_start_is_exclusive_bound() {
        let ts = TimestampNs::new(NANOS_PER_HOUR - 1);
        assert_eq!(ts.next_hour_start(), TimestampNs::new(NANOS_PER_HOUR));
        // A timestamp exactly on the boundary belongs to the new hour.
        let boundary = TimestampNs::new(NANOS_PER_HOUR);
        assert_eq!(boundary.hour_start(), boundary);
    }

    #[test]
    fn lag_is_floored_at_zero() {
        let a = TimestampNs::from_millis(1_000);
        let b = TimestampNs::from_millis(4_000);
        assert_eq!(b.lag_ms_since(a), 3_000);
        assert_eq!(a.lag_ms_since(b), 0);
    }

    #[test]
    fn display_is_rfc3339() {
        let ts = TimestampNs::from_secs(0);
        assert_eq!(ts.to_string(), "1970-01-01T00:00:00+00:00");
    }
}
