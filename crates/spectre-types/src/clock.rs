//! Monotonic-correcting wall clock for event ingress.
//!
//! Watch events are stamped at ingress. Wall clocks can step backwards (NTP
//! adjustments); the watcher contract requires timestamps to be monotonic per
//! source, so the clock remembers the last value handed out and never returns
//! anything earlier.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::TimestampNs;

/// A wall clock that never goes backwards.
///
/// Safe to share across threads; each call returns a value strictly greater
/// than every value previously returned by the same instance.
#[derive(Debug, Default)]
pub struct ClockSource {
    last: AtomicI64,
}

impl ClockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time, corrected to be strictly increasing.
    pub fn now(&self) -> TimestampNs {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as i64);

        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return TimestampNs::new(next),
                Err(observed) => prev = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_strictly_increasing() {
        let clock = ClockSource::new();
        let mut prev = clock.now();
        for _ in 0..1_000 {
            let next = clock.now();
            assert!(next > prev, "clock went backwards: {next:?} <= {prev:?}");
            prev = next;
        }
    }

    #[test]
    fn now_tracks_wall_clock() {
        let clock = ClockSource::new();
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as i64;
        let observed = clock.now().as_nanos();
        // Within a generous minute of the wall clock.
        assert!((observed - wall).abs() < 60 * 1_000_000_000);
    }
}
