//! Shared indexer status: watermark and health flags.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::atomic::AtomicI64;

use spectre_types::TimestampNs;

/// The indexing watermark: the highest timestamp up to which all log and
/// graph work has been applied.
///
/// Monotonically non-decreasing. Readers that need fully-applied state cut
/// their scans off at this value.
#[derive(Debug, Default)]
pub struct Watermark {
    nanos: AtomicI64,
}

impl Watermark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> TimestampNs {
        TimestampNs::new(self.nanos.load(Ordering::Acquire))
    }

    /// Advances the watermark. A lower value is ignored.
    pub fn advance(&self, to: TimestampNs) {
        self.nanos.fetch_max(to.as_nanos(), Ordering::AcqRel);
    }
}

/// Runtime health flags surfaced by the server.
#[derive(Debug, Default)]
pub struct HealthState {
    /// Set while log appends are failing and events are being parked.
    log_degraded: AtomicBool,
    /// Number of events currently parked awaiting a log recovery.
    parked_events: AtomicUsize,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_log_degraded(&self) -> bool {
        self.log_degraded.load(Ordering::Acquire)
    }

    pub fn parked_events(&self) -> usize {
        self.parked_events.load(Ordering::Acquire)
    }

    pub fn set_parked(&self, count: usize) {
        self.parked_events.store(count, Ordering::Release);
        self.log_degraded.store(count > 0, Ordering::Release);
    }

    /// `true` when the process is fully healthy.
    pub fn is_healthy(&self) -> bool {
        !self.is_log_degraded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermark_never_rewinds() {
        let wm = Watermark::new();
        wm.advance(TimestampNs::from_secs(100));
        wm.advance(TimestampNs::from_secs(50));
        assert_eq!(wm.get(), TimestampNs::from_secs(100));
        wm.advance(TimestampNs::from_secs(200));
        assert_eq!(wm.get(), TimestampNs::from_secs(200));
    }

    #[test]
    fn health_follows_parked_count() {
        let health = HealthState::new();
        assert!(health.is_healthy());
        health.set_parked(3);
        assert!(health.is_log_degraded());
        health.set_parked(0);
        assert!(health.is_healthy());
    }
}
