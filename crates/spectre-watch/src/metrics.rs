//! Watch-layer metrics.

use prometheus::{IntCounterVec, IntGauge, Opts, Registry};

/// Counters for the watch layer, registered into the process registry.
#[derive(Debug, Clone)]
pub struct WatchMetrics {
    /// Mutations observed, labeled by kind.
    pub events_observed: IntCounterVec,
    /// Times a kind's watch blocked on its full per-kind buffer.
    pub buffer_pauses: IntCounterVec,
    /// Cumulative nanoseconds each kind's watch spent paused on
    /// back-pressure.
    pub buffer_pause_nanos: IntCounterVec,
    /// Currently active watches.
    pub active_watches: IntGauge,
    /// Full relists performed (watch resume token expired).
    pub relists: IntCounterVec,
}

impl WatchMetrics {
    pub fn register(registry: &Registry) -> Self {
        let events_observed = IntCounterVec::new(
            Opts::new("spectre_watch_events_observed_total", "Mutations observed per kind"),
            &["kind"],
        )
        .expect("valid metric opts");
        let buffer_pauses = IntCounterVec::new(
            Opts::new(
                "spectre_watch_buffer_pauses_total",
                "Watch pauses due to a full per-kind event buffer",
            ),
            &["kind"],
        )
        .expect("valid metric opts");
        let buffer_pause_nanos = IntCounterVec::new(
            Opts::new(
                "spectre_watch_buffer_pause_nanos_total",
                "Cumulative nanoseconds spent paused on back-pressure, per kind",
            ),
            &["kind"],
        )
        .expect("valid metric opts");
        let active_watches = IntGauge::new(
            "spectre_watch_active",
            "Currently active kind watches",
        )
        .expect("valid metric opts");
        let relists = IntCounterVec::new(
            Opts::new("spectre_watch_relists_total", "Full relists per kind"),
            &["kind"],
        )
        .expect("valid metric opts");

        for metric in [
            Box::new(events_observed.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(buffer_pauses.clone()),
            Box::new(buffer_pause_nanos.clone()),
            Box::new(active_watches.clone()),
            Box::new(relists.clone()),
        ] {
            // A second registration (tests sharing a registry) is not fatal.
            if let Err(e) = registry.register(metric) {
                tracing::debug!(error = %e, "metric already registered");
            }
        }

        Self {
            events_observed,
            buffer_pauses,
            buffer_pause_nanos,
            active_watches,
            relists,
        }
    }
}
