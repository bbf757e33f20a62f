//! Indexer metrics.

use prometheus::{IntCounter, IntGauge, Registry};

/// Counters and gauges for the indexing loop.
#[derive(Debug, Clone)]
pub struct IndexMetrics {
    /// Events fully indexed (log + graph + edges).
    pub events_indexed: IntCounter,
    /// Events currently parked after append failures.
    pub events_parked: IntGauge,
    /// The indexing watermark in nanoseconds since epoch.
    pub watermark_nanos: IntGauge,
}

impl IndexMetrics {
    pub fn register(registry: &Registry) -> Self {
        let events_indexed = IntCounter::new(
            "spectre_index_events_total",
            "Events fully indexed into log and graph",
        )
        .expect("valid metric opts");
        let events_parked = IntGauge::new(
            "spectre_index_parked_events",
            "Events parked after persistent append failures",
        )
        .expect("valid metric opts");
        let watermark_nanos = IntGauge::new(
            "spectre_index_watermark_nanos",
            "Indexing watermark, nanoseconds since epoch",
        )
        .expect("valid metric opts");

        for metric in [
            Box::new(events_indexed.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(events_parked.clone()),
            Box::new(watermark_nanos.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                tracing::debug!(error = %e, "metric already registered");
            }
        }

        Self {
            events_indexed,
            events_parked,
            watermark_nanos,
        }
    }
}
