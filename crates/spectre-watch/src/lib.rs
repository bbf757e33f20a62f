//! # spectre-watch: Kubernetes ingestion
//!
//! The live half of the pipeline: a dynamic set of per-kind watches over
//! the Kubernetes API ([`WatchManager`]) and the hot-reloadable document
//! naming which kinds to observe ([`ConfigReloader`]).
//!
//! Each kind buffers into its own bounded channel; a multiplexing task
//! merges them into the single combined stream of
//! [`spectre_types::ObservedMutation`] the indexer consumes. Timestamps are
//! assigned at ingress by a monotonic clock; delivery is at-least-once per
//! uid lineage with dedup downstream.

mod error;
mod kinds;
mod manager;
mod metrics;
mod reloader;

#[cfg(test)]
mod tests;

pub use error::{WatchError, WatchResult};
pub use kinds::{KindSpec, WatchedKinds};
pub use manager::WatchManager;
pub use metrics::WatchMetrics;
pub use reloader::{ConfigReloader, DEFAULT_POLL_INTERVAL};
