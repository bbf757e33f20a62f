//! # spectre-index: the single-writer indexer
//!
//! One dedicated thread turns the watcher's mutation stream into durable,
//! queryable state: append to the event log, upsert graph nodes, run the
//! extractor pipeline, advance the watermark. The strict single-writer
//! discipline is what gives the log/graph ordering guarantees their cheap
//! implementation — none of the mutation APIs need to tolerate concurrent
//! writers.

mod id;
mod indexer;
mod metrics;
mod status;

#[cfg(test)]
mod tests;

pub use id::derive_event_id;
pub use indexer::{IndexCommand, Indexer, IndexerConfig};
pub use metrics::IndexMetrics;
pub use status::{HealthState, Watermark};
