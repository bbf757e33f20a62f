//! # spectre-graph: Property graph of cluster state over time
//!
//! The graph holds one `ResourceIdentity` node per uid ever observed, one
//! `ChangeEvent` node per accepted event, and typed directed edges between
//! identities (plus TRIGGERED_BY links between change events). The indexer
//! is the only writer; queries run concurrently against clones of the data.
//!
//! - [`store`] — the [`GraphStore`]: upserts, lookups, pattern queries,
//!   retention sweeps
//! - [`status_rules`] — per-kind Ready/Warning/Error derivation table
//! - [`diff`] — config/status/replica change flags
//! - [`snapshot`] — CRC-verified persistence under `data_dir/graph/`

pub mod diff;
mod edge;
mod error;
mod node;
mod pattern;
pub mod snapshot;
pub mod status_rules;
mod store;

#[cfg(test)]
mod tests;

pub use edge::{EdgeKey, EdgeProps, EdgeRecord, EdgeUpsert, TriggeredByRecord};
pub use error::{GraphError, GraphResult};
pub use node::{ChangeEventNode, ResourceIdentityNode};
pub use pattern::{Direction, EdgeConstraint, NodePattern, Pattern, PatternMatch};
pub use store::{GraphStore, NodeKind, SweepStats};
