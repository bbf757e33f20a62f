//! # spectre-query: the external query surface
//!
//! The three contracts external collaborators (REST, MCP, UI) consume —
//! the event-log reader, the graph query interface, and the analyzer entry
//! point — wrapped into one [`QueryService`] facade with per-call deadlines
//! and a stable error taxonomy (`INVALID_REQUEST`, `NOT_FOUND`,
//! `INTERNAL`, `DEADLINE_EXCEEDED`).
//!
//! Reads go straight to the graph and log; writes (imports) are forwarded
//! to the indexer thread so the single-writer discipline holds.

mod error;
mod service;
mod types;


pub use error::{QueryError, QueryResult};
pub use service::{DEFAULT_DEADLINE, QueryService};
pub use types::{
    EventView, Metadata, RangeQuery, ResourceSummary, ResourceTimeline, StatusSegment, TimeRange,
    segment_events,
};
