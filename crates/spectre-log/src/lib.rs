//! # spectre-log: Hour-segmented append-only event log
//!
//! This crate is the durable half of the Spectre engine: every observed
//! resource mutation is appended to the segment file for its wall-clock
//! hour, CRC-framed and idempotent on event id. Closed segments carry a
//! footer index for filtered scans; export/import packages segment ranges
//! for transfer between installations.
//!
//! ## Layout
//!
//! - [`record`] — `(length, crc32, payload)` record framing
//! - [`codec`] — the event payload wire format
//! - [`footer`] — closed-segment index rows
//! - [`segment`] — one hour segment: writer, reader, recovery
//! - [`log`] — [`EventLog`]: append, rotation, scan, startup finalization
//! - [`export`] / [`import`] — the `SPXP` container and JSON batches
//!
//! ## Usage
//!
//! ```no_run
//! use spectre_log::{EventLog, ScanFilter};
//! use spectre_types::TimestampNs;
//!
//! # fn main() -> Result<(), spectre_log::LogError> {
//! let mut log = EventLog::open(std::path::Path::new("./data"))?;
//! for event in log.scan(
//!     TimestampNs::ZERO,
//!     TimestampNs::MAX,
//!     ScanFilter { kind: Some("Deployment".into()), ..ScanFilter::default() },
//! ) {
//!     let event = event?;
//!     println!("{} {}", event.timestamp, event.resource.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
mod error;
pub mod export;
pub mod footer;
pub mod import;
mod log;
pub mod record;
pub mod segment;

pub use error::{LogError, LogResult};

/// The log shared between its single writer (the indexer) and query
/// readers. The mutex serializes access to the open-segment state; scans
/// copy what they need and release the lock before iterating.
pub type SharedEventLog = std::sync::Arc<std::sync::Mutex<EventLog>>;

/// Locks a [`SharedEventLog`], recovering from a poisoned mutex (a panicked
/// reader cannot corrupt the log state, which lives on disk).
pub fn lock_log(log: &SharedEventLog) -> std::sync::MutexGuard<'_, EventLog> {
    log.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
pub use export::{
    CONTENT_TYPE_BINARY, CONTENT_TYPE_JSON, Compression, ExportMeta, export_to, parse_container,
};
pub use import::{
    EventBatch, ImportOutcome, ImportReport, decode_events, import, import_events,
    import_events_outcome, import_outcome,
};
pub use log::{Durability, EventLog, ScanFilter, ScanIter};
