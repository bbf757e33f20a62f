//! Import of exported containers and JSON event batches.
//!
//! Import is per-event: a schema-invalid event is rejected and counted
//! without failing the batch, and the `overwrite` flag decides whether an
//! event whose id already exists is replaced or skipped.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use spectre_types::{Event, TimestampNs};

use crate::export::{CONTENT_TYPE_BINARY, CONTENT_TYPE_JSON, looks_binary, parse_container};
use crate::segment::SegmentReader;
use crate::{EventLog, LogError, LogResult};

/// Body of a JSON event batch: `{ "events": [ ... ] }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventBatch {
    pub events: Vec<Event>,
}

/// Per-import accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Events seen in the input, valid or not.
    pub total_events: u64,
    /// Newly stored events.
    pub imported: u64,
    /// Existing events replaced (`overwrite = true`).
    pub replaced: u64,
    /// Duplicates left untouched (`overwrite = false`).
    pub skipped: u64,
    /// Events rejected by validation.
    pub invalid: u64,
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events: {} imported, {} replaced, {} skipped, {} invalid",
            self.total_events, self.imported, self.replaced, self.skipped, self.invalid
        )
    }
}

/// Report plus the events that actually landed (imported or replaced), for
/// callers that must mirror the import into the graph.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    pub report: ImportReport,
    pub applied: Vec<Event>,
}

/// Decodes an import stream into events, discriminating binary container
/// from JSON batch by content type. `None` sniffs for the binary magic.
pub fn decode_events(data: &Bytes, content_type: Option<&str>) -> LogResult<Vec<Event>> {
    match content_type {
        Some(CONTENT_TYPE_BINARY) => decode_binary(data),
        Some(CONTENT_TYPE_JSON) => decode_json(data),
        Some(other) => Err(LogError::UnsupportedContentType {
            content_type: other.to_string(),
        }),
        None if looks_binary(data) => decode_binary(data),
        None => decode_json(data),
    }
}

fn decode_binary(data: &Bytes) -> LogResult<Vec<Event>> {
    let (_meta, segments) = parse_container(data)?;
    let mut events = Vec::new();
    for segment in segments {
        let reader = SegmentReader::from_bytes(segment.bytes, Path::new("<import>"))?;
        events.extend(reader.events()?);
    }
    Ok(events)
}

fn decode_json(data: &Bytes) -> LogResult<Vec<Event>> {
    let batch: EventBatch = serde_json::from_slice(data)?;
    Ok(batch.events)
}

/// Imports a stream and returns the accounting report.
pub fn import(
    log: &mut EventLog,
    data: &Bytes,
    content_type: Option<&str>,
    validate: bool,
    overwrite: bool,
) -> LogResult<ImportReport> {
    import_outcome(log, data, content_type, validate, overwrite).map(|o| o.report)
}

/// Imports a stream and returns both the report and the applied events.
pub fn import_outcome(
    log: &mut EventLog,
    data: &Bytes,
    content_type: Option<&str>,
    validate: bool,
    overwrite: bool,
) -> LogResult<ImportOutcome> {
    let events = decode_events(data, content_type)?;
    let outcome = import_events_outcome(log, events, validate, overwrite)?;
    tracing::info!(report = %outcome.report, "import complete");
    Ok(outcome)
}

/// Shared per-event import path, report only.
pub fn import_events(
    log: &mut EventLog,
    events: Vec<Event>,
    validate: bool,
    overwrite: bool,
) -> LogResult<ImportReport> {
    import_events_outcome(log, events, validate, overwrite).map(|o| o.report)
}

/// Shared per-event import path: validates, groups by hour, merges each hour
/// segment once. Returns the report plus the events that landed.
pub fn import_events_outcome(
    log: &mut EventLog,
    events: Vec<Event>,
    validate: bool,
    overwrite: bool,
) -> LogResult<ImportOutcome> {
    let mut report = ImportReport::default();
    let mut applied = Vec::new();
    let mut by_hour: BTreeMap<TimestampNs, Vec<Event>> = BTreeMap::new();

    for event in events {
        report.total_events += 1;
        if validate {
            if let Err(reason) = event.validate() {
                tracing::debug!(error = %reason, "rejecting invalid event on import");
                report.invalid += 1;
                continue;
            }
        }
        by_hour.entry(event.timestamp.hour_start()).or_default().push(event);
    }

    for (hour, incoming) in by_hour {
        // Account before merging: the merge itself only reports "changed".
        let mut existing = log.hour_event_ids(hour)?;
        let mut retained = Vec::with_capacity(incoming.len());
        for event in incoming {
            let exists = existing.contains(&event.id);
            if exists && !overwrite {
                report.skipped += 1;
                continue;
            }
            if exists {
                report.replaced += 1;
            } else {
                report.imported += 1;
            }
            existing.insert(event.id.clone());
            retained.push(event);
        }
        if !retained.is_empty() {
            log.merge_into_hour(hour, &retained, overwrite)?;
            applied.extend(retained);
        }
    }

    Ok(ImportOutcome { report, applied })
}
