//! The append-only, hour-segmented event log.
//!
//! # File Layout
//!
//! ```text
//! {data_dir}/
//! └── segments/
//!     ├── 1755500400000000000.seg   <- closed hour (footer + trailing magic)
//!     ├── 1755504000000000000.seg   <- closed hour
//!     └── 1755507600000000000.seg   <- open hour (current, no footer)
//! ```
//!
//! # Invariants
//!
//! - Records are append-only; closed segments are never modified except by
//!   explicit import merges, which rewrite atomically
//! - An event id appears at most once within its hour segment
//! - The log watermark (maximum accepted timestamp) never decreases, across
//!   restarts included
//!
//! # Startup
//!
//! The current hour is determined from the wall clock. Segments older than
//! the current hour that still lack a footer are finalized; a torn tail on
//! the open segment is truncated to the last CRC-valid record.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use spectre_types::{Event, TimestampNs, Uid};

use crate::segment::{SegmentReader, SegmentWriter, hour_from_file_name, segment_file_name};
use crate::{LogError, LogResult};

/// When appends are flushed to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// fsync on every append. The default: `append` returns only once the
    /// event is durable.
    Always,
    /// fsync every `n` appends, on rotation, and on shutdown. For test and
    /// bulk-import workloads.
    EveryN(u32),
}

/// Filter for [`EventLog::scan`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub uid: Option<Uid>,
}

impl ScanFilter {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.namespace.is_none() && self.uid.is_none()
    }

    pub fn by_uid(uid: Uid) -> Self {
        Self {
            uid: Some(uid),
            ..Self::default()
        }
    }
}

/// The hour-segmented event log (component C1).
#[derive(Debug)]
pub struct EventLog {
    segments_dir: PathBuf,
    writer: Option<SegmentWriter>,
    durability: Durability,
    appends_since_sync: u32,
    max_timestamp: TimestampNs,
}

impl EventLog {
    /// Opens (or creates) the log under `data_dir/segments`.
    ///
    /// Finalizes stale open segments from previous runs and recovers the
    /// current hour's tail.
    pub fn open(data_dir: &Path) -> LogResult<Self> {
        Self::open_with_durability(data_dir, Durability::Always)
    }

    pub fn open_with_durability(data_dir: &Path, durability: Durability) -> LogResult<Self> {
        let segments_dir = data_dir.join("segments");
        fs::create_dir_all(&segments_dir)?;

        let current_hour = wall_clock_now().hour_start();
        let mut writer = None;
        let mut max_timestamp = TimestampNs::ZERO;

        for hour in list_segment_hours(&segments_dir)? {
            let path = segments_dir.join(segment_file_name(hour));
            let data: bytes::Bytes = fs::read(&path)?.into();
            let closed = crate::footer::has_trailing_magic(&data);

            if hour < current_hour && !closed {
                // Finalize: a previous run stopped while this hour was open.
                let stale = SegmentWriter::recover(&path)?;
                max_timestamp = max_timestamp.max(stale.max_timestamp());
                stale.finalize()?;
                tracing::info!(hour_start = %hour, "finalized stale open segment");
            } else if hour == current_hour && !closed {
                let recovered = SegmentWriter::recover(&path)?;
                max_timestamp = max_timestamp.max(recovered.max_timestamp());
                writer = Some(recovered);
            } else {
                // Closed segment: only the newest can hold the watermark,
                // but reading one max per segment keeps this simple and
                // startup-only.
                let reader = SegmentReader::load(&path)?;
                max_timestamp = max_timestamp.max(reader.max_timestamp()?);
            }
        }

        Ok(Self {
            segments_dir,
            writer,
            durability,
            appends_since_sync: 0,
            max_timestamp,
        })
    }

    /// The log watermark: the maximum timestamp of any accepted event.
    pub fn max_timestamp(&self) -> TimestampNs {
        self.max_timestamp
    }

    /// Appends one event; returns once the event is durable per the
    /// configured [`Durability`].
    ///
    /// Idempotent on `event.id` within the open segment: a repeat id is
    /// silently dropped and `Ok(false)` returned.
    ///
    /// Rotation at the hour boundary is driven by the first event of the new
    /// hour: the new segment's header is written before the append.
    pub fn append(&mut self, event: &Event) -> LogResult<bool> {
        let event_hour = event.timestamp.hour_start();

        match self.writer.as_ref().map(SegmentWriter::hour_start) {
            Some(open_hour) if event_hour == open_hour => {}
            Some(open_hour) if event_hour > open_hour => {
                self.rotate_to(event_hour)?;
            }
            Some(_) => {
                // Event belongs to an already-closed hour (import replay,
                // recovered backlog). Merge it below the open segment.
                return self.merge_into_hour(event_hour, std::slice::from_ref(event), false);
            }
            None => {
                self.open_writer(event_hour)?;
            }
        }

        let writer = self.writer.as_mut().expect("writer opened above");
        let accepted = writer.append(event)?;
        if accepted {
            self.max_timestamp = self.max_timestamp.max(event.timestamp);
            self.appends_since_sync += 1;
            match self.durability {
                Durability::Always => {
                    writer.sync()?;
                    self.appends_since_sync = 0;
                }
                Durability::EveryN(n) => {
                    if self.appends_since_sync >= n {
                        writer.sync()?;
                        self.appends_since_sync = 0;
                    }
                }
            }
        }
        Ok(accepted)
    }

    fn open_writer(&mut self, hour: TimestampNs) -> LogResult<()> {
        let path = self.segments_dir.join(segment_file_name(hour));
        let writer = if path.exists() {
            SegmentWriter::recover(&path)?
        } else {
            SegmentWriter::create(&self.segments_dir, hour)?
        };
        self.writer = Some(writer);
        Ok(())
    }

    fn rotate_to(&mut self, new_hour: TimestampNs) -> LogResult<()> {
        if let Some(old) = self.writer.take() {
            let old_hour = old.hour_start();
            old.finalize()?;
            tracing::info!(
                closed_hour = %old_hour,
                new_hour = %new_hour,
                "rotated hour segment"
            );
        }
        self.open_writer(new_hour)
    }

    /// Merges events into a specific (usually closed) hour segment,
    /// rewriting it atomically. With `overwrite`, an existing event with the
    /// same id is replaced; otherwise incoming duplicates are skipped.
    ///
    /// Returns `true` if anything changed.
    pub(crate) fn merge_into_hour(
        &mut self,
        hour: TimestampNs,
        incoming: &[Event],
        overwrite: bool,
    ) -> LogResult<bool> {
        let path = self.segments_dir.join(segment_file_name(hour));
        let is_open_hour = self
            .writer
            .as_ref()
            .is_some_and(|w| w.hour_start() == hour);

        let mut existing = if path.exists() {
            if is_open_hour {
                // Sync so the snapshot sees every accepted record.
                if let Some(w) = self.writer.as_mut() {
                    w.sync()?;
                }
            }
            SegmentReader::load(&path)?.events()?
        } else {
            Vec::new()
        };

        let mut changed = false;
        for event in incoming {
            debug_assert_eq!(event.timestamp.hour_start(), hour);
            match existing.iter().position(|e| e.id == event.id) {
                Some(idx) if overwrite => {
                    existing[idx] = event.clone();
                    changed = true;
                }
                Some(_) => {}
                None => {
                    existing.push(event.clone());
                    changed = true;
                }
            }
        }

        if !changed {
            return Ok(false);
        }

        if is_open_hour {
            // Rewrite, then reopen the writer: recover strips the footer so
            // the segment accepts appends again.
            self.writer = None;
            SegmentReader::rewrite_closed(&path, hour, &existing)?;
            self.writer = Some(SegmentWriter::recover(&path)?);
        } else {
            SegmentReader::rewrite_closed(&path, hour, &existing)?;
        }

        for event in incoming {
            self.max_timestamp = self.max_timestamp.max(event.timestamp);
        }
        Ok(true)
    }

    /// The ids already stored in the segment for `hour`.
    pub fn hour_event_ids(
        &mut self,
        hour: TimestampNs,
    ) -> LogResult<std::collections::HashSet<spectre_types::EventId>> {
        if let Some(w) = self.writer.as_mut() {
            if w.hour_start() == hour {
                w.sync()?;
            }
        }
        let path = self.segments_dir.join(segment_file_name(hour));
        if !path.exists() {
            return Ok(std::collections::HashSet::new());
        }
        let reader = SegmentReader::load(&path)?;
        Ok(reader.events()?.into_iter().map(|e| e.id).collect())
    }

    /// Hour-start keys of all segments on disk, ascending.
    pub fn segment_hours(&self) -> LogResult<Vec<TimestampNs>> {
        list_segment_hours(&self.segments_dir)
    }

    /// Segments whose hour intersects `[start, end]`, ascending.
    pub fn segments_overlapping(
        &self,
        start: TimestampNs,
        end: TimestampNs,
    ) -> LogResult<Vec<TimestampNs>> {
        Ok(self
            .segment_hours()?
            .into_iter()
            .filter(|h| *h <= end && h.next_hour_start() > start)
            .collect())
    }

    /// Lazily scans events with timestamps in `[start, end]` matching
    /// `filter`. Order: segment ascending, then file offset.
    ///
    /// The returned sequence is finite and non-restartable.
    pub fn scan(&mut self, start: TimestampNs, end: TimestampNs, filter: ScanFilter) -> ScanIter {
        // Sync the open segment so the scan's on-disk read sees the tail.
        if let Some(w) = self.writer.as_mut() {
            if w.sync().is_err() {
                tracing::warn!("failed to sync open segment ahead of scan");
            }
        }
        let hours = self.segments_overlapping(start, end).unwrap_or_default();
        ScanIter {
            segments_dir: self.segments_dir.clone(),
            pending_hours: hours.into_iter().collect(),
            current: None,
            row_idx: 0,
            start,
            end,
            filter,
        }
    }

    /// Raw file bytes for a segment, for export. The open hour is synced
    /// first so the copy includes the live tail.
    pub fn segment_bytes(&mut self, hour: TimestampNs) -> LogResult<bytes::Bytes> {
        if let Some(w) = self.writer.as_mut() {
            if w.hour_start() == hour {
                w.sync()?;
                return w.snapshot_bytes();
            }
        }
        let path = self.segments_dir.join(segment_file_name(hour));
        Ok(fs::read(&path)?.into())
    }

    /// The hour of the currently open segment, if any.
    pub fn open_hour(&self) -> Option<TimestampNs> {
        self.writer.as_ref().map(SegmentWriter::hour_start)
    }

    /// Flushes the open segment to disk.
    pub fn flush(&mut self) -> LogResult<()> {
        if let Some(w) = self.writer.as_mut() {
            w.sync()?;
            self.appends_since_sync = 0;
        }
        Ok(())
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::error!(error = %e, "failed to flush open segment during EventLog drop");
        }
    }
}

/// Lazy scan iterator. Loads one segment at a time; within a closed segment
/// the footer index skips records that cannot match the filter.
pub struct ScanIter {
    segments_dir: PathBuf,
    pending_hours: std::collections::VecDeque<TimestampNs>,
    current: Option<SegmentReader>,
    row_idx: usize,
    start: TimestampNs,
    end: TimestampNs,
    filter: ScanFilter,
}

impl Iterator for ScanIter {
    type Item = LogResult<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                let hour = self.pending_hours.pop_front()?;
                let path = self.segments_dir.join(segment_file_name(hour));
                match SegmentReader::load(&path) {
                    Ok(reader) => {
                        self.current = Some(reader);
                        self.row_idx = 0;
                    }
                    Err(LogError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => return Some(Err(e)),
                }
            }

            let reader = self.current.as_ref().expect("current set above");
            while self.row_idx < reader.rows().len() {
                let row = &reader.rows()[self.row_idx];
                self.row_idx += 1;

                if !row.matches(
                    self.filter.uid.as_ref().map(Uid::as_str),
                    self.filter.kind.as_deref(),
                    self.filter.namespace.as_deref(),
                ) {
                    continue;
                }
                match reader.event_at(row) {
                    Ok(event) => {
                        if event.timestamp.in_range(self.start, self.end) {
                            return Some(Ok(event));
                        }
                    }
                    Err(e) => return Some(Err(e)),
                }
            }
            self.current = None;
        }
    }
}

fn list_segment_hours(segments_dir: &Path) -> LogResult<Vec<TimestampNs>> {
    let mut hours = Vec::new();
    for entry in fs::read_dir(segments_dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if let Some(hour) = hour_from_file_name(name) {
                hours.push(hour);
            }
        }
    }
    hours.sort_unstable();
    Ok(hours)
}

fn wall_clock_now() -> TimestampNs {
    TimestampNs::new(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as i64),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use spectre_types::{EventId, EventType, GroupVersionKind, ResourceMetadata};
    use tempfile::tempdir;

    fn event(id: &str, ts: TimestampNs) -> Event {
        Event {
            id: EventId::new(id),
            timestamp: ts,
            event_type: EventType::Update,
            resource: ResourceMetadata::new(
                GroupVersionKind::core("v1", "Pod"),
                "ns",
                format!("pod-{id}"),
                Uid::new(format!("uid-{id}")),
            ),
            data: Bytes::from_static(b"{}"),
        }
    }

    fn open(dir: &std::path::Path) -> EventLog {
        EventLog::open_with_durability(dir, Durability::EveryN(1_000)).unwrap()
    }

    #[test]
    fn first_event_of_new_hour_drives_rotation() {
        let dir = tempdir().unwrap();
        let mut log = open(dir.path());

        let now = wall_clock_now();
        let this_hour = now.hour_start() + 60;
        let next_hour = now.next_hour_start() + 60;

        log.append(&event("a", this_hour)).unwrap();
        assert_eq!(log.open_hour(), Some(this_hour.hour_start()));

        log.append(&event("b", next_hour)).unwrap();
        assert_eq!(log.open_hour(), Some(next_hour.hour_start()));

        // The rotated-out hour carries its footer now.
        let old: Bytes = fs::read(
            log.segments_dir
                .join(segment_file_name(this_hour.hour_start())),
        )
        .unwrap()
        .into();
        assert!(crate::footer::has_trailing_magic(&old));

        let all: Vec<Event> = log
            .scan(TimestampNs::ZERO, TimestampNs::MAX, ScanFilter::default())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn event_for_a_past_hour_merges_below_the_open_segment() {
        let dir = tempdir().unwrap();
        let mut log = open(dir.path());

        let now = wall_clock_now();
        let current = now.hour_start() + 60;
        let previous = current - spectre_types::NANOS_PER_HOUR;

        log.append(&event("current", current)).unwrap();
        assert!(log.append(&event("late", previous)).unwrap());
        assert_eq!(
            log.open_hour(),
            Some(current.hour_start()),
            "open segment untouched by the historical merge"
        );

        let hours = log.segment_hours().unwrap();
        assert_eq!(hours.len(), 2);

        // Merging the same late event again changes nothing.
        assert!(!log.append(&event("late", previous)).unwrap());
        let all: Vec<Event> = log
            .scan(TimestampNs::ZERO, TimestampNs::MAX, ScanFilter::default())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn segments_overlapping_uses_hour_bounds() {
        let dir = tempdir().unwrap();
        let mut log = open(dir.path());

        let now = wall_clock_now();
        let in_hour = now.hour_start() + 60;
        log.append(&event("a", in_hour)).unwrap();

        let hour = in_hour.hour_start();
        // A range ending exactly at the hour start still touches it.
        assert_eq!(log.segments_overlapping(hour - 10, hour).unwrap(), vec![hour]);
        // A range before the hour does not.
        assert!(
            log.segments_overlapping(hour - 100, hour - 1)
                .unwrap()
                .is_empty()
        );
        // A range starting inside the hour does.
        assert_eq!(
            log.segments_overlapping(hour + 10, TimestampNs::MAX).unwrap(),
            vec![hour]
        );
    }

    #[test]
    fn watermark_reflects_merges_and_appends() {
        let dir = tempdir().unwrap();
        let mut log = open(dir.path());
        assert_eq!(log.max_timestamp(), TimestampNs::ZERO);

        let now = wall_clock_now();
        let ts = now.hour_start() + 60;
        log.append(&event("a", ts)).unwrap();
        assert_eq!(log.max_timestamp(), ts);

        // An older event never rewinds the watermark.
        log.append(&event("old", ts - spectre_types::NANOS_PER_HOUR))
            .unwrap();
        assert_eq!(log.max_timestamp(), ts);
    }
}
