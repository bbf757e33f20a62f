//! Hour segment files.
//!
//! A segment holds every accepted event whose timestamp falls in one
//! wall-clock hour. The file is self-describing:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ magic "SPEC" │ major:u8 │ minor:u8 │ hour_start:i64      │  header, 14 B
//! │ repeated record frames (see record.rs)                   │
//! │ footer index (see footer.rs)                             │  closed only
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Segments are append-only while open (the current hour) and immutable once
//! closed. Records sit in arrival order; timestamps are non-decreasing within
//! a single uid lineage but not globally.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use spectre_types::{Event, EventId, TimestampNs};

use crate::codec::{decode_event, encode_event};
use crate::footer::{IndexRow, SEGMENT_MAGIC, decode_footer_at, encode_footer, footer_starts_at};
use crate::record::{ReadFrame, frame_to_bytes, read_frame};
use crate::{LogError, LogResult};

/// Segment format version written by this build.
pub const FORMAT_MAJOR: u8 = 1;
pub const FORMAT_MINOR: u8 = 0;

/// Header size: magic(4) + major(1) + minor(1) + hour_start(8).
pub const HEADER_SIZE: usize = 14;

/// File name for a segment: `<hour-start-nanos>.seg`.
pub fn segment_file_name(hour_start: TimestampNs) -> String {
    format!("{}.seg", hour_start.as_nanos())
}

/// Parses the hour start back out of a segment file name.
pub fn hour_from_file_name(name: &str) -> Option<TimestampNs> {
    let stem = name.strip_suffix(".seg")?;
    stem.parse::<i64>().ok().map(TimestampNs::new)
}

fn encode_header(hour_start: TimestampNs) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[0..4].copy_from_slice(SEGMENT_MAGIC);
    buf[4] = FORMAT_MAJOR;
    buf[5] = FORMAT_MINOR;
    buf[6..14].copy_from_slice(&hour_start.as_nanos().to_le_bytes());
    buf
}

fn decode_header(data: &Bytes, path: &Path) -> LogResult<TimestampNs> {
    if data.len() < HEADER_SIZE {
        return Err(LogError::InvalidHeader {
            path: path.display().to_string(),
            reason: "file shorter than header".to_string(),
        });
    }
    if &data[0..4] != SEGMENT_MAGIC {
        return Err(LogError::InvalidHeader {
            path: path.display().to_string(),
            reason: "bad magic".to_string(),
        });
    }
    if data[4] != FORMAT_MAJOR {
        return Err(LogError::InvalidHeader {
            path: path.display().to_string(),
            reason: format!("unsupported major version {}", data[4]),
        });
    }
    let hour = i64::from_le_bytes(data[6..14].try_into().expect("8 bytes"));
    Ok(TimestampNs::new(hour))
}

/// Writable handle on the current hour's open segment.
///
/// Tracks the id set for open-segment idempotency, the accumulating footer
/// rows, and the running maximum timestamp.
#[derive(Debug)]
pub struct SegmentWriter {
    path: PathBuf,
    file: File,
    hour_start: TimestampNs,
    position: u64,
    rows: Vec<IndexRow>,
    ids: HashSet<EventId>,
    max_timestamp: TimestampNs,
}

impl SegmentWriter {
    /// Creates a fresh segment, writing the header before any append.
    pub fn create(dir: &Path, hour_start: TimestampNs) -> LogResult<Self> {
        debug_assert_eq!(
            hour_start.hour_start(),
            hour_start,
            "segment key must be hour-aligned"
        );
        let path = dir.join(segment_file_name(hour_start));
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)?;
        file.write_all(&encode_header(hour_start))
            .map_err(|e| LogError::from_write_error(e, &path))?;
        file.sync_all()?;

        Ok(Self {
            path,
            file,
            hour_start,
            position: HEADER_SIZE as u64,
            rows: Vec::new(),
            ids: HashSet::new(),
            max_timestamp: TimestampNs::ZERO,
        })
    }

    /// Reopens an existing open segment, truncating any torn tail.
    ///
    /// Walks record frames from the header; the first frame that is short or
    /// fails its CRC marks the torn tail, which is discarded with a warning.
    pub fn recover(path: &Path) -> LogResult<Self> {
        let data: Bytes = fs::read(path)?.into();
        let hour_start = decode_header(&data, path)?;

        let mut rows = Vec::new();
        let mut ids = HashSet::new();
        let mut max_timestamp = TimestampNs::ZERO;
        let mut pos = HEADER_SIZE;

        loop {
            if pos == data.len() {
                break;
            }
            // Reopening a finalized segment (import into the current hour):
            // drop the footer, the appends that follow will rewrite it.
            if footer_starts_at(&data, pos) {
                tracing::debug!(
                    path = %path.display(),
                    offset = pos,
                    "stripping footer to reopen segment"
                );
                break;
            }
            match read_frame(&data, pos) {
                Ok(ReadFrame::Ok { payload, consumed }) => {
                    let event = decode_event(&payload)?;
                    rows.push(IndexRow {
                        uid: event.resource.uid.to_string(),
                        kind: event.resource.gvk.kind.clone(),
                        namespace: event.resource.namespace.clone(),
                        offset: pos as u64,
                        length: consumed as u32,
                    });
                    max_timestamp = max_timestamp.max(event.timestamp);
                    ids.insert(event.id);
                    pos += consumed;
                }
                Ok(ReadFrame::BadCrc) | Err(LogError::UnexpectedEof) => {
                    let discarded = data.len() - pos;
                    tracing::warn!(
                        path = %path.display(),
                        offset = pos,
                        discarded_bytes = discarded,
                        "truncating torn tail of open segment"
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(pos as u64)?;
        file.sync_all()?;
        let file = OpenOptions::new().append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            hour_start,
            position: pos as u64,
            rows,
            ids,
            max_timestamp,
        })
    }

    pub fn hour_start(&self) -> TimestampNs {
        self.hour_start
    }

    pub fn max_timestamp(&self) -> TimestampNs {
        self.max_timestamp
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of events in the segment.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `true` if an event with this id is already stored in the segment.
    pub fn contains(&self, id: &EventId) -> bool {
        self.ids.contains(id)
    }

    /// Appends one event. Returns `false` (silently dropping the event) when
    /// its id is already present in the segment.
    pub fn append(&mut self, event: &Event) -> LogResult<bool> {
        debug_assert_eq!(
            event.timestamp.hour_start(),
            self.hour_start,
            "event routed to wrong segment"
        );
        if self.ids.contains(&event.id) {
            return Ok(false);
        }

        let frame = frame_to_bytes(&encode_event(event));
        self.file
            .write_all(&frame)
            .map_err(|e| LogError::from_write_error(e, &self.path))?;

        self.rows.push(IndexRow {
            uid: event.resource.uid.to_string(),
            kind: event.resource.gvk.kind.clone(),
            namespace: event.resource.namespace.clone(),
            offset: self.position,
            length: frame.len() as u32,
        });
        self.position += frame.len() as u64;
        self.max_timestamp = self.max_timestamp.max(event.timestamp);
        self.ids.insert(event.id.clone());
        Ok(true)
    }

    /// Flushes file contents to disk.
    pub fn sync(&mut self) -> LogResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Writes the footer index and closes the segment.
    ///
    /// After this the file is immutable; the trailing magic marks it closed.
    pub fn finalize(mut self) -> LogResult<()> {
        let footer = encode_footer(&self.rows);
        self.file
            .write_all(&footer)
            .map_err(|e| LogError::from_write_error(e, &self.path))?;
        self.file.sync_all()?;
        tracing::info!(
            path = %self.path.display(),
            events = self.rows.len(),
            hour_start = %self.hour_start,
            "finalized segment"
        );
        Ok(())
    }

    /// Snapshot of the live file bytes (header + records, no footer), for
    /// export over the open hour.
    pub fn snapshot_bytes(&self) -> LogResult<Bytes> {
        Ok(fs::read(&self.path)?.into())
    }

    /// Index rows accumulated so far (arrival order).
    pub fn rows(&self) -> &[IndexRow] {
        &self.rows
    }
}

/// Immutable view of a segment file, closed or a snapshot of the open hour.
#[derive(Debug, Clone)]
pub struct SegmentReader {
    hour_start: TimestampNs,
    data: Bytes,
    rows: Vec<IndexRow>,
}

impl SegmentReader {
    /// Loads a segment file.
    ///
    /// For closed segments the footer supplies the index; a malformed footer
    /// is logged and the index rebuilt from a record walk. Open-segment
    /// snapshots are indexed by walking records, tolerating a torn tail.
    pub fn load(path: &Path) -> LogResult<Self> {
        let data: Bytes = fs::read(path)?.into();
        Self::from_bytes(data, path)
    }

    /// Parses a segment from in-memory bytes (used by import).
    pub fn from_bytes(data: Bytes, origin: &Path) -> LogResult<Self> {
        let hour_start = decode_header(&data, origin)?;

        let mut rows = Vec::new();
        let mut pos = HEADER_SIZE;
        loop {
            if pos == data.len() {
                break;
            }
            if footer_starts_at(&data, pos) {
                match decode_footer_at(&data, pos) {
                    Ok(footer_rows) => rows = footer_rows,
                    Err(_) => {
                        tracing::warn!(
                            path = %origin.display(),
                            "segment footer unreadable, using rebuilt index"
                        );
                    }
                }
                break;
            }
            match read_frame(&data, pos) {
                Ok(ReadFrame::Ok { payload, consumed }) => {
                    let event = decode_event(&payload)?;
                    rows.push(IndexRow {
                        uid: event.resource.uid.to_string(),
                        kind: event.resource.gvk.kind.clone(),
                        namespace: event.resource.namespace.clone(),
                        offset: pos as u64,
                        length: consumed as u32,
                    });
                    pos += consumed;
                }
                Ok(ReadFrame::BadCrc) | Err(LogError::UnexpectedEof) => {
                    tracing::warn!(
                        path = %origin.display(),
                        offset = pos,
                        "ignoring torn tail while reading segment"
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Self {
            hour_start,
            data,
            rows,
        })
    }

    pub fn hour_start(&self) -> TimestampNs {
        self.hour_start
    }

    pub fn rows(&self) -> &[IndexRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Decodes the event stored at an index row.
    pub fn event_at(&self, row: &IndexRow) -> LogResult<Event> {
        let pos = row.offset as usize;
        match read_frame(&self.data, pos)? {
            ReadFrame::Ok { payload, .. } => decode_event(&payload),
            ReadFrame::BadCrc => Err(LogError::CorruptedRecord {
                hour_start: self.hour_start,
                offset: row.offset,
            }),
        }
    }

    /// Decodes every event in file order.
    pub fn events(&self) -> LogResult<Vec<Event>> {
        self.rows.iter().map(|row| self.event_at(row)).collect()
    }

    /// The maximum event timestamp in the segment, or `ZERO` when empty.
    pub fn max_timestamp(&self) -> LogResult<TimestampNs> {
        let mut max = TimestampNs::ZERO;
        for row in &self.rows {
            let pos = row.offset as usize;
            if let ReadFrame::Ok { payload, .. } = read_frame(&self.data, pos)? {
                max = max.max(crate::codec::decode_timestamp(&payload)?);
            }
        }
        Ok(max)
    }

    /// Rewrites this segment's events plus a footer to `path` atomically
    /// (tmp file + rename). Used by import when merging into an existing
    /// hour, and by startup finalization of stale open segments.
    pub fn rewrite_closed(path: &Path, hour_start: TimestampNs, events: &[Event]) -> LogResult<()> {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_header(hour_start));

        let mut rows = Vec::with_capacity(events.len());
        for event in events {
            let frame = frame_to_bytes(&encode_event(event));
            rows.push(IndexRow {
                uid: event.resource.uid.to_string(),
                kind: event.resource.gvk.kind.clone(),
                namespace: event.resource.namespace.clone(),
                offset: buf.len() as u64,
                length: frame.len() as u32,
            });
            buf.extend_from_slice(&frame);
        }
        buf.extend_from_slice(&encode_footer(&rows));

        let tmp = path.with_extension("seg.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&buf)
            .map_err(|e| LogError::from_write_error(e, &tmp))?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
