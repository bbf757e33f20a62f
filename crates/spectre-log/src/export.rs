//! Binary export container.
//!
//! An export packages every segment touching a time range into one stream:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ magic "SPXP" │ major:u8 │ minor:u8 │ flags:u8 │ meta_len:u32  │
//! │ meta JSON bytes                                               │
//! │ body (zstd-compressed when flags bit 0 is set):               │
//! │   segment_count:u32                                           │
//! │   repeated: hour_start:i64 │ seg_len:u64 │ segment file bytes │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Segment bytes are verbatim file contents, so an exported closed segment
//! keeps its footer and CRCs. The open hour, when included, is copied as a
//! live tail without a footer.

use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use spectre_types::TimestampNs;

use crate::{EventLog, LogError, LogResult};

/// Magic identifying an export container.
pub const EXPORT_MAGIC: &[u8; 4] = b"SPXP";

pub const EXPORT_MAJOR: u8 = 1;
pub const EXPORT_MINOR: u8 = 0;

const FLAG_ZSTD: u8 = 0b0000_0001;

/// Content type of the binary export stream.
pub const CONTENT_TYPE_BINARY: &str = "application/vnd.spectre.events.v1+bin";

/// Content type of a JSON event batch.
pub const CONTENT_TYPE_JSON: &str = "application/vnd.spectre.events.v1+json";

/// Compression applied to the export body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Zstd,
}

/// Container metadata, stored as JSON right after the fixed header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMeta {
    pub start_ts: i64,
    pub end_ts: i64,
    pub segment_count: u32,
    pub includes_open_hour: bool,
}

/// Packages all segments touching `[start, end]` into `out`.
pub fn export_to<W: Write>(
    log: &mut EventLog,
    out: &mut W,
    start: TimestampNs,
    end: TimestampNs,
    include_open_hour: bool,
    compression: Compression,
) -> LogResult<ExportMeta> {
    let open_hour = log.open_hour();
    let hours: Vec<TimestampNs> = log
        .segments_overlapping(start, end)?
        .into_iter()
        .filter(|h| include_open_hour || Some(*h) != open_hour)
        .collect();

    let mut body = BytesMut::new();
    body.put_u32_le(hours.len() as u32);
    for hour in &hours {
        let bytes = log.segment_bytes(*hour)?;
        body.put_i64_le(hour.as_nanos());
        body.put_u64_le(bytes.len() as u64);
        body.extend_from_slice(&bytes);
    }

    let meta = ExportMeta {
        start_ts: start.as_nanos(),
        end_ts: end.as_nanos(),
        segment_count: hours.len() as u32,
        includes_open_hour: include_open_hour && open_hour.is_some_and(|h| hours.contains(&h)),
    };
    let meta_json = serde_json::to_vec(&meta)?;

    let flags = match compression {
        Compression::None => 0,
        Compression::Zstd => FLAG_ZSTD,
    };

    out.write_all(EXPORT_MAGIC)?;
    out.write_all(&[EXPORT_MAJOR, EXPORT_MINOR, flags])?;
    out.write_all(&(meta_json.len() as u32).to_le_bytes())?;
    out.write_all(&meta_json)?;

    match compression {
        Compression::None => out.write_all(&body)?,
        Compression::Zstd => {
            let compressed = zstd::encode_all(&body[..], 0).map_err(LogError::Io)?;
            out.write_all(&compressed)?;
        }
    }

    tracing::info!(
        segments = meta.segment_count,
        start = %start,
        end = %end,
        compressed = matches!(compression, Compression::Zstd),
        "exported event range"
    );
    Ok(meta)
}

/// A segment pulled out of an export container.
#[derive(Debug)]
pub struct ExportedSegment {
    pub hour_start: TimestampNs,
    pub bytes: Bytes,
}

/// Parses an export container produced by [`export_to`].
pub fn parse_container(data: &Bytes) -> LogResult<(ExportMeta, Vec<ExportedSegment>)> {
    if data.len() < 11 || &data[0..4] != EXPORT_MAGIC {
        return Err(LogError::InvalidContainer {
            reason: "missing SPXP magic".to_string(),
        });
    }
    if data[4] != EXPORT_MAJOR {
        return Err(LogError::InvalidContainer {
            reason: format!("unsupported export version {}", data[4]),
        });
    }
    let flags = data[6];
    let meta_len = u32::from_le_bytes(data[7..11].try_into().expect("4 bytes")) as usize;
    if 11 + meta_len > data.len() {
        return Err(LogError::InvalidContainer {
            reason: "metadata extends past end of stream".to_string(),
        });
    }
    let meta: ExportMeta = serde_json::from_slice(&data[11..11 + meta_len])?;

    let body: Bytes = if flags & FLAG_ZSTD != 0 {
        zstd::decode_all(&data[11 + meta_len..])
            .map_err(LogError::Io)?
            .into()
    } else {
        data.slice(11 + meta_len..)
    };

    let mut pos = 0usize;
    let count = read_u32(&body, &mut pos)? as usize;
    let mut segments = Vec::with_capacity(count);
    for _ in 0..count {
        let hour_start = TimestampNs::new(read_i64(&body, &mut pos)?);
        let len = read_u64(&body, &mut pos)? as usize;
        if pos + len > body.len() {
            return Err(LogError::InvalidContainer {
                reason: "segment extends past end of body".to_string(),
            });
        }
        segments.push(ExportedSegment {
            hour_start,
            bytes: body.slice(pos..pos + len),
        });
        pos += len;
    }

    Ok((meta, segments))
}

/// `true` when the stream starts with the export magic. Lets import fall
/// back to content sniffing when no content type is supplied.
pub fn looks_binary(data: &[u8]) -> bool {
    data.len() >= 4 && &data[0..4] == EXPORT_MAGIC
}

fn read_u32(data: &Bytes, pos: &mut usize) -> LogResult<u32> {
    if *pos + 4 > data.len() {
        return Err(LogError::InvalidContainer {
            reason: "truncated body".to_string(),
        });
    }
    let v = u32::from_le_bytes(data[*pos..*pos + 4].try_into().expect("4 bytes"));
    *pos += 4;
    Ok(v)
}

fn read_i64(data: &Bytes, pos: &mut usize) -> LogResult<i64> {
    if *pos + 8 > data.len() {
        return Err(LogError::InvalidContainer {
            reason: "truncated body".to_string(),
        });
    }
    let v = i64::from_le_bytes(data[*pos..*pos + 8].try_into().expect("8 bytes"));
    *pos += 8;
    Ok(v)
}

fn read_u64(data: &Bytes, pos: &mut usize) -> LogResult<u64> {
    read_i64(data, pos).map(|v| v as u64)
}
