//! Record framing for segment files.
//!
//! Each record is framed as:
//!
//! ```text
//! [length:u32][crc32:u32][payload bytes]
//!     4B          4B        variable
//! ```
//!
//! The CRC covers the payload only. A frame whose CRC does not match, or
//! that extends past the end of the available data, marks the torn tail of
//! an open segment: recovery truncates to the last good frame.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{LogError, LogResult};

/// Frame overhead in bytes: length(4) + crc(4).
pub const FRAME_OVERHEAD: usize = 8;

/// Serializes one framed record into `buf`.
pub fn write_frame(buf: &mut BytesMut, payload: &Bytes) {
    buf.reserve(FRAME_OVERHEAD + payload.len());
    buf.put_u32_le(payload.len() as u32);
    buf.put_u32_le(crc32fast::hash(payload));
    buf.extend_from_slice(payload);
}

/// Serializes one framed record to a fresh buffer.
pub fn frame_to_bytes(payload: &Bytes) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_OVERHEAD + payload.len());
    write_frame(&mut buf, payload);
    buf.freeze()
}

/// Reads one framed record starting at `pos`.
///
/// Returns the payload (zero-copy slice) and the number of bytes consumed.
///
/// # Errors
///
/// - [`LogError::UnexpectedEof`] if the frame extends past `data`
/// - [`LogError::CorruptedRecord`] is **not** produced here; CRC mismatch is
///   reported as [`ReadFrame::BadCrc`] so callers can decide between torn-tail
///   truncation and hard failure
pub fn read_frame(data: &Bytes, pos: usize) -> LogResult<ReadFrame> {
    if pos + FRAME_OVERHEAD > data.len() {
        return Err(LogError::UnexpectedEof);
    }
    let len = u32::from_le_bytes(
        data[pos..pos + 4]
            .try_into()
            .expect("slice is exactly 4 bytes after bounds check"),
    ) as usize;
    let stored_crc = u32::from_le_bytes(
        data[pos + 4..pos + 8]
            .try_into()
            .expect("slice is exactly 4 bytes after bounds check"),
    );

    let payload_start = pos + FRAME_OVERHEAD;
    let payload_end = payload_start
        .checked_add(len)
        .ok_or(LogError::UnexpectedEof)?;
    if payload_end > data.len() {
        return Err(LogError::UnexpectedEof);
    }

    let payload = data.slice(payload_start..payload_end);
    if crc32fast::hash(&payload) != stored_crc {
        return Ok(ReadFrame::BadCrc);
    }

    Ok(ReadFrame::Ok {
        payload,
        consumed: FRAME_OVERHEAD + len,
    })
}

/// Outcome of reading one frame.
#[derive(Debug)]
pub enum ReadFrame {
    Ok { payload: Bytes, consumed: usize },
    /// Length parsed but the payload checksum does not match.
    BadCrc,
}
