//! Segment footer index.
//!
//! Closed segments end with a small index that lets scans skip records whose
//! resource does not match a `(uid, kind, namespace)` filter without decoding
//! their payloads.
//!
//! # Footer Format
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │ index_len:u32 │ index bytes │ magic "SPEC" (4) │
//! └────────────────────────────────────────────────┘
//!
//! index bytes:
//!   [row_count:u32]
//!   repeated: [uid:str][kind:str][namespace:str][offset:u64][length:u32]
//!   str := [len:u16][utf8 bytes]
//! ```
//!
//! The trailing magic doubles as the closed-segment marker: an open or
//! interrupted segment simply lacks it, and the index is rebuilt from a
//! record scan.
//!
//! Record frames and the footer share the file without any record/footer tag
//! byte. They are still unambiguous: walking frame boundaries from the start
//! of the record region, a position holds the footer iff its leading `u32`
//! (the index length) lands the footer flush against a valid trailing magic.
//! A record frame can never satisfy that, because its trailing CRC and
//! payload would have to end exactly 4 bytes short of EOF *and* spell the
//! magic, which the footer test checks before the frame parse runs.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{LogError, LogResult};

/// Magic marking segment headers and footers.
pub const SEGMENT_MAGIC: &[u8; 4] = b"SPEC";

/// One index row: where in the segment a record for `uid` lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub uid: String,
    pub kind: String,
    pub namespace: String,
    /// Byte offset of the record frame within the segment file.
    pub offset: u64,
    /// Length of the record frame (including frame overhead).
    pub length: u32,
}

impl IndexRow {
    /// `true` if the row satisfies the scan filter fields.
    pub fn matches(&self, uid: Option<&str>, kind: Option<&str>, namespace: Option<&str>) -> bool {
        uid.is_none_or(|u| self.uid == u)
            && kind.is_none_or(|k| self.kind == k)
            && namespace.is_none_or(|n| self.namespace == n)
    }
}

/// Serializes the footer (index length, index bytes, trailing magic).
pub fn encode_footer(rows: &[IndexRow]) -> Bytes {
    let mut index = BytesMut::new();
    index.put_u32_le(rows.len() as u32);
    for row in rows {
        put_str(&mut index, &row.uid);
        put_str(&mut index, &row.kind);
        put_str(&mut index, &row.namespace);
        index.put_u64_le(row.offset);
        index.put_u32_le(row.length);
    }

    let mut buf = BytesMut::with_capacity(4 + index.len() + 4);
    buf.put_u32_le(index.len() as u32);
    buf.extend_from_slice(&index);
    buf.extend_from_slice(SEGMENT_MAGIC);
    buf.freeze()
}

/// Tests whether the footer begins at `pos` in `data`.
///
/// True iff the `u32` at `pos` is an index length that places the trailing
/// magic exactly at end-of-file.
pub fn footer_starts_at(data: &Bytes, pos: usize) -> bool {
    if pos + 8 > data.len() || &data[data.len() - 4..] != SEGMENT_MAGIC {
        return false;
    }
    let index_len = u32::from_le_bytes(data[pos..pos + 4].try_into().expect("4 bytes")) as usize;
    pos + 4 + index_len + 4 == data.len()
}

/// Parses the footer known to start at `pos` (see [`footer_starts_at`]).
pub fn decode_footer_at(data: &Bytes, pos: usize) -> LogResult<Vec<IndexRow>> {
    debug_assert!(footer_starts_at(data, pos), "caller must locate the footer");
    let index_len =
        u32::from_le_bytes(data[pos..pos + 4].try_into().expect("4 bytes")) as usize;
    let index = data.slice(pos + 4..pos + 4 + index_len);
    parse_rows(&index)
}

/// `true` if the file carries the closed-segment trailing magic.
pub fn has_trailing_magic(data: &Bytes) -> bool {
    data.len() >= 4 && &data[data.len() - 4..] == SEGMENT_MAGIC
}

fn parse_rows(index: &Bytes) -> LogResult<Vec<IndexRow>> {
    let mut pos = 0usize;
    let row_count = read_u32(index, &mut pos)? as usize;
    let mut rows = Vec::with_capacity(row_count.min(1 << 20));
    for _ in 0..row_count {
        let uid = read_str(index, &mut pos)?;
        let kind = read_str(index, &mut pos)?;
        let namespace = read_str(index, &mut pos)?;
        let offset = read_u64(index, &mut pos)?;
        let length = read_u32(index, &mut pos)?;
        rows.push(IndexRow {
            uid,
            kind,
            namespace,
            offset,
            length,
        });
    }
    Ok(rows)
}

fn put_str(buf: &mut BytesMut, s: &str) {
    let len = s.len().min(u16::MAX as usize);
    buf.put_u16_le(len as u16);
    buf.extend_from_slice(&s.as_bytes()[..len]);
}

fn read_u32(data: &Bytes, pos: &mut usize) -> LogResult<u32> {
    if *pos + 4 > data.len() {
        return Err(LogError::UnexpectedEof);
    }
    let v = u32::from_le_bytes(data[*pos..*pos + 4].try_into().expect("4 bytes"));
    *pos += 4;
    Ok(v)
}

fn read_u64(data: &Bytes, pos: &mut usize) -> LogResult<u64> {
    if *pos + 8 > data.len() {
        return Err(LogError::UnexpectedEof);
    }
    let v = u64::from_le_bytes(data[*pos..*pos + 8].try_into().expect("8 bytes"));
    *pos += 8;
    Ok(v)
}

fn read_str(data: &Bytes, pos: &mut usize) -> LogResult<String> {
    if *pos + 2 > data.len() {
        return Err(LogError::UnexpectedEof);
    }
    let len = u16::from_le_bytes(data[*pos..*pos + 2].try_into().expect("2 bytes")) as usize;
    *pos += 2;
    if *pos + len > data.len() {
        return Err(LogError::UnexpectedEof);
    }
    let s = String::from_utf8(data[*pos..*pos + len].to_vec()).map_err(|_| {
        LogError::InvalidPayload {
            reason: "index string is not valid UTF-8".to_string(),
        }
    })?;
    *pos += len;
    Ok(s)
}
