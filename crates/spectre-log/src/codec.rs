//! Binary codec for event record payloads.
//!
//! The record payload is the serialized event. All integers are
//! little-endian; strings are length-prefixed with a `u16`.
//!
//! # Payload Format
//!
//! ```text
//! [id:str][timestamp:i64][type:u8]
//! [group:str][version:str][kind:str][namespace:str][name:str][uid:str]
//! [has_involved:u8][involved_uid:str?]
//! [data_size:u32][data:bytes]
//!
//! str := [len:u16][utf8 bytes]
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use spectre_types::{
    Event, EventId, EventType, GroupVersionKind, ResourceMetadata, TimestampNs, Uid,
};

use crate::{LogError, LogResult};

/// Maximum length of any string field on the wire (u16 prefix).
const MAX_STR: usize = u16::MAX as usize;

/// Serializes an event into a payload buffer.
pub fn encode_event(event: &Event) -> Bytes {
    let meta = &event.resource;
    let mut buf = BytesMut::with_capacity(96 + event.data.len());

    put_str(&mut buf, event.id.as_str());
    buf.put_i64_le(event.timestamp.as_nanos());
    buf.put_u8(event.event_type.as_byte());

    put_str(&mut buf, &meta.gvk.group);
    put_str(&mut buf, &meta.gvk.version);
    put_str(&mut buf, &meta.gvk.kind);
    put_str(&mut buf, &meta.namespace);
    put_str(&mut buf, &meta.name);
    put_str(&mut buf, meta.uid.as_str());

    match &meta.involved_object_uid {
        Some(uid) => {
            buf.put_u8(1);
            put_str(&mut buf, uid.as_str());
        }
        None => buf.put_u8(0),
    }

    buf.put_u32_le(event.data.len() as u32);
    buf.extend_from_slice(&event.data);

    buf.freeze()
}

/// Deserializes an event from a payload buffer.
pub fn decode_event(payload: &Bytes) -> LogResult<Event> {
    let mut cursor = Cursor::new(payload);

    let id = EventId::new(cursor.read_str()?);
    let timestamp = TimestampNs::new(cursor.read_i64()?);
    let type_byte = cursor.read_u8()?;
    let event_type = EventType::from_byte(type_byte).ok_or_else(|| LogError::InvalidPayload {
        reason: format!("unknown event type byte {type_byte}"),
    })?;

    let group = cursor.read_str()?;
    let version = cursor.read_str()?;
    let kind = cursor.read_str()?;
    let namespace = cursor.read_str()?;
    let name = cursor.read_str()?;
    let uid = Uid::new(cursor.read_str()?);

    let involved_object_uid = match cursor.read_u8()? {
        0 => None,
        1 => Some(Uid::new(cursor.read_str()?)),
        other => {
            return Err(LogError::InvalidPayload {
                reason: format!("invalid involved-object marker {other}"),
            });
        }
    };

    let data_size = cursor.read_u32()? as usize;
    let data = cursor.read_bytes(data_size)?;

    Ok(Event {
        id,
        timestamp,
        event_type,
        resource: ResourceMetadata {
            gvk: GroupVersionKind::new(group, version, kind),
            namespace,
            name,
            uid,
            involved_object_uid,
        },
        data,
    })
}

/// Decodes only `(uid, timestamp)` from a payload, skipping the document.
///
/// Used by scans that filter on time before paying for a full decode.
pub fn decode_timestamp(payload: &Bytes) -> LogResult<TimestampNs> {
    let mut cursor = Cursor::new(payload);
    let _id = cursor.read_str()?;
    Ok(TimestampNs::new(cursor.read_i64()?))
}

fn put_str(buf: &mut BytesMut, s: &str) {
    debug_assert!(s.len() <= MAX_STR, "string field exceeds u16 length prefix");
    let len = s.len().min(MAX_STR);
    buf.put_u16_le(len as u16);
    buf.extend_from_slice(&s.as_bytes()[..len]);
}

/// Bounds-checked reader over a payload.
struct Cursor<'a> {
    data: &'a Bytes,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a Bytes) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> LogResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(LogError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(LogError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> LogResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> LogResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> LogResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i64(&mut self) -> LogResult<i64> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_str(&mut self) -> LogResult<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| LogError::InvalidPayload {
            reason: "string field is not valid UTF-8".to_string(),
        })
    }

    fn read_bytes(&mut self, n: usize) -> LogResult<Bytes> {
        let end = self.pos.checked_add(n).ok_or(LogError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(LogError::UnexpectedEof);
        }
        let bytes = self.data.slice(self.pos..end);
        self.pos = end;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn event(id: &str, ns: &str, involved: Option<&str>) -> Event {
        Event {
            id: EventId::new(id),
            timestamp: TimestampNs::from_secs(1_700_000_000),
            event_type: EventType::Update,
            resource: ResourceMetadata {
                gvk: GroupVersionKind::new("apps", "v1", "Deployment"),
                namespace: ns.to_string(),
                name: "web".to_string(),
                uid: Uid::new("uid-web"),
                involved_object_uid: involved.map(Uid::new),
            },
            data: Bytes::from_static(b"{\"spec\":{}}"),
        }
    }

    #[test]
    fn roundtrip_with_involved_object() {
        let ev = event("e1", "prod", Some("uid-other"));
        let payload = encode_event(&ev);
        let back = decode_event(&payload).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn roundtrip_without_involved_object() {
        let ev = event("e2", "", None);
        let payload = encode_event(&ev);
        let back = decode_event(&payload).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn timestamp_fast_path_matches_full_decode() {
        let ev = event("e3", "ns", None);
        let payload = encode_event(&ev);
        assert_eq!(decode_timestamp(&payload).unwrap(), ev.timestamp);
    }

    #[test]
    fn truncated_payload_is_eof() {
        let ev = event("e4", "ns", None);
        let payload = encode_event(&ev);
        let truncated = payload.slice(..payload.len() - 3);
        assert!(matches!(
            decode_event(&truncated),
            Err(LogError::UnexpectedEof)
        ));
    }

    proptest! {
        #[test]
        fn arbitrary_fields_roundtrip(
            id in "[a-f0-9]{1,32}",
            ns in "[a-z0-9-]{0,40}",
            name in "[a-z0-9-]{1,40}",
            nanos in 1i64..i64::MAX / 2,
            data in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let ev = Event {
                id: EventId::new(id),
                timestamp: TimestampNs::new(nanos),
                event_type: EventType::Create,
                resource: ResourceMetadata {
                    gvk: GroupVersionKind::core("v1", "Pod"),
                    namespace: ns,
                    name,
                    uid: Uid::new("u"),
                    involved_object_uid: None,
                },
                data: Bytes::from(data),
            };
            let back = decode_event(&encode_event(&ev)).unwrap();
            prop_assert_eq!(back, ev);
        }
    }
}
