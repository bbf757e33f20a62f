//! Observed mutation events and their resource metadata.

use std::fmt::{self, Display};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{GroupVersionKind, TimestampNs, Uid};

/// The kind of mutation a watch event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Create,
    Update,
    Delete,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Create => "CREATE",
            EventType::Update => "UPDATE",
            EventType::Delete => "DELETE",
        }
    }

    /// Wire byte for the binary record payload.
    pub fn as_byte(self) -> u8 {
        match self {
            EventType::Create => 1,
            EventType::Update => 2,
            EventType::Delete => 3,
        }
    }

    /// Inverse of [`Self::as_byte`]. Returns `None` for unknown bytes.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(EventType::Create),
            2 => Some(EventType::Update),
            3 => Some(EventType::Delete),
            _ => None,
        }
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(EventType::Create),
            "UPDATE" => Ok(EventType::Update),
            "DELETE" => Ok(EventType::Delete),
            other => Err(ValidationError::UnknownEventType {
                value: other.to_string(),
            }),
        }
    }
}

/// Identifying metadata of the resource an event is about.
///
/// `uid` is the cluster-assigned identity; `(kind, namespace, name)` is the
/// secondary identifier used for cross-references by name when the uid of the
/// referenced object is unknown. `involved_object_uid` is set only for
/// Kubernetes `Event`-kind resources and links to the object the Kubernetes
/// event reports on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceMetadata {
    #[serde(flatten)]
    pub gvk: GroupVersionKind,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    pub uid: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub involved_object_uid: Option<Uid>,
}

impl ResourceMetadata {
    pub fn new(gvk: GroupVersionKind, namespace: impl Into<String>, name: impl Into<String>, uid: Uid) -> Self {
        Self {
            gvk,
            namespace: namespace.into(),
            name: name.into(),
            uid,
            involved_object_uid: None,
        }
    }

    pub fn kind(&self) -> &str {
        &self.gvk.kind
    }

    /// `namespace/name` (or just `name` for cluster-scoped resources).
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }
}

/// A single observed mutation: the unit of the event log.
///
/// Produced by the watcher, made durable by the log, never mutated after
/// acceptance. `data` holds the full resource document as serialized JSON
/// bytes; the log stores it opaquely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: crate::EventId,
    pub timestamp: TimestampNs,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub resource: ResourceMetadata,
    #[serde(with = "data_serde")]
    pub data: Bytes,
}

impl Event {
    /// Declared size of the resource document in bytes.
    pub fn data_size(&self) -> u32 {
        self.data.len() as u32
    }

    /// Checks the event-level invariants enforced on import and in-flow.
    ///
    /// An event must have a non-empty id, a positive timestamp, and a
    /// non-empty kind and name. Violations reject the event individually;
    /// the surrounding batch continues.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingId);
        }
        if self.timestamp <= TimestampNs::ZERO {
            return Err(ValidationError::InvalidTimestamp {
                nanos: self.timestamp.as_nanos(),
            });
        }
        if self.resource.gvk.kind.is_empty() {
            return Err(ValidationError::MissingKind {
                id: self.id.to_string(),
            });
        }
        if self.resource.name.is_empty() {
            return Err(ValidationError::MissingName {
                id: self.id.to_string(),
            });
        }
        Ok(())
    }

    /// Parses the resource document as JSON. Returns `None` when `data` is
    /// empty or not valid JSON (deleted-object tombstones may carry no body).
    pub fn data_json(&self) -> Option<serde_json::Value> {
        if self.data.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.data).ok()
    }
}

/// JSON (de)serialization of the opaque `data` bytes.
///
/// On the JSON batch surface the document travels as an embedded JSON value,
/// not base64, so batches stay human-writable.
mod data_serde {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        match serde_json::from_slice::<serde_json::Value>(data) {
            Ok(value) => value.serialize(serializer),
            Err(_) => serde_json::Value::Null.serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(Bytes::new());
        }
        Ok(Bytes::from(value.to_string()))
    }
}

/// A mutation observed by the watcher, before the indexer assigns its
/// stable id.
///
/// Carries the resource version the id is derived from; everything else
/// maps 1:1 onto [`Event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedMutation {
    pub timestamp: TimestampNs,
    pub event_type: EventType,
    pub resource: ResourceMetadata,
    pub resource_version: String,
    pub data: Bytes,
}

/// Event-level invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("event id must not be empty")]
    MissingId,

    #[error("event timestamp must be positive, got {nanos}")]
    InvalidTimestamp { nanos: i64 },

    #[error("event {id} has no resource kind")]
    MissingKind { id: String },

    #[error("event {id} has no resource name")]
    MissingName { id: String },

    #[error("unknown event type {value:?}")]
    UnknownEventType { value: String },
}
