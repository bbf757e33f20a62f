//! # spectre-types: Core types for Spectre
//!
//! This crate contains the shared types used across the Spectre system:
//! - Identity types ([`Uid`], [`EventId`], [`GroupVersionKind`])
//! - Temporal types ([`TimestampNs`], [`ClockSource`])
//! - Mutation events ([`Event`], [`EventType`], [`ResourceMetadata`])
//! - Graph edge types ([`EdgeType`], [`ValidationState`], [`Evidence`])
//! - Derived resource status ([`DerivedStatus`])
//!
//! Everything here is plain data: no IO, no locks. The heavier machinery
//! (log, graph, watcher) lives in the sibling crates and depends on this one.

mod clock;
mod edge;
mod event;
mod status;
mod timestamp;

pub use clock::ClockSource;
pub use edge::{EdgeType, Evidence, ValidationState};
pub use event::{Event, EventType, ObservedMutation, ResourceMetadata, ValidationError};
pub use status::DerivedStatus;
pub use timestamp::{NANOS_PER_HOUR, TimestampNs};

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

// ============================================================================
// Identity types
// ============================================================================

/// Cluster-assigned unique identifier of a resource.
///
/// Kubernetes assigns every object a UID that is stable for the lifetime of
/// the object and never reused for a different object within a cluster. A
/// [`Uid`] is the primary identity of a `ResourceIdentity` node in the graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Returns the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the UID is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Uid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Uid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Uid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Stable identifier of a single observed mutation.
///
/// Derived by the indexer from `(uid, resource_version, event_type)` so that
/// a replayed or re-delivered watch event maps to the same id and can be
/// deduplicated by the log and the graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EventId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A Kubernetes API group/version/kind triple.
///
/// The empty group is the core group (`v1/Pod`).
///
/// # Examples
///
/// ```
/// # use spectre_types::GroupVersionKind;
/// let gvk = GroupVersionKind::new("apps", "v1", "Deployment");
/// assert_eq!(gvk.to_string(), "apps/v1/Deployment");
/// assert_eq!(GroupVersionKind::core("v1", "Pod").to_string(), "v1/Pod");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Creates a core-group (empty group) GVK.
    pub fn core(version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::new("", version, kind)
    }

    /// Returns the `group/version` API version string used on the wire.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}
