//! Graph snapshot persistence.
//!
//! The graph is rebuilt from the event log in principle, but replaying the
//! full history on every start is wasteful: a snapshot bounds the replay to
//! the events after the graph watermark.
//!
//! # File Format
//!
//! ```text
//! {data_dir}/graph/graph.snap
//! ┌──────────────────────────────────────────────────────────┐
//! │ magic "SPGR" │ version:u8 │ crc32:u32 │ postcard payload │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The CRC covers the payload. A snapshot that fails the check is discarded
//! (warning logged) and the graph rebuilds from the log alone.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use spectre_types::Uid;

use crate::edge::{EdgeRecord, TriggeredByRecord};
use crate::node::{ChangeEventNode, ResourceIdentityNode};
use crate::{GraphError, GraphResult, GraphStore};

const SNAPSHOT_MAGIC: &[u8; 4] = b"SPGR";
const SNAPSHOT_VERSION: u8 = 1;

/// Serializable image of the whole graph.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct GraphSnapshot {
    pub identities: Vec<ResourceIdentityNode>,
    pub events: Vec<ChangeEventNode>,
    pub events_by_uid: Vec<(Uid, Vec<spectre_types::EventId>)>,
    pub edges: Vec<EdgeRecord>,
    pub triggered_by: Vec<TriggeredByRecord>,
}

fn snapshot_path(data_dir: &Path) -> PathBuf {
    data_dir.join("graph").join("graph.snap")
}

/// Writes the graph to `data_dir/graph/graph.snap` atomically.
pub fn save(store: &GraphStore, data_dir: &Path) -> GraphResult<()> {
    let path = snapshot_path(data_dir);
    fs::create_dir_all(path.parent().expect("snapshot path has a parent"))?;

    let payload = postcard::to_allocvec(&store.to_snapshot())?;
    let crc = crc32fast::hash(&payload);

    let tmp = path.with_extension("snap.tmp");
    let mut file = File::create(&tmp)?;
    file.write_all(SNAPSHOT_MAGIC)?;
    file.write_all(&[SNAPSHOT_VERSION])?;
    file.write_all(&crc.to_le_bytes())?;
    file.write_all(&payload)?;
    file.sync_all()?;
    fs::rename(&tmp, &path)?;

    tracing::debug!(
        path = %path.display(),
        bytes = payload.len(),
        "graph snapshot written"
    );
    Ok(())
}

/// Loads the snapshot if one exists and verifies.
///
/// Returns `false` when no snapshot is present. A corrupt snapshot is
/// removed and treated as absent: the caller replays from the log.
pub fn load(store: &GraphStore, data_dir: &Path) -> GraphResult<bool> {
    let path = snapshot_path(data_dir);
    if !path.exists() {
        return Ok(false);
    }

    match read_verified(&path) {
        Ok(snapshot) => {
            store.load_snapshot(snapshot);
            tracing::info!(path = %path.display(), "graph snapshot restored");
            Ok(true)
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "discarding unreadable graph snapshot; rebuilding from log"
            );
            let _ = fs::remove_file(&path);
            Ok(false)
        }
    }
}

fn read_verified(path: &Path) -> GraphResult<GraphSnapshot> {
    let data = fs::read(path)?;
    if data.len() < 9 || &data[0..4] != SNAPSHOT_MAGIC {
        return Err(GraphError::InvalidSnapshot {
            reason: "missing SPGR magic".to_string(),
        });
    }
    if data[4] != SNAPSHOT_VERSION {
        return Err(GraphError::InvalidSnapshot {
            reason: format!("unsupported snapshot version {}", data[4]),
        });
    }
    let stored_crc = u32::from_le_bytes(data[5..9].try_into().expect("4 bytes"));
    let payload = &data[9..];
    if crc32fast::hash(payload) != stored_crc {
        return Err(GraphError::InvalidSnapshot {
            reason: "checksum mismatch".to_string(),
        });
    }
    Ok(postcard::from_bytes(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use spectre_types::{
        Event, EventId, EventType, GroupVersionKind, ResourceMetadata, TimestampNs,
    };
    use tempfile::tempdir;

    fn event(id: &str, uid: &str, ts: i64) -> Event {
        Event {
            id: EventId::new(id),
            timestamp: TimestampNs::from_secs(ts),
            event_type: EventType::Create,
            resource: ResourceMetadata::new(
                GroupVersionKind::core("v1", "Pod"),
                "ns",
                format!("pod-{uid}"),
                Uid::new(uid),
            ),
            data: Bytes::from_static(b"{\"status\":{\"phase\":\"Running\"}}"),
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = GraphStore::new();
        let ev = event("e1", "u1", 100);
        store.upsert_resource_identity(&ev);
        store.record_change_event(&ev);

        save(&store, dir.path()).unwrap();

        let restored = GraphStore::new();
        assert!(load(&restored, dir.path()).unwrap());
        assert_eq!(restored.total_identities(), 1);
        assert_eq!(restored.total_events(), 1);
        assert_eq!(restored.graph_watermark(), TimestampNs::from_secs(100));
    }

    #[test]
    fn missing_snapshot_is_fine() {
        let dir = tempdir().unwrap();
        let store = GraphStore::new();
        assert!(!load(&store, dir.path()).unwrap());
    }

    #[test]
    fn corrupt_snapshot_is_discarded() {
        let dir = tempdir().unwrap();
        let store = GraphStore::new();
        let ev = event("e1", "u1", 100);
        store.upsert_resource_identity(&ev);
        store.record_change_event(&ev);
        save(&store, dir.path()).unwrap();

        // Flip a payload bit.
        let path = dir.path().join("graph").join("graph.snap");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, &bytes).unwrap();

        let restored = GraphStore::new();
        assert!(!load(&restored, dir.path()).unwrap());
        assert!(!path.exists(), "corrupt snapshot removed");
    }
}
