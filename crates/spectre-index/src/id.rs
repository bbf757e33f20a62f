//! Stable event id derivation.
//!
//! The id is the content address of one observed mutation: derived from
//! `(uid, resource_version, event_type)`, so a re-delivered watch event
//! (reconnect, relist, duplicate) maps to the same id and is deduplicated
//! by the log and the graph.

use spectre_types::{EventId, EventType, Uid};

/// Hex length of a derived id (128 bits of the blake3 hash).
const ID_LEN: usize = 32;

/// Derives the stable id for a mutation.
///
/// # Examples
///
/// ```
/// # use spectre_index::derive_event_id;
/// # use spectre_types::{EventType, Uid};
/// let uid = Uid::new("7a6f");
/// let a = derive_event_id(&uid, "1001", EventType::Update);
/// let b = derive_event_id(&uid, "1001", EventType::Update);
/// assert_eq!(a, b);
/// assert_ne!(a, derive_event_id(&uid, "1002", EventType::Update));
/// assert_ne!(a, derive_event_id(&uid, "1001", EventType::Delete));
/// ```
pub fn derive_event_id(uid: &Uid, resource_version: &str, event_type: EventType) -> EventId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(uid.as_str().as_bytes());
    hasher.update(&[0]);
    hasher.update(resource_version.as_bytes());
    hasher.update(&[0]);
    hasher.update(&[event_type.as_byte()]);
    let hex = hasher.finalize().to_hex();
    EventId::new(&hex.as_str()[..ID_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_stable_and_field_sensitive() {
        let uid = Uid::new("uid-1");
        let id = derive_event_id(&uid, "42", EventType::Create);
        assert_eq!(id, derive_event_id(&uid, "42", EventType::Create));
        assert_eq!(id.as_str().len(), ID_LEN);

        assert_ne!(id, derive_event_id(&Uid::new("uid-2"), "42", EventType::Create));
        assert_ne!(id, derive_event_id(&uid, "43", EventType::Create));
        assert_ne!(id, derive_event_id(&uid, "42", EventType::Update));
    }

    #[test]
    fn separator_prevents_field_bleed() {
        // ("ab", "c") and ("a", "bc") must not collide.
        let a = derive_event_id(&Uid::new("ab"), "c", EventType::Create);
        let b = derive_event_id(&Uid::new("a"), "bc", EventType::Create);
        assert_ne!(a, b);
    }
}
