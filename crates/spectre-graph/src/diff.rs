//! Change-flag derivation by diffing consecutive documents of a uid.

use serde_json::Value;

/// Flags derived from comparing an event's document against the previous
/// document of the same uid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeFlags {
    /// The non-status portion of the document differs.
    pub config_changed: bool,
    /// The status portion differs.
    pub status_changed: bool,
    /// The declared replica count differs (where applicable).
    pub replicas_changed: bool,
}

/// Derives change flags. `prior` is `None` for the first observation of a
/// uid, which counts as a config change (the configuration came into being).
pub fn derive_flags(prior: Option<&Value>, current: Option<&Value>) -> ChangeFlags {
    let Some(current) = current else {
        // No document (e.g. a DELETE tombstone): nothing to compare.
        return ChangeFlags {
            config_changed: false,
            status_changed: prior.is_some_and(|p| p.get("status").is_some()),
            replicas_changed: false,
        };
    };
    let Some(prior) = prior else {
        return ChangeFlags {
            config_changed: true,
            status_changed: current.get("status").is_some(),
            replicas_changed: false,
        };
    };

    ChangeFlags {
        config_changed: config_portion(prior) != config_portion(current),
        status_changed: prior.get("status") != current.get("status"),
        replicas_changed: declared_replicas(prior) != declared_replicas(current),
    }
}

/// The document minus its status and the metadata fields that churn on
/// every write without representing a configuration change.
fn config_portion(doc: &Value) -> Value {
    let mut out = doc.clone();
    if let Some(obj) = out.as_object_mut() {
        obj.remove("status");
        if let Some(metadata) = obj.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.remove("resourceVersion");
            metadata.remove("managedFields");
            metadata.remove("generation");
        }
    }
    out
}

fn declared_replicas(doc: &Value) -> Option<i64> {
    doc.pointer("/spec/replicas").and_then(Value::as_i64)
}

/// Heuristic blast-radius estimate for a change, in `[0, 1]`.
pub fn impact_score(
    flags: ChangeFlags,
    status: spectre_types::DerivedStatus,
    container_issues: &[String],
) -> f64 {
    use spectre_types::DerivedStatus;

    let mut score: f64 = 0.1;
    if flags.config_changed {
        score += 0.35;
    }
    if flags.replicas_changed {
        score += 0.15;
    }
    match status {
        DerivedStatus::Error => score += 0.3,
        DerivedStatus::Warning => score += 0.15,
        _ => {}
    }
    if !container_issues.is_empty() {
        score += 0.1;
    }
    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_observation_is_a_config_change() {
        let doc = json!({"spec": {"x": 1}});
        let flags = derive_flags(None, Some(&doc));
        assert!(flags.config_changed);
        assert!(!flags.status_changed);
    }

    #[test]
    fn status_only_update_does_not_flag_config() {
        let before = json!({
            "metadata": {"name": "web", "resourceVersion": "100"},
            "spec": {"replicas": 3},
            "status": {"readyReplicas": 2}
        });
        let after = json!({
            "metadata": {"name": "web", "resourceVersion": "101"},
            "spec": {"replicas": 3},
            "status": {"readyReplicas": 3}
        });
        let flags = derive_flags(Some(&before), Some(&after));
        assert!(!flags.config_changed, "resourceVersion churn is not config");
        assert!(flags.status_changed);
        assert!(!flags.replicas_changed);
    }

    #[test]
    fn spec_edit_flags_config() {
        let before = json!({"spec": {"image": "web:v1"}, "status": {}});
        let after = json!({"spec": {"image": "web:v2"}, "status": {}});
        let flags = derive_flags(Some(&before), Some(&after));
        assert!(flags.config_changed);
        assert!(!flags.status_changed);
    }

    #[test]
    fn replica_scale_flags_both() {
        let before = json!({"spec": {"replicas": 3}});
        let after = json!({"spec": {"replicas": 5}});
        let flags = derive_flags(Some(&before), Some(&after));
        assert!(flags.config_changed);
        assert!(flags.replicas_changed);
    }

    #[test]
    fn impact_score_stays_in_unit_interval() {
        use spectre_types::DerivedStatus;
        let all = ChangeFlags {
            config_changed: true,
            status_changed: true,
            replicas_changed: true,
        };
        let issues = vec!["OOMKilled".to_string()];
        let score = impact_score(all, DerivedStatus::Error, &issues);
        assert!(score <= 1.0 && score > 0.0);

        let quiet = impact_score(ChangeFlags::default(), DerivedStatus::Ready, &[]);
        assert!(quiet > 0.0 && quiet < 0.2);
    }
}
