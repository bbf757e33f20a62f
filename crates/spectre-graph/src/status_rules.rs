//! Per-kind status derivation rules.
//!
//! The Ready/Warning/Error derivation differs by kind, so the rules live in
//! one table indexed by kind rather than branches scattered through the
//! store. Each rule inspects the resource document and returns the derived
//! status plus an optional error message.
//!
//! | Kind(s)                                   | Rule |
//! |-------------------------------------------|------|
//! | Pod                                       | phase + container waiting/terminated reasons |
//! | Deployment, ReplicaSet, StatefulSet, DaemonSet | ready vs desired replicas |
//! | Job                                       | succeeded / failed counters |
//! | Node                                      | `Ready` condition |
//! | Event                                     | the Kubernetes event's own `type` |
//! | HelmRelease, Kustomization, GitRepository, Application | `Ready` condition (GitOps conventions) |
//! | everything else                           | generic condition scan |
//!
//! A DELETE event always derives [`DerivedStatus::Deleted`] before any rule
//! runs.

use serde_json::Value;
use spectre_types::{DerivedStatus, EventType};

/// Derived status plus supporting error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusOutcome {
    pub status: DerivedStatus,
    pub error_message: Option<String>,
}

impl StatusOutcome {
    fn ready() -> Self {
        Self {
            status: DerivedStatus::Ready,
            error_message: None,
        }
    }

    fn unknown() -> Self {
        Self {
            status: DerivedStatus::Unknown,
            error_message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: DerivedStatus::Error,
            error_message: Some(message.into()),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            status: DerivedStatus::Warning,
            error_message: Some(message.into()),
        }
    }
}

type Rule = fn(&Value) -> StatusOutcome;

/// The rule table. First matching kind wins; the last entry is the default.
const RULES: &[(&[&str], Rule)] = &[
    (&["Pod"], pod_status),
    (
        &["Deployment", "ReplicaSet", "StatefulSet", "DaemonSet"],
        workload_status,
    ),
    (&["Job"], job_status),
    (&["Node"], node_status),
    (&["Event"], kube_event_status),
    (
        &[
            "HelmRelease",
            "Kustomization",
            "GitRepository",
            "HelmRepository",
            "Application",
        ],
        gitops_status,
    ),
];

/// Derives the status of a resource document.
pub fn derive_status(kind: &str, event_type: EventType, doc: Option<&Value>) -> StatusOutcome {
    if event_type == EventType::Delete {
        return StatusOutcome {
            status: DerivedStatus::Deleted,
            error_message: None,
        };
    }
    let Some(doc) = doc else {
        return StatusOutcome::unknown();
    };

    for (kinds, rule) in RULES {
        if kinds.contains(&kind) {
            return rule(doc);
        }
    }
    generic_status(doc)
}

fn pod_status(doc: &Value) -> StatusOutcome {
    // Container-level failures outrank the phase.
    if let Some(reason) = first_container_issue(doc) {
        let message = container_issue_message(doc, &reason).unwrap_or_else(|| reason.clone());
        return StatusOutcome::error(message);
    }

    match doc.pointer("/status/phase").and_then(Value::as_str) {
        Some("Running" | "Succeeded") => StatusOutcome::ready(),
        Some("Pending") => StatusOutcome::warning("pod is Pending"),
        Some("Failed") => {
            let msg = doc
                .pointer("/status/message")
                .and_then(Value::as_str)
                .unwrap_or("pod Failed");
            StatusOutcome::error(msg)
        }
        Some("Unknown") | None => StatusOutcome::unknown(),
        Some(other) => StatusOutcome::warning(format!("pod phase {other}")),
    }
}

fn workload_status(doc: &Value) -> StatusOutcome {
    let desired = doc
        .pointer("/spec/replicas")
        .and_then(Value::as_i64)
        .unwrap_or(1);
    let ready = doc
        .pointer("/status/readyReplicas")
        .or_else(|| doc.pointer("/status/numberReady"))
        .and_then(Value::as_i64)
        .unwrap_or(0);

    if desired == 0 || ready >= desired {
        return StatusOutcome::ready();
    }
    let message = condition_message(doc)
        .unwrap_or_else(|| format!("{ready}/{desired} replicas ready"));
    if ready == 0 {
        StatusOutcome::error(message)
    } else {
        StatusOutcome::warning(message)
    }
}

fn job_status(doc: &Value) -> StatusOutcome {
    let failed = doc
        .pointer("/status/failed")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let succeeded = doc
        .pointer("/status/succeeded")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    if failed > 0 {
        let message =
            condition_message(doc).unwrap_or_else(|| format!("{failed} pods failed"));
        StatusOutcome::error(message)
    } else if succeeded > 0 {
        StatusOutcome::ready()
    } else {
        StatusOutcome {
            status: DerivedStatus::Warning,
            error_message: None,
        }
    }
}

fn node_status(doc: &Value) -> StatusOutcome {
    match condition_status(doc, "Ready") {
        Some((true, _)) => StatusOutcome::ready(),
        Some((false, message)) => {
            StatusOutcome::error(message.unwrap_or_else(|| "node not Ready".to_string()))
        }
        None => StatusOutcome::unknown(),
    }
}

fn kube_event_status(doc: &Value) -> StatusOutcome {
    let message = doc
        .pointer("/message")
        .and_then(Value::as_str)
        .map(str::to_string);
    match doc.pointer("/type").and_then(Value::as_str) {
        Some("Warning") => {
            let reason = doc.pointer("/reason").and_then(Value::as_str).unwrap_or("");
            if reason.starts_with("Failed") || reason == "BackOff" {
                StatusOutcome {
                    status: DerivedStatus::Error,
                    error_message: message,
                }
            } else {
                StatusOutcome {
                    status: DerivedStatus::Warning,
                    error_message: message,
                }
            }
        }
        _ => StatusOutcome::ready(),
    }
}

fn gitops_status(doc: &Value) -> StatusOutcome {
    match condition_status(doc, "Ready") {
        Some((true, _)) => StatusOutcome::ready(),
        Some((false, message)) => {
            StatusOutcome::error(message.unwrap_or_else(|| "reconciliation failed".to_string()))
        }
        None => StatusOutcome::unknown(),
    }
}

fn generic_status(doc: &Value) -> StatusOutcome {
    if doc.pointer("/metadata/deletionTimestamp").is_some() {
        return StatusOutcome::warning("terminating");
    }
    for condition in ["Ready", "Available"] {
        match condition_status(doc, condition) {
            Some((true, _)) => return StatusOutcome::ready(),
            Some((false, message)) => {
                return StatusOutcome::warning(
                    message.unwrap_or_else(|| format!("condition {condition} is False")),
                );
            }
            None => {}
        }
    }
    // No recognizable status surface at all: not degraded, just untracked.
    if doc.get("status").is_some() {
        StatusOutcome::ready()
    } else {
        StatusOutcome::unknown()
    }
}

/// Looks up `status.conditions[type == wanted]`, returning whether it is
/// True and the condition message.
fn condition_status(doc: &Value, wanted: &str) -> Option<(bool, Option<String>)> {
    let conditions = doc.pointer("/status/conditions")?.as_array()?;
    for condition in conditions {
        if condition.get("type").and_then(Value::as_str) == Some(wanted) {
            let is_true = condition.get("status").and_then(Value::as_str) == Some("True");
            let message = condition
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string);
            return Some((is_true, message));
        }
    }
    None
}

/// Message of the first condition with `status == "False"`.
fn condition_message(doc: &Value) -> Option<String> {
    let conditions = doc.pointer("/status/conditions")?.as_array()?;
    conditions
        .iter()
        .find(|c| c.get("status").and_then(Value::as_str) == Some("False"))
        .and_then(|c| c.get("message").and_then(Value::as_str))
        .map(str::to_string)
}

/// Waiting/terminated reasons recognized as container issues. Unknown
/// reasons are ignored.
pub const KNOWN_CONTAINER_ISSUES: &[&str] = &[
    "ImagePullBackOff",
    "ErrImagePull",
    "InvalidImageName",
    "CrashLoopBackOff",
    "CreateContainerConfigError",
    "CreateContainerError",
    "RunContainerError",
    "OOMKilled",
];

/// All recognized container issues in a pod document, in observation order.
pub fn container_issues(doc: &Value) -> Vec<String> {
    let mut issues = Vec::new();
    for list in ["/status/containerStatuses", "/status/initContainerStatuses"] {
        let Some(statuses) = doc.pointer(list).and_then(Value::as_array) else {
            continue;
        };
        for status in statuses {
            for state_path in ["/state/waiting/reason", "/state/terminated/reason", "/lastState/terminated/reason"] {
                if let Some(reason) = status.pointer(state_path).and_then(Value::as_str) {
                    if KNOWN_CONTAINER_ISSUES.contains(&reason)
                        && !issues.iter().any(|i| i == reason)
                    {
                        issues.push(reason.to_string());
                    }
                }
            }
        }
    }
    issues
}

fn first_container_issue(doc: &Value) -> Option<String> {
    container_issues(doc).into_iter().next()
}

/// Message accompanying a container issue, when the kubelet supplied one.
fn container_issue_message(doc: &Value, reason: &str) -> Option<String> {
    let statuses = doc
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)?;
    for status in statuses {
        if status.pointer("/state/waiting/reason").and_then(Value::as_str) == Some(reason) {
            if let Some(msg) = status
                .pointer("/state/waiting/message")
                .and_then(Value::as_str)
            {
                return Some(msg.to_string());
            }
        }
    }
    Some(reason.to_string())
}
