//! The watched-kinds configuration document.
//!
//! A YAML list of `{group, version, kind}` triples:
//!
//! ```yaml
//! resources:
//!   - group: apps
//!     version: v1
//!     kind: Deployment
//!   - version: v1
//!     kind: Pod
//! ```
//!
//! Unknown fields are ignored so the document can carry annotations for
//! other tooling; schema violations are reported and the previous valid
//! configuration continues to apply.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use spectre_types::GroupVersionKind;

use crate::{WatchError, WatchResult};

/// One watch target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KindSpec {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Optional field selector narrowing the watch (e.g.
    /// `metadata.namespace=prod`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_selector: Option<String>,
}

impl KindSpec {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            field_selector: None,
        }
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::new(self.group.clone(), self.version.clone(), self.kind.clone())
    }
}

impl std::fmt::Display for KindSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.gvk())
    }
}

/// The parsed document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedKinds {
    #[serde(default)]
    pub resources: Vec<KindSpec>,
}

impl WatchedKinds {
    /// Loads and parses the document at `path`.
    pub fn load(path: &Path) -> WatchResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes).map_err(|reason| WatchError::InvalidConfig {
            path: path.display().to_string(),
            reason,
        })
    }

    /// Parses document bytes. Unknown fields are ignored; missing or
    /// malformed required fields are schema violations.
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        let parsed: WatchedKinds =
            serde_yaml::from_slice(bytes).map_err(|e| e.to_string())?;
        for spec in &parsed.resources {
            if spec.kind.is_empty() {
                return Err("resource entry with empty kind".to_string());
            }
            if spec.version.is_empty() {
                return Err(format!("resource {} has empty version", spec.kind));
            }
        }
        Ok(parsed)
    }

    /// The desired set, deduplicated.
    pub fn desired(&self) -> BTreeSet<KindSpec> {
        self.resources.iter().cloned().collect()
    }
}
