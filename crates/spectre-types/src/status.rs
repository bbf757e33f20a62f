//! Derived resource status.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Coarse status derived from a resource document at a point in time.
///
/// The derivation rules are per-kind (see `spectre-graph::status_rules`);
/// this type is only the result vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum DerivedStatus {
    Ready,
    Warning,
    Error,
    Deleted,
    #[default]
    Unknown,
}

impl DerivedStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DerivedStatus::Ready => "Ready",
            DerivedStatus::Warning => "Warning",
            DerivedStatus::Error => "Error",
            DerivedStatus::Deleted => "Deleted",
            DerivedStatus::Unknown => "Unknown",
        }
    }

    /// `true` for statuses that indicate something is wrong.
    pub fn is_degraded(self) -> bool {
        matches!(self, DerivedStatus::Warning | DerivedStatus::Error)
    }
}

impl Display for DerivedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
