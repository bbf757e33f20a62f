//! Log error types.

use spectre_types::TimestampNs;
use thiserror::Error;

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors that can occur in the event log.
#[derive(Debug, Error)]
pub enum LogError {
    /// The disk is full. Surfaced as a runtime health flag; no automatic
    /// recovery.
    #[error("storage full while writing {path}")]
    Full { path: String },

    /// Transient or permanent I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A record failed its CRC check.
    #[error("corrupted record in segment {hour_start} at byte {offset}")]
    CorruptedRecord {
        hour_start: TimestampNs,
        offset: u64,
    },

    /// Data ended in the middle of a record frame.
    #[error("unexpected end of segment data")]
    UnexpectedEof,

    /// The segment header is missing or malformed.
    #[error("invalid segment header in {path}: {reason}")]
    InvalidHeader { path: String, reason: String },

    /// The segment footer failed to parse; the index will be rebuilt.
    #[error("invalid segment footer in {path}")]
    InvalidFooter { path: String },

    /// An event payload failed to decode.
    #[error("invalid event payload: {reason}")]
    InvalidPayload { reason: String },

    /// An export/import container is malformed.
    #[error("invalid export container: {reason}")]
    InvalidContainer { reason: String },

    /// The import content type is not one of the supported types.
    #[error("unsupported content type {content_type:?}")]
    UnsupportedContentType { content_type: String },

    /// JSON batch parse failure (the batch as a whole, not per-event).
    #[error("invalid JSON event batch: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl LogError {
    /// Maps `ENOSPC` to [`LogError::Full`], everything else stays `Io`.
    pub(crate) fn from_write_error(err: std::io::Error, path: &std::path::Path) -> Self {
        if err.raw_os_error() == Some(28) {
            LogError::Full {
                path: path.display().to_string(),
            }
        } else {
            LogError::Io(err)
        }
    }

    /// `true` for failures worth a bounded local retry (transient I/O).
    pub fn is_transient(&self) -> bool {
        matches!(self, LogError::Io(_))
    }
}
