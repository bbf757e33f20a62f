//! Watcher error types.

use thiserror::Error;

/// Result type for watcher operations.
pub type WatchResult<T> = Result<T, WatchError>;

/// Errors that can occur in the watch layer.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Kubernetes API error.
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    /// The watched-kinds document failed to load or parse. The previous
    /// valid configuration stays in effect.
    #[error("invalid watch configuration {path}: {reason}")]
    InvalidConfig { path: String, reason: String },

    /// Config document I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A watch for this kind is already running.
    #[error("watch for {kind} already active")]
    AlreadyWatching { kind: String },

    /// No watch is running for this kind.
    #[error("no active watch for {kind}")]
    NotWatching { kind: String },

    /// The combined event stream was already taken.
    #[error("event stream already taken")]
    StreamTaken,

    /// The combined event stream's consumer is gone; no new watch can
    /// deliver anywhere.
    #[error("event stream closed")]
    StreamClosed,
}
