//! Graph store error types.

use thiserror::Error;

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur in the graph store.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Snapshot file I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot container is malformed (bad magic, version, or checksum).
    #[error("invalid graph snapshot: {reason}")]
    InvalidSnapshot { reason: String },

    /// Snapshot payload failed to (de)serialize.
    #[error("snapshot codec error: {0}")]
    Codec(#[from] postcard::Error),

    /// An edge endpoint does not exist. Callers usually drop the edge
    /// silently instead of surfacing this; see the extractor contract.
    #[error("unknown edge endpoint {uid}")]
    UnknownEndpoint { uid: String },
}
