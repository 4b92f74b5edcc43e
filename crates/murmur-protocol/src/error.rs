//! Error types for node collaborators.

use thiserror::Error;

/// Errors surfaced by a broadcast node when creating or delivering events.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node unavailable: {0}")]
    Unavailable(String),
}

/// Convenience result type for node operations.
pub type NodeResult<T> = Result<T, NodeError>;
