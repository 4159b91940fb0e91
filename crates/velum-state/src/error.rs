//! State and storage errors.

use thiserror::Error;

/// Errors produced by state transitions or the persistence protocol.
#[derive(Debug, Error)]
pub enum StateError {
    /// The backing store failed.
    #[error("store failure: {0}")]
    Store(String),

    /// Persisted state is inconsistent with the recorded length. Fatal:
    /// surfaces through the block-apply path and halts the node.
    #[error("corrupt state: {0}")]
    CorruptState(&'static str),
}
