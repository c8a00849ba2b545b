use endorser_types::{HandleId, SequenceId};
use thiserror::Error;

/// Result type for claim log operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Claim log errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("handle {handle} moved to {found} while an edit of {expected} was in flight")]
    StaleVersion {
        handle: HandleId,
        expected: SequenceId,
        found: SequenceId,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}
