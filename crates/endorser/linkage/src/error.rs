use endorser_store::StoreError;
use endorser_types::{HandleError, SequenceId};
use endorser_visibility::VisibilityError;
use thiserror::Error;

/// Result type for linkage operations.
pub type LinkageResult<T> = Result<T, LinkageError>;

/// Why a submission collided with what is already recorded.
///
/// Display text becomes the stored rejection reason, which any viewer can
/// read, so it never names the handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictKind {
    #[error("handle belongs to another issuer")]
    ForeignIssuer { handle: String },

    #[error("identical claim already recorded as {0}")]
    Duplicate(SequenceId),

    #[error("handle changed while this edit was being applied")]
    ConcurrentEdit(String),
}

/// Linkage errors.
///
/// `Validation` and `Conflict` mean the claim was not applied (it is still
/// logged as rejected). `Storage` and `Visibility` are backend faults.
#[derive(Debug, Error)]
pub enum LinkageError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(ConflictKind),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("visibility error: {0}")]
    Visibility(#[from] VisibilityError),
}

impl LinkageError {
    /// Errors that leave an audit record of the rejected envelope.
    pub fn is_rejection(&self) -> bool {
        matches!(self, LinkageError::Validation(_) | LinkageError::Conflict(_))
    }
}

impl From<HandleError> for LinkageError {
    fn from(err: HandleError) -> Self {
        LinkageError::Validation(err.to_string())
    }
}

impl From<ConflictKind> for LinkageError {
    fn from(kind: ConflictKind) -> Self {
        LinkageError::Conflict(kind)
    }
}
