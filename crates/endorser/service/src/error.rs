//! Error types for the service facade.

use endorser_linkage::{ConflictKind, LinkageError};
use endorser_store::StoreError;
use endorser_visibility::VisibilityError;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The upstream verifier refused the envelope.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// A full claim was requested that holds identifiers the viewer may not see.
    #[error("claim contains identifiers hidden from the viewer")]
    Hidden,

    #[error(transparent)]
    Linkage(#[from] LinkageError),

    #[error(transparent)]
    Visibility(#[from] VisibilityError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::Linkage(LinkageError::Storage(err))
    }
}

impl From<config::ConfigError> for ServiceError {
    fn from(err: config::ConfigError) -> Self {
        ServiceError::Config(err.to_string())
    }
}

impl ServiceError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::SignatureInvalid(_) => "SIGNATURE_INVALID",
            ServiceError::Hidden => "HIDDEN",
            ServiceError::Linkage(err) => match err {
                LinkageError::Validation(_) => "VALIDATION_ERROR",
                LinkageError::Conflict(ConflictKind::ForeignIssuer { .. }) => "FOREIGN_ISSUER",
                LinkageError::Conflict(ConflictKind::Duplicate(_)) => "DUPLICATE",
                LinkageError::Conflict(ConflictKind::ConcurrentEdit(_)) => "CONCURRENT_EDIT",
                LinkageError::NotFound(_) => "NOT_FOUND",
                LinkageError::Storage(StoreError::NotFound(_)) => "NOT_FOUND",
                LinkageError::Storage(_) => "STORAGE_ERROR",
                LinkageError::Visibility(err) => visibility_code(err),
            },
            ServiceError::Visibility(err) => visibility_code(err),
            ServiceError::Serialization(_) => "SERIALIZATION_ERROR",
            ServiceError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Client-facing rendering.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail {
                message: self.to_string(),
                code: self.code().to_string(),
            },
        }
    }
}

fn visibility_code(err: &VisibilityError) -> &'static str {
    match err {
        VisibilityError::NotGranter { .. } => "NOT_GRANTER",
        VisibilityError::InvalidIdentifier(_) => "VALIDATION_ERROR",
        VisibilityError::Backend(_) => "STORAGE_ERROR",
    }
}

/// Error response body: `{"error": {"message": .., "code": ..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub code: String,
}
