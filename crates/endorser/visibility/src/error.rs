use thiserror::Error;

/// Result type for visibility operations.
pub type VisibilityResult<T> = Result<T, VisibilityError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VisibilityError {
    #[error("caller {caller} cannot change grants made by {granter}")]
    NotGranter { caller: String, granter: String },

    #[error("'{0}' is not an identifier")]
    InvalidIdentifier(String),

    #[error("visibility backend error: {0}")]
    Backend(String),
}
