//! Error types for the taskdav bridge.

use http::StatusCode;
use thiserror::Error;

/// Errors reported by a store backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Project does not exist [id: {0}]")]
    CollectionNotFound(i64),

    #[error("Task does not exist [{0}]")]
    ItemNotFound(String),

    #[error("Label does not exist [id: {0}]")]
    LabelNotFound(i64),

    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::CollectionNotFound(_)
                | StoreError::ItemNotFound(_)
                | StoreError::LabelNotFound(_)
        )
    }
}

/// Errors surfaced to the CalDAV transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DavError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("VTODO parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(StoreError),
}

impl DavError {
    /// Status code the transport should answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            DavError::NotFound(_) => StatusCode::NOT_FOUND,
            DavError::Forbidden(_) => StatusCode::FORBIDDEN,
            DavError::InvalidPath(_) | DavError::Parse(_) => StatusCode::BAD_REQUEST,
            DavError::Config(_) | DavError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// A vanished entity is a not-found outcome; everything else passes through untouched.
impl From<StoreError> for DavError {
    fn from(err: StoreError) -> Self {
        if err.is_not_found() {
            DavError::NotFound(err.to_string())
        } else {
            DavError::Store(err)
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for bridge operations.
pub type DavResult<T> = Result<T, DavError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_store_errors_become_not_found() {
        let err: DavError = StoreError::ItemNotFound("uid-1".into()).into();
        assert!(matches!(err, DavError::NotFound(_)));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_backend_errors_pass_through_unchanged() {
        let original = StoreError::Backend("connection reset".into());
        let err: DavError = original.clone().into();
        assert_eq!(err, DavError::Store(original));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Store error: connection reset");
    }
}
