/**
 * Backend Error Types
 *
 * `BackendError` is the single error type returned by services and HTTP
 * handlers. Each variant maps to one `ErrorKind`, so the kind a client sees is
 * decided where the error is raised, not where it is rendered.
 *
 * Lower layers have their own errors (`StoreError`, `ObjectStoreError`,
 * `EngineError`, `SharedError`); the `From` impls below decide which kind
 * each of them surfaces as.
 */

use axum::http::StatusCode;
use thiserror::Error;

use crate::backend::collab::engine::EngineError;
use crate::backend::objects::ObjectStoreError;
use crate::backend::store::StoreError;
use crate::shared::{ErrorKind, SharedError};

/// Backend-specific error types
///
/// # Usage
///
/// ```rust
/// use collabspace::backend::error::BackendError;
///
/// let err = BackendError::validation("Password must be at least 6 characters");
/// assert_eq!(err.status_code().as_u16(), 400);
/// ```
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Bad input
    #[error("{message}")]
    Validation { message: String },

    /// Unauthenticated, bad token, or not a member of the group
    #[error("{message}")]
    NotAuthorized { message: String },

    /// Member without the required role
    #[error("{message}")]
    Forbidden { message: String },

    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("{message}")]
    TooLarge { message: String },

    #[error("{message}")]
    Timeout { message: String },

    /// Relational or object store failure
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BackendError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn not_authorized(message: impl Into<String>) -> Self {
        Self::NotAuthorized { message: message.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden { message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn too_large(message: impl Into<String>) -> Self {
        Self::TooLarge { message: message.into() }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout { message: message.into() }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// The machine-checkable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotAuthorized { .. } => ErrorKind::NotAuthorized,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::TooLarge { .. } => ErrorKind::TooLarge,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Storage { .. } => ErrorKind::StorageError,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotAuthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::StorageError => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error message
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<SharedError> for BackendError {
    fn from(err: SharedError) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<StoreError> for BackendError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::not_found("not found"),
            StoreError::AlreadyExists(what) => Self::conflict(format!("{} already exists", what)),
            StoreError::Backend(message) => Self::storage(message),
        }
    }
}

impl From<ObjectStoreError> for BackendError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::NotFound(key) => Self::not_found(format!("no object at '{}'", key)),
            ObjectStoreError::InvalidKey(key) => Self::validation(format!("invalid object key '{}'", key)),
            other => Self::storage(other.to_string()),
        }
    }
}

impl From<EngineError> for BackendError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::OutOfBounds { .. } => Self::validation(err.to_string()),
            EngineError::Decode(_) => Self::validation(err.to_string()),
            EngineError::CorruptSnapshot(_) => Self::storage(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation(format!("invalid JSON: {}", err))
    }
}
