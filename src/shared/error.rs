//! Shared Error Types
//!
//! This module defines the error vocabulary shared between the server and its
//! clients. Every failure that crosses the wire carries a machine-checkable
//! [`ErrorKind`] next to a human readable message, so a client can tell
//! "not a member" apart from "load failed" without parsing strings.
//!
//! # Usage
//!
//! ```rust
//! use collabspace::shared::error::{ErrorKind, SharedError};
//!
//! let error = SharedError::validation("position", "insert position is past the end");
//! assert_eq!(error.kind(), ErrorKind::Validation);
//! ```
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-checkable failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input, correctable by the user
    #[serde(rename = "validation_error")]
    Validation,
    /// Unauthenticated, or authenticated but not a member
    NotAuthorized,
    /// A member lacking the required role
    Forbidden,
    /// Group, document, user or announcement missing
    NotFound,
    /// Duplicate email, document name, membership...
    Conflict,
    /// Upload over the size cap
    TooLarge,
    /// A bounded operation ran out of time
    Timeout,
    /// Downstream store failure
    StorageError,
    /// Anything unexpected
    Internal,
}

impl ErrorKind {
    /// Wire name, identical to the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotAuthorized => "not_authorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::TooLarge => "too_large",
            ErrorKind::Timeout => "timeout",
            ErrorKind::StorageError => "storage_error",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body returned by every failing HTTP endpoint and every non-fatal
/// error frame on a document session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
    pub status: u16,
}

/// Errors raised while decoding or validating wire data
#[derive(Debug, Error, Clone)]
pub enum SharedError {
    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Human-readable error message
        message: String,
    },

    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Both variants are user-correctable input problems
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

impl From<serde_json::Error> for SharedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::Validation).unwrap();
        assert_eq!(json, "\"validation_error\"");
        let json = serde_json::to_string(&ErrorKind::NotAuthorized).unwrap();
        assert_eq!(json, "\"not_authorized\"");
    }

    #[test]
    fn test_as_str_matches_serde() {
        for kind in [
            ErrorKind::Validation,
            ErrorKind::NotAuthorized,
            ErrorKind::Forbidden,
            ErrorKind::NotFound,
            ErrorKind::Conflict,
            ErrorKind::TooLarge,
            ErrorKind::Timeout,
            ErrorKind::StorageError,
            ErrorKind::Internal,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json.trim_matches('"'), kind.as_str());
        }
    }

    #[test]
    fn test_validation_error() {
        let error = SharedError::validation("email", "Invalid email format");
        match error {
            SharedError::ValidationError { field, message } => {
                assert_eq!(field, "email");
                assert_eq!(message, "Invalid email format");
            }
            _ => panic!("Expected ValidationError"),
        }
    }

    #[test]
    fn test_from_serde_error() {
        let result: Result<serde_json::Value, _> = serde_json::from_str("{ invalid json }");
        let shared_error: SharedError = result.unwrap_err().into();
        assert!(matches!(shared_error, SharedError::SerializationError { .. }));
        assert_eq!(shared_error.kind(), ErrorKind::Validation);
    }
}
