//! Middleware Module
//!
//! Request extractors shared by every handler.
//!
//! - **`auth`** - `AuthUser` bearer-token extractor
//! - **`json`** - `ApiJson` body extractor with JSON error bodies

pub mod auth;
pub mod json;

pub use auth::{bearer_token, AuthUser};
pub use json::ApiJson;

use uuid::Uuid;

use crate::backend::error::BackendError;

/// Parse an id taken from a path segment; garbage is simply not found
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, BackendError> {
    Uuid::parse_str(raw).map_err(|_| BackendError::not_found(format!("{} not found", what)))
}
