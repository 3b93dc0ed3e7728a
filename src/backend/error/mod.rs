//! Backend Error Module
//!
//! Error types for services and HTTP handlers.
//!
//! - **`types`** - `BackendError` and its conversions from lower layers
//! - **`conversion`** - `IntoResponse` rendering
//!
//! Every error renders as `{"error", "kind", "status"}` so clients can
//! branch on `kind` instead of parsing messages.

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

pub use types::BackendError;
