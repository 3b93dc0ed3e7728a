//! CollabSpace - Main Library
//!
//! CollabSpace lets members of a group co-edit text documents in real time
//! and share files, with everything gated by group membership.
//!
//! # Overview
//!
//! - Accounts with bcrypt-hashed passwords and JWT session tokens
//! - Groups joined by a six-character code, with admin and member roles
//! - Live multi-writer documents over WebSocket, merged with diamond-types
//!   and saved back to storage after every change
//! - File uploads and one listing of a group's files and documents, with
//!   expiring signed download links
//!
//! # Module Structure
//!
//! - **`shared`** - Wire types shared with clients
//!   - Error kinds and bodies, document-session frames, group and resource views
//!
//! - **`backend`** - Server-side code (only compiled with `ssr` feature)
//!   - Axum HTTP and WebSocket server
//!   - Credential service, membership guard, document sync bridge, resource aggregator
//!   - PostgreSQL and in-memory relational stores, filesystem and in-memory object stores
//!
//! # Feature Flags
//!
//! - **`ssr`** (default) - Enables the backend and its server dependencies.
//!   Without it only the `shared` wire types are built, for client crates.
//!
//! # Usage
//!
//! ```rust,no_run
//! use collabspace::backend::server::{create_app, AppConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! let (app, _state) = create_app(&config).await?;
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Each layer has its own `thiserror` enum; `backend::error::BackendError`
//! is what handlers return, and it renders as
//! `{"error": ..., "kind": ..., "status": ...}`.

/// Shared types and data structures
pub mod shared;

/// Backend server-side code
#[cfg(feature = "ssr")]
pub mod backend;
