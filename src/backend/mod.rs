//! Backend Module
//!
//! The CollabSpace server: an Axum HTTP and WebSocket service that gates
//! live document editing and file sharing behind group membership.
//!
//! This module is only compiled when the `ssr` feature is enabled.
//!
//! # Architecture
//!
//! - **`server`** - Configuration, state, initialization
//! - **`routes`** - Route table
//! - **`auth`** - Credential service, session tokens, auth handlers
//! - **`groups`** - Membership guard, groups, announcements
//! - **`collab`** - CRDT engine, live document sessions, document registry
//! - **`resources`** - Resource listing, uploads, signed downloads
//! - **`store`** - Relational store trait with PostgreSQL and in-memory backends
//! - **`objects`** - Object store trait with filesystem and in-memory backends
//! - **`middleware`** - Request extractors
//! - **`error`** - `BackendError` and its HTTP rendering
//!
//! # Module Structure
//!
//! ```text
//! backend/
//! ├── mod.rs
//! ├── main.rs         - Server binary
//! ├── server/
//! ├── routes/
//! ├── auth/
//! ├── groups/
//! ├── collab/
//! ├── resources/
//! ├── store/
//! ├── objects/
//! ├── middleware/
//! └── error/
//! ```
//!
//! # Request Flow
//!
//! A client logs in for a bearer token, then calls the group, document and
//! resource endpoints with it. Every group-scoped operation goes through
//! `MembershipGuard` before touching group data. Opening
//! `/collab/{document_id}` attaches the connection to the document's live
//! session, which loads stored state on first use and saves it back after
//! every change.

/// Server initialization and configuration
pub mod server;

/// Route configuration
pub mod routes;

/// Authentication and session tokens
pub mod auth;

/// Groups, membership and announcements
pub mod groups;

/// Live collaborative editing
pub mod collab;

/// Group resources: files and documents
pub mod resources;

/// Relational store
pub mod store;

/// Object store
pub mod objects;

/// Request extractors
pub mod middleware;

/// Error types
pub mod error;
