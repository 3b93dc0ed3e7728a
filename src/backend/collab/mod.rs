//! Collaborative Editing Module
//!
//! Live multi-writer document sessions backed by diamond-types, and the
//! bridge that ties them to durable storage.
//!
//! # Architecture
//!
//! - **`engine`** - `CrdtEngine`/`CrdtDocument` traits and the diamond-types implementation
//! - **`session`** - One task per live document: owns the CRDT, fans out updates, persists
//! - **`registry`** - One task owning the map of live sessions
//! - **`bridge`** - `DocumentSyncBridge`: authorize, attach, flush
//! - **`documents`** - Per-group document registry (create, list)
//! - **`handlers`** - WebSocket session endpoint and document HTTP handlers
//!
//! ```text
//! WebSocket ──▶ DocumentSyncBridge ──▶ MembershipGuard
//!                      │
//!                      ▼
//!               RegistryHandle ──▶ session task ──▶ RelationalStore
//! ```

pub mod engine;

pub mod session;

pub mod registry;

pub mod bridge;

pub mod documents;

pub mod handlers;

pub use bridge::{AttachmentEvent, DocumentSyncBridge, SessionAttachment};
pub use documents::DocumentRegistry;
pub use engine::{CrdtDocument, CrdtEngine, DiamondEngine, EngineError};
pub use session::{SessionConfig, SessionEvent};
