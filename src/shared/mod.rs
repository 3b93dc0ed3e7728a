//! Shared Module
//!
//! Types that cross the wire between the server and its clients: error
//! kinds, document-session frames, group/document registry views and
//! resource listings. Everything here is plain serde data so a client crate
//! can depend on it without pulling in the server stack.

/// Shared error types
pub mod error;

/// Document session wire messages
pub mod crdt;

/// Group, membership, document and announcement views
pub mod group;

/// Resource listing types
pub mod resource;

pub use crdt::{ClientMessage, DocumentState, EditOperation, ServerMessage};
pub use error::{ErrorBody, ErrorKind, SharedError};
pub use group::{AnnouncementView, DocumentSummary, GroupSummary, MemberSummary, MembershipSummary, Role};
pub use resource::{sort_resources, GroupUsage, Resource, ResourceKind, ResourceListing, UploadResponse};
