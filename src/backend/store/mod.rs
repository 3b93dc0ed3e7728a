//! Relational Store Module
//!
//! Typed access to users, groups, memberships, the document registry and
//! announcements. Services only see the [`RelationalStore`] trait; the
//! server picks [`PostgresStore`] when `DATABASE_URL` is set and
//! [`MemoryStore`] otherwise.
//!
//! - **`models`** - Row types returned by the store
//! - **`postgres`** - sqlx/PostgreSQL implementation
//! - **`memory`** - In-process implementation for tests and database-less runs

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::shared::Role;

/// Row types
pub mod models;

/// PostgreSQL implementation
pub mod postgres;

/// In-memory implementation
pub mod memory;

pub use memory::MemoryStore;
pub use models::{Announcement, DocumentRecord, Group, LeaveOutcome, Member, Membership, User};
pub use postgres::PostgresStore;

/// Uniform error type for both store implementations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    /// A uniqueness constraint was hit; carries what was duplicated
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Relational store accessors
///
/// Group codes passed in are already normalised to upper case.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    // Users

    /// `AlreadyExists("email")` when the email is taken
    async fn create_user(&self, name: &str, email: &str, password_hash: &str) -> Result<User, StoreError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    // Groups and membership

    /// Creates the group and the creator's admin membership in one step.
    /// `AlreadyExists("group code")` on a code collision.
    async fn create_group(
        &self,
        name: &str,
        description: &str,
        code: &str,
        creator: Uuid,
    ) -> Result<Group, StoreError>;
    async fn get_group_by_code(&self, code: &str) -> Result<Option<Group>, StoreError>;
    async fn get_group(&self, id: Uuid) -> Result<Option<Group>, StoreError>;
    /// Removes the group with its memberships, documents and announcements
    async fn delete_group(&self, id: Uuid) -> Result<(), StoreError>;
    async fn list_groups_for_user(&self, user_id: Uuid) -> Result<Vec<(Group, Role)>, StoreError>;
    async fn get_membership(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<Membership>, StoreError>;
    /// `AlreadyExists("membership")` when the user is already in the group
    async fn add_membership(&self, user_id: Uuid, group_id: Uuid, role: Role) -> Result<Membership, StoreError>;
    /// `NotFound` when the user is not a member
    async fn leave_group(&self, user_id: Uuid, group_id: Uuid) -> Result<LeaveOutcome, StoreError>;
    /// Members in join order
    async fn list_members(&self, group_id: Uuid) -> Result<Vec<Member>, StoreError>;

    // Document registry

    /// `AlreadyExists("document name")` when the group already has the name
    async fn create_document(&self, group_id: Uuid, name: &str) -> Result<DocumentRecord, StoreError>;
    /// Metadata only, never the binary state
    async fn get_document(&self, id: Uuid) -> Result<Option<DocumentRecord>, StoreError>;
    async fn list_documents(&self, group_id: Uuid) -> Result<Vec<DocumentRecord>, StoreError>;
    /// `Ok(None)` for a registered document that was never saved, `NotFound`
    /// for an unknown id
    async fn load_document_state(&self, id: Uuid) -> Result<Option<Vec<u8>>, StoreError>;
    async fn save_document_state(&self, id: Uuid, state: &[u8]) -> Result<(), StoreError>;

    // Announcements

    async fn create_announcement(&self, group_id: Uuid, user_id: Uuid, body: &str) -> Result<Announcement, StoreError>;
    /// Newest first, with author names
    async fn list_announcements(&self, group_id: Uuid) -> Result<Vec<Announcement>, StoreError>;
    async fn get_announcement(&self, id: Uuid) -> Result<Option<Announcement>, StoreError>;
    async fn delete_announcement(&self, id: Uuid) -> Result<(), StoreError>;
}
