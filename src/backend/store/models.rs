/**
 * Store Row Types
 *
 * Plain records returned by `RelationalStore`. Password hashes only ever
 * live on `User`; API responses are built from the shared view types.
 */

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::shared::{AnnouncementView, DocumentSummary, GroupSummary, MemberSummary, MembershipSummary, Role};

/// User struct representing a user in the database
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Normalised (trimmed, lower-case)
    pub email: String,
    /// Hashed password (bcrypt)
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Six upper-case alphanumeric characters
    pub code: String,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn summary(&self, role: Option<Role>) -> GroupSummary {
        GroupSummary {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            code: self.code.clone(),
            role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub user_id: Uuid,
    pub group_id: Uuid,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

impl From<Membership> for MembershipSummary {
    fn from(m: Membership) -> Self {
        MembershipSummary {
            user_id: m.user_id,
            group_id: m.group_id,
            role: m.role,
            joined_at: m.joined_at,
        }
    }
}

/// A user joined with their membership row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

impl From<Member> for MemberSummary {
    fn from(m: Member) -> Self {
        MemberSummary {
            id: m.id,
            name: m.name,
            email: m.email,
            role: m.role,
        }
    }
}

/// Document registry row; the binary state is loaded separately
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

impl From<DocumentRecord> for DocumentSummary {
    fn from(d: DocumentRecord) -> Self {
        DocumentSummary {
            id: d.id,
            group_id: d.group_id,
            name: d.name,
            updated_at: d.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Announcement {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    /// Author name, filled in by listings
    pub user_name: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<Announcement> for AnnouncementView {
    fn from(a: Announcement) -> Self {
        AnnouncementView {
            id: a.id,
            group_id: a.group_id,
            user_id: a.user_id,
            user_name: a.user_name,
            body: a.body,
            created_at: a.created_at,
        }
    }
}

/// What happened to the group when a member left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    /// The last admin left; the earliest-joined remaining member was promoted
    Promoted(Uuid),
    /// The last member left and the group was removed
    GroupDeleted,
}
