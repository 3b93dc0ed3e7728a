/**
 * PostgreSQL Relational Store
 *
 * sqlx-backed implementation of `RelationalStore`. Multi-row operations
 * (group creation with the admin membership, leaving with promotion or
 * cleanup) run in a transaction. Deleting a group relies on the
 * `ON DELETE CASCADE` foreign keys from the bootstrap migration.
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{Announcement, DocumentRecord, Group, LeaveOutcome, Member, Membership, User};
use super::{RelationalStore, StoreError};
use crate::shared::Role;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an already migrated pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Map unique violations to `AlreadyExists(what)`
fn unique_or_backend(e: sqlx::Error, what: &str) -> StoreError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StoreError::AlreadyExists(what.to_string()),
        _ => StoreError::Backend(e.to_string()),
    }
}

fn parse_role(role: &str) -> Result<Role, StoreError> {
    Role::from_str(role).map_err(|e| StoreError::Backend(e.to_string()))
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    user_id: Uuid,
    group_id: Uuid,
    role: String,
    joined_at: DateTime<Utc>,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = StoreError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        Ok(Membership {
            user_id: row.user_id,
            group_id: row.group_id,
            role: parse_role(&row.role)?,
            joined_at: row.joined_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    joined_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct GroupWithRoleRow {
    id: Uuid,
    name: String,
    description: String,
    code: String,
    created_at: DateTime<Utc>,
    role: String,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at";
const GROUP_COLUMNS: &str = "id, name, description, code, created_at";
const DOCUMENT_COLUMNS: &str = "id, group_id, name, updated_at";

#[async_trait]
impl RelationalStore for PostgresStore {
    async fn create_user(&self, name: &str, email: &str, password_hash: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, name, email, password_hash, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_or_backend(e, "email"))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn create_group(
        &self,
        name: &str,
        description: &str,
        code: &str,
        creator: Uuid,
    ) -> Result<Group, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let group = sqlx::query_as::<_, Group>(&format!(
            "INSERT INTO groups (id, name, description, code, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {GROUP_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(code)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| unique_or_backend(e, "group code"))?;

        sqlx::query("INSERT INTO memberships (user_id, group_id, role, joined_at) VALUES ($1, $2, $3, $4)")
            .bind(creator)
            .bind(group.id)
            .bind(Role::Admin.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(group)
    }

    async fn get_group_by_code(&self, code: &str) -> Result<Option<Group>, StoreError> {
        sqlx::query_as::<_, Group>(&format!("SELECT {GROUP_COLUMNS} FROM groups WHERE code = $1"))
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn get_group(&self, id: Uuid) -> Result<Option<Group>, StoreError> {
        sqlx::query_as::<_, Group>(&format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn delete_group(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_groups_for_user(&self, user_id: Uuid) -> Result<Vec<(Group, Role)>, StoreError> {
        let rows = sqlx::query_as::<_, GroupWithRoleRow>(
            "SELECT g.id, g.name, g.description, g.code, g.created_at, m.role
             FROM groups g
             JOIN memberships m ON m.group_id = g.id
             WHERE m.user_id = $1
             ORDER BY m.joined_at, g.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                let role = parse_role(&row.role)?;
                Ok((
                    Group {
                        id: row.id,
                        name: row.name,
                        description: row.description,
                        code: row.code,
                        created_at: row.created_at,
                    },
                    role,
                ))
            })
            .collect()
    }

    async fn get_membership(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<Membership>, StoreError> {
        let row = sqlx::query_as::<_, MembershipRow>(
            "SELECT user_id, group_id, role, joined_at FROM memberships WHERE user_id = $1 AND group_id = $2",
        )
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(Membership::try_from).transpose()
    }

    async fn add_membership(&self, user_id: Uuid, group_id: Uuid, role: Role) -> Result<Membership, StoreError> {
        let row = sqlx::query_as::<_, MembershipRow>(
            "INSERT INTO memberships (user_id, group_id, role, joined_at)
             VALUES ($1, $2, $3, $4)
             RETURNING user_id, group_id, role, joined_at",
        )
        .bind(user_id)
        .bind(group_id)
        .bind(role.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_or_backend(e, "membership"))?;
        Membership::try_from(row)
    }

    async fn leave_group(&self, user_id: Uuid, group_id: Uuid) -> Result<LeaveOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Serialise concurrent leaves of the same group
        sqlx::query("SELECT id FROM groups WHERE id = $1 FOR UPDATE")
            .bind(group_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let leaving_role: Option<String> = sqlx::query_scalar(
            "DELETE FROM memberships WHERE user_id = $1 AND group_id = $2 RETURNING role",
        )
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;
        let leaving_role = parse_role(&leaving_role.ok_or(StoreError::NotFound)?)?;

        let remaining = sqlx::query_as::<_, MembershipRow>(
            "SELECT user_id, group_id, role, joined_at FROM memberships
             WHERE group_id = $1
             ORDER BY joined_at, user_id",
        )
        .bind(group_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(backend)?
        .into_iter()
        .map(Membership::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        let outcome = if remaining.is_empty() {
            sqlx::query("DELETE FROM groups WHERE id = $1")
                .bind(group_id)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            LeaveOutcome::GroupDeleted
        } else if leaving_role == Role::Admin && !remaining.iter().any(|m| m.role == Role::Admin) {
            let successor = remaining[0].user_id;
            sqlx::query("UPDATE memberships SET role = $1 WHERE user_id = $2 AND group_id = $3")
                .bind(Role::Admin.as_str())
                .bind(successor)
                .bind(group_id)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            LeaveOutcome::Promoted(successor)
        } else {
            LeaveOutcome::Left
        };

        tx.commit().await.map_err(backend)?;
        Ok(outcome)
    }

    async fn list_members(&self, group_id: Uuid) -> Result<Vec<Member>, StoreError> {
        let rows = sqlx::query_as::<_, MemberRow>(
            "SELECT u.id, u.name, u.email, m.role, m.joined_at
             FROM memberships m
             JOIN users u ON u.id = m.user_id
             WHERE m.group_id = $1
             ORDER BY m.joined_at, u.id",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                Ok(Member {
                    id: row.id,
                    name: row.name,
                    email: row.email,
                    role: parse_role(&row.role)?,
                    joined_at: row.joined_at,
                })
            })
            .collect()
    }

    async fn create_document(&self, group_id: Uuid, name: &str) -> Result<DocumentRecord, StoreError> {
        sqlx::query_as::<_, DocumentRecord>(&format!(
            "INSERT INTO documents (id, group_id, name, state, updated_at)
             VALUES ($1, $2, $3, NULL, $4)
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(group_id)
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_or_backend(e, "document name"))
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<DocumentRecord>, StoreError> {
        sqlx::query_as::<_, DocumentRecord>(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn list_documents(&self, group_id: Uuid) -> Result<Vec<DocumentRecord>, StoreError> {
        sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE group_id = $1 ORDER BY lower(name), id"
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn load_document_state(&self, id: Uuid) -> Result<Option<Vec<u8>>, StoreError> {
        let row: Option<(Option<Vec<u8>>,)> = sqlx::query_as("SELECT state FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|(state,)| state).ok_or(StoreError::NotFound)
    }

    async fn save_document_state(&self, id: Uuid, state: &[u8]) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE documents SET state = $1, updated_at = $2 WHERE id = $3")
            .bind(state)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn create_announcement(&self, group_id: Uuid, user_id: Uuid, body: &str) -> Result<Announcement, StoreError> {
        sqlx::query_as::<_, Announcement>(
            "WITH inserted AS (
                 INSERT INTO announcements (id, group_id, user_id, body, created_at)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING id, group_id, user_id, body, created_at
             )
             SELECT i.id, i.group_id, i.user_id, u.name AS user_name, i.body, i.created_at
             FROM inserted i
             LEFT JOIN users u ON u.id = i.user_id",
        )
        .bind(Uuid::new_v4())
        .bind(group_id)
        .bind(user_id)
        .bind(body)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(backend)
    }

    async fn list_announcements(&self, group_id: Uuid) -> Result<Vec<Announcement>, StoreError> {
        sqlx::query_as::<_, Announcement>(
            "SELECT a.id, a.group_id, a.user_id, u.name AS user_name, a.body, a.created_at
             FROM announcements a
             LEFT JOIN users u ON u.id = a.user_id
             WHERE a.group_id = $1
             ORDER BY a.created_at DESC, a.id DESC",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn get_announcement(&self, id: Uuid) -> Result<Option<Announcement>, StoreError> {
        sqlx::query_as::<_, Announcement>(
            "SELECT a.id, a.group_id, a.user_id, u.name AS user_name, a.body, a.created_at
             FROM announcements a
             LEFT JOIN users u ON u.id = a.user_id
             WHERE a.id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)
    }

    async fn delete_announcement(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM announcements WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
