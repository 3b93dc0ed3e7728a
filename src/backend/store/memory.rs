/**
 * In-Memory Relational Store
 *
 * Backs tests and servers started without `DATABASE_URL`. All tables sit
 * behind one lock so multi-row operations (group creation, leaving, cascading
 * deletes) are atomic the same way a transaction is in PostgreSQL.
 */

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{Announcement, DocumentRecord, Group, LeaveOutcome, Member, Membership, User};
use super::{RelationalStore, StoreError};
use crate::shared::Role;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    groups: HashMap<Uuid, Group>,
    /// Join order is insertion order
    memberships: Vec<Membership>,
    documents: HashMap<Uuid, (DocumentRecord, Option<Vec<u8>>)>,
    /// Creation order is insertion order
    announcements: Vec<Announcement>,
}

impl Tables {
    fn remove_group(&mut self, group_id: Uuid) {
        self.groups.remove(&group_id);
        self.memberships.retain(|m| m.group_id != group_id);
        self.documents.retain(|_, (doc, _)| doc.group_id != group_id);
        self.announcements.retain(|a| a.group_id != group_id);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelationalStore for MemoryStore {
    async fn create_user(&self, name: &str, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == email) {
            return Err(StoreError::AlreadyExists("email".to_string()));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn create_group(
        &self,
        name: &str,
        description: &str,
        code: &str,
        creator: Uuid,
    ) -> Result<Group, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.groups.values().any(|g| g.code == code) {
            return Err(StoreError::AlreadyExists("group code".to_string()));
        }
        if !tables.users.contains_key(&creator) {
            return Err(StoreError::NotFound);
        }
        let now = Utc::now();
        let group = Group {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            code: code.to_string(),
            created_at: now,
        };
        tables.groups.insert(group.id, group.clone());
        tables.memberships.push(Membership {
            user_id: creator,
            group_id: group.id,
            role: Role::Admin,
            joined_at: now,
        });
        Ok(group)
    }

    async fn get_group_by_code(&self, code: &str) -> Result<Option<Group>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.groups.values().find(|g| g.code == code).cloned())
    }

    async fn get_group(&self, id: Uuid) -> Result<Option<Group>, StoreError> {
        Ok(self.tables.read().await.groups.get(&id).cloned())
    }

    async fn delete_group(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.groups.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        tables.remove_group(id);
        Ok(())
    }

    async fn list_groups_for_user(&self, user_id: Uuid) -> Result<Vec<(Group, Role)>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| tables.groups.get(&m.group_id).map(|g| (g.clone(), m.role)))
            .collect())
    }

    async fn get_membership(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<Membership>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .memberships
            .iter()
            .find(|m| m.user_id == user_id && m.group_id == group_id)
            .cloned())
    }

    async fn add_membership(&self, user_id: Uuid, group_id: Uuid, role: Role) -> Result<Membership, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.groups.contains_key(&group_id) || !tables.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        if tables
            .memberships
            .iter()
            .any(|m| m.user_id == user_id && m.group_id == group_id)
        {
            return Err(StoreError::AlreadyExists("membership".to_string()));
        }
        let membership = Membership {
            user_id,
            group_id,
            role,
            joined_at: Utc::now(),
        };
        tables.memberships.push(membership.clone());
        Ok(membership)
    }

    async fn leave_group(&self, user_id: Uuid, group_id: Uuid) -> Result<LeaveOutcome, StoreError> {
        let mut tables = self.tables.write().await;
        let index = tables
            .memberships
            .iter()
            .position(|m| m.user_id == user_id && m.group_id == group_id)
            .ok_or(StoreError::NotFound)?;
        let leaving = tables.memberships.remove(index);

        let remaining: Vec<usize> = tables
            .memberships
            .iter()
            .enumerate()
            .filter(|(_, m)| m.group_id == group_id)
            .map(|(i, _)| i)
            .collect();

        if remaining.is_empty() {
            tables.remove_group(group_id);
            return Ok(LeaveOutcome::GroupDeleted);
        }

        let admin_left = remaining.iter().any(|&i| tables.memberships[i].role == Role::Admin);
        if leaving.role == Role::Admin && !admin_left {
            let successor = &mut tables.memberships[remaining[0]];
            successor.role = Role::Admin;
            return Ok(LeaveOutcome::Promoted(successor.user_id));
        }

        Ok(LeaveOutcome::Left)
    }

    async fn list_members(&self, group_id: Uuid) -> Result<Vec<Member>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .memberships
            .iter()
            .filter(|m| m.group_id == group_id)
            .filter_map(|m| {
                tables.users.get(&m.user_id).map(|u| Member {
                    id: u.id,
                    name: u.name.clone(),
                    email: u.email.clone(),
                    role: m.role,
                    joined_at: m.joined_at,
                })
            })
            .collect())
    }

    async fn create_document(&self, group_id: Uuid, name: &str) -> Result<DocumentRecord, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.groups.contains_key(&group_id) {
            return Err(StoreError::NotFound);
        }
        if tables
            .documents
            .values()
            .any(|(d, _)| d.group_id == group_id && d.name == name)
        {
            return Err(StoreError::AlreadyExists("document name".to_string()));
        }
        let doc = DocumentRecord {
            id: Uuid::new_v4(),
            group_id,
            name: name.to_string(),
            updated_at: Utc::now(),
        };
        tables.documents.insert(doc.id, (doc.clone(), None));
        Ok(doc)
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self.tables.read().await.documents.get(&id).map(|(d, _)| d.clone()))
    }

    async fn list_documents(&self, group_id: Uuid) -> Result<Vec<DocumentRecord>, StoreError> {
        let tables = self.tables.read().await;
        let mut docs: Vec<DocumentRecord> = tables
            .documents
            .values()
            .filter(|(d, _)| d.group_id == group_id)
            .map(|(d, _)| d.clone())
            .collect();
        docs.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()).then(a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn load_document_state(&self, id: Uuid) -> Result<Option<Vec<u8>>, StoreError> {
        let tables = self.tables.read().await;
        tables
            .documents
            .get(&id)
            .map(|(_, state)| state.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn save_document_state(&self, id: Uuid, state: &[u8]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let (doc, stored) = tables.documents.get_mut(&id).ok_or(StoreError::NotFound)?;
        *stored = Some(state.to_vec());
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn create_announcement(&self, group_id: Uuid, user_id: Uuid, body: &str) -> Result<Announcement, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.groups.contains_key(&group_id) {
            return Err(StoreError::NotFound);
        }
        let announcement = Announcement {
            id: Uuid::new_v4(),
            group_id,
            user_id,
            user_name: tables.users.get(&user_id).map(|u| u.name.clone()),
            body: body.to_string(),
            created_at: Utc::now(),
        };
        tables.announcements.push(announcement.clone());
        Ok(announcement)
    }

    async fn list_announcements(&self, group_id: Uuid) -> Result<Vec<Announcement>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .announcements
            .iter()
            .rev()
            .filter(|a| a.group_id == group_id)
            .map(|a| Announcement {
                user_name: tables.users.get(&a.user_id).map(|u| u.name.clone()),
                ..a.clone()
            })
            .collect())
    }

    async fn get_announcement(&self, id: Uuid) -> Result<Option<Announcement>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.announcements.iter().find(|a| a.id == id).cloned())
    }

    async fn delete_announcement(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.announcements.len();
        tables.announcements.retain(|a| a.id != id);
        if tables.announcements.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    async fn user(store: &MemoryStore, email: &str) -> User {
        store.create_user("Test", email, "hash").await.unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        user(&store, "a@example.com").await;
        let err = store.create_user("Other", "a@example.com", "hash").await.unwrap_err();
        assert_matches!(err, StoreError::AlreadyExists(what) if what == "email");
    }

    #[tokio::test]
    async fn test_create_group_makes_creator_admin() {
        let store = MemoryStore::new();
        let creator = user(&store, "a@example.com").await;
        let group = store.create_group("Team", "", "ABC123", creator.id).await.unwrap();

        let membership = store.get_membership(creator.id, group.id).await.unwrap().unwrap();
        assert_eq!(membership.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_last_admin_leaving_promotes_earliest_member() {
        let store = MemoryStore::new();
        let admin = user(&store, "a@example.com").await;
        let first = user(&store, "b@example.com").await;
        let second = user(&store, "c@example.com").await;
        let group = store.create_group("Team", "", "ABC123", admin.id).await.unwrap();
        store.add_membership(first.id, group.id, Role::Member).await.unwrap();
        store.add_membership(second.id, group.id, Role::Member).await.unwrap();

        let outcome = store.leave_group(admin.id, group.id).await.unwrap();
        assert_eq!(outcome, LeaveOutcome::Promoted(first.id));
        let promoted = store.get_membership(first.id, group.id).await.unwrap().unwrap();
        assert_eq!(promoted.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_sole_member_leaving_deletes_group() {
        let store = MemoryStore::new();
        let admin = user(&store, "a@example.com").await;
        let group = store.create_group("Team", "", "ABC123", admin.id).await.unwrap();
        let doc = store.create_document(group.id, "Notes").await.unwrap();

        let outcome = store.leave_group(admin.id, group.id).await.unwrap();
        assert_eq!(outcome, LeaveOutcome::GroupDeleted);
        assert!(store.get_group(group.id).await.unwrap().is_none());
        assert!(store.get_document(doc.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_document_state_round_trip() {
        let store = MemoryStore::new();
        let admin = user(&store, "a@example.com").await;
        let group = store.create_group("Team", "", "ABC123", admin.id).await.unwrap();
        let doc = store.create_document(group.id, "Notes").await.unwrap();

        assert_eq!(store.load_document_state(doc.id).await.unwrap(), None);
        store.save_document_state(doc.id, &[1, 2, 3]).await.unwrap();
        assert_eq!(store.load_document_state(doc.id).await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.load_document_state(Uuid::new_v4()).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_announcements_newest_first() {
        let store = MemoryStore::new();
        let admin = user(&store, "a@example.com").await;
        let group = store.create_group("Team", "", "ABC123", admin.id).await.unwrap();
        store.create_announcement(group.id, admin.id, "first").await.unwrap();
        store.create_announcement(group.id, admin.id, "second").await.unwrap();

        let list = store.list_announcements(group.id).await.unwrap();
        let bodies: Vec<_> = list.iter().map(|a| a.body.as_str()).collect();
        assert_eq!(bodies, vec!["second", "first"]);
        assert_eq!(list[0].user_name.as_deref(), Some("Test"));
    }
}
