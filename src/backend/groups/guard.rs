/**
 * Membership Guard
 *
 * Answers "may this user act on this group?" and owns every membership
 * change. Every other service authorizes through here before touching
 * group data.
 *
 * # Codes
 *
 * Join codes are six upper-case alphanumeric characters. Lookups are
 * case-insensitive. `authorize` reports an unknown code exactly like a
 * group the caller is not in, so codes cannot be probed.
 */

use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::error::BackendError;
use crate::backend::store::{Group, LeaveOutcome, Membership, RelationalStore, StoreError};
use crate::shared::{GroupSummary, MemberSummary, Role};

pub const CODE_LEN: usize = 6;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_ATTEMPTS: usize = 8;
pub const MAX_GROUP_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 500;

const NOT_A_MEMBER: &str = "not a member of this group";

/// Upper-cased, trimmed group code
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

pub struct MembershipGuard {
    store: Arc<dyn RelationalStore>,
}

impl MembershipGuard {
    pub fn new(store: Arc<dyn RelationalStore>) -> Self {
        Self { store }
    }

    async fn find_group(&self, code: &str) -> Result<Option<Group>, BackendError> {
        let code = normalize_code(code);
        if code.len() != CODE_LEN {
            return Ok(None);
        }
        Ok(self.store.get_group_by_code(&code).await?)
    }

    /// The group behind `code`, if the user is a member of it
    pub async fn authorize(&self, user_id: Uuid, code: &str) -> Result<Group, BackendError> {
        let group = self
            .find_group(code)
            .await?
            .ok_or_else(|| BackendError::not_authorized(NOT_A_MEMBER))?;
        self.role_of(user_id, group.id).await?;
        Ok(group)
    }

    pub async fn role_of(&self, user_id: Uuid, group_id: Uuid) -> Result<Role, BackendError> {
        self.store
            .get_membership(user_id, group_id)
            .await?
            .map(|m| m.role)
            .ok_or_else(|| BackendError::not_authorized(NOT_A_MEMBER))
    }

    pub async fn join(&self, user_id: Uuid, code: &str) -> Result<(Group, Membership), BackendError> {
        let group = self
            .find_group(code)
            .await?
            .ok_or_else(|| BackendError::not_found("No group with that code"))?;
        let membership = self
            .store
            .add_membership(user_id, group.id, Role::Member)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists(_) => BackendError::conflict("Already a member of this group"),
                other => other.into(),
            })?;
        tracing::info!("[Groups] User {} joined {}", user_id, group.code);
        Ok((group, membership))
    }

    /// The group is returned too, so callers can clean up after a
    /// `GroupDeleted` outcome
    pub async fn leave(&self, user_id: Uuid, code: &str) -> Result<(Group, LeaveOutcome), BackendError> {
        let group = self
            .find_group(code)
            .await?
            .ok_or_else(|| BackendError::not_found("No group with that code"))?;
        let outcome = self
            .store
            .leave_group(user_id, group.id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => BackendError::not_found(NOT_A_MEMBER),
                other => other.into(),
            })?;
        match outcome {
            LeaveOutcome::Left => tracing::info!("[Groups] User {} left {}", user_id, group.code),
            LeaveOutcome::Promoted(successor) => tracing::info!(
                "[Groups] Last admin left {}; promoted {}",
                group.code,
                successor
            ),
            LeaveOutcome::GroupDeleted => {
                tracing::info!("[Groups] Last member left {}; group removed", group.code)
            }
        }
        Ok((group, outcome))
    }

    /// Admins only; removes documents, memberships and announcements too.
    /// Returns the removed group.
    pub async fn delete_group(&self, user_id: Uuid, code: &str) -> Result<Group, BackendError> {
        let group = self
            .find_group(code)
            .await?
            .ok_or_else(|| BackendError::not_found("No group with that code"))?;
        let role = self.store.get_membership(user_id, group.id).await?.map(|m| m.role);
        if role != Some(Role::Admin) {
            return Err(BackendError::forbidden("Only group admins can delete a group"));
        }
        self.store.delete_group(group.id).await?;
        tracing::info!("[Groups] Group {} deleted by {}", group.code, user_id);
        Ok(group)
    }

    /// The creator becomes the first admin
    pub async fn create_group(&self, user_id: Uuid, name: &str, description: &str) -> Result<Group, BackendError> {
        let name = name.trim();
        let description = description.trim();
        if name.is_empty() {
            return Err(BackendError::validation("Group name is required"));
        }
        if name.chars().count() > MAX_GROUP_NAME_LEN {
            return Err(BackendError::validation(format!(
                "Group name must be at most {} characters",
                MAX_GROUP_NAME_LEN
            )));
        }
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(BackendError::validation(format!(
                "Description must be at most {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }

        for _ in 0..CODE_ATTEMPTS {
            let code = generate_code();
            match self.store.create_group(name, description, &code, user_id).await {
                Ok(group) => {
                    tracing::info!("[Groups] User {} created group {}", user_id, group.code);
                    return Ok(group);
                }
                Err(StoreError::AlreadyExists(_)) => {
                    tracing::debug!("[Groups] Code collision on {}, retrying", code);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(BackendError::internal("could not allocate a unique group code"))
    }

    pub async fn list_my_groups(&self, user_id: Uuid) -> Result<Vec<GroupSummary>, BackendError> {
        Ok(self
            .store
            .list_groups_for_user(user_id)
            .await?
            .into_iter()
            .map(|(group, role)| group.summary(Some(role)))
            .collect())
    }

    pub async fn list_members(&self, user_id: Uuid, code: &str) -> Result<Vec<MemberSummary>, BackendError> {
        let group = self.authorize(user_id, code).await?;
        Ok(self
            .store
            .list_members(group.id)
            .await?
            .into_iter()
            .map(MemberSummary::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_shape() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code(" abc123 "), "ABC123");
    }
}
