//! Group notice board

use std::sync::Arc;
use uuid::Uuid;

use crate::backend::error::BackendError;
use crate::backend::groups::guard::MembershipGuard;
use crate::backend::store::RelationalStore;
use crate::shared::{AnnouncementView, ErrorKind, Role};

pub const MAX_ANNOUNCEMENT_LEN: usize = 2000;

fn forbidden() -> BackendError {
    BackendError::forbidden("Only the author or a group admin can delete this")
}

pub struct AnnouncementBoard {
    store: Arc<dyn RelationalStore>,
    guard: Arc<MembershipGuard>,
}

impl AnnouncementBoard {
    pub fn new(store: Arc<dyn RelationalStore>, guard: Arc<MembershipGuard>) -> Self {
        Self { store, guard }
    }

    pub async fn post(&self, user_id: Uuid, code: &str, body: &str) -> Result<AnnouncementView, BackendError> {
        let body = body.trim();
        let len = body.chars().count();
        if len == 0 || len > MAX_ANNOUNCEMENT_LEN {
            return Err(BackendError::validation(format!(
                "Announcement must be between 1 and {} characters",
                MAX_ANNOUNCEMENT_LEN
            )));
        }
        let group = self.guard.authorize(user_id, code).await?;
        let announcement = self.store.create_announcement(group.id, user_id, body).await?;
        tracing::debug!("[Groups] Announcement {} posted in {}", announcement.id, group.code);
        Ok(announcement.into())
    }

    /// Newest first
    pub async fn list(&self, user_id: Uuid, code: &str) -> Result<Vec<AnnouncementView>, BackendError> {
        let group = self.guard.authorize(user_id, code).await?;
        Ok(self
            .store
            .list_announcements(group.id)
            .await?
            .into_iter()
            .map(AnnouncementView::from)
            .collect())
    }

    /// The author or a group admin may delete
    pub async fn delete(&self, user_id: Uuid, announcement_id: Uuid) -> Result<(), BackendError> {
        let announcement = self
            .store
            .get_announcement(announcement_id)
            .await?
            .ok_or_else(|| BackendError::not_found("Announcement not found"))?;

        if announcement.user_id != user_id {
            match self.guard.role_of(user_id, announcement.group_id).await {
                Ok(Role::Admin) => {}
                Ok(Role::Member) => return Err(forbidden()),
                Err(e) if e.kind() == ErrorKind::NotAuthorized => return Err(forbidden()),
                Err(e) => return Err(e),
            }
        }
        self.store.delete_announcement(announcement_id).await?;
        Ok(())
    }
}
