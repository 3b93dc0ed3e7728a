//! Document registry: the named documents each group owns

use std::sync::Arc;
use uuid::Uuid;

use crate::backend::error::BackendError;
use crate::backend::groups::MembershipGuard;
use crate::backend::store::{RelationalStore, StoreError};
use crate::shared::DocumentSummary;

pub const MAX_DOCUMENT_NAME_LEN: usize = 120;

pub struct DocumentRegistry {
    store: Arc<dyn RelationalStore>,
    guard: Arc<MembershipGuard>,
}

impl DocumentRegistry {
    pub fn new(store: Arc<dyn RelationalStore>, guard: Arc<MembershipGuard>) -> Self {
        Self { store, guard }
    }

    /// Any member may create; names are unique within the group
    pub async fn create_document(&self, user_id: Uuid, code: &str, name: &str) -> Result<DocumentSummary, BackendError> {
        let name = name.trim();
        let len = name.chars().count();
        if len == 0 || len > MAX_DOCUMENT_NAME_LEN {
            return Err(BackendError::validation(format!(
                "Document name must be between 1 and {} characters",
                MAX_DOCUMENT_NAME_LEN
            )));
        }
        let group = self.guard.authorize(user_id, code).await?;
        let record = self
            .store
            .create_document(group.id, name)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists(_) => {
                    BackendError::conflict("A document with that name already exists in this group")
                }
                other => other.into(),
            })?;
        tracing::info!("[Collab] Document {} created in {}", record.id, group.code);
        Ok(record.into())
    }

    pub async fn list_documents(&self, user_id: Uuid, code: &str) -> Result<Vec<DocumentSummary>, BackendError> {
        let group = self.guard.authorize(user_id, code).await?;
        Ok(self
            .store
            .list_documents(group.id)
            .await?
            .into_iter()
            .map(DocumentSummary::from)
            .collect())
    }
}
